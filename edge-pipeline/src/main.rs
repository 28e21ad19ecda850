use std::path::PathBuf;

use clap::{Parser, Subcommand};
use edge_pipeline::dispatcher::CallbackArgs;
use edge_pipeline::encoding::frame_from_image;
use edge_pipeline::telemetry::{init_tracing, install_prometheus};
use edge_pipeline::{
    BoundingBox, InferenceDispatcher, InferenceReply, Persona, PipelineConfig, SchemaGenerator,
    VstClient,
};
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "edge-pipeline", about = "Edge camera pipeline utilities")]
struct Cli {
    /// JSON configuration file; built-in defaults are used when omitted.
    #[arg(long, env = "EDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `dispatch.base_url`.
    #[arg(long, env = "VLM_URL")]
    vlm_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Check whether the inference backend is ready.
    Health,
    /// Send one prompt (optionally with an image) and print the reply.
    Ask {
        #[arg(long)]
        prompt: String,
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        system_prompt: Option<String>,
    },
    /// List RTSP streams known to the camera-management service.
    Streams {
        #[arg(long, env = "VST_URL", default_value = "http://0.0.0.0:81")]
        vst_url: String,
    },
    /// Print an example detection record.
    Schema,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(url) = cli.vlm_url {
        config.dispatch.base_url = url;
    }

    if let Some(port) = config.telemetry.metrics_port {
        install_prometheus(port)?;
    }

    match cli.command {
        Command::Health => {
            let dispatcher = InferenceDispatcher::new(config.dispatch)?;
            let ready = dispatcher.health_check().await;
            println!("{}", if ready { "ready" } else { "not ready" });
        }
        Command::Ask {
            prompt,
            image,
            system_prompt,
        } => {
            let dispatcher = InferenceDispatcher::new(config.dispatch)?;
            let (tx, mut rx) = mpsc::unbounded_channel();

            let mut persona = Persona::new("cli").with_callback(move |reply, _args| {
                let _ = tx.send(reply);
            });
            if let Some(system_prompt) = system_prompt {
                persona = persona.with_system_prompt(system_prompt);
            }
            dispatcher.register_persona(persona);

            let images = match image {
                Some(path) => vec![frame_from_image(image::open(&path)?)],
                None => Vec::new(),
            };

            let handle = dispatcher.dispatch("cli", prompt, images, CallbackArgs::new())?;
            info!(request_id = %handle.request_id(), "Request dispatched");
            handle.wait().await;

            match rx.try_recv() {
                Ok(InferenceReply::Text(text)) => println!("{}", text),
                Ok(InferenceReply::Raw(value)) => println!("{}", serde_json::to_string_pretty(&value)?),
                Err(_) => {
                    error!("No reply received from the inference backend");
                    std::process::exit(1);
                }
            }
        }
        Command::Streams { vst_url } => {
            let client = VstClient::new(&vst_url)?;
            for stream in client.rtsp_streams().await? {
                println!("{}\t{}\t{}", stream.stream_id, stream.name, stream.url);
            }
        }
        Command::Schema => {
            let mut generator = SchemaGenerator::default();
            let record = generator.generate(
                &["person", "car"],
                &[
                    BoundingBox::from((10, 20, 110, 220)),
                    BoundingBox::from((300, 400, 500, 480)),
                ],
            )?;
            println!("{}", record);
        }
    }

    Ok(())
}
