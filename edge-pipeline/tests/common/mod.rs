#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use edge_pipeline::types::{Frame, PixelFormat, RenderOptions};
use interfaces::{InputStream, OutputStream, VideoInput, VideoOutput};
use serde_json::{json, Value};
use tokio::sync::{Notify, Semaphore};

static INIT: Once = Once::new();

pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .try_init()
            .ok();
    });
}

/// Small RGB frame with every byte set to `fill`.
pub fn solid_frame(fill: u8) -> Frame {
    Frame::new(4, 4, PixelFormat::Rgb8, vec![fill; 4 * 4 * 3]).unwrap()
}

/// Poll `condition` every 10ms for up to two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

// ---------------------------------------------------------------------------
// Media fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InputScript {
    /// Outcome of each `open` call in order; exhausted means failure.
    pub opens: VecDeque<bool>,
    /// Outcome of each `capture` call in order; exhausted means failure.
    pub captures: VecDeque<bool>,
    pub open_attempts: usize,
    pub closes: usize,
    pub fail_close: bool,
}

#[derive(Clone, Default)]
pub struct ScriptedInput {
    script: Arc<Mutex<InputScript>>,
}

impl ScriptedInput {
    pub fn new(opens: impl IntoIterator<Item = bool>, captures: impl IntoIterator<Item = bool>) -> Self {
        Self {
            script: Arc::new(Mutex::new(InputScript {
                opens: opens.into_iter().collect(),
                captures: captures.into_iter().collect(),
                ..Default::default()
            })),
        }
    }

    pub fn push_captures(&self, captures: impl IntoIterator<Item = bool>) {
        self.script.lock().unwrap().captures.extend(captures);
    }

    pub fn set_fail_close(&self, fail: bool) {
        self.script.lock().unwrap().fail_close = fail;
    }

    pub fn open_attempts(&self) -> usize {
        self.script.lock().unwrap().open_attempts
    }

    pub fn closes(&self) -> usize {
        self.script.lock().unwrap().closes
    }
}

struct ScriptedStream {
    script: Arc<Mutex<InputScript>>,
}

#[async_trait]
impl VideoInput for ScriptedInput {
    async fn open(&self, url: &str) -> anyhow::Result<Box<dyn InputStream>> {
        let mut script = self.script.lock().unwrap();
        script.open_attempts += 1;
        if script.opens.pop_front().unwrap_or(false) {
            Ok(Box::new(ScriptedStream {
                script: self.script.clone(),
            }))
        } else {
            Err(anyhow!("connection refused: {}", url))
        }
    }
}

#[async_trait]
impl InputStream for ScriptedStream {
    async fn capture(&mut self) -> anyhow::Result<Frame> {
        let ok = self.script.lock().unwrap().captures.pop_front().unwrap_or(false);
        if ok {
            Ok(solid_frame(42))
        } else {
            Err(anyhow!("decoder stalled"))
        }
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        let mut script = self.script.lock().unwrap();
        script.closes += 1;
        if script.fail_close {
            Err(anyhow!("pipeline already torn down"))
        } else {
            Ok(())
        }
    }
}

/// Output that records every frame handed to `render`.
///
/// With a gate, each render holds until a permit is added. `fail_renders`
/// makes that many leading renders fail.
#[derive(Clone)]
pub struct RecordingOutput {
    pub rendered: Arc<Mutex<Vec<Frame>>>,
    pub attempts: Arc<Mutex<usize>>,
    pub notify: Arc<Notify>,
    gate: Option<Arc<Semaphore>>,
    fail_renders: Arc<Mutex<usize>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self {
            rendered: Arc::new(Mutex::new(Vec::new())),
            attempts: Arc::new(Mutex::new(0)),
            notify: Arc::new(Notify::new()),
            gate: None,
            fail_renders: Arc::new(Mutex::new(0)),
        }
    }

    pub fn gated(gate: Arc<Semaphore>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::new()
        }
    }

    pub fn failing(count: usize) -> Self {
        let output = Self::new();
        *output.fail_renders.lock().unwrap() = count;
        output
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.rendered.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

struct RecordingStream {
    output: RecordingOutput,
}

#[async_trait]
impl VideoOutput for RecordingOutput {
    async fn open(&self, _url: &str, _options: &RenderOptions) -> anyhow::Result<Box<dyn OutputStream>> {
        Ok(Box::new(RecordingStream {
            output: self.clone(),
        }))
    }
}

#[async_trait]
impl OutputStream for RecordingStream {
    async fn render(&mut self, frame: &Frame) -> anyhow::Result<()> {
        *self.output.attempts.lock().unwrap() += 1;
        {
            let mut remaining = self.output.fail_renders.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(anyhow!("encoder rejected frame"));
            }
        }

        self.output.rendered.lock().unwrap().push(frame.clone());
        self.output.notify.notify_waiters();

        if let Some(gate) = &self.output.gate {
            gate.acquire().await.unwrap().forget();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Inference backend fake
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct FakeBackend {
    pub base_url: String,
    pub requests: Arc<Mutex<Vec<Value>>>,
    pub reply: Arc<Mutex<(StatusCode, Value)>>,
    pub health: Arc<Mutex<Value>>,
    pub gate: Option<Arc<Semaphore>>,
}

impl FakeBackend {
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }

    pub fn set_reply(&self, status: StatusCode, body: Value) {
        *self.reply.lock().unwrap() = (status, body);
    }

    pub fn set_health(&self, body: Value) {
        *self.health.lock().unwrap() = body;
    }
}

pub fn completion(content: &str) -> Value {
    json!({
        "choices": [
            { "index": 0, "message": { "role": "assistant", "content": content } }
        ]
    })
}

async fn completions(State(backend): State<FakeBackend>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    backend.requests.lock().unwrap().push(body);
    if let Some(gate) = &backend.gate {
        gate.acquire().await.unwrap().forget();
    }
    let (status, reply) = backend.reply.lock().unwrap().clone();
    (status, Json(reply))
}

async fn health(State(backend): State<FakeBackend>) -> Json<Value> {
    let body = backend.health.lock().unwrap().clone();
    Json(body)
}

/// Serve a fake chat-completion backend on an ephemeral port.
pub async fn spawn_backend(gate: Option<Arc<Semaphore>>) -> FakeBackend {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let backend = FakeBackend {
        base_url: format!("http://{}", addr),
        requests: Arc::new(Mutex::new(Vec::new())),
        reply: Arc::new(Mutex::new((StatusCode::OK, completion("ok")))),
        health: Arc::new(Mutex::new(json!({ "detail": "ready" }))),
        gate,
    };

    let app = Router::new()
        .route("/v1/chat/completions", get(completions))
        .route("/v1/health", get(health))
        .with_state(backend.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    backend
}

// ---------------------------------------------------------------------------
// Camera-management fake
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct FakeVst {
    pub base_url: String,
    /// (name, sensorId)
    pub sensors: Arc<Mutex<Vec<(String, String)>>>,
    pub added: Arc<Mutex<Vec<Value>>>,
    pub removed: Arc<Mutex<Vec<String>>>,
    pub streams: Arc<Mutex<Value>>,
}

async fn add_sensor(State(vst): State<FakeVst>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    vst.added.lock().unwrap().push(body.clone());
    let name = body["name"].as_str().unwrap_or_default().to_string();

    let mut sensors = vst.sensors.lock().unwrap();
    if sensors.iter().any(|(existing, _)| *existing == name) {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error_code": "VMSInvalidParameter", "error_message": "User given name is invalid or already exists" })),
        );
    }
    let sensor_id = format!("sensor-{}", sensors.len() + 1);
    sensors.push((name, sensor_id.clone()));
    (StatusCode::OK, Json(json!({ "sensorId": sensor_id })))
}

async fn remove_sensor(State(vst): State<FakeVst>, Path(sensor_id): Path<String>) -> StatusCode {
    vst.removed.lock().unwrap().push(sensor_id.clone());
    vst.sensors.lock().unwrap().retain(|(_, id)| *id != sensor_id);
    StatusCode::OK
}

async fn list_sensors(State(vst): State<FakeVst>) -> Json<Value> {
    let sensors: Vec<Value> = vst
        .sensors
        .lock()
        .unwrap()
        .iter()
        .map(|(name, id)| json!({ "name": name, "sensorId": id, "state": "online" }))
        .collect();
    Json(Value::Array(sensors))
}

async fn list_streams(State(vst): State<FakeVst>) -> Json<Value> {
    Json(vst.streams.lock().unwrap().clone())
}

pub async fn spawn_vst() -> FakeVst {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let vst = FakeVst {
        base_url: format!("http://{}", addr),
        streams: Arc::new(Mutex::new(json!([]))),
        ..Default::default()
    };

    let app = Router::new()
        .route("/api/v1/sensor/add", post(add_sensor))
        .route("/api/v1/sensor/list", get(list_sensors))
        .route("/api/v1/sensor/:id", delete(remove_sensor))
        .route("/api/v1/live/streams", get(list_streams))
        .with_state(vst.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    vst
}
