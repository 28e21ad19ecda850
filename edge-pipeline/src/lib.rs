pub mod types;
pub mod config;
pub mod source;
pub mod sink;
pub mod encoding;
pub mod chat;
pub mod dispatcher;
pub mod traits;
pub mod alerts;
pub mod telemetry;
pub mod schema;
pub mod vst;

pub use types::*;
pub use config::{AlertConfig, DispatchConfig, PipelineConfig, SinkConfig, SourceConfig};
pub use source::FrameSource;
pub use sink::FrameSink;
pub use chat::{ChatCompletion, ChatMessage, ContentPart};
pub use dispatcher::{DispatchHandle, DispatchRejection, InferenceDispatcher, InferenceReply, Persona, Prompt};
pub use traits::AlertExporter;
pub use alerts::AlertMonitor;
pub use telemetry::PrometheusAlertExporter;
pub use schema::{BoundingBox, SchemaGenerator};
pub use vst::{RtspStream, VstClient};
