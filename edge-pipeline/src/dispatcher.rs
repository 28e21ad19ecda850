use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use reqwest::Client;
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::chat::{ChatCompletion, ChatMessage, ContentPart};
use crate::config::DispatchConfig;
use crate::encoding::jpeg_data_url;
use crate::types::{Frame, PipelineError, Result};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Keyword arguments handed to a persona callback.
pub type CallbackArgs = Map<String, Value>;

pub type PersonaCallback = Arc<dyn Fn(InferenceReply, CallbackArgs) + Send + Sync>;

/// Named bundle of system prompt and result callback ("ego").
#[derive(Clone)]
pub struct Persona {
    pub name: String,
    pub system_prompt: String,
    pub callback_args: CallbackArgs,
    callback: Option<PersonaCallback>,
}

impl Persona {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            callback_args: CallbackArgs::new(),
            callback: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(InferenceReply, CallbackArgs) + Send + Sync + 'static,
    {
        self.callback = Some(Arc::new(callback));
        self
    }

    pub fn with_args(mut self, args: CallbackArgs) -> Self {
        self.callback_args = args;
        self
    }

    pub fn has_callback(&self) -> bool {
        self.callback.is_some()
    }
}

impl std::fmt::Debug for Persona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persona")
            .field("name", &self.name)
            .field("system_prompt", &self.system_prompt)
            .field("callback_args", &self.callback_args)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// What to send: a bare prompt or a full chat-completion body.
#[derive(Debug, Clone, PartialEq)]
pub enum Prompt {
    Text(String),
    Chat(ChatCompletion),
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<ChatCompletion> for Prompt {
    fn from(chat: ChatCompletion) -> Self {
        Prompt::Chat(chat)
    }
}

/// Result passed to a persona callback.
#[derive(Debug, Clone, PartialEq)]
pub enum InferenceReply {
    /// Cleaned text of the first choice (plain prompt path).
    Text(String),
    /// Parsed response body as returned by the backend (chat path).
    Raw(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchRejection {
    #[error("inference backend is busy")]
    Busy,

    #[error("persona '{0}' does not exist; register it first")]
    UnknownPersona(String),

    #[error("unsupported message: {0}")]
    UnsupportedMessage(String),
}

impl DispatchRejection {
    pub fn label(&self) -> &'static str {
        match self {
            DispatchRejection::Busy => "busy",
            DispatchRejection::UnknownPersona(_) => "unknown_persona",
            DispatchRejection::UnsupportedMessage(_) => "unsupported_message",
        }
    }
}

/// Handle to an accepted request. Dropping it does not cancel the call.
#[derive(Debug)]
pub struct DispatchHandle {
    request_id: Uuid,
    task: JoinHandle<()>,
}

impl DispatchHandle {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Wait until the backend call and its callback have finished.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            error!(request_id = %self.request_id, "Inference task ended abnormally: {}", e);
        }
    }
}

/// Single-flight client for the vision-language chat server.
///
/// At most one request is in flight at any time; requests arriving while one
/// is running are rejected, not queued.
#[derive(Clone)]
pub struct InferenceDispatcher {
    inner: Arc<DispatcherInner>,
    runtime: Handle,
}

struct DispatcherInner {
    client: Client,
    completions_url: Url,
    health_url: Url,
    jpeg_quality: u8,
    personas: RwLock<HashMap<String, Persona>>,
    busy: AtomicBool,
}

/// Clears the busy flag when the request task ends, however it ends.
struct BusyGuard(Arc<DispatcherInner>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.busy.store(false, Ordering::Release);
    }
}

impl InferenceDispatcher {
    /// Must be called from within a tokio runtime; requests run on it.
    pub fn new(config: DispatchConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            PipelineError::Config(format!("inference dispatcher needs a tokio runtime: {}", e))
        })?;

        let mut builder = Client::builder().user_agent(&config.user_agent);
        if let Some(seconds) = config.request_timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }
        let client = builder.build()?;

        let base = config.base_url.trim_end_matches('/');
        let completions_url = Url::parse(&format!("{}/v1/chat/completions", base))?;
        let health_url = Url::parse(&format!("{}/v1/health", base))?;

        Ok(Self {
            inner: Arc::new(DispatcherInner {
                client,
                completions_url,
                health_url,
                jpeg_quality: config.jpeg_quality,
                personas: RwLock::new(HashMap::new()),
                busy: AtomicBool::new(false),
            }),
            runtime,
        })
    }

    /// Add a persona, replacing any existing one with the same name.
    pub fn register_persona(&self, persona: Persona) {
        info!(persona = %persona.name, "Registering persona");
        let mut personas = self
            .inner
            .personas
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        personas.insert(persona.name.clone(), persona);
    }

    pub fn persona(&self, name: &str) -> Option<Persona> {
        let personas = self
            .inner
            .personas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        personas.get(name).cloned()
    }

    pub fn list_personas(&self) -> Vec<String> {
        let personas = self
            .inner
            .personas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        personas.keys().cloned().collect()
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Start an inference call for `persona_name` without waiting for it.
    ///
    /// On acceptance the call runs on its own task and the persona callback
    /// receives the reply; failures during the call are logged and the
    /// callback is skipped. Rejections leave any in-flight call untouched.
    pub fn dispatch(
        &self,
        persona_name: &str,
        prompt: impl Into<Prompt>,
        images: Vec<Frame>,
        extra_args: CallbackArgs,
    ) -> std::result::Result<DispatchHandle, DispatchRejection> {
        let prompt = prompt.into();

        let admitted = self.admit(persona_name, &prompt);
        let persona = match admitted {
            Ok(persona) => persona,
            Err(rejection) => {
                info!(persona = %persona_name, "Request not dispatched: {}", rejection);
                metrics::counter!("edge_dispatch_rejected_total", "reason" => rejection.label())
                    .increment(1);
                return Err(rejection);
            }
        };

        let request_id = Uuid::new_v4();
        let guard = BusyGuard(self.inner.clone());
        let inner = self.inner.clone();

        debug!(request_id = %request_id, persona = %persona.name, "Dispatching inference request");
        let task = self.runtime.spawn(async move {
            let _guard = guard;
            inner
                .run(request_id, persona, prompt, images, extra_args)
                .await;
        });

        Ok(DispatchHandle { request_id, task })
    }

    fn admit(
        &self,
        persona_name: &str,
        prompt: &Prompt,
    ) -> std::result::Result<Persona, DispatchRejection> {
        if self.is_busy() {
            return Err(DispatchRejection::Busy);
        }

        let persona = self
            .persona(persona_name)
            .ok_or_else(|| DispatchRejection::UnknownPersona(persona_name.to_string()))?;

        if let Prompt::Chat(chat) = prompt {
            if chat.messages.is_empty() {
                return Err(DispatchRejection::UnsupportedMessage(
                    "chat completion has no messages".to_string(),
                ));
            }
        }

        // Only the caller that flips the flag gets to run.
        self.inner
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| DispatchRejection::Busy)?;

        Ok(persona)
    }

    /// GET the health endpoint; ready only on `{"detail": "ready"}`.
    pub async fn health_check(&self) -> bool {
        let response = match self
            .inner
            .client
            .get(self.inner.health_url.clone())
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                info!("Error occurred in health check: {}", e);
                return false;
            }
        };

        if !response.status().is_success() {
            debug!("Health check returned HTTP {}", response.status());
            return false;
        }

        match response.json::<Value>().await {
            Ok(body) => body == serde_json::json!({ "detail": "ready" }),
            Err(e) => {
                info!("Health check body was not JSON: {}", e);
                false
            }
        }
    }
}

impl DispatcherInner {
    async fn run(
        &self,
        request_id: Uuid,
        persona: Persona,
        prompt: Prompt,
        images: Vec<Frame>,
        extra_args: CallbackArgs,
    ) {
        let outcome = match prompt {
            Prompt::Text(text) => self
                .call_text(&persona, &text, &images)
                .await
                .map(InferenceReply::Text),
            Prompt::Chat(chat) => self.call_chat(chat, &images).await.map(InferenceReply::Raw),
        };

        let reply = match outcome {
            Ok(reply) => reply,
            Err(e) => {
                error!(request_id = %request_id, persona = %persona.name, "Inference request failed: {}", e);
                return;
            }
        };

        let callback = match &persona.callback {
            Some(callback) => callback,
            None => {
                debug!(request_id = %request_id, persona = %persona.name, "No callback registered; reply discarded");
                return;
            }
        };

        // Stored persona args win over call-site args on key collisions.
        let mut args = extra_args;
        for (key, value) in &persona.callback_args {
            args.insert(key.clone(), value.clone());
        }

        callback(reply, args);
        debug!(request_id = %request_id, persona = %persona.name, "Callback completed");
    }

    async fn call_chat(&self, mut chat: ChatCompletion, images: &[Frame]) -> Result<Value> {
        chat.resolve_streams(images, self.jpeg_quality)?;
        self.send(&chat).await
    }

    async fn call_text(&self, persona: &Persona, message: &str, images: &[Frame]) -> Result<String> {
        let mut parts = Vec::with_capacity(2);
        if let Some(frame) = images.first() {
            if images.len() > 1 {
                warn!(
                    persona = %persona.name,
                    "Plain prompt takes one image; ignoring {} extra",
                    images.len() - 1
                );
            }
            parts.push(ContentPart::image_url(jpeg_data_url(frame, self.jpeg_quality)?));
        }
        parts.push(ContentPart::text(message));

        let chat = ChatCompletion::new(vec![
            ChatMessage::system(persona.system_prompt.clone()),
            ChatMessage::user(parts),
        ]);

        let response = self.send(&chat).await?;
        let content = response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                PipelineError::MalformedResponse(
                    "response has no choices[0].message.content".to_string(),
                )
            })?;

        Ok(clean_reply(content))
    }

    async fn send(&self, chat: &ChatCompletion) -> Result<Value> {
        // The chat server takes the completion body on a GET.
        let response = self
            .client
            .get(self.completions_url.clone())
            .json(chat)
            .send()
            .await?
            .error_for_status()?;

        let body = response.text().await?;
        debug!("Chat server response: {}", body);
        Ok(serde_json::from_str(&body)?)
    }
}

/// Strip newlines and `</s>` end-of-sequence markers, then trim.
pub fn clean_reply(text: &str) -> String {
    text.replace('\n', "").replace("</s>", "").trim().to_string()
}
