use serde::{Deserialize, Serialize};
use tracing::info;

use crate::encoding::jpeg_data_url;
use crate::types::{Frame, Result};

/// Chat-completion request body: `{"messages": [...]}`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChatCompletion {
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
    /// Placeholder for a live frame, replaced by an `ImageUrl` before sending.
    Stream,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    }

    fn parts(&self) -> &[ContentPart] {
        match &self.content {
            MessageContent::Parts(parts) => parts,
            MessageContent::Text(_) => &[],
        }
    }
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image_url(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

impl ChatCompletion {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages }
    }

    pub fn push(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn stream_placeholders(&self) -> usize {
        self.all_parts().filter(|part| **part == ContentPart::Stream).count()
    }

    fn all_parts(&self) -> impl Iterator<Item = &ContentPart> {
        self.messages.iter().flat_map(ChatMessage::parts)
    }

    /// Replace `stream` placeholders, in order, with the supplied frames.
    ///
    /// Placeholders left over once `images` runs out are removed rather than
    /// failing the request. Returns how many were removed.
    pub fn resolve_streams(&mut self, images: &[Frame], jpeg_quality: u8) -> Result<usize> {
        let mut next_image = images.iter();
        let mut dropped = 0;

        for message in &mut self.messages {
            let parts = match &mut message.content {
                MessageContent::Parts(parts) => parts,
                MessageContent::Text(_) => continue,
            };

            let mut resolved = Vec::with_capacity(parts.len());
            for part in parts.drain(..) {
                if part != ContentPart::Stream {
                    resolved.push(part);
                    continue;
                }
                match next_image.next() {
                    Some(frame) => {
                        resolved.push(ContentPart::image_url(jpeg_data_url(frame, jpeg_quality)?));
                    }
                    None => dropped += 1,
                }
            }
            *parts = resolved;
        }

        if dropped > 0 {
            info!(
                "Not enough images were supplied with the chat completion prompt; dropped {} stream placeholder(s)",
                dropped
            );
        }
        Ok(dropped)
    }
}
