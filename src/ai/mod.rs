/// Response sourcing for the kiosk
///
/// An exchange consumes a sequence of [`StreamEvent`]s. Where they come from is
/// decided once at startup: the live provider streams them from the
/// chat-completions endpoint, the demo provider plays canned answers locally.
///
/// # Architecture
///
/// - `decoder` - incremental `text/event-stream` frame decoder
/// - `live` - HTTP provider backed by `reqwest`
/// - `demo` - canned provider with no network access
mod decoder;
mod demo;
mod live;

pub use decoder::{DecodeError, EventFrameDecoder, decode_body};
pub use demo::DemoSource;
pub use live::LiveSource;

use crate::types::{ChatRequest, StreamEvent};
use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

// ============================================
// Error Types
// ============================================

#[derive(Debug, Error)]
pub enum ChatError {
    /// The endpoint answered with a non-success status.
    #[error("{status} {body}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Transport(String),

    #[error("Zeitüberschreitung bei der Anfrage.")]
    Timeout,
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        ChatError::Transport(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;

/// Ordered events of one exchange. Ends after `StreamEvent::End`, at end of
/// body, or with the first transport error.
pub type EventStream = BoxStream<'static, ChatResult<StreamEvent>>;

/// Capability shared by the live and demo providers.
#[async_trait]
pub trait ResponseSource: Send + Sync {
    /// Issues the request. `Ok` means the server accepted it and events will
    /// follow on the returned stream.
    async fn connect(&self, request: ChatRequest) -> ChatResult<EventStream>;

    fn is_demo(&self) -> bool {
        false
    }
}
