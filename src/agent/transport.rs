// ABOUTME: Transport boundary: the completion call the core hands a conversation to.
// ABOUTME: Implementations push fragments over a channel, ending with Done or Failed.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::TransportError;
use crate::session::Turn;

/// Channel capacity between a transport's reader task and the consumer.
pub const EVENT_BUFFER: usize = 64;

/// What a transport is asked to complete.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<Turn>,
    pub max_tokens: u32,
    pub model: Option<String>,
    pub stream: bool,
}

/// One item of a completion's output. A non-streaming reply is a single
/// `Fragment` followed by `Done`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Fragment(String),
    Done,
    Failed(String),
}

/// A completion service.
///
/// Dropping the returned receiver abandons the request; implementations
/// stop producing once sends fail.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<TransportEvent>, TransportError>;
}
