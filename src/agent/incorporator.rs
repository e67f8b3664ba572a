// ABOUTME: Streaming incorporator: folds response fragments into the trailing assistant turn.
// ABOUTME: State machine Idle -> Streaming -> (Completed | Failed | Cancelled) -> Idle.

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::StreamError;
use crate::session::{Session, Turn};

/// Where the incorporator is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
}

/// How the last stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// Events forwarded to the display while a response streams.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Fragment(String),
    Finished(StreamOutcome),
}

/// Applies fragments, in arrival order, to the session's streaming target.
///
/// Every method takes the session explicitly; the incorporator only tracks
/// whether a stream is open and where to forward display events.
#[derive(Debug)]
pub struct StreamingIncorporator {
    state: StreamState,
    last_outcome: Option<StreamOutcome>,
    display: Option<mpsc::UnboundedSender<StreamEvent>>,
}

impl Default for StreamingIncorporator {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamingIncorporator {
    pub fn new() -> Self {
        Self {
            state: StreamState::Idle,
            last_outcome: None,
            display: None,
        }
    }

    /// Forward fragments and terminal outcomes to `display`.
    pub fn with_display(mut self, display: mpsc::UnboundedSender<StreamEvent>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == StreamState::Idle
    }

    pub fn last_outcome(&self) -> Option<&StreamOutcome> {
        self.last_outcome.as_ref()
    }

    /// Open a stream: append an empty assistant turn as the target.
    pub fn begin(&mut self, session: &mut Session) -> Result<(), StreamError> {
        if self.state != StreamState::Idle || session.is_streaming() {
            return Err(StreamError::AlreadyStreaming);
        }
        session.append(Turn::assistant(""));
        self.state = StreamState::Streaming;
        self.last_outcome = None;
        debug!(turns = session.turns().len(), "stream started");
        Ok(())
    }

    /// Append a fragment to the target turn and forward it to the display.
    pub fn on_fragment(&mut self, session: &mut Session, text: &str) -> Result<(), StreamError> {
        self.ensure_streaming()?;
        session.extend_active(text)?;
        self.emit(StreamEvent::Fragment(text.to_string()));
        Ok(())
    }

    /// Close the stream successfully; the target turn becomes immutable.
    pub fn on_complete(&mut self, session: &mut Session) -> Result<(), StreamError> {
        self.ensure_streaming()?;
        let len = session.finalize_active().map_or(0, |t| t.content.len());
        debug!(bytes = len, "stream completed");
        self.finish(StreamOutcome::Completed);
        Ok(())
    }

    /// Close the stream with an error. Whatever content accumulated stays in
    /// the session so the user can inspect it or undo the exchange.
    pub fn on_error(&mut self, session: &mut Session, message: &str) -> Result<(), StreamError> {
        self.ensure_streaming()?;
        session.finalize_active();
        debug!(error = %message, "stream failed");
        self.finish(StreamOutcome::Failed(message.to_string()));
        Ok(())
    }

    /// Force the incorporator back to idle after the transport was abandoned.
    /// The partial turn remains in the session. No-op when idle.
    pub fn cancel(&mut self, session: &mut Session) {
        if self.state != StreamState::Streaming {
            return;
        }
        session.finalize_active();
        debug!("stream cancelled");
        self.finish(StreamOutcome::Cancelled);
    }

    fn ensure_streaming(&self) -> Result<(), StreamError> {
        match self.state {
            StreamState::Streaming => Ok(()),
            StreamState::Idle => Err(StreamError::NotStreaming),
        }
    }

    fn finish(&mut self, outcome: StreamOutcome) {
        self.state = StreamState::Idle;
        self.emit(StreamEvent::Finished(outcome.clone()));
        self.last_outcome = Some(outcome);
    }

    fn emit(&self, event: StreamEvent) {
        if let Some(display) = &self.display {
            let _ = display.send(event);
        }
    }
}
