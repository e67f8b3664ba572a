// ABOUTME: Exchange driver: runs one completion request from the transport into the session.
// ABOUTME: Consumes events strictly in order and always leaves the incorporator idle.

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::incorporator::{StreamOutcome, StreamingIncorporator};
use crate::agent::transport::{CompletionRequest, Transport, TransportEvent};
use crate::error::StreamError;
use crate::session::Session;

/// Request settings that do not come from the session.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeParams {
    pub max_tokens: u32,
    pub model: Option<String>,
    pub stream: bool,
}

/// Send the session's turns to `transport` and fold the reply into a new
/// assistant turn.
///
/// Fails only if a stream is already open. Transport failures and
/// cancellation are reported through the returned outcome.
pub async fn run_exchange(
    session: &mut Session,
    incorporator: &mut StreamingIncorporator,
    transport: &dyn Transport,
    params: &ExchangeParams,
    cancel: &CancellationToken,
) -> Result<StreamOutcome, StreamError> {
    let request = CompletionRequest {
        messages: session.turns().to_vec(),
        max_tokens: params.max_tokens,
        model: params.model.clone(),
        stream: params.stream,
    };
    incorporator.begin(session)?;

    let mut events = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            incorporator.cancel(session);
            return Ok(StreamOutcome::Cancelled);
        }
        result = transport.complete(request) => match result {
            Ok(rx) => rx,
            Err(e) => {
                warn!(error = %e, "completion request failed");
                incorporator.on_error(session, &e.to_string())?;
                return Ok(StreamOutcome::Failed(e.to_string()));
            }
        },
    };

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                incorporator.cancel(session);
                return Ok(StreamOutcome::Cancelled);
            }
            event = events.recv() => event,
        };

        match event {
            Some(TransportEvent::Fragment(text)) => {
                if let Err(e) = incorporator.on_fragment(session, &text) {
                    let message = e.to_string();
                    incorporator.on_error(session, &message)?;
                    return Ok(StreamOutcome::Failed(message));
                }
            }
            Some(TransportEvent::Done) => {
                incorporator.on_complete(session)?;
                debug!(turns = session.turns().len(), "exchange completed");
                return Ok(StreamOutcome::Completed);
            }
            Some(TransportEvent::Failed(message)) => {
                warn!(error = %message, "stream failed");
                incorporator.on_error(session, &message)?;
                return Ok(StreamOutcome::Failed(message));
            }
            None => {
                let message = "stream ended without end-of-stream marker".to_string();
                warn!("{}", message);
                incorporator.on_error(session, &message)?;
                return Ok(StreamOutcome::Failed(message));
            }
        }
    }
}
