// ABOUTME: Agent module: the transport boundary, streaming incorporation, and the exchange driver.
// ABOUTME: One exchange at a time: user turn in, streamed assistant turn out.

pub mod exchange;
pub mod incorporator;
pub mod openai;
pub mod transport;

pub use exchange::{ExchangeParams, run_exchange};
pub use incorporator::{StreamEvent, StreamOutcome, StreamState, StreamingIncorporator};
pub use openai::OpenAiTransport;
pub use transport::{CompletionRequest, Transport, TransportEvent};
