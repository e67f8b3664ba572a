// ABOUTME: Session module: conversation turns, the session store, and conversation files.
// ABOUTME: The system turn lives only in memory; saved conversations hold the rest.

pub mod persistence;
pub mod store;
pub mod turn;

pub use store::Session;
pub use turn::{Role, Turn};
