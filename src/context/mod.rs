// ABOUTME: Context module: notebook page selection and system instruction assembly.
// ABOUTME: The assembled text becomes the session's system turn.

pub mod assembler;
pub mod set;

pub use assembler::{AssembledContext, assemble, assemble_with_report};
pub use set::{ContextSet, PageEntry};
