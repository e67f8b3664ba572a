// ABOUTME: Library root for zimchat: re-exports all modules for integration testing.
// ABOUTME: The binary entry point is in main.rs, which uses this crate as a library.

pub mod agent;
pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod session;
