// ABOUTME: Library root for sandclaw, re-exporting all modules for integration testing.
// ABOUTME: The binary entry point is in main.rs, which uses this crate as a library.

pub mod cli;
pub mod config;
pub mod logging;
pub mod sandbox;
