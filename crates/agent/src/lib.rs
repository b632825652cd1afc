//! `gpuwatch-agent` library crate.
//!
//! The sampling engine and its acquisition sources. The binary entrypoint
//! lives in `main.rs`; modules are public for integration testing and for
//! embedding the engine in another service.

pub mod collector;
pub mod config;
pub mod engine;
pub mod sampler;
pub mod source;
