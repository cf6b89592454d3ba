//! Core utilities shared by every vista crate.
//!
//! This crate provides:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Renderer configuration read once at startup

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{FailurePolicy, RendererConfig};
pub use error::{Error, Result};
pub use logging::{init_logging, init_logging_with_filter};
pub use timer::FrameTimer;
