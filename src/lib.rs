// src/lib.rs
//! GL200 Decoder Library
//!
//! Decodes the comma-delimited text frames of Queclink GL200-family trackers
//! into position records and builds the acknowledgments those devices expect.

pub mod config;
pub mod display;
pub mod error;
pub mod protocol;
pub mod server;
pub mod session;

// Re-export main types for convenience
pub use error::{Result, TrackerError};
pub use protocol::{Gl200Decoder, Position};
pub use server::TrackerServer;
