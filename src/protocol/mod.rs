// src/protocol/mod.rs
//! GL200 frame parsing and decoding

pub mod decoder;
pub mod frame;
pub mod layouts;
pub mod pattern;
pub mod position;
pub mod reconcile;

pub use decoder::Gl200Decoder;
pub use position::{AttributeValue, DeviceId, Position};
