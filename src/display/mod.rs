// src/display/mod.rs
//! Display modules for watching decoded positions

pub mod terminal;

pub use terminal::TerminalDisplay;
