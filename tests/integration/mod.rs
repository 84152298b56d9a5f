//! Integration test modules for divisi
//!
//! - engine: lifecycle, validation, fatal state, seeking
//! - playback: segment scheduling through the engine
//! - mixer: output and track controls, metering
//! - recording: input capture to ring buffers and wave files
//! - plugins: plugin layers inside the render cycle

pub mod engine;
pub mod mixer;
pub mod playback;
pub mod plugins;
pub mod recording;
