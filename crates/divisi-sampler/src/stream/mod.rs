//! Threaded read-ahead streaming of one file channel.
//!
//! A background thread fills two fixed-size chunks (the ping-pong pair) and hands them to the
//! consumer through a lock-free ring; drained chunks travel back through a second ring. The
//! audio thread only pops, reads and recycles, never touching the file.

mod chunk;
mod reader;
mod thread;

pub use reader::BufferedFileReader;
