//! Synchronization markers - named timestamps used to align device streams

mod markers;

pub use markers::{MarkerTracker, MarkerWrite};
