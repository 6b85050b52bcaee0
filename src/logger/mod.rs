//! Append-only activity logging with rotation and graceful degradation.

pub mod activity;
