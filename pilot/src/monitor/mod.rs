//! Log stream processing
//!
//! Classifies server console output and tails the rotating access log,
//! publishing both as [`pilot_api::LogEvent`]s through a [`sink::LogSink`].

pub mod access_log;
pub mod classify;
pub mod processor;
pub mod sink;
