//! Background workers

pub mod access_log;
pub mod refresh;
