//! Application wiring

pub mod action;
pub mod options;
pub mod run;
pub mod state;
