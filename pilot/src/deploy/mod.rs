//! Deployment orchestrator and build strategies

pub mod attempt;
pub mod direct;
pub mod orchestrator;
pub mod project;
pub mod runner;
pub mod strategy;
pub mod toolchain;
