//! catpilot library
//!
//! Build, deploy and observe loop for a local Tomcat server.

pub mod api;
pub mod app;
pub mod browser;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod logs;
pub mod monitor;
pub mod storage;
pub mod tomcat;
pub mod utils;
pub mod workbench;
pub mod workers;
