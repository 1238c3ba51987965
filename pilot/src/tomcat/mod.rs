//! Process lifecycle manager for the local Tomcat

pub mod config;
pub mod fsm;
pub mod install;
pub mod lifecycle;
pub mod manager;
pub mod port;
pub mod process;
