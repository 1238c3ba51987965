//! Unit tests across module boundaries

mod support;

mod test_actions;
mod test_deploy;
mod test_fsm;
mod test_lifecycle;
mod test_refresh;
