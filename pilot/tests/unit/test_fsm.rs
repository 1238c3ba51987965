//! Server FSM tests

use catpilot::tomcat::fsm::{ServerEvent, ServerFsm, ServerState};

#[test]
fn test_fsm_initial_state() {
    let fsm = ServerFsm::new();
    assert_eq!(fsm.state(), ServerState::Unknown);
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_start_flow() {
    let mut fsm = ServerFsm::new();

    fsm.process(ServerEvent::Probed(false)).unwrap();
    assert_eq!(fsm.state(), ServerState::Stopped);

    fsm.process(ServerEvent::Spawned).unwrap();
    assert_eq!(fsm.state(), ServerState::Starting);
    assert!(fsm.state().is_up());

    fsm.process(ServerEvent::Ready).unwrap();
    assert_eq!(fsm.state(), ServerState::Running);
}

#[test]
fn test_fsm_probe_does_not_interrupt_transitions() {
    let mut fsm = ServerFsm::new();
    fsm.process(ServerEvent::Spawned).unwrap();

    fsm.process(ServerEvent::Probed(false)).unwrap();
    assert_eq!(fsm.state(), ServerState::Starting);

    fsm.process(ServerEvent::Probed(true)).unwrap();
    fsm.process(ServerEvent::Ready).unwrap();
    fsm.process(ServerEvent::Stop).unwrap();
    fsm.process(ServerEvent::Probed(true)).unwrap();
    assert_eq!(fsm.state(), ServerState::Stopping);

    fsm.process(ServerEvent::Exited).unwrap();
    assert_eq!(fsm.state(), ServerState::Stopped);
}

#[test]
fn test_fsm_external_server_is_running() {
    let mut fsm = ServerFsm::new();
    fsm.process(ServerEvent::Probed(true)).unwrap();
    assert_eq!(fsm.state(), ServerState::Running);

    // Someone else stopped it
    fsm.process(ServerEvent::Probed(false)).unwrap();
    assert_eq!(fsm.state(), ServerState::Stopped);
}

#[test]
fn test_fsm_failure_records_error() {
    let mut fsm = ServerFsm::new();
    fsm.process(ServerEvent::Spawned).unwrap();
    fsm.process(ServerEvent::Failed("port in use".to_string())).unwrap();
    assert_eq!(fsm.state(), ServerState::Stopped);
    assert_eq!(fsm.error(), Some("port in use"));

    // Cleared on the next start
    fsm.process(ServerEvent::Spawned).unwrap();
    assert!(fsm.error().is_none());
}

#[test]
fn test_fsm_invalid_transitions() {
    let mut fsm = ServerFsm::new();
    fsm.process(ServerEvent::Probed(false)).unwrap();
    assert!(fsm.process(ServerEvent::Ready).is_err());
    assert!(fsm.process(ServerEvent::Stop).is_err());
    assert_eq!(fsm.state(), ServerState::Stopped);

    fsm.process(ServerEvent::Probed(true)).unwrap();
    assert!(fsm.process(ServerEvent::Spawned).is_err());
    assert_eq!(fsm.state(), ServerState::Running);
}
