//! Channel behaviour against a scripted shell that imitates a debugger prompt.

use std::process::Command;
use std::time::Duration;

use dbgdiff_session::{Channel, ExitKind, SessionError};

const FAKE_DEBUGGER: &str = r#"
printf '(fake) '
while IFS= read -r line; do
  case "$line" in
    quit) exit 3 ;;
    crash) kill -SEGV $$ ;;
    hang) sleep 5 ;;
    *) printf 'you said %s\n' "$line" ;;
  esac
  printf '(fake) '
done
"#;

fn spawn(timeout: Duration) -> Channel {
    let mut command = Command::new("sh");
    command.arg("-c").arg(FAKE_DEBUGGER);
    let mut channel = Channel::spawn(command, "(fake) ", timeout).unwrap();
    assert!(channel.expect_prompt().unwrap().is_some(), "no initial prompt");
    channel
}

#[test]
fn test_command_round_trip() {
    let mut channel = spawn(Duration::from_secs(5));
    assert_eq!(channel.send("info proc").unwrap(), "you said info proc");
    assert_eq!(channel.send("step").unwrap(), "you said step");
}

#[test]
fn test_exit_status_is_reported() {
    let mut channel = spawn(Duration::from_secs(5));
    match channel.send("quit") {
        Err(SessionError::AbnormalExit(kind)) => assert_eq!(kind, ExitKind::Exited(3)),
        other => panic!("expected abnormal exit, got {other:?}"),
    }
    // Later commands fail the same way without touching the terminal.
    assert!(matches!(channel.send("step"), Err(SessionError::AbnormalExit(_))));
}

#[test]
fn test_segfault_is_reported() {
    let mut channel = spawn(Duration::from_secs(5));
    match channel.send("crash") {
        Err(SessionError::AbnormalExit(kind)) => assert_eq!(kind, ExitKind::Segfault),
        other => panic!("expected segfault, got {other:?}"),
    }
}

#[test]
fn test_command_timeout() {
    let mut channel = spawn(Duration::from_millis(300));
    match channel.send("hang") {
        Err(SessionError::CommandTimeout { command, .. }) => assert_eq!(command, "hang"),
        other => panic!("expected timeout, got {other:?}"),
    }
}
