use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::AsFd;
use std::os::unix::process::CommandExt;
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use nix::pty::{OpenptyResult, Winsize, openpty};
use nix::sys::termios::{LocalFlags, SetArg, Termios, tcgetattr, tcsetattr};
use regex::Regex;

use crate::{ExitKind, Result, SessionError};

/// How long a process that closed its terminal gets to exit before it is killed.
const EXIT_GRACE: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A child process on a pseudo-terminal, answered by a fixed prompt string.
pub struct Channel {
    child: Child,
    pty: File,
    prompt: Vec<u8>,
    buffer: Vec<u8>,
    timeout: Duration,
    exited: Option<ExitKind>,
}

impl Channel {
    /// Spawn `command` with a new pseudo-terminal as its stdin, stdout and stderr.
    ///
    /// Echo is off and the window is wide so long lines are not wrapped.
    pub fn spawn(mut command: Command, prompt: &str, timeout: Duration) -> Result<Self> {
        let winsize = Winsize {
            ws_row: 50,
            ws_col: 4096,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let OpenptyResult { master, slave } = openpty(&winsize, None::<&Termios>)?;

        let mut termios = tcgetattr(&slave)?;
        termios.local_flags.remove(LocalFlags::ECHO);
        tcsetattr(&slave, SetArg::TCSANOW, &termios)?;

        command
            .stdin(Stdio::from(slave.try_clone()?))
            .stdout(Stdio::from(slave.try_clone()?))
            .stderr(Stdio::from(slave))
            .env("TERM", "dumb");
        // SAFETY: setsid is async-signal-safe and touches no parent state.
        unsafe {
            command.pre_exec(|| nix::unistd::setsid().map(drop).map_err(io::Error::from));
        }
        let child = command.spawn()?;
        // The command holds the slave side open; EOF is only seen once it is gone.
        drop(command);

        Ok(Self {
            child,
            pty: File::from(master),
            prompt: prompt.as_bytes().to_vec(),
            buffer: Vec::new(),
            timeout,
            exited: None,
        })
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Wait for the next prompt and return what was printed before it.
    ///
    /// `Ok(None)` means the timeout elapsed first.
    pub fn expect_prompt(&mut self) -> Result<Option<String>> {
        let deadline = Instant::now() + self.timeout;
        self.read_until_prompt(deadline)
            .map(|raw| raw.map(|raw| clean_output(&raw, None)))
    }

    /// Write one command line and return the response printed before the next prompt.
    pub fn send(&mut self, command: &str) -> Result<String> {
        self.write_line(command)?;
        let deadline = Instant::now() + self.timeout;
        match self.read_until_prompt(deadline)? {
            Some(raw) => Ok(clean_output(&raw, Some(command))),
            None => Err(SessionError::CommandTimeout {
                command: command.to_string(),
                timeout: self.timeout,
            }),
        }
    }

    pub fn write_line(&mut self, line: &str) -> Result<()> {
        if let Some(kind) = &self.exited {
            return Err(SessionError::AbnormalExit(kind.clone()));
        }
        let mut bytes = Vec::with_capacity(line.len() + 1);
        bytes.extend_from_slice(line.as_bytes());
        bytes.push(b'\n');
        self.pty.write_all(&bytes)?;
        Ok(())
    }

    fn read_until_prompt(&mut self, deadline: Instant) -> Result<Option<String>> {
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(pos) = find(&self.buffer, &self.prompt) {
                let text = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
                self.buffer.drain(..pos + self.prompt.len());
                return Ok(Some(text));
            }
            if let Some(kind) = &self.exited {
                return Err(SessionError::AbnormalExit(kind.clone()));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }
            let wait_ms = u16::try_from((deadline - now).as_millis()).unwrap_or(u16::MAX);
            let ready = {
                let mut fds = [PollFd::new(self.pty.as_fd(), PollFlags::POLLIN)];
                match poll(&mut fds, PollTimeout::from(wait_ms)) {
                    Ok(n) => n > 0,
                    Err(Errno::EINTR) => false,
                    Err(e) => return Err(e.into()),
                }
            };
            if !ready {
                continue;
            }

            match self.pty.read(&mut chunk) {
                Ok(0) => self.mark_exited(),
                Ok(n) => self.buffer.extend_from_slice(&chunk[..n]),
                // Linux reports a closed slave side as EIO rather than EOF.
                Err(e) if e.raw_os_error() == Some(Errno::EIO as i32) => self.mark_exited(),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn mark_exited(&mut self) {
        let deadline = Instant::now() + EXIT_GRACE;
        let kind = loop {
            match self.child.try_wait() {
                Ok(Some(status)) => break ExitKind::from_status(status),
                Ok(None) if Instant::now() < deadline => std::thread::sleep(POLL_INTERVAL),
                _ => {
                    let _ = self.child.kill();
                    break self.child.wait().map_or(ExitKind::Unknown, ExitKind::from_status);
                }
            }
        };
        self.exited = Some(kind);
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        if self.exited.is_none() {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

static ESCAPE_PATTERN: OnceLock<Regex> = OnceLock::new();

/// Normalize terminal output: escape sequences and carriage returns go, and
/// a leading echo of `command` is dropped.
fn clean_output(raw: &str, command: Option<&str>) -> String {
    let escapes = ESCAPE_PATTERN.get_or_init(|| {
        Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)|\x1b[=>]").unwrap()
    });
    let text = escapes.replace_all(raw, "");
    let text = text.replace("\r\n", "\n").replace('\r', "");

    let body = match (command, text.split_once('\n')) {
        (Some(cmd), Some((first, rest))) if first.trim() == cmd.trim() => rest,
        (Some(cmd), None) if text.trim() == cmd.trim() => "",
        _ => text.as_str(),
    };
    body.trim_end_matches('\n').to_string()
}
