use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dbgdiff_model::{DebuggerKind, StartPoint};
use tracing::{debug, warn};

use crate::adapter::{Adapter, StepKind, adapter_for};
use crate::channel::Channel;
use crate::transcript::Transcript;
use crate::{Result, SessionError};

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Options for launching a debugger.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound on every wait for a prompt, including the first one.
    pub timeout: Duration,
    /// Where per-session transcripts are written, if anywhere.
    pub transcript_dir: Option<PathBuf>,
    /// Debugger executable, overriding the kind's default name.
    pub program: Option<String>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            transcript_dir: None,
            program: None,
        }
    }
}

impl SessionOptions {
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_transcript_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transcript_dir = Some(dir.into());
        self
    }

    #[must_use]
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = Some(program.into());
        self
    }
}

/// A running debugger with a binary loaded.
pub struct Session {
    adapter: Box<dyn Adapter>,
    channel: Channel,
    id: String,
    transcript: Option<Transcript>,
}

impl Session {
    /// Launch a debugger, configure it for scripting and load `binary`.
    pub fn launch(kind: DebuggerKind, binary: &Path, options: &SessionOptions) -> Result<Self> {
        let adapter = adapter_for(kind);
        let program = options
            .program
            .clone()
            .unwrap_or_else(|| adapter.program().to_string());

        let mut command = Command::new(&program);
        command.args(adapter.launch_args());
        let mut channel = Channel::spawn(command, adapter.prompt(), options.timeout)?;
        if channel.expect_prompt()?.is_none() {
            return Err(SessionError::LaunchTimeout {
                program,
                timeout: options.timeout,
            });
        }

        let stem = binary
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("binary");
        let id = format!("{kind}-{stem}-{}", NEXT_SESSION.fetch_add(1, Ordering::Relaxed));
        let transcript = options
            .transcript_dir
            .as_deref()
            .map(|dir| Transcript::create(dir, &id))
            .transpose()?;
        debug!(session = %id, pid = channel.id(), "debugger launched");

        let mut session = Self {
            adapter,
            channel,
            id,
            transcript,
        };
        for line in session.adapter.config_script() {
            session.send(line)?;
        }
        let load = session.adapter.load_command(binary);
        session.send(&load)?;
        Ok(session)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> DebuggerKind {
        self.adapter.kind()
    }

    pub fn adapter(&self) -> &dyn Adapter {
        self.adapter.as_ref()
    }

    pub const fn timeout(&self) -> Duration {
        self.channel.timeout()
    }

    /// Send one command and return its response.
    pub fn send(&mut self, command: &str) -> Result<String> {
        let result = self.channel.send(command);
        match &result {
            Ok(response) => {
                debug!(session = %self.id, command, response = %response, "exchange");
                if let Some(transcript) = &mut self.transcript {
                    if let Err(e) = transcript.record(command, response) {
                        warn!(session = %self.id, error = %e, "transcript write failed");
                    }
                }
            }
            Err(e) => debug!(session = %self.id, command, error = %e, "exchange failed"),
        }
        result
    }

    /// Whether the inferior has not exited yet.
    pub fn is_process_alive(&mut self) -> Result<bool> {
        let output = self.send(self.adapter.process_status_command())?;
        Ok(self.adapter.is_process_alive(&output))
    }

    pub fn set_breakpoint(&mut self, start: &StartPoint) -> Result<String> {
        let command = self.adapter.break_command(start);
        self.send(&command)
    }

    pub fn run(&mut self) -> Result<String> {
        self.send(self.adapter.run_command())
    }

    pub fn step(&mut self, kind: StepKind) -> Result<String> {
        self.send(self.adapter.step_command(kind))
    }

    /// Return to the caller, or take one `fallback` step when there is no
    /// caller or the debugger refuses to finish.
    pub fn finish_or_step(&mut self, fallback: StepKind) -> Result<()> {
        let backtrace = self.send(self.adapter.backtrace_command())?;
        if self.adapter.has_caller(&backtrace) {
            let output = self.send(self.adapter.finish_command())?;
            if !self.adapter.finish_failed(&output) {
                return Ok(());
            }
        }
        self.step(fallback)?;
        Ok(())
    }

    /// Tell the debugger not to step into loaded shared objects.
    ///
    /// Only some debuggers support this; elsewhere it does nothing.
    pub fn avoid_library_stepping(&mut self) -> Result<()> {
        if !self.adapter.supports_step_avoid() {
            return Ok(());
        }
        let listing = self.send(self.adapter.image_list_command())?;
        let libraries: Vec<String> = self
            .adapter
            .parse_image_list(&listing)
            .into_iter()
            .filter(|path| Path::new(path).exists())
            .collect();
        if let Some(command) = self.adapter.step_avoid_command(&libraries) {
            self.send(&command)?;
        }
        Ok(())
    }
}
