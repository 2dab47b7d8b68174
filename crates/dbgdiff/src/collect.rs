//! Stepping a debugger through a program and recording where it stops.
//!
//! A run breaks at its start point, then steps until the inferior exits.
//! Every stop inside the file under test is recorded with the variables
//! visible there; stops in library code are stepped or finished through
//! without being recorded.

use std::path::Path;
use std::time::{Duration, Instant};

use dbgdiff_model::{DebuggerKind, DrivePolicy, Location, StartPoint, Stepping, Trace, TraceBuilder};
use dbgdiff_session::{Session, SessionOptions, StepKind, current_frame, frame_variables};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::{Error, Result, metrics};

/// Options shared by every debugger run of a file.
#[derive(Debug, Clone)]
pub struct CollectOptions {
    pub session: SessionOptions,
    /// Wall-clock bound on one drive or collection loop.
    pub timeout: Duration,
    /// Seed for random stepping; fresh entropy when absent.
    pub seed: Option<u64>,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            timeout: Duration::from_secs(300),
            seed: None,
        }
    }
}

impl CollectOptions {
    #[must_use]
    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn rng(&self) -> StdRng {
        self.seed.map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64)
    }
}

/// Lifecycle of one run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    NotStarted,
    Running,
    Exited,
    TimedOut,
    Failed,
}

/// Moves a session forward one stop at a time.
struct Walker<'a> {
    session: &'a mut Session,
    source: &'a Path,
    rng: &'a mut StdRng,
    stepping: Stepping,
    state: RunState,
    /// Whether the previous stop was in the file under test.
    previous_in_user: bool,
    steps: u64,
}

impl<'a> Walker<'a> {
    fn new(session: &'a mut Session, source: &'a Path, stepping: Stepping, rng: &'a mut StdRng) -> Self {
        Self {
            session,
            source,
            rng,
            stepping,
            state: RunState::NotStarted,
            previous_in_user: false,
            steps: 0,
        }
    }

    fn start(&mut self, start: &StartPoint) -> Result<()> {
        self.session.set_breakpoint(start)?;
        self.session.run()?;
        self.state = RunState::Running;
        Ok(())
    }

    fn step_kind(&mut self) -> StepKind {
        match self.stepping {
            Stepping::Line => StepKind::Line,
            Stepping::Instruction => StepKind::Instruction,
            Stepping::Random => {
                if self.rng.random_bool(0.5) {
                    StepKind::Line
                } else {
                    StepKind::Instruction
                }
            }
        }
    }

    /// Whether the loop may go on: not out of time and the inferior is alive.
    fn advance_check(&mut self, began: Instant, timeout: Duration) -> Result<bool> {
        if began.elapsed() >= timeout {
            self.state = RunState::TimedOut;
            return Ok(false);
        }
        if !self.session.is_process_alive()? {
            self.state = RunState::Exited;
            return Ok(false);
        }
        Ok(true)
    }

    fn frame(&mut self) -> Result<Option<Location>> {
        Ok(current_frame(self.session, self.source)?)
    }

    fn step(&mut self) -> Result<()> {
        debug_assert_eq!(self.state, RunState::Running);
        let kind = self.step_kind();
        self.session.step(kind)?;
        self.steps += 1;
        Ok(())
    }

    /// Get out of library code.
    ///
    /// Returns whether the stop was handled here; user-code stops are left to
    /// the caller.
    fn pass_library(&mut self, frame: Option<&Location>) -> Result<bool> {
        if frame.is_some_and(Location::is_user_code) {
            self.previous_in_user = true;
            return Ok(false);
        }
        if self.previous_in_user {
            // Just left the file under test: one step, not recorded.
            self.previous_in_user = false;
            self.step()?;
        } else {
            let kind = self.step_kind();
            self.session.finish_or_step(kind)?;
            self.steps += 1;
        }
        Ok(true)
    }

    fn fail_on_error<T>(&mut self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.state = RunState::Failed;
        }
        result
    }
}

fn reached(frame: &Location, start: &StartPoint) -> bool {
    match start {
        StartPoint::Entry => true,
        StartPoint::Address(address) => frame.address == *address,
        StartPoint::Line { file, line } => {
            frame.file.as_deref() == Some(file.as_str()) && frame.line == Some(*line)
        }
    }
}

/// Bring the inferior to `start`.
///
/// A breakpoint drive (or any drive to `main`) breaks and runs once; a
/// stepping drive breaks at `main` and steps until the target shows up.
/// Returns whether the inferior stopped at the target.
pub fn drive_to_start(
    session: &mut Session,
    source: &Path,
    drive: DrivePolicy,
    start: &StartPoint,
    timeout: Duration,
    rng: &mut StdRng,
) -> Result<bool> {
    let stepping = match (start, drive) {
        (StartPoint::Entry, _) | (_, DrivePolicy::Break) => {
            session.set_breakpoint(start)?;
            session.run()?;
            if matches!(start, StartPoint::Entry) {
                return Ok(true);
            }
            let frame = current_frame(session, source)?;
            return Ok(frame.is_some_and(|frame| reached(&frame, start)));
        }
        (_, DrivePolicy::Step(stepping)) => stepping,
    };

    let mut walker = Walker::new(session, source, stepping, rng);
    walker.start(&StartPoint::Entry)?;
    let began = Instant::now();
    loop {
        let alive = walker.advance_check(began, timeout);
        if !walker.fail_on_error(alive)? {
            if walker.state == RunState::TimedOut {
                return Err(Error::DriveTimeout {
                    target: start.to_string(),
                    timeout,
                });
            }
            debug!(session = %walker.session.id(), %start, "inferior exited before the start point");
            return Ok(false);
        }

        let frame = walker.frame();
        let frame = walker.fail_on_error(frame)?;
        if frame.as_ref().is_some_and(|frame| reached(frame, start)) {
            return Ok(true);
        }
        let passed = walker.pass_library(frame.as_ref());
        if !walker.fail_on_error(passed)? {
            let stepped = walker.step();
            walker.fail_on_error(stepped)?;
        }
    }
}

/// Step until the inferior exits, recording every stop in `source`.
///
/// The session must already be stopped at the start point.
pub fn collect(
    session: &mut Session,
    source: &Path,
    stepping: Stepping,
    timeout: Duration,
    rng: &mut StdRng,
) -> Result<Trace> {
    let kind = session.kind();
    let mut walker = Walker::new(session, source, stepping, rng);
    walker.state = RunState::Running;
    let mut builder = TraceBuilder::new();
    let began = Instant::now();

    loop {
        let alive = walker.advance_check(began, timeout);
        if !walker.fail_on_error(alive)? {
            break;
        }

        let frame = walker.frame();
        let frame = walker.fail_on_error(frame)?;
        let passed = walker.pass_library(frame.as_ref());
        if walker.fail_on_error(passed)? {
            continue;
        }
        let Some(location) = frame else { continue };

        let vars = frame_variables(walker.session).map_err(Error::from);
        let vars = walker.fail_on_error(vars)?;
        builder.record(location, vars);
        let stepped = walker.step();
        walker.fail_on_error(stepped)?;
    }

    metrics::record_collect(kind, stepping, walker.steps, began.elapsed());
    if walker.state == RunState::TimedOut {
        return Err(Error::CollectTimeout { timeout });
    }
    debug!(
        session = %walker.session.id(),
        stops = builder.len(),
        steps = walker.steps,
        "collection finished"
    );
    Ok(builder.finish())
}

/// Launch a debugger on `binary`, break at `main` and collect to the end.
pub fn complete_run(
    binary: &Path,
    source: &Path,
    kind: DebuggerKind,
    stepping: Stepping,
    options: &CollectOptions,
) -> Result<Trace> {
    let mut session = launch(binary, kind, options)?;
    let mut rng = options.rng();
    drive_to_start(
        &mut session,
        source,
        DrivePolicy::Break,
        &StartPoint::Entry,
        options.timeout,
        &mut rng,
    )?;
    session.avoid_library_stepping()?;
    collect(&mut session, source, stepping, options.timeout, &mut rng)
}

/// Launch a debugger on `binary`, drive it to `start` and collect from there.
///
/// `None` when the drive never reached `start`.
pub fn one_run(
    binary: &Path,
    source: &Path,
    kind: DebuggerKind,
    drive: DrivePolicy,
    start: &StartPoint,
    stepping: Stepping,
    options: &CollectOptions,
) -> Result<Option<Trace>> {
    let mut session = launch(binary, kind, options)?;
    let mut rng = options.rng();
    if !drive_to_start(&mut session, source, drive, start, options.timeout, &mut rng)? {
        info!(binary = %binary.display(), %start, %drive, "start point not reached");
        return Ok(None);
    }
    collect(&mut session, source, stepping, options.timeout, &mut rng).map(Some)
}

fn launch(binary: &Path, kind: DebuggerKind, options: &CollectOptions) -> Result<Session> {
    let session = Session::launch(kind, binary, &options.session)?;
    metrics::record_session(kind);
    Ok(session)
}

#[cfg(test)]
mod tests {
    use dbgdiff_model::Address;

    use super::*;

    fn loc(file: Option<&str>, line: u32, address: u64) -> Location {
        Location::new(file.map(str::to_string), Some(line), None, Address(address))
    }

    #[test]
    fn test_reached() {
        let frame = loc(Some("t.c"), 5, 0x1138);
        assert!(reached(&frame, &StartPoint::Entry));
        assert!(reached(&frame, &StartPoint::Address(Address(0x1138))));
        assert!(!reached(&frame, &StartPoint::Address(Address(0x1140))));
        assert!(reached(
            &frame,
            &StartPoint::Line {
                file: "t.c".into(),
                line: 5
            }
        ));
        assert!(!reached(
            &loc(None, 5, 0x1138),
            &StartPoint::Line {
                file: "t.c".into(),
                line: 5
            }
        ));
    }

    #[test]
    fn test_seeded_options_repeat() {
        let options = CollectOptions::default().with_seed(7);
        let a: Vec<bool> = {
            let mut rng = options.rng();
            (0..32).map(|_| rng.random_bool(0.5)).collect()
        };
        let b: Vec<bool> = {
            let mut rng = options.rng();
            (0..32).map(|_| rng.random_bool(0.5)).collect()
        };
        assert_eq!(a, b);
    }
}
