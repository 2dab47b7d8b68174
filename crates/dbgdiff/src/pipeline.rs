//! Per-file pipeline and the worker pool over source files.
//!
//! One file goes through check → compile → line table → collect → cache →
//! compare → report. Failures abort that file only and are written to the
//! ledger; the pool keeps going.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dbgdiff_model::{
    Configuration, DebuggerKind, DrivePolicy, FileTraces, Image, OptLevel, StartPoint, Stepping,
};
use dbgdiff_session::{SessionOptions, static_line_table};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::cache::Cache;
use crate::collect::{CollectOptions, complete_run, one_run};
use crate::compare::{CompareConfig, Discrepancy, Engine, SourceText};
use crate::ledger::Ledger;
use crate::metrics::{self, FileOutcome};
use crate::report::ReportWriter;
use crate::toolchain::Compiler;
use crate::{Error, Result};

/// Drive policies tried for every start point.
const START_DRIVES: [DrivePolicy; 3] = [
    DrivePolicy::Step(Stepping::Line),
    DrivePolicy::Step(Stepping::Instruction),
    DrivePolicy::Break,
];

/// Configuration for a run over one file or a directory.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Source file or directory.
    pub source: PathBuf,
    /// Where the ledger, reports and cache go (default: `Expr`).
    pub out_dir: PathBuf,
    pub compiler: Compiler,
    pub debugger: DebuggerKind,
    /// Bound on each compile, check and debugger loop.
    pub timeout: Duration,
    /// Process files on a worker pool.
    pub parallel: bool,
    /// Also collect from every line-table point, under every drive policy.
    pub start_points: bool,
    /// Restrict comparisons to points in the static line table.
    pub validate: bool,
    pub seed: Option<u64>,
    pub transcript_dir: Option<PathBuf>,
    /// Debugger executable, when not the kind's default.
    pub debugger_program: Option<String>,
}

impl RunConfig {
    pub fn new(source: impl Into<PathBuf>, compiler: Compiler, debugger: DebuggerKind) -> Self {
        Self {
            source: source.into(),
            out_dir: PathBuf::from("Expr"),
            compiler,
            debugger,
            timeout: Duration::from_secs(300),
            parallel: false,
            start_points: false,
            validate: false,
            seed: None,
            transcript_dir: None,
            debugger_program: None,
        }
    }

    #[must_use]
    pub fn with_out_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.out_dir = dir.into();
        self
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    #[must_use]
    pub const fn with_start_points(mut self, start_points: bool) -> Self {
        self.start_points = start_points;
        self
    }

    #[must_use]
    pub const fn with_validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }

    #[must_use]
    pub const fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_transcript_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.transcript_dir = dir;
        self
    }

    #[must_use]
    pub fn with_debugger_program(mut self, program: Option<String>) -> Self {
        self.debugger_program = program;
        self
    }

    pub fn cache(&self) -> Cache {
        Cache::new(self.out_dir.join("cache"))
    }

    pub fn ledger(&self) -> io::Result<Ledger> {
        Ledger::open(&self.out_dir, self.debugger)
    }

    pub fn session_options(&self) -> SessionOptions {
        let mut options = SessionOptions::default().with_timeout(self.timeout);
        if let Some(dir) = &self.transcript_dir {
            options = options.with_transcript_dir(dir);
        }
        if let Some(program) = &self.debugger_program {
            options = options.with_program(program);
        }
        options
    }

    pub fn collect_options(&self) -> CollectOptions {
        let options = CollectOptions::default()
            .with_session(self.session_options())
            .with_timeout(self.timeout);
        match self.seed {
            Some(seed) => options.with_seed(seed),
            None => options,
        }
    }

    pub fn compare_config(&self) -> CompareConfig {
        CompareConfig::default().with_validate(self.validate)
    }
}

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    /// Traces were compared; `cached` when they came from the cache.
    Compared { discrepancies: usize, cached: bool },
    /// Processing stopped; the ledger category or reason.
    Failed(String),
}

/// Result of processing one source file.
#[derive(Debug, Clone)]
pub struct FileResult {
    pub path: PathBuf,
    pub status: FileStatus,
}

impl FileResult {
    pub const fn is_failure(&self) -> bool {
        matches!(self.status, FileStatus::Failed(_))
    }
}

/// Totals over a run.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub compared: usize,
    pub cached: usize,
    pub failed: usize,
    /// Files skipped because an earlier run already handled them.
    pub skipped: usize,
    pub discrepancies: usize,
    pub failures: Vec<FileResult>,
}

impl RunSummary {
    pub const fn total(&self) -> usize {
        self.compared + self.failed + self.skipped
    }

    pub fn add(&mut self, result: FileResult) {
        match &result.status {
            FileStatus::Compared { discrepancies, cached } => {
                self.compared += 1;
                self.discrepancies += discrepancies;
                if *cached {
                    self.cached += 1;
                }
            }
            FileStatus::Failed(_) => {
                self.failed += 1;
                self.failures.push(result);
            }
        }
    }
}

// ============================================================================
// Source enumeration
// ============================================================================

/// Every file under `dir` ending in `suffix`, sorted, minus `handled`.
///
/// Fails when `dir` itself cannot be read; unreadable subdirectories are
/// logged and skipped.
pub fn enumerate_sources(dir: &Path, suffix: &str, handled: &BTreeSet<PathBuf>) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    walk(fs::read_dir(dir)?, suffix, &mut files);
    files.retain(|file| !handled.contains(file));
    files.sort();
    Ok(files)
}

fn walk(entries: fs::ReadDir, suffix: &str, files: &mut Vec<PathBuf>) {
    for entry in entries {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if path.is_dir() {
            match fs::read_dir(&path) {
                Ok(nested) => walk(nested, suffix, files),
                Err(e) => warn!(dir = %path.display(), error = %e, "skipping unreadable directory"),
            }
        } else if path.is_file() && path.to_string_lossy().ends_with(suffix) {
            files.push(path);
        }
    }
}

// ============================================================================
// One file
// ============================================================================

/// Compile `source` at every level and collect all of its traces.
///
/// Binaries live in a temporary directory removed on return.
pub fn collect_file(source: &Path, config: &RunConfig, ledger: &Ledger) -> Result<FileTraces> {
    let workdir = tempfile::tempdir()?;
    config.compiler.check(source, workdir.path(), config.timeout)?;

    let options = config.collect_options();
    let debugger = config.debugger;
    let mut traces = FileTraces::new();
    for opt in config.compiler.opt_levels() {
        info!(source = %source.display(), %opt, "collecting");
        let binary = workdir.path().join(binary_name(source, &config.compiler, &opt));
        config.compiler.compile(source, &opt, &binary, config.timeout)?;
        let image = static_line_table(&binary, source, debugger, &options.session)?;

        for stepping in [Stepping::Line, Stepping::Instruction] {
            let trace = complete_run(&binary, source, debugger, stepping, &options)?;
            let key = Configuration::new(config.compiler.name(), opt.clone(), debugger).with_stepping(stepping);
            traces.traces.insert(key, trace);
        }

        if config.start_points {
            let runs = StartRuns {
                binary: &binary,
                source,
                opt: &opt,
                config,
                options: &options,
                ledger,
            };
            runs.collect_all(&image, &mut traces);
        }
        traces.images.insert(opt, image);
    }
    Ok(traces)
}

/// Runs from each line-table point of one binary.
struct StartRuns<'a> {
    binary: &'a Path,
    source: &'a Path,
    opt: &'a OptLevel,
    config: &'a RunConfig,
    options: &'a CollectOptions,
    ledger: &'a Ledger,
}

impl StartRuns<'_> {
    fn collect_all(&self, image: &Image, traces: &mut FileTraces) {
        let points = start_points(image);
        debug!(binary = %self.binary.display(), points = points.len(), "start-point runs");
        for drive in START_DRIVES {
            for start in &points {
                self.collect_one(drive, start, traces);
            }
        }
    }

    /// Both strategies from one start point. A drive that fails or never
    /// arrives goes to the ledger.
    fn collect_one(&self, drive: DrivePolicy, start: &StartPoint, traces: &mut FileTraces) {
        let debugger = self.config.debugger;
        for stepping in [Stepping::Line, Stepping::Instruction] {
            let reason = match one_run(
                self.binary,
                self.source,
                debugger,
                drive,
                start,
                stepping,
                self.options,
            ) {
                Ok(Some(trace)) => {
                    let key = Configuration::new(self.config.compiler.name(), self.opt.clone(), debugger)
                        .with_stepping(stepping)
                        .with_drive(drive)
                        .with_start(start.clone());
                    traces.traces.insert(key, trace);
                    continue;
                }
                Ok(None) => "not reached".to_string(),
                Err(e) => e.to_string(),
            };
            if let Err(e) = self
                .ledger
                .record_failed_drive(self.binary, self.opt, start, drive, &reason)
            {
                warn!(error = %e, "could not record failed drive");
            }
        }
    }
}

/// Start points from a line table: every line first, then every address.
pub fn start_points(image: &Image) -> Vec<StartPoint> {
    let lines: BTreeSet<StartPoint> = image
        .iter()
        .filter_map(|loc| match (&loc.file, loc.line) {
            (Some(file), Some(line)) => Some(StartPoint::Line {
                file: file.clone(),
                line,
            }),
            _ => None,
        })
        .collect();
    let addresses: BTreeSet<StartPoint> = image.iter().map(|loc| StartPoint::Address(loc.address)).collect();
    lines.into_iter().chain(addresses).collect()
}

fn binary_name(source: &Path, compiler: &Compiler, opt: &OptLevel) -> String {
    let stem = source
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{stem}__{}{opt}", compiler.name())
}

/// Compare every configuration pair of a file's traces.
pub fn compare_file(source: &Path, traces: &FileTraces, config: &RunConfig) -> Result<Vec<Discrepancy>> {
    let engine = Engine::new(SourceText::read(source)?, config.compare_config());
    let found = engine.compare_all(
        traces,
        config.compiler.name(),
        config.debugger,
        &config.compiler.opt_levels(),
    )?;
    Ok(found)
}

/// Traces from the cache, or collected and stored.
fn load_or_collect(source: &Path, config: &RunConfig, ledger: &Ledger) -> Result<(FileTraces, bool)> {
    let cache = config.cache();
    let compiler = config.compiler.name();
    if let Some(traces) = cache.load(source, compiler, config.debugger)? {
        return Ok((traces, true));
    }
    let traces = collect_file(source, config, ledger)?;
    cache.store(source, compiler, config.debugger, &traces)?;
    Ok((traces, false))
}

/// Run the whole pipeline for one file, recording the outcome.
pub fn process_file(source: &Path, config: &RunConfig, ledger: &Ledger) -> FileResult {
    info!(source = %source.display(), compiler = %config.compiler, debugger = %config.debugger, "processing");
    let outcome = load_or_collect(source, config, ledger).and_then(|(traces, cached)| {
        let found = compare_file(source, &traces, config)?;
        let written = ReportWriter::new(&config.out_dir).write(&found)?;
        Ok((written, cached))
    });

    let compiler = config.compiler.name();
    let status = match outcome {
        Ok((discrepancies, cached)) => {
            metrics::record_file(if cached {
                FileOutcome::Cached
            } else {
                FileOutcome::Compared
            });
            if let Err(e) = ledger.record_done(source, compiler, config.debugger) {
                warn!(error = %e, "could not update ledger");
            }
            FileStatus::Compared { discrepancies, cached }
        }
        Err(e) => {
            error!(source = %source.display(), error = %e, "processing failed");
            metrics::record_file(FileOutcome::Failed);
            let flag = e.ledger_flag();
            if let Err(e) = ledger.record_failure(source, compiler, config.debugger, &flag) {
                warn!(error = %e, "could not update ledger");
            }
            FileStatus::Failed(flag.to_string())
        }
    };
    FileResult {
        path: source.to_path_buf(),
        status,
    }
}

// ============================================================================
// Many files
// ============================================================================

/// Worker count for parallel runs: three quarters of the cores, at least one.
pub fn worker_count() -> usize {
    (num_cpus::get() * 3 / 4).max(1)
}

/// Files a run will process: the source itself, or the unhandled files of a
/// directory. A directory listing is also written to the ledger.
pub fn plan(config: &RunConfig, ledger: &Ledger) -> Result<(Vec<PathBuf>, usize)> {
    let source = std::path::absolute(&config.source)?;
    if !source.is_dir() {
        if !source.is_file() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", source.display()),
            )));
        }
        return Ok((vec![source], 0));
    }

    let all = enumerate_sources(&source, config.compiler.suffix(), &BTreeSet::new())?;
    ledger.record_all(&all)?;
    let handled = ledger.handled_files()?;
    let files: Vec<PathBuf> = all.iter().filter(|f| !handled.contains(*f)).cloned().collect();
    let skipped = all.len() - files.len();
    for _ in 0..skipped {
        metrics::record_file(FileOutcome::Skipped);
    }
    Ok((files, skipped))
}

/// Process `files`, calling `progress` as each one finishes.
pub fn run_all<F>(files: &[PathBuf], config: &RunConfig, ledger: &Ledger, progress: F) -> Result<RunSummary>
where
    F: Fn(&FileResult) + Sync,
{
    let mut summary = RunSummary::default();
    let run = |file: &PathBuf| {
        let result = process_file(file, config, ledger);
        progress(&result);
        result
    };

    let results: Vec<FileResult> = if config.parallel && files.len() > 1 {
        let workers = worker_count();
        metrics::record_workers(workers);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .map_err(io::Error::other)?;
        pool.install(|| files.par_iter().map(run).collect())
    } else {
        metrics::record_workers(1);
        files.iter().map(run).collect()
    };

    for result in results {
        summary.add(result);
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use dbgdiff_model::{Address, Location};

    use super::*;

    #[test]
    fn test_enumerate_sources() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        for name in ["a.c", "b.h", "nested/c.c", "nested/deeper/d.c", "nested/e.cj"] {
            fs::write(dir.path().join(name), "int main(void) { return 0; }\n").unwrap();
        }

        let handled: BTreeSet<PathBuf> = [dir.path().join("nested/c.c")].into();
        let files = enumerate_sources(dir.path(), ".c", &handled).unwrap();
        assert_eq!(files, vec![dir.path().join("a.c"), dir.path().join("nested/deeper/d.c")]);

        let cangjie = enumerate_sources(dir.path(), ".cj", &BTreeSet::new()).unwrap();
        assert_eq!(cangjie, vec![dir.path().join("nested/e.cj")]);
    }

    #[test]
    fn test_enumerate_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = enumerate_sources(&dir.path().join("missing"), ".c", &BTreeSet::new()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_start_points_lines_then_addresses() {
        let image: Image = [
            Location::new(Some("t.c".into()), Some(4), Some(3), Address(0x1140)),
            Location::new(Some("t.c".into()), Some(3), None, Address(0x1138)),
            Location::new(Some("t.c".into()), Some(3), Some(7), Address(0x113c)),
        ]
        .into_iter()
        .collect();

        let points: Vec<String> = start_points(&image).iter().map(ToString::to_string).collect();
        assert_eq!(points, ["t.c:3", "t.c:4", "0x1138", "0x113c", "0x1140"]);
    }

    #[test]
    fn test_binary_name() {
        let compiler: Compiler = "/usr/bin/gcc-13".parse().unwrap();
        let name = binary_name(Path::new("/src/pr1234.c"), &compiler, &"-Og".parse().unwrap());
        assert_eq!(name, "pr1234__gcc-13-Og");
    }

    #[test]
    fn test_summary() {
        let mut summary = RunSummary::default();
        summary.add(FileResult {
            path: "a.c".into(),
            status: FileStatus::Compared {
                discrepancies: 4,
                cached: true,
            },
        });
        summary.add(FileResult {
            path: "b.c".into(),
            status: FileStatus::Failed("ERRORCPL".into()),
        });
        assert_eq!(summary.total(), 2);
        assert_eq!((summary.compared, summary.cached, summary.failed), (1, 1, 1));
        assert_eq!(summary.discrepancies, 4);
        assert_eq!(summary.failures.len(), 1);
        assert!(summary.failures[0].is_failure());
    }

    #[test]
    fn test_plan_resumes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sources = dir.path().join("src");
        fs::create_dir_all(&sources).unwrap();
        for name in ["a.c", "b.c"] {
            fs::write(sources.join(name), "int main(void) { return 0; }\n").unwrap();
        }
        let config = RunConfig::new(&sources, "gcc".parse().unwrap(), DebuggerKind::Gdb)
            .with_out_dir(dir.path().join("out"));
        let ledger = config.ledger().unwrap();
        ledger.record_done(&sources.join("a.c"), "gcc", DebuggerKind::Gdb).unwrap();

        let (files, skipped) = plan(&config, &ledger).unwrap();
        assert_eq!(files, vec![sources.join("b.c")]);
        assert_eq!(skipped, 1);
        assert!(ledger.dir().join("files-ALL.txt").exists());
    }
}
