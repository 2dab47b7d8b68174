//! Metrics collection and reporting using metrics-rs.
//!
//! Recording goes through the `metrics` facade; the binary installs
//! [`CliRecorder`] with `--metrics` and prints a summary at exit.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dbgdiff_model::{DebuggerKind, Stepping};
use metrics::{
    Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit, counter, describe_counter,
    describe_gauge, describe_histogram, gauge, histogram,
};
use parking_lot::RwLock;

use crate::compare::Discrepancy;

/// How processing a file ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOutcome {
    Compared,
    Cached,
    Failed,
    Skipped,
}

impl FileOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Compared => "compared",
            Self::Cached => "cached",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

// ============================================================================
// Metric descriptions
// ============================================================================

/// Register metric descriptions. Call once at startup.
pub fn init() {
    describe_counter!("dbgdiff_sessions_total", Unit::Count, "Debugger sessions launched");
    describe_counter!(
        "dbgdiff_debugger_steps_total",
        Unit::Count,
        "Step commands sent to debuggers"
    );
    describe_counter!(
        "dbgdiff_discrepancies_total",
        Unit::Count,
        "Discrepancies found, by method, check and view"
    );
    describe_counter!("dbgdiff_files_total", Unit::Count, "Source files processed, by outcome");
    describe_gauge!("dbgdiff_workers", Unit::Count, "Worker threads processing files");
    describe_histogram!(
        "dbgdiff_collect_duration_seconds",
        Unit::Seconds,
        "Wall-clock time of one trace collection"
    );
}

// ============================================================================
// Metric recording functions
// ============================================================================

pub fn record_session(kind: DebuggerKind) {
    counter!("dbgdiff_sessions_total", "debugger" => kind.as_str()).increment(1);
}

/// Record one finished (or timed out) collection.
pub fn record_collect(kind: DebuggerKind, stepping: Stepping, steps: u64, elapsed: Duration) {
    let labels = [("debugger", kind.as_str().to_string()), ("stepping", stepping.to_string())];
    counter!("dbgdiff_debugger_steps_total", &labels).increment(steps);
    histogram!("dbgdiff_collect_duration_seconds", &labels).record(elapsed.as_secs_f64());
}

pub fn record_discrepancy(discrepancy: &Discrepancy) {
    let labels = [
        ("method", discrepancy.method.as_str().to_string()),
        ("check", discrepancy.check.as_str().to_string()),
        ("view", discrepancy.view.to_string()),
    ];
    counter!("dbgdiff_discrepancies_total", &labels).increment(1);
}

pub fn record_file(outcome: FileOutcome) {
    counter!("dbgdiff_files_total", "outcome" => outcome.as_str()).increment(1);
}

#[allow(clippy::cast_precision_loss)]
pub fn record_workers(workers: usize) {
    gauge!("dbgdiff_workers").set(workers as f64);
}

// ============================================================================
// CLI Recorder for terminal output
// ============================================================================

type Store<T> = Arc<RwLock<HashMap<String, T>>>;

struct CliCounter {
    key: String,
    storage: Store<u64>,
}

impl metrics::CounterFn for CliCounter {
    fn increment(&self, value: u64) {
        *self.storage.write().entry(self.key.clone()).or_insert(0) += value;
    }

    fn absolute(&self, value: u64) {
        self.storage.write().insert(self.key.clone(), value);
    }
}

struct CliGauge {
    key: String,
    storage: Store<f64>,
}

impl metrics::GaugeFn for CliGauge {
    fn increment(&self, value: f64) {
        *self.storage.write().entry(self.key.clone()).or_insert(0.0) += value;
    }

    fn decrement(&self, value: f64) {
        *self.storage.write().entry(self.key.clone()).or_insert(0.0) -= value;
    }

    fn set(&self, value: f64) {
        self.storage.write().insert(self.key.clone(), value);
    }
}

struct CliHistogram {
    key: String,
    storage: Store<Vec<f64>>,
}

impl metrics::HistogramFn for CliHistogram {
    fn record(&self, value: f64) {
        self.storage.write().entry(self.key.clone()).or_default().push(value);
    }
}

/// Recorder that keeps metrics in memory for a summary at exit.
#[derive(Default)]
pub struct CliRecorder {
    counters: Store<u64>,
    gauges: Store<f64>,
    histograms: Store<Vec<f64>>,
}

impl CliRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install as the global recorder. `None` if one is already installed.
    pub fn install(self) -> Option<CliRecorderHandle> {
        let handle = CliRecorderHandle {
            counters: Arc::clone(&self.counters),
            gauges: Arc::clone(&self.gauges),
            histograms: Arc::clone(&self.histograms),
        };
        metrics::set_global_recorder(self).ok()?;
        Some(handle)
    }
}

fn key_to_string(key: &Key) -> String {
    let labels: Vec<String> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
    if labels.is_empty() {
        key.name().to_string()
    } else {
        format!("{}{{{}}}", key.name(), labels.join(","))
    }
}

impl Recorder for CliRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(CliCounter {
            key: key_to_string(key),
            storage: Arc::clone(&self.counters),
        }))
    }

    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(CliGauge {
            key: key_to_string(key),
            storage: Arc::clone(&self.gauges),
        }))
    }

    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(CliHistogram {
            key: key_to_string(key),
            storage: Arc::clone(&self.histograms),
        }))
    }
}

/// Access to what the installed [`CliRecorder`] collected.
pub struct CliRecorderHandle {
    counters: Store<u64>,
    gauges: Store<f64>,
    histograms: Store<Vec<f64>>,
}

impl CliRecorderHandle {
    pub fn counter(&self, key: &str) -> Option<u64> {
        self.counters.read().get(key).copied()
    }

    /// Print all collected metrics, sorted by key.
    pub fn print_summary(&self) {
        let counters = self.counters.read();
        let gauges = self.gauges.read();
        let histograms = self.histograms.read();

        if counters.is_empty() && gauges.is_empty() && histograms.is_empty() {
            println!("No metrics collected.");
            return;
        }

        println!();
        println!("## Metrics Summary");
        println!();

        if !counters.is_empty() {
            println!("### Counters");
            for (key, value) in sorted(&counters) {
                println!("  {key}: {value}");
            }
            println!();
        }

        if !gauges.is_empty() {
            println!("### Gauges");
            for (key, value) in sorted(&gauges) {
                println!("  {key}: {value:.6}");
            }
            println!();
        }

        if !histograms.is_empty() {
            println!("### Histograms");
            for (key, values) in sorted(&histograms) {
                if values.is_empty() {
                    continue;
                }
                let min = values.iter().copied().fold(f64::INFINITY, f64::min);
                let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                #[allow(clippy::cast_precision_loss)]
                let avg = values.iter().sum::<f64>() / values.len() as f64;
                println!(
                    "  {key}: count={}, min={min:.6}, max={max:.6}, avg={avg:.6}",
                    values.len()
                );
            }
            println!();
        }
    }
}

fn sorted<T>(map: &HashMap<String, T>) -> Vec<(&String, &T)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

#[cfg(test)]
mod tests {
    use metrics::Label;

    use super::*;

    #[test]
    fn test_key_to_string() {
        let key = Key::from_name("dbgdiff_sessions_total");
        assert_eq!(key_to_string(&key), "dbgdiff_sessions_total");

        let key = Key::from_parts(
            "dbgdiff_debugger_steps_total",
            vec![Label::new("debugger", "gdb"), Label::new("stepping", "stepi")],
        );
        assert_eq!(
            key_to_string(&key),
            "dbgdiff_debugger_steps_total{debugger=gdb,stepping=stepi}"
        );
    }

    #[test]
    fn test_recorded_through_facade() {
        let recorder = CliRecorder::new();
        let handle = CliRecorderHandle {
            counters: Arc::clone(&recorder.counters),
            gauges: Arc::clone(&recorder.gauges),
            histograms: Arc::clone(&recorder.histograms),
        };

        metrics::with_local_recorder(&recorder, || {
            record_session(DebuggerKind::Lldb);
            record_session(DebuggerKind::Lldb);
            record_collect(DebuggerKind::Gdb, Stepping::Line, 42, Duration::from_millis(250));
            record_file(FileOutcome::Cached);
        });

        assert_eq!(handle.counter("dbgdiff_sessions_total{debugger=lldb}"), Some(2));
        assert_eq!(
            handle.counter("dbgdiff_debugger_steps_total{debugger=gdb,stepping=stepl}"),
            Some(42)
        );
        assert_eq!(handle.counter("dbgdiff_files_total{outcome=cached}"), Some(1));
        let durations = recorder.histograms.read();
        assert_eq!(
            durations.get("dbgdiff_collect_duration_seconds{debugger=gdb,stepping=stepl}"),
            Some(&vec![0.25])
        );
    }
}
