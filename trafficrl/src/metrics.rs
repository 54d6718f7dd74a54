//! Performance metrics reported by the simulator on every control interval,
//! their per-run history, and CSV persistence.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Local;
use serde::{Deserialize, Serialize};
use sumo::MetricSnapshot;

/// The aggregate measurements the bridge emits in the step info dict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    SystemTotalStopped,
    SystemTotalWaitingTime,
    SystemMeanWaitingTime,
    SystemMeanSpeed,
    TStopped,
    TAccumulatedWaitingTime,
    TAverageSpeed,
    AgentsTotalStopped,
    AgentsTotalAccumulatedWaitingTime,
}

impl Metric {
    pub const ALL: [Metric; 9] = [
        Metric::SystemTotalStopped,
        Metric::SystemTotalWaitingTime,
        Metric::SystemMeanWaitingTime,
        Metric::SystemMeanSpeed,
        Metric::TStopped,
        Metric::TAccumulatedWaitingTime,
        Metric::TAverageSpeed,
        Metric::AgentsTotalStopped,
        Metric::AgentsTotalAccumulatedWaitingTime,
    ];

    /// Key used in the bridge info dict, the CSV header and the plot file
    /// names.
    pub fn wire_name(&self) -> &'static str {
        match self {
            Metric::SystemTotalStopped => "system_total_stopped",
            Metric::SystemTotalWaitingTime => "system_total_waiting_time",
            Metric::SystemMeanWaitingTime => "system_mean_waiting_time",
            Metric::SystemMeanSpeed => "system_mean_speed",
            Metric::TStopped => "t_stopped",
            Metric::TAccumulatedWaitingTime => "t_accumulated_waiting_time",
            Metric::TAverageSpeed => "t_average_speed",
            Metric::AgentsTotalStopped => "agents_total_stopped",
            Metric::AgentsTotalAccumulatedWaitingTime => {
                "agents_total_accumulated_waiting_time"
            }
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Callback invoked for every metric value recorded during a run:
/// `(agent name, metric, value)`.
pub type MetricCallback<'a> = dyn FnMut(&str, Metric, f64) + 'a;

/// Per-run metric series, one row per control interval.
///
/// A metric the simulator did not report on a given interval is stored as
/// NaN so rows stay aligned across the run.
#[derive(Debug, Clone, Default)]
pub struct MetricHistory {
    steps: usize,
    series: BTreeMap<Metric, Vec<f64>>,
}

impl MetricHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, snapshot: &MetricSnapshot) {
        for metric in Metric::ALL {
            let val = snapshot
                .get(metric.wire_name())
                .copied()
                .unwrap_or(f64::NAN);
            self.series.entry(metric).or_default().push(val);
        }
        self.steps += 1;
    }

    pub fn len(&self) -> usize {
        self.steps
    }

    pub fn is_empty(&self) -> bool {
        self.steps == 0
    }

    pub fn series(&self, metric: Metric) -> &[f64] {
        self.series.get(&metric).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Output stem for one agent run: `<out_dir>/<agent>/<timestamp>,<k=v>,...`
/// (same naming scheme for the CSV and any sibling artifacts). Colons would
/// not survive every filesystem, hence the `%H-%M-%S` timestamp.
pub fn run_output_stem(out_dir: &Path, agent: &str, params: &[(&str, String)]) -> PathBuf {
    let stamp = Local::now().format("%Y-%m-%d %H-%M-%S");
    let params = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join(",");

    out_dir.join(agent).join(format!("{stamp},{params}"))
}

/// Write the run history as `<stem>.csv` with a `step` column followed by
/// one column per metric.
pub fn write_csv(history: &MetricHistory, stem: &Path) -> anyhow::Result<PathBuf> {
    let path = stem.with_extension("csv");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("opening {}", path.display()))?;

    let mut header = vec!["step".to_string()];
    header.extend(Metric::ALL.iter().map(|m| m.wire_name().to_string()));
    wtr.write_record(&header)?;

    for step in 0..history.len() {
        let mut row = vec![step.to_string()];
        row.extend(
            Metric::ALL
                .iter()
                .map(|&m| history.series(m)[step].to_string()),
        );
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use float_eq::*;
    use sumo::MetricSnapshot;

    fn snapshot(pairs: &[(&str, f64)]) -> MetricSnapshot {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect()
    }

    #[test]
    fn wire_names_round_trip_through_serde() {
        for metric in Metric::ALL {
            let json = serde_json::to_string(&metric).unwrap();
            assert_eq!(json, format!("\"{}\"", metric.wire_name()));
            let back: Metric = serde_json::from_str(&json).unwrap();
            assert_eq!(back, metric);
        }
    }

    #[test]
    fn history_aligns_rows_across_partial_snapshots() {
        let mut history = MetricHistory::new();
        history.append(&snapshot(&[
            ("system_mean_speed", 4.2),
            ("system_total_stopped", 3.0),
        ]));
        history.append(&snapshot(&[("system_mean_speed", 3.9)]));

        assert_eq!(history.len(), 2);
        assert_float_eq!(history.series(Metric::SystemMeanSpeed)[1], 3.9, abs <= 1e-12);
        assert_float_eq!(
            history.series(Metric::SystemTotalStopped)[0],
            3.0,
            abs <= 1e-12
        );
        assert!(history.series(Metric::SystemTotalStopped)[1].is_nan());
        // Unreported metrics still fill their column.
        assert_eq!(history.series(Metric::TStopped).len(), 2);
    }

    #[test]
    fn output_stem_encodes_agent_and_params() {
        let stem = run_output_stem(
            Path::new("outputs"),
            "ql",
            &[("num_seconds", "1000".to_string()), ("delta_time", "5".to_string())],
        );
        let s = stem.to_string_lossy();
        assert!(s.starts_with("outputs/ql/"));
        assert!(s.ends_with(",num_seconds=1000,delta_time=5"));
        assert!(!s.contains(':'));
    }

    #[test]
    fn csv_has_header_and_one_row_per_step() {
        let dir = tempfile::tempdir().unwrap();
        let mut history = MetricHistory::new();
        history.append(&snapshot(&[("system_mean_speed", 1.0)]));
        history.append(&snapshot(&[("system_mean_speed", 2.0)]));

        let path = write_csv(&history, &dir.path().join("run")).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines = contents.lines().collect::<Vec<_>>();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("step,system_total_stopped,"));
        assert!(lines[1].starts_with("0,"));
        assert!(lines[2].starts_with("1,"));
        assert!(lines[2].contains('2'));
    }
}
