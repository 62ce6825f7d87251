//! Run report types with JSON persistence and regression detection.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::marker::{KindSummary, Marker, MarkerConfig};
use crate::model::CaseKind;
use crate::results::OutcomeRecord;

/// A finalized benchmark run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    /// Constants the rating was computed with.
    pub marker_config: MarkerConfig,
    pub elo_score: f64,
    /// Every accepted outcome, in `seq` order.
    pub records: Vec<OutcomeRecord>,
    /// Results the marker refused as malformed.
    pub rejected: u64,
    /// Questions whose inference failed and were left unscored.
    pub failed: usize,
    pub summary: Vec<KindSummary>,
    /// Rating after each record.
    #[serde(default)]
    pub trajectory: Vec<f64>,
    /// Total wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl RunReport {
    /// Snapshot a marker into a report.
    pub fn from_marker(
        marker: &Marker,
        model: &str,
        provider: &str,
        failed: usize,
        duration_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            model: model.to_string(),
            provider: provider.to_string(),
            marker_config: marker.config().clone(),
            elo_score: marker.calculate_elo_score(),
            records: marker.records().to_vec(),
            rejected: marker.rejected(),
            failed,
            summary: marker.summary(),
            trajectory: marker.rating_trajectory(),
            duration_ms,
        }
    }

    /// Rebuild the marker this report was computed from, optionally under
    /// different constants.
    pub fn to_marker(&self, config: Option<MarkerConfig>) -> Result<Marker> {
        let config = config.unwrap_or_else(|| self.marker_config.clone());
        Marker::replay(config, self.records.clone()).context("failed to replay report records")
    }

    pub fn passed(&self) -> usize {
        self.summary.iter().map(|s| s.passed).sum()
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: RunReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Compare this report against a baseline.
    ///
    /// Both runs are re-rated under this report's marker constants so the
    /// Elo delta is meaningful. A kind whose mean score moved by more than
    /// `threshold` counts as a regression or improvement.
    pub fn compare(&self, baseline: &RunReport, threshold: f64) -> Result<Comparison> {
        let config = self.marker_config.clone();
        let current = self.to_marker(Some(config.clone()))?;
        let base = baseline.to_marker(Some(config))?;

        let current_summary = current.summary();
        let baseline_summary = base.summary();

        let mut kinds = Vec::new();
        let mut new_kinds = Vec::new();
        for kind in CaseKind::ALL {
            let cur = current_summary.iter().find(|s| s.kind == kind);
            let old = baseline_summary.iter().find(|s| s.kind == kind);
            match (cur, old) {
                (Some(cur), Some(old)) => kinds.push(KindDelta {
                    kind,
                    baseline_score: old.mean_score,
                    current_score: cur.mean_score,
                    delta: cur.mean_score - old.mean_score,
                }),
                (Some(_), None) => new_kinds.push(kind),
                _ => {}
            }
        }
        let removed_kinds = baseline_summary
            .iter()
            .filter(|s| !current_summary.iter().any(|c| c.kind == s.kind))
            .map(|s| s.kind)
            .collect();

        let baseline_elo = base.calculate_elo_score();
        let current_elo = current.calculate_elo_score();

        Ok(Comparison {
            baseline_model: baseline.model.clone(),
            current_model: self.model.clone(),
            baseline_elo,
            current_elo,
            elo_delta: current_elo - baseline_elo,
            threshold,
            kinds,
            new_kinds,
            removed_kinds,
        })
    }
}

/// Per-kind change in mean score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KindDelta {
    pub kind: CaseKind,
    pub baseline_score: f64,
    pub current_score: f64,
    pub delta: f64,
}

/// Result of comparing two runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comparison {
    pub baseline_model: String,
    pub current_model: String,
    pub baseline_elo: f64,
    pub current_elo: f64,
    pub elo_delta: f64,
    pub threshold: f64,
    /// Kinds present in both runs.
    pub kinds: Vec<KindDelta>,
    /// Kinds only in the current run.
    pub new_kinds: Vec<CaseKind>,
    /// Kinds only in the baseline.
    pub removed_kinds: Vec<CaseKind>,
}

impl Comparison {
    pub fn regressions(&self) -> impl Iterator<Item = &KindDelta> {
        self.kinds.iter().filter(|k| k.delta < -self.threshold)
    }

    pub fn improvements(&self) -> impl Iterator<Item = &KindDelta> {
        self.kinds.iter().filter(|k| k.delta > self.threshold)
    }

    /// Check if there are any regressions.
    pub fn has_regressions(&self) -> bool {
        self.regressions().next().is_some()
    }

    /// Format the comparison as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Elo:** {:.1} -> {:.1} ({:+.1})\n\n",
            self.baseline_elo, self.current_elo, self.elo_delta
        ));
        md.push_str(&format!(
            "**Summary:** {} regressions, {} improvements, {} unchanged\n\n",
            self.regressions().count(),
            self.improvements().count(),
            self.kinds.len() - self.regressions().count() - self.improvements().count()
        ));

        if !self.kinds.is_empty() {
            md.push_str("| Kind | Baseline | Current | Delta |\n");
            md.push_str("|------|----------|---------|-------|\n");
            for k in &self.kinds {
                let flag = if k.delta < -self.threshold {
                    " (regression)"
                } else if k.delta > self.threshold {
                    " (improvement)"
                } else {
                    ""
                };
                md.push_str(&format!(
                    "| {} | {:.1}% | {:.1}% | {:+.1}%{flag} |\n",
                    k.kind,
                    k.baseline_score * 100.0,
                    k.current_score * 100.0,
                    k.delta * 100.0
                ));
            }
            md.push('\n');
        }

        if !self.new_kinds.is_empty() {
            let names: Vec<&str> = self.new_kinds.iter().map(|k| k.name()).collect();
            md.push_str(&format!("New kinds: {}\n", names.join(", ")));
        }
        if !self.removed_kinds.is_empty() {
            let names: Vec<&str> = self.removed_kinds.iter().map(|k| k.name()).collect();
            md.push_str(&format!("Removed kinds: {}\n", names.join(", ")));
        }

        md
    }
}
