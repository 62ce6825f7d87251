//! The `knitbench compare` command.

use std::path::PathBuf;

use anyhow::Result;

use knitbench_core::report::RunReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: f64,
    fail_on_regression: bool,
    format: String,
) -> Result<()> {
    anyhow::ensure!(threshold >= 0.0, "threshold must be non-negative");
    let baseline = RunReport::load_json(&baseline_path)?;
    let current = RunReport::load_json(&current_path)?;

    let report = current.compare(&baseline, threshold)?;

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            let regressions: Vec<_> = report.regressions().collect();
            let improvements: Vec<_> = report.improvements().collect();
            println!(
                "Elo: {} {:.1} -> {} {:.1} ({:+.1})",
                report.baseline_model,
                report.baseline_elo,
                report.current_model,
                report.current_elo,
                report.elo_delta
            );
            println!(
                "Comparison: {} regressions, {} improvements, {} unchanged",
                regressions.len(),
                improvements.len(),
                report.kinds.len() - regressions.len() - improvements.len()
            );

            if !regressions.is_empty() {
                println!("\nRegressions:");
                for r in &regressions {
                    println!(
                        "  {} {:.1}% -> {:.1}% ({:+.1}%)",
                        r.kind,
                        r.baseline_score * 100.0,
                        r.current_score * 100.0,
                        r.delta * 100.0
                    );
                }
            }

            if !improvements.is_empty() {
                println!("\nImprovements:");
                for i in &improvements {
                    println!(
                        "  {} {:.1}% -> {:.1}% ({:+.1}%)",
                        i.kind,
                        i.baseline_score * 100.0,
                        i.current_score * 100.0,
                        i.delta * 100.0
                    );
                }
            }

            if !report.new_kinds.is_empty() {
                println!("\n{} new kind(s)", report.new_kinds.len());
            }
            if !report.removed_kinds.is_empty() {
                println!("{} removed kind(s)", report.removed_kinds.len());
            }
        }
    }

    if fail_on_regression && report.has_regressions() {
        std::process::exit(1);
    }

    Ok(())
}
