//! The `knitbench review` command.

use std::path::PathBuf;

use anyhow::Result;

use knitbench_core::report::RunReport;
use knitbench_report::write_html_report;

pub fn execute(report_path: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let report = RunReport::load_json(&report_path)?;
    let output = output.unwrap_or_else(|| report_path.with_extension("html"));
    write_html_report(&report, &output)?;
    println!(
        "{}: Elo {:.1}, {} records",
        report.model,
        report.elo_score,
        report.records.len()
    );
    println!("Review page: {}", output.display());
    Ok(())
}
