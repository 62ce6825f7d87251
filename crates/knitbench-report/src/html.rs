//! HTML review page generator.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use std::path::Path;

use anyhow::{Context, Result};

use knitbench_core::report::RunReport;
use knitbench_core::results::OutcomeRecord;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn score_class(record: &OutcomeRecord) -> &'static str {
    if record.result.correct {
        "pass"
    } else if record.result.score > 0.0 {
        "partial"
    } else {
        "fail"
    }
}

/// Generate the review page for a finished run.
pub fn generate_html(report: &RunReport) -> String {
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>knitbench review: {}</title>\n",
        html_escape(&report.model)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    // Header
    html.push_str("<header>\n");
    html.push_str("<h1>knitbench review</h1>\n");
    html.push_str(&format!(
        "<p class=\"meta\">Model: <strong>{}</strong> via {} | {} | run {}</p>\n",
        html_escape(&report.model),
        html_escape(&report.provider),
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
        report.id
    ));
    html.push_str(&format!(
        "<p class=\"elo\">Elo <strong>{:.1}</strong></p>\n",
        report.elo_score
    ));
    html.push_str(&format!(
        "<p class=\"meta\">{} of {} graded correct | {} failed inference | {} rejected | {:.1}s</p>\n",
        report.passed(),
        report.records.len(),
        report.failed,
        report.rejected,
        report.duration_ms as f64 / 1000.0
    ));
    html.push_str("</header>\n");

    // Per-kind summary
    html.push_str("<section class=\"dashboard\">\n");
    html.push_str("<h2>Summary</h2>\n");
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Kind</th><th>Attempted</th><th>Passed</th><th>Mean score</th><th>Est. FLOPs</th></tr></thead>\n");
    html.push_str("<tbody>\n");
    for s in &report.summary {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{:.1}%</td><td>{:.3e}</td></tr>\n",
            html_escape(s.kind.name()),
            s.attempted,
            s.passed,
            s.mean_score * 100.0,
            s.total_flops,
        ));
    }
    html.push_str("</tbody></table>\n");

    if report.trajectory.len() > 1 {
        html.push_str("<h2>Rating trajectory</h2>\n");
        html.push_str(&generate_trajectory_chart(
            &report.trajectory,
            report.marker_config.anchor_rating,
        ));
    }
    html.push_str("</section>\n");

    // Every outcome, in fold order
    html.push_str("<section class=\"results\">\n");
    html.push_str("<h2>Outcomes</h2>\n");
    html.push_str("<table class=\"results-table\" id=\"results\">\n");
    html.push_str("<thead><tr><th onclick=\"sortTable(0)\">#</th><th onclick=\"sortTable(1)\">Case</th><th onclick=\"sortTable(2)\">Score</th><th onclick=\"sortTable(3)\">Difficulty</th><th>Detail</th></tr></thead>\n");
    html.push_str("<tbody>\n");

    for r in &report.records {
        let class = score_class(r);
        let diagnostic = r.result.diagnostic.as_deref().unwrap_or("");
        html.push_str(&format!(
            "<tr class=\"{class}\"><td>{}</td><td>{}</td><td>{:.2}</td><td>{:.1}</td><td><details><summary>{}</summary>\
             <h4>Question</h4><pre>{}</pre><h4>Expected</h4><pre>{}</pre><h4>Answer</h4><pre>{}</pre></details></td></tr>\n",
            r.seq,
            html_escape(&r.case_id),
            r.result.score,
            r.difficulty,
            if diagnostic.is_empty() {
                "correct".to_string()
            } else {
                html_escape(diagnostic)
            },
            html_escape(&r.question),
            html_escape(&r.expected),
            html_escape(&r.generated_answer),
        ));
    }

    html.push_str("</tbody></table>\n");
    html.push_str("</section>\n");

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(report).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str(&format!(
        "<footer class=\"meta\">Rendered {}</footer>\n",
        chrono::Utc::now().format("%Y-%m-%d %H:%M UTC")
    ));

    // JavaScript for sorting
    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write the review page to a file.
pub fn write_html_report(report: &RunReport, path: &Path) -> Result<()> {
    let html = generate_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write review page to {}", path.display()))?;
    Ok(())
}

/// Line chart of the rating after each record, with the anchor as a
/// dashed baseline.
fn generate_trajectory_chart(trajectory: &[f64], anchor: f64) -> String {
    let width = 720.0;
    let height = 220.0;
    let pad = 30.0;

    let lo = trajectory.iter().copied().fold(anchor, f64::min) - 10.0;
    let hi = trajectory.iter().copied().fold(anchor, f64::max) + 10.0;
    let x_step = (width - 2.0 * pad) / (trajectory.len() - 1) as f64;
    let y = |v: f64| height - pad - (v - lo) / (hi - lo) * (height - 2.0 * pad);

    let points: Vec<String> = trajectory
        .iter()
        .enumerate()
        .map(|(i, &v)| format!("{:.1},{:.1}", pad + i as f64 * x_step, y(v)))
        .collect();

    let mut svg = format!(
        "<svg width=\"{width}\" height=\"{height}\" xmlns=\"http://www.w3.org/2000/svg\">\n"
    );
    svg.push_str(&format!(
        "  <line x1=\"{pad}\" y1=\"{0:.1}\" x2=\"{1}\" y2=\"{0:.1}\" stroke=\"#9ca3af\" stroke-dasharray=\"4 4\"/>\n",
        y(anchor),
        width - pad
    ));
    svg.push_str(&format!(
        "  <text x=\"2\" y=\"{:.1}\" font-size=\"11\" fill=\"currentColor\">{anchor:.0}</text>\n",
        y(anchor) - 4.0
    ));
    svg.push_str(&format!(
        "  <polyline points=\"{}\" fill=\"none\" stroke=\"#3b82f6\" stroke-width=\"2\"/>\n",
        points.join(" ")
    ));
    if let Some(last) = trajectory.last() {
        svg.push_str(&format!(
            "  <text x=\"{:.1}\" y=\"{:.1}\" font-size=\"12\" fill=\"currentColor\" text-anchor=\"end\">{last:.1}</text>\n",
            width - pad,
            y(*last) - 6.0
        ));
    }
    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --partial: #fef9c3; --fail: #fde2e2; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --partial: #713f12; --fail: #7f1d1d; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
.elo { font-size: 2rem; margin: 0.5rem 0; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; vertical-align: top; }
th { background: var(--border); cursor: pointer; }
.pass { background: var(--pass); }
.partial { background: var(--partial); }
.fail { background: var(--fail); }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; white-space: pre-wrap; max-height: 24rem; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 0.25rem 0; }
summary { cursor: pointer; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('results');
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    const na = parseFloat(va), nb = parseFloat(vb);
    const cmp = isNaN(na) || isNaN(nb) ? va.localeCompare(vb) : na - nb;
    return asc ? cmp : -cmp;
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;
