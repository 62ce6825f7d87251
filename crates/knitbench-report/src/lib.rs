//! knitbench-report: Review surface for finished runs.
//!
//! Renders a [`RunReport`](knitbench_core::report::RunReport) as a
//! self-contained HTML page. The page is read-only; nothing in it feeds
//! back into the rating.

pub mod html;

pub use html::{generate_html, write_html_report};
