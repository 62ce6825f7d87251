//! The `knitbench validate` command.

use std::path::PathBuf;

use anyhow::Result;

use knitbench_core::bank::{load_bank_directory, parse_bank, validate_bank, QuestionBank};

pub fn execute(bank_path: Option<PathBuf>) -> Result<()> {
    let bank = match &bank_path {
        Some(path) if path.is_dir() => load_bank_directory(path)?,
        Some(path) => parse_bank(path)?,
        None => QuestionBank::builtin()?,
    };

    println!(
        "Bank: {} ({} passages, {} mmlu, {} medmcqa)",
        bank.name,
        bank.passages.len(),
        bank.mmlu.len(),
        bank.medmcqa.len()
    );

    let warnings = validate_bank(&bank);
    for w in &warnings {
        let prefix = w
            .item_id
            .as_ref()
            .map(|id| format!("  [{id}]"))
            .unwrap_or_else(|| "  ".to_string());
        println!("{prefix} WARNING: {}", w.message);
    }

    if warnings.is_empty() {
        println!("Bank valid.");
    } else {
        println!("\n{} warning(s) found.", warnings.len());
    }

    Ok(())
}
