//! The `knitbench list-cases` command.

use anyhow::Result;
use comfy_table::Table;

use knitbench_core::model::CaseKind;

pub fn execute() -> Result<()> {
    let mut table = Table::new();
    table.set_header(vec!["Kind", "Difficulty offset", "Description"]);
    for kind in CaseKind::ALL {
        table.add_row(vec![
            kind.name().to_string(),
            format!("{:+.0}", kind.difficulty_offset()),
            kind.description().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}
