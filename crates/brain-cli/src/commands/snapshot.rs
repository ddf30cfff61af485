//! Snapshot commands (export, reset)

use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use brain_core::Brain;

pub fn cmd_export(brain: &Brain, output: Option<&Path>) -> Result<()> {
    let snapshot = brain
        .get_brain_snapshot()
        .context("No brain snapshot to export. Run 'brain init' first.")?;
    let json = serde_json::to_string_pretty(&snapshot)?;

    match output {
        Some(path) => {
            fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("✅ Exported snapshot to {}", path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

pub fn cmd_reset(brain: &Brain, yes: bool) -> Result<()> {
    if !yes {
        print!("⚠️  This will DELETE the brain snapshot. Everything it learned will be lost.\n\n");
        print!("Are you sure? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    brain.reset_brain();
    println!("✅ Brain reset. Run 'brain init' to start over.");
    Ok(())
}
