//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, open_brain, load_config)
//! - `evolve` - Training and dataset inspection (evolve, months)
//! - `snapshot` - Snapshot export and reset
//! - `status` - Head statistics and run history

pub mod core;
pub mod evolve;
pub mod snapshot;
pub mod status;

// Re-export command functions for main.rs
pub use core::*;
pub use evolve::*;
pub use snapshot::*;
pub use status::*;

/// Render cents as a currency amount, e.g. `-1,234.50`
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    let units = (abs / 100).to_string();

    let mut grouped = String::with_capacity(units.len() + units.len() / 3);
    for (i, c) in units.chars().enumerate() {
        if i > 0 && (units.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}{}.{:02}", sign, grouped, abs % 100)
}

/// Render a [0, 1] value as a percentage
pub fn percent(value: f64) -> String {
    format!("{:.0}%", value * 100.0)
}
