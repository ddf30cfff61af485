//! History builders shared by unit tests and downstream crates

use chrono::NaiveDate;

use crate::models::{Category, SpendingNature, Transaction};

/// Epoch milliseconds for noon UTC on the given day
pub fn timestamp(year: i32, month: u32, day: u32) -> i64 {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(12, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .expect("valid test date")
}

/// Categories used by the builders below
pub fn categories() -> Vec<Category> {
    vec![
        Category::new("salary", SpendingNature::Essential),
        Category::new("rent", SpendingNature::Essential),
        Category::new("groceries", SpendingNature::Essential),
        Category::new("dining", SpendingNature::Comfort),
        Category::new("gadgets", SpendingNature::Superfluous),
    ]
}

/// One month of history: a salary on the 1st and expenses split across
/// rent (half), dining (a quarter) and gadgets (the rest)
pub fn month_history(year: i32, month: u32, income_cents: i64, expense_cents: i64) -> Vec<Transaction> {
    let mut txs = Vec::new();
    if income_cents > 0 {
        txs.push(Transaction::income(income_cents, timestamp(year, month, 1), "salary"));
    }

    let rent = expense_cents / 2;
    let dining = expense_cents / 4;
    let gadgets = expense_cents - rent - dining;
    for (amount, day, category) in [(rent, 5, "rent"), (dining, 12, "dining"), (gadgets, 20, "gadgets")] {
        if amount > 0 {
            txs.push(Transaction::expense(amount, timestamp(year, month, day), category));
        }
    }
    txs
}

/// Several consecutive months starting at `(year, month)`, one per
/// `(income, expenses)` pair
pub fn history(year: i32, month: u32, months: &[(i64, i64)]) -> Vec<Transaction> {
    let mut txs = Vec::new();
    let (mut y, mut m) = (year, month);
    for (income, expenses) in months {
        txs.extend(month_history(y, m, *income, *expenses));
        if m == 12 {
            y += 1;
            m = 1;
        } else {
            m += 1;
        }
    }
    txs
}
