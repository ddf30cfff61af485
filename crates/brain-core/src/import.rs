//! History import: transactions and categories from CSV or JSON
//!
//! Transaction CSV header: `date,type,amount,category_id[,superfluous]`
//! - `date`: `YYYY-MM-DD` (midnight UTC), RFC 3339, or epoch milliseconds
//! - `type`: `income`/`expense` (also `credit`/`debit`); when empty the sign
//!   of the amount decides (negative = expense)
//! - `amount`: currency units, e.g. `1,234.56` or `(12.00)`
//!
//! Category CSV header: `id,spending_nature`
//!
//! JSON inputs are arrays of the serde shapes of [`Transaction`] and
//! [`Category`].

use std::io::Read;
use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Category, SpendingNature, Transaction, TransactionType};

/// Parse a transaction CSV
pub fn parse_transactions_csv<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let date_col = column(&headers, "date")?;
    let type_col = column(&headers, "type")?;
    let amount_col = column(&headers, "amount")?;
    let category_col = column(&headers, "category_id")?;
    let superfluous_col = optional_column(&headers, "superfluous");

    let mut transactions = Vec::new();
    for (index, result) in rdr.records().enumerate() {
        let record = result?;
        // Header is line 1
        let line = index + 2;

        let timestamp_ms = parse_timestamp(field(&record, date_col, "date", line)?)
            .map_err(|e| at_line(line, e))?;
        let amount = parse_amount(field(&record, amount_col, "amount", line)?)
            .map_err(|e| at_line(line, e))?;

        let type_str = record.get(type_col).unwrap_or_default();
        let kind = if type_str.is_empty() {
            if amount < 0.0 {
                TransactionType::Expense
            } else {
                TransactionType::Income
            }
        } else {
            type_str
                .parse::<TransactionType>()
                .map_err(|e| Error::Import(format!("line {}: {}", line, e)))?
        };

        let is_superfluous = match superfluous_col.and_then(|c| record.get(c)) {
            Some(value) => parse_flag(value).map_err(|e| at_line(line, e))?,
            None => None,
        };

        transactions.push(Transaction {
            amount_cents: to_cents(amount),
            kind,
            timestamp_ms,
            category_id: record.get(category_col).unwrap_or_default().to_string(),
            is_superfluous,
        });
    }

    debug!(count = transactions.len(), "Parsed transaction CSV");
    Ok(transactions)
}

/// Parse a category CSV
pub fn parse_categories_csv<R: Read>(reader: R) -> Result<Vec<Category>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let id_col = column(&headers, "id")?;
    let nature_col = column(&headers, "spending_nature")?;

    let mut categories = Vec::new();
    for (index, result) in rdr.records().enumerate() {
        let record = result?;
        let line = index + 2;

        let id = field(&record, id_col, "id", line)?;
        let nature = field(&record, nature_col, "spending_nature", line)?
            .parse::<SpendingNature>()
            .map_err(|e| Error::Import(format!("line {}: {}", line, e)))?;
        categories.push(Category::new(id, nature));
    }

    debug!(count = categories.len(), "Parsed category CSV");
    Ok(categories)
}

pub fn parse_transactions_json(content: &str) -> Result<Vec<Transaction>> {
    Ok(serde_json::from_str(content)?)
}

pub fn parse_categories_json(content: &str) -> Result<Vec<Category>> {
    Ok(serde_json::from_str(content)?)
}

/// Load transactions from a file; `.json` files are parsed as JSON, anything else as CSV
pub fn load_transactions(path: &Path) -> Result<Vec<Transaction>> {
    if is_json(path) {
        parse_transactions_json(&std::fs::read_to_string(path)?)
    } else {
        parse_transactions_csv(std::fs::File::open(path)?)
    }
}

/// Load categories from a file; `.json` files are parsed as JSON, anything else as CSV
pub fn load_categories(path: &Path) -> Result<Vec<Category>> {
    if is_json(path) {
        parse_categories_json(&std::fs::read_to_string(path)?)
    } else {
        parse_categories_csv(std::fs::File::open(path)?)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

fn column(headers: &StringRecord, name: &str) -> Result<usize> {
    optional_column(headers, name)
        .ok_or_else(|| Error::Import(format!("Missing column: {}", name)))
}

fn optional_column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers.iter().position(|h| h.eq_ignore_ascii_case(name))
}

fn field<'a>(record: &'a StringRecord, col: usize, name: &str, line: usize) -> Result<&'a str> {
    record
        .get(col)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::Import(format!("line {}: missing {}", line, name)))
}

fn at_line(line: usize, error: Error) -> Error {
    match error {
        Error::Import(message) => Error::Import(format!("line {}: {}", line, message)),
        other => other,
    }
}

/// Parse a date into epoch milliseconds (UTC)
fn parse_timestamp(s: &str) -> Result<i64> {
    let s = s.trim();

    if !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()) {
        return s
            .parse::<i64>()
            .map_err(|_| Error::Import(format!("Unable to parse timestamp: {}", s)));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc).timestamp_millis());
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc().timestamp_millis())
        .ok_or_else(|| Error::Import(format!("Unable to parse date: {}", s)))
}

/// Parse an amount string, handling currency symbols and commas
fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s
        .trim()
        .replace(['$', '€', '£', ',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| Error::Import(format!("Unable to parse amount: {}", s)))
}

fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

fn parse_flag(s: &str) -> Result<Option<bool>> {
    match s.trim().to_lowercase().as_str() {
        "" => Ok(None),
        "true" | "yes" | "1" | "y" => Ok(Some(true)),
        "false" | "no" | "0" | "n" => Ok(Some(false)),
        _ => Err(Error::Import(format!("Unable to parse flag: {}", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp("2024-01-15").unwrap(), 1_705_276_800_000);
        assert_eq!(
            parse_timestamp("2024-01-15T12:30:00+02:00").unwrap(),
            1_705_314_600_000
        );
        assert_eq!(parse_timestamp("1705276800000").unwrap(), 1_705_276_800_000);
        assert!(parse_timestamp("15/01/2024").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$1,234.56").unwrap(), 1234.56);
        assert_eq!(parse_amount("-123.45").unwrap(), -123.45);
        assert_eq!(parse_amount("(100.00)").unwrap(), -100.00);
        assert!(parse_amount("lots").is_err());
        assert_eq!(to_cents(19.99), 1999);
    }

    #[test]
    fn test_parse_transactions_csv() {
        let csv = "date,type,amount,category_id,superfluous
2025-01-01,income,\"4,000.00\",salary,
2025-01-05,expense,1500,rent,no
2025-01-12,,-42.10,gadgets,yes
";
        let txs = parse_transactions_csv(csv.as_bytes()).unwrap();
        assert_eq!(txs.len(), 3);

        assert_eq!(txs[0].kind, TransactionType::Income);
        assert_eq!(txs[0].amount_cents, 400_000);
        assert_eq!(txs[0].is_superfluous, None);

        assert_eq!(txs[1].kind, TransactionType::Expense);
        assert_eq!(txs[1].is_superfluous, Some(false));

        assert_eq!(txs[2].kind, TransactionType::Expense);
        assert_eq!(txs[2].amount_cents, -4_210);
        assert_eq!(txs[2].magnitude(), 4_210);
        assert_eq!(txs[2].is_superfluous, Some(true));
        assert_eq!(txs[2].category_id, "gadgets");
    }

    #[test]
    fn test_transactions_csv_without_optional_column() {
        let csv = "Date,Type,Amount,Category_Id\n2025-02-01,debit,10,dining\n";
        let txs = parse_transactions_csv(csv.as_bytes()).unwrap();
        assert_eq!(txs[0].kind, TransactionType::Expense);
        assert_eq!(txs[0].is_superfluous, None);
    }

    #[test]
    fn test_transactions_csv_errors_name_the_line() {
        let csv = "date,type,amount,category_id\n2025-02-01,expense,10,dining\nnope,expense,10,dining\n";
        let err = parse_transactions_csv(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("line 3"), "{}", err);

        let missing = "date,amount,category_id\n2025-02-01,10,dining\n";
        assert!(parse_transactions_csv(missing.as_bytes()).is_err());
    }

    #[test]
    fn test_parse_categories_csv() {
        let csv = "id,spending_nature\nrent,essential\ndining,Comfort\n";
        let categories = parse_categories_csv(csv.as_bytes()).unwrap();
        assert_eq!(
            categories,
            vec![
                Category::new("rent", SpendingNature::Essential),
                Category::new("dining", SpendingNature::Comfort),
            ]
        );

        let bad = "id,spending_nature\nrent,luxury\n";
        assert!(parse_categories_csv(bad.as_bytes()).is_err());
    }

    #[test]
    fn test_parse_json_inputs() {
        let txs = parse_transactions_json(
            r#"[{"amountCents": 1200, "type": "expense", "timestamp": 1705276800000, "categoryId": "dining"}]"#,
        )
        .unwrap();
        assert_eq!(txs[0].amount_cents, 1200);
        assert_eq!(txs[0].is_superfluous, None);

        let categories =
            parse_categories_json(r#"[{"id": "dining", "spendingNature": "comfort"}]"#).unwrap();
        assert_eq!(categories[0].spending_nature, SpendingNature::Comfort);
    }

    #[test]
    fn test_load_dispatches_on_extension() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("categories.csv");
        let json_path = dir.path().join("categories.json");
        std::fs::write(&csv_path, "id,spending_nature\nrent,essential\n").unwrap();
        std::fs::write(&json_path, r#"[{"id":"rent","spendingNature":"essential"}]"#).unwrap();

        assert_eq!(
            load_categories(&csv_path).unwrap(),
            load_categories(&json_path).unwrap()
        );
    }
}
