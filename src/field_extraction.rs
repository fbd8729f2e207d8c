//! # Field Extraction Module
//!
//! Pulls a small fixed set of structured fields out of recognized document text:
//!
//! - **invoice-number**: from `Invoice Number`, `Invoice No.` or `Invoice #` labels,
//!   or a bare `INV-123` style token
//! - **date**: ISO `yyyy-mm-dd`, `dd/mm/yyyy` or `mm/dd/yyyy`, `dd.mm.yyyy` and
//!   `dd-mm-yyyy`, validated as a real calendar date and returned as written
//! - **total**: the amount after the last `Total` label, without currency symbol but
//!   with thousands separators kept
//!
//! A field that is not found is absent from the [`FieldMap`]; it is never stored as
//! an empty string.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

lazy_static! {
    static ref INVOICE_LABELLED: Regex = Regex::new(
        r"(?i)\binvoice\s*(?:number|num\.?|no\.?|#)\s*[:#]?\s*([A-Z0-9/-]*\d[A-Z0-9/-]*)"
    )
    .expect("Invoice label pattern should be valid");
    static ref INVOICE_BARE: Regex =
        Regex::new(r"\b(INV-?\d+)\b").expect("Invoice token pattern should be valid");
    static ref ISO_DATE: Regex =
        Regex::new(r"\b(\d{4})-(\d{2})-(\d{2})\b").expect("ISO date pattern should be valid");
    static ref SLASH_DATE: Regex = Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b")
        .expect("Slash date pattern should be valid");
    static ref DOT_DATE: Regex = Regex::new(r"\b(\d{1,2})\.(\d{1,2})\.(\d{4})\b")
        .expect("Dot date pattern should be valid");
    static ref DASH_DATE: Regex = Regex::new(r"\b(\d{1,2})-(\d{1,2})-(\d{4})\b")
        .expect("Dash date pattern should be valid");
    static ref TOTAL_LABELLED: Regex = Regex::new(
        r"(?i)\b(?:grand\s+)?total(?:\s+(?:due|amount))?\s*[:\-]?\s*(?:[$£€]\s*)?(\d{1,3}(?:,\d{3})+(?:\.\d{1,2})?|\d+(?:\.\d{1,2})?)"
    )
    .expect("Total pattern should be valid");
}

/// The extractable fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldName {
    InvoiceNumber,
    Date,
    Total,
}

impl FieldName {
    pub const ALL: [FieldName; 3] = [FieldName::InvoiceNumber, FieldName::Date, FieldName::Total];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::InvoiceNumber => "invoice-number",
            FieldName::Date => "date",
            FieldName::Total => "total",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Extracted fields keyed by name. Values are never empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMap {
    fields: BTreeMap<FieldName, String>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a trimmed value. Blank values are ignored and `false` is returned.
    pub fn insert(&mut self, name: FieldName, value: impl AsRef<str>) -> bool {
        let value = value.as_ref().trim();
        if value.is_empty() {
            return false;
        }
        self.fields.insert(name, value.to_string());
        true
    }

    pub fn get(&self, name: FieldName) -> Option<&str> {
        self.fields.get(&name).map(String::as_str)
    }

    pub fn contains(&self, name: FieldName) -> bool {
        self.fields.contains_key(&name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &str)> {
        self.fields.iter().map(|(name, value)| (*name, value.as_str()))
    }
}

fn is_calendar_date(year: &str, month: &str, day: &str) -> bool {
    match (year.parse::<i32>(), month.parse::<u32>(), day.parse::<u32>()) {
        (Ok(y), Ok(m), Ok(d)) => NaiveDate::from_ymd_opt(y, m, d).is_some(),
        _ => false,
    }
}

/// Earliest valid date in `text` as `(byte offset, text as written)`.
fn first_date(text: &str) -> Option<(usize, String)> {
    let iso = ISO_DATE
        .captures_iter(text)
        .filter(|c| is_calendar_date(&c[1], &c[2], &c[3]));
    // Slash dates are ambiguous between day-first and month-first
    let slash = SLASH_DATE.captures_iter(text).filter(|c| {
        is_calendar_date(&c[3], &c[2], &c[1]) || is_calendar_date(&c[3], &c[1], &c[2])
    });
    let day_first = DOT_DATE
        .captures_iter(text)
        .chain(DASH_DATE.captures_iter(text))
        .filter(|c| is_calendar_date(&c[3], &c[2], &c[1]));

    iso.chain(slash)
        .chain(day_first)
        .filter_map(|c| c.get(0).map(|m| (m.start(), m.as_str().to_string())))
        .min_by_key(|(start, _)| *start)
}

/// Invoice number from a labelled line, else the first bare `INV` token.
pub fn extract_invoice_number(text: &str) -> Option<String> {
    INVOICE_LABELLED
        .captures(text)
        .or_else(|| INVOICE_BARE.captures(text))
        .map(|c| c[1].trim_end_matches(['-', '/']).to_string())
        .filter(|v| !v.is_empty())
}

/// First valid date, preferring lines that mention a date.
pub fn extract_date(text: &str) -> Option<String> {
    text.lines()
        .filter(|line| line.to_lowercase().contains("date"))
        .find_map(first_date)
        .or_else(|| first_date(text))
        .map(|(_, date)| date)
}

/// Amount after the last `Total` label.
pub fn extract_total(text: &str) -> Option<String> {
    TOTAL_LABELLED
        .captures_iter(text)
        .last()
        .map(|c| c[1].to_string())
}

/// Extracts every known field from recognized text.
///
/// # Examples
///
/// ```
/// use docscan::field_extraction::{extract_fields, FieldName};
///
/// let fields = extract_fields("Invoice Number: INV12345\nTotal: $1,234.56");
/// assert_eq!(fields.get(FieldName::InvoiceNumber), Some("INV12345"));
/// assert_eq!(fields.get(FieldName::Total), Some("1,234.56"));
/// assert_eq!(fields.get(FieldName::Date), None);
/// ```
pub fn extract_fields(text: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    for name in FieldName::ALL {
        let value = match name {
            FieldName::InvoiceNumber => extract_invoice_number(text),
            FieldName::Date => extract_date(text),
            FieldName::Total => extract_total(text),
        };
        if let Some(value) = value {
            fields.insert(name, value);
        }
    }
    debug!(
        found = fields.len(),
        chars = text.len(),
        "Field extraction completed"
    );
    fields
}
