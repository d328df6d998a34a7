//! Normalization boundary for provider invoice payloads
//!
//! The government sandbox has shipped invoices as a bare array and as an
//! `{"invoices": [...]}` envelope, with the amount under `grand_total` or
//! `amount` and the date under `due_date` or `date`. Everything downstream of
//! this module only ever sees [`ExternalInvoice`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;

use core_kernel::Money;

use crate::error::CreditError;

const AMOUNT_FIELDS: [&str; 2] = ["grand_total", "amount"];
const DATE_FIELDS: [&str; 2] = ["due_date", "date"];
const DEFAULT_DUE_DATE: &str = "2025-01-01";

/// An invoice as reported by the provider, in internal shape
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalInvoice {
    pub invoice_number: String,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
    pub delay_days: i32,
}

/// A record that could not be used, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedRecord {
    pub index: usize,
    pub reason: String,
}

/// Result of normalizing one payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedInvoices {
    pub invoices: Vec<ExternalInvoice>,
    pub skipped: Vec<SkippedRecord>,
}

/// Maps a provider payload into internal invoices
///
/// # Arguments
///
/// * `gst_number` - Used to build a fallback invoice number
/// * `payload` - Bare array or `{"invoices": [...]}` envelope
/// * `now` - Fallback due date for unparseable dates
///
/// # Errors
///
/// Returns `Normalization` if the payload is neither an array nor an object.
/// Individual bad records are skipped and reported, not fatal.
pub fn normalize_invoices(
    gst_number: &str,
    payload: &Value,
    now: DateTime<Utc>,
) -> Result<NormalizedInvoices, CreditError> {
    let records: &[Value] = match payload {
        Value::Array(items) => items.as_slice(),
        Value::Object(map) => match map.get("invoices") {
            Some(Value::Array(items)) => items.as_slice(),
            Some(Value::Null) | None => &[][..],
            Some(other) => {
                return Err(CreditError::Normalization(format!(
                    "`invoices` must be an array, got {}",
                    kind_of(other)
                )))
            }
        },
        other => {
            return Err(CreditError::Normalization(format!(
                "expected an invoice array or envelope, got {}",
                kind_of(other)
            )))
        }
    };

    let mut result = NormalizedInvoices::default();
    for (index, record) in records.iter().enumerate() {
        match normalize_record(gst_number, record, now) {
            Ok(invoice) => result.invoices.push(invoice),
            Err(reason) => {
                tracing::debug!(index, %reason, "invoice_sync.record_skipped");
                result.skipped.push(SkippedRecord { index, reason });
            }
        }
    }
    Ok(result)
}

fn normalize_record(
    gst_number: &str,
    record: &Value,
    now: DateTime<Utc>,
) -> Result<ExternalInvoice, String> {
    let Value::Object(fields) = record else {
        return Err(format!("record is {}, not an object", kind_of(record)));
    };

    let invoice_number = match fields.get("invoice_number") {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        _ => format!("INV-{}", gst_number),
    };

    let amount = AMOUNT_FIELDS
        .iter()
        .find_map(|field| fields.get(*field).filter(|v| !v.is_null()))
        .ok_or_else(|| "missing amount".to_string())
        .and_then(parse_decimal)?;
    if amount <= Decimal::ZERO {
        return Err(format!("non-positive amount {}", amount));
    }

    let raw_date = DATE_FIELDS
        .iter()
        .find_map(|field| fields.get(*field).and_then(Value::as_str).filter(|s| !s.is_empty()))
        .unwrap_or(DEFAULT_DUE_DATE);
    let due_date = parse_date(raw_date).unwrap_or(now);

    let delay_days = fields
        .get("delay_days")
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        })
        .unwrap_or(0)
        .clamp(0, i32::MAX as i64) as i32;

    Ok(ExternalInvoice {
        invoice_number,
        amount: Money::inr(amount),
        due_date,
        delay_days,
    })
}

fn parse_decimal(value: &Value) -> Result<Decimal, String> {
    match value {
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .map_err(|e| format!("bad amount {}: {}", text, e))
        }
        Value::String(s) => {
            Decimal::from_str(s.trim()).map_err(|e| format!("bad amount {:?}: {}", s, e))
        }
        other => Err(format!("amount is {}", kind_of(other))),
    }
}

/// Accepts RFC 3339 (with `Z` or offset), naive ISO date-times and plain dates
pub fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
