//! Property-Based Test Generators
//!
//! Proptest strategies producing lending inputs that respect domain rules.

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use core_kernel::{BusinessId, LoanId, Money, Rate, UserId};
use domain_credit::{GstReturnsSummary, RiskGrade, ScoringSignals};

/// Rupee amounts with paise, 1.00 to 10 crore
pub fn inr_amount_strategy() -> impl Strategy<Value = Decimal> {
    (100i64..10_000_000_000i64).prop_map(|paise| Decimal::new(paise, 2))
}

pub fn inr_money_strategy() -> impl Strategy<Value = Money> {
    inr_amount_strategy().prop_map(Money::inr)
}

/// Annual rates between 0% and 36%
pub fn annual_rate_strategy() -> impl Strategy<Value = Rate> {
    (0u32..=3600u32).prop_map(|bp| Rate::from_percentage(Decimal::new(i64::from(bp), 2)))
}

pub fn tenure_months_strategy() -> impl Strategy<Value = u32> {
    1u32..=36u32
}

/// Well-formed 15-character GSTINs
pub fn gst_number_strategy() -> impl Strategy<Value = String> {
    "[0-3][0-9][A-Z]{5}[0-9]{4}[A-Z][1-9]Z[0-9A-Z]"
}

pub fn invoice_number_strategy() -> impl Strategy<Value = String> {
    "INV-[0-9]{1,6}"
}

pub fn risk_grade_strategy() -> impl Strategy<Value = RiskGrade> {
    prop_oneof![Just(RiskGrade::A), Just(RiskGrade::B), Just(RiskGrade::C)]
}

/// Provider scores, including some outside the accepted range
pub fn external_score_strategy() -> impl Strategy<Value = Option<Decimal>> {
    prop_oneof![
        3 => (0i64..=1000i64).prop_map(|s| Some(Decimal::from(s))),
        1 => (-500i64..0i64).prop_map(|s| Some(Decimal::from(s))),
        1 => (1001i64..5000i64).prop_map(|s| Some(Decimal::from(s))),
        1 => Just(None),
    ]
}

pub fn gst_returns_strategy() -> impl Strategy<Value = GstReturnsSummary> {
    (0u32..=24u32, 0u32..=24u32).prop_map(|(filed, total)| GstReturnsSummary { filed, total })
}

pub fn scoring_signals_strategy() -> impl Strategy<Value = ScoringSignals> {
    (gst_returns_strategy(), 0u32..200u32, 0i64..365i64, 0u32..50u32).prop_map(
        |(gst_returns, invoice_count, delay, repaid_invoice_count)| ScoringSignals {
            gst_returns,
            invoice_count,
            average_delay_days: Decimal::from(delay),
            repaid_invoice_count,
        },
    )
}

pub fn timestamp_2025_strategy() -> impl Strategy<Value = DateTime<Utc>> {
    (0i64..365i64, 0i64..86_400i64).prop_map(|(days, secs)| {
        Utc.timestamp_opt(1_735_689_600, 0).single().unwrap_or_else(Utc::now)
            + Duration::days(days)
            + Duration::seconds(secs)
    })
}

pub fn user_id_strategy() -> impl Strategy<Value = UserId> {
    any::<[u8; 16]>().prop_map(|bytes| UserId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

pub fn business_id_strategy() -> impl Strategy<Value = BusinessId> {
    any::<[u8; 16]>().prop_map(|bytes| BusinessId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

pub fn loan_id_strategy() -> impl Strategy<Value = LoanId> {
    any::<[u8; 16]>().prop_map(|bytes| LoanId::from_uuid(uuid::Uuid::from_bytes(bytes)))
}

/// One provider invoice record in any of the shapes the sandbox has sent
pub fn provider_invoice_strategy() -> impl Strategy<Value = Value> {
    (
        invoice_number_strategy(),
        inr_amount_strategy(),
        prop::bool::ANY,
        prop::bool::ANY,
        0i64..90i64,
    )
        .prop_map(|(number, amount, grand_total, due_key, delay)| {
            let mut record = serde_json::Map::new();
            record.insert("invoice_number".into(), json!(number));
            let amount_key = if grand_total { "grand_total" } else { "amount" };
            record.insert(amount_key.into(), json!(amount.to_string()));
            let date_key = if due_key { "due_date" } else { "date" };
            record.insert(date_key.into(), json!("2025-03-31"));
            record.insert("delay_days".into(), json!(delay));
            Value::Object(record)
        })
}

/// A provider payload: a bare array or an `{"invoices": [...]}` envelope
pub fn provider_payload_strategy() -> impl Strategy<Value = Value> {
    (
        proptest::collection::vec(provider_invoice_strategy(), 0..8),
        prop::bool::ANY,
    )
        .prop_map(|(records, enveloped)| {
            if enveloped {
                json!({ "invoices": records })
            } else {
                Value::Array(records)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kernel::Currency;
    use domain_credit::{normalize_invoices, CreditScore, ScoringConfig};

    proptest! {
        #[test]
        fn inr_money_is_positive_rupees(money in inr_money_strategy()) {
            prop_assert!(money.is_positive());
            prop_assert_eq!(money.currency(), Currency::INR);
        }

        #[test]
        fn gst_numbers_have_fifteen_characters(gst in gst_number_strategy()) {
            prop_assert_eq!(gst.len(), 15);
        }

        #[test]
        fn internal_score_stays_in_range(signals in scoring_signals_strategy()) {
            let score = signals.internal_score();
            prop_assert!(score >= Decimal::ZERO);
            prop_assert!(score <= Decimal::from(800));
        }

        #[test]
        fn any_external_score_yields_a_bounded_final_score(
            external in external_score_strategy(),
            signals in scoring_signals_strategy(),
        ) {
            let config = ScoringConfig::default();
            let business = BusinessId::new_v7();
            let (record, _) =
                CreditScore::compute(business, external, &signals, &config, Utc::now());
            prop_assert!(record.external_score >= Decimal::ZERO);
            prop_assert!(record.external_score <= config.max_external_score);
            prop_assert_eq!(record.risk_grade, RiskGrade::from_score(record.final_score, &config));
        }

        #[test]
        fn generated_payloads_normalize_without_skips(payload in provider_payload_strategy()) {
            let expected = match &payload {
                Value::Array(records) => records.len(),
                other => other["invoices"].as_array().map_or(0, Vec::len),
            };
            let normalized = normalize_invoices("27AAPFU0939F1ZV", &payload, Utc::now()).unwrap();
            prop_assert_eq!(normalized.invoices.len() + normalized.skipped.len(), expected);
            prop_assert!(normalized.skipped.is_empty());
        }
    }
}
