//! Row shapes and their mapping onto domain types
//!
//! Amounts are stored as rupee `NUMERIC`, counters as `INTEGER` and every
//! status as its upper-case code. A row that does not map back is reported
//! as [`DatabaseError::CorruptRow`] rather than silently defaulted.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

use core_kernel::{Money, Rate};
use domain_credit::{
    BusinessProfile, CreditScore, Invoice, InvoiceStatus, LoanType, Offer, OfferStatus, RiskGrade,
};
use domain_ledger::{EntryType, LedgerAccount, LedgerEntry};
use domain_lending::{
    Collateral, CollateralStatus, Emi, EmiStatus, Loan, LoanStatus, RecoveryAction,
    RecoveryActionType, RecoveryStatus,
};

use crate::error::DatabaseError;

pub(crate) const BUSINESS_COLUMNS: &str =
    "id, user_id, gst_number, aadhaar_number, pan_number, verification_snapshot, created_at";
pub(crate) const INVOICE_COLUMNS: &str =
    "id, business_id, invoice_number, amount, due_date, delay_days, status, created_at, updated_at";
pub(crate) const SCORE_COLUMNS: &str =
    "id, business_id, external_score, internal_score, final_score, risk_grade, created_at";
pub(crate) const OFFER_COLUMNS: &str =
    "id, invoice_id, loan_type, financed_percentage, interest_rate, tenure_months, status, \
     expires_at, created_at";
pub(crate) const LOAN_COLUMNS: &str =
    "id, offer_id, invoice_id, business_id, loan_type, status, principal, disbursed_amount, \
     created_at, updated_at";
pub(crate) const EMI_COLUMNS: &str =
    "id, loan_id, installment_number, due_date, amount, status, retry_count, paid_at, \
     created_at, updated_at";
pub(crate) const COLLATERAL_COLUMNS: &str =
    "id, loan_id, asset_description, asset_value, status, created_at, updated_at";
pub(crate) const RECOVERY_COLUMNS: &str =
    "id, loan_id, action_type, status, amount_recovered, notes, created_at, updated_at";
pub(crate) const LEDGER_COLUMNS: &str =
    "id, loan_id, entry_type, account, amount, description, created_at";

fn code<T>(parsed: Option<T>, table: &str, column: &str, raw: &str) -> Result<T, DatabaseError> {
    parsed.ok_or_else(|| DatabaseError::corrupt(table, column, raw))
}

fn unsigned(value: i32, table: &str, column: &str) -> Result<u32, DatabaseError> {
    u32::try_from(value).map_err(|_| DatabaseError::corrupt(table, column, value))
}

/// Binds a `u32` counter into an `INTEGER` column
pub(crate) fn to_i32(value: u32, column: &str) -> Result<i32, DatabaseError> {
    i32::try_from(value).map_err(|_| {
        DatabaseError::ConstraintViolation(format!("{} out of range: {}", column, value))
    })
}

#[derive(Debug, FromRow)]
pub(crate) struct BusinessRow {
    id: Uuid,
    user_id: Uuid,
    gst_number: String,
    aadhaar_number: Option<String>,
    pan_number: Option<String>,
    verification_snapshot: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
}

impl From<BusinessRow> for BusinessProfile {
    fn from(row: BusinessRow) -> Self {
        BusinessProfile {
            id: row.id.into(),
            user_id: row.user_id.into(),
            gst_number: row.gst_number,
            aadhaar_number: row.aadhaar_number,
            pan_number: row.pan_number,
            verification_snapshot: row.verification_snapshot,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct InvoiceRow {
    id: Uuid,
    business_id: Uuid,
    invoice_number: String,
    amount: Decimal,
    due_date: DateTime<Utc>,
    delay_days: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = DatabaseError;

    fn try_from(row: InvoiceRow) -> Result<Self, Self::Error> {
        Ok(Invoice {
            id: row.id.into(),
            business_id: row.business_id.into(),
            invoice_number: row.invoice_number,
            amount: Money::inr(row.amount),
            due_date: row.due_date,
            delay_days: row.delay_days,
            status: code(
                InvoiceStatus::parse_code(&row.status),
                "invoices",
                "status",
                &row.status,
            )?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct ScoreRow {
    id: Uuid,
    business_id: Uuid,
    external_score: Decimal,
    internal_score: Decimal,
    final_score: Decimal,
    risk_grade: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<ScoreRow> for CreditScore {
    type Error = DatabaseError;

    fn try_from(row: ScoreRow) -> Result<Self, Self::Error> {
        Ok(CreditScore {
            id: row.id.into(),
            business_id: row.business_id.into(),
            external_score: row.external_score,
            internal_score: row.internal_score,
            final_score: row.final_score,
            risk_grade: code(
                RiskGrade::parse_code(&row.risk_grade),
                "credit_scores",
                "risk_grade",
                &row.risk_grade,
            )?,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct OfferRow {
    id: Uuid,
    invoice_id: Uuid,
    loan_type: String,
    financed_percentage: Decimal,
    interest_rate: Decimal,
    tenure_months: i32,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OfferRow> for Offer {
    type Error = DatabaseError;

    fn try_from(row: OfferRow) -> Result<Self, Self::Error> {
        Ok(Offer {
            id: row.id.into(),
            invoice_id: row.invoice_id.into(),
            loan_type: code(
                LoanType::parse_code(&row.loan_type),
                "offers",
                "loan_type",
                &row.loan_type,
            )?,
            financed_percentage: row.financed_percentage,
            interest_rate: Rate::new(row.interest_rate),
            tenure_months: unsigned(row.tenure_months, "offers", "tenure_months")?,
            status: code(OfferStatus::parse_code(&row.status), "offers", "status", &row.status)?,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct LoanRow {
    id: Uuid,
    offer_id: Uuid,
    invoice_id: Uuid,
    business_id: Uuid,
    loan_type: String,
    status: String,
    principal: Decimal,
    disbursed_amount: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LoanRow> for Loan {
    type Error = DatabaseError;

    fn try_from(row: LoanRow) -> Result<Self, Self::Error> {
        Ok(Loan {
            id: row.id.into(),
            offer_id: row.offer_id.into(),
            invoice_id: row.invoice_id.into(),
            business_id: row.business_id.into(),
            loan_type: code(
                LoanType::parse_code(&row.loan_type),
                "loans",
                "loan_type",
                &row.loan_type,
            )?,
            status: code(LoanStatus::parse_code(&row.status), "loans", "status", &row.status)?,
            principal: Money::inr(row.principal),
            disbursed_amount: Money::inr(row.disbursed_amount),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct EmiRow {
    id: Uuid,
    loan_id: Uuid,
    installment_number: i32,
    due_date: DateTime<Utc>,
    amount: Decimal,
    status: String,
    retry_count: i32,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EmiRow> for Emi {
    type Error = DatabaseError;

    fn try_from(row: EmiRow) -> Result<Self, Self::Error> {
        Ok(Emi {
            id: row.id.into(),
            loan_id: row.loan_id.into(),
            installment_number: unsigned(row.installment_number, "emis", "installment_number")?,
            due_date: row.due_date,
            amount: Money::inr(row.amount),
            status: code(EmiStatus::parse_code(&row.status), "emis", "status", &row.status)?,
            retry_count: unsigned(row.retry_count, "emis", "retry_count")?,
            paid_at: row.paid_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct CollateralRow {
    id: Uuid,
    loan_id: Uuid,
    asset_description: String,
    asset_value: Decimal,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CollateralRow> for Collateral {
    type Error = DatabaseError;

    fn try_from(row: CollateralRow) -> Result<Self, Self::Error> {
        Ok(Collateral {
            id: row.id.into(),
            loan_id: row.loan_id.into(),
            asset_description: row.asset_description,
            asset_value: Money::inr(row.asset_value),
            status: code(
                CollateralStatus::parse_code(&row.status),
                "collaterals",
                "status",
                &row.status,
            )?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct RecoveryRow {
    id: Uuid,
    loan_id: Uuid,
    action_type: String,
    status: String,
    amount_recovered: Decimal,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<RecoveryRow> for RecoveryAction {
    type Error = DatabaseError;

    fn try_from(row: RecoveryRow) -> Result<Self, Self::Error> {
        Ok(RecoveryAction {
            id: row.id.into(),
            loan_id: row.loan_id.into(),
            action_type: code(
                RecoveryActionType::parse_code(&row.action_type),
                "recovery_actions",
                "action_type",
                &row.action_type,
            )?,
            status: code(
                RecoveryStatus::parse_code(&row.status),
                "recovery_actions",
                "status",
                &row.status,
            )?,
            amount_recovered: Money::inr(row.amount_recovered),
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub(crate) struct LedgerRow {
    id: Uuid,
    loan_id: Uuid,
    entry_type: String,
    account: String,
    amount: Decimal,
    description: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DatabaseError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        let entry_type: EntryType = row
            .entry_type
            .parse()
            .map_err(|_| DatabaseError::corrupt("ledger_entries", "entry_type", &row.entry_type))?;
        let account: LedgerAccount = row
            .account
            .parse()
            .map_err(|_| DatabaseError::corrupt("ledger_entries", "account", &row.account))?;
        Ok(LedgerEntry {
            id: row.id.into(),
            loan_id: row.loan_id.into(),
            entry_type,
            account,
            amount: Money::inr(row.amount),
            description: row.description,
            created_at: row.created_at,
        })
    }
}

/// Maps a batch of rows, failing on the first corrupt one
pub(crate) fn map_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DatabaseError>
where
    T: TryFrom<R, Error = DatabaseError>,
{
    rows.into_iter().map(T::try_from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn emi_row(status: &str, retry_count: i32) -> EmiRow {
        let now = Utc::now();
        EmiRow {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            installment_number: 1,
            due_date: now,
            amount: dec!(5000),
            status: status.to_string(),
            retry_count,
            paid_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_emi_row_maps_codes_and_counters() {
        let emi = Emi::try_from(emi_row("BOUNCED", 2)).unwrap();
        assert_eq!(emi.status, EmiStatus::Bounced);
        assert_eq!(emi.retry_count, 2);
        assert_eq!(emi.amount, Money::inr(dec!(5000)));
    }

    #[test]
    fn test_unknown_status_is_corrupt() {
        let err = Emi::try_from(emi_row("LATE", 0)).unwrap_err();
        assert!(matches!(err, DatabaseError::CorruptRow(_)));
        assert!(err.to_string().contains("emis.status"));
    }

    #[test]
    fn test_negative_counter_is_corrupt() {
        let err = Emi::try_from(emi_row("PENDING", -1)).unwrap_err();
        assert!(err.to_string().contains("retry_count"));
    }

    #[test]
    fn test_offer_rate_is_stored_as_fraction() {
        let now = Utc::now();
        let offer = Offer::try_from(OfferRow {
            id: Uuid::new_v4(),
            invoice_id: Uuid::new_v4(),
            loan_type: "SECURED".into(),
            financed_percentage: dec!(100),
            interest_rate: dec!(0.12),
            tenure_months: 12,
            status: "GENERATED".into(),
            expires_at: now,
            created_at: now,
        })
        .unwrap();
        assert_eq!(offer.interest_rate.as_percentage(), dec!(12));
        assert_eq!(offer.loan_type, LoanType::Secured);
    }

    #[test]
    fn test_to_i32_rejects_overflow() {
        assert_eq!(to_i32(12, "tenure_months").unwrap(), 12);
        assert!(to_i32(u32::MAX, "tenure_months").is_err());
    }
}
