//! SQL shared by pooled reads and units of work
//!
//! Every function takes a bare connection so the same statement serves a
//! pooled read and a locked read inside a transaction. Statements are runtime
//! checked; nothing here needs a database at build time.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use core_kernel::{BusinessId, EmiId, InvoiceId, LoanId, Money, OfferId, RecoveryId, UserId};
use credit_engine::{BorrowerExposure, ExposureScope, InvoiceStats};
use domain_credit::{BusinessProfile, CreditScore, Invoice, Offer, RiskGrade};
use domain_ledger::{EntryType, LedgerAccount, LedgerEntry};
use domain_lending::{Collateral, CollateralStatus, Emi, Loan, LoanStatus, RecoveryAction};

use crate::error::DatabaseError;
use crate::rows::{
    map_all, to_i32, BusinessRow, CollateralRow, EmiRow, InvoiceRow, LedgerRow, LoanRow, OfferRow,
    RecoveryRow, ScoreRow, BUSINESS_COLUMNS, COLLATERAL_COLUMNS, EMI_COLUMNS, INVOICE_COLUMNS,
    LEDGER_COLUMNS, LOAN_COLUMNS, OFFER_COLUMNS, RECOVERY_COLUMNS, SCORE_COLUMNS,
};

/// Row locking for a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lock {
    None,
    ForUpdate,
}

impl Lock {
    fn clause(self) -> &'static str {
        match self {
            Lock::None => "",
            Lock::ForUpdate => " FOR UPDATE",
        }
    }
}

type Result<T> = std::result::Result<T, DatabaseError>;

// ============================================================================
// Businesses
// ============================================================================

pub(crate) async fn business(
    conn: &mut PgConnection,
    id: BusinessId,
    lock: Lock,
) -> Result<Option<BusinessProfile>> {
    let sql = format!("SELECT {} FROM businesses WHERE id = $1{}", BUSINESS_COLUMNS, lock.clause());
    let row = sqlx::query_as::<_, BusinessRow>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(BusinessProfile::from))
}

pub(crate) async fn business_by_gst(
    conn: &mut PgConnection,
    gst_number: &str,
) -> Result<Option<BusinessProfile>> {
    let sql = format!("SELECT {} FROM businesses WHERE gst_number = $1", BUSINESS_COLUMNS);
    let row = sqlx::query_as::<_, BusinessRow>(&sql)
        .bind(gst_number)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(BusinessProfile::from))
}

pub(crate) async fn business_ids(conn: &mut PgConnection) -> Result<Vec<BusinessId>> {
    let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM businesses ORDER BY created_at, id")
        .fetch_all(&mut *conn)
        .await?;
    Ok(ids.into_iter().map(BusinessId::from).collect())
}

pub(crate) async fn insert_business(
    conn: &mut PgConnection,
    business: &BusinessProfile,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO businesses
            (id, user_id, gst_number, aadhaar_number, pan_number, verification_snapshot, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::from(business.id))
    .bind(Uuid::from(business.user_id))
    .bind(&business.gst_number)
    .bind(&business.aadhaar_number)
    .bind(&business.pan_number)
    .bind(&business.verification_snapshot)
    .bind(business.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ============================================================================
// Invoices
// ============================================================================

pub(crate) async fn invoice(
    conn: &mut PgConnection,
    id: InvoiceId,
    lock: Lock,
) -> Result<Option<Invoice>> {
    let sql = format!("SELECT {} FROM invoices WHERE id = $1{}", INVOICE_COLUMNS, lock.clause());
    sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await?
        .map(Invoice::try_from)
        .transpose()
}

pub(crate) async fn invoice_by_number(
    conn: &mut PgConnection,
    business_id: BusinessId,
    invoice_number: &str,
    lock: Lock,
) -> Result<Option<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE business_id = $1 AND invoice_number = $2{}",
        INVOICE_COLUMNS,
        lock.clause()
    );
    sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(Uuid::from(business_id))
        .bind(invoice_number)
        .fetch_optional(&mut *conn)
        .await?
        .map(Invoice::try_from)
        .transpose()
}

pub(crate) async fn invoices_for_business(
    conn: &mut PgConnection,
    business_id: BusinessId,
) -> Result<Vec<Invoice>> {
    let sql = format!(
        "SELECT {} FROM invoices WHERE business_id = $1 ORDER BY created_at, id",
        INVOICE_COLUMNS
    );
    let rows = sqlx::query_as::<_, InvoiceRow>(&sql)
        .bind(Uuid::from(business_id))
        .fetch_all(&mut *conn)
        .await?;
    map_all(rows)
}

pub(crate) async fn invoice_stats(
    conn: &mut PgConnection,
    business_id: BusinessId,
) -> Result<InvoiceStats> {
    let (count, average, repaid) = sqlx::query_as::<_, (i64, Decimal, i64)>(
        r#"
        SELECT COUNT(*),
               COALESCE(AVG(delay_days), 0)::NUMERIC,
               COUNT(*) FILTER (WHERE status = 'REPAID')
        FROM invoices
        WHERE business_id = $1
        "#,
    )
    .bind(Uuid::from(business_id))
    .fetch_one(&mut *conn)
    .await?;

    let as_u32 = |n: i64| {
        u32::try_from(n).map_err(|_| DatabaseError::QueryFailed(format!("count overflow: {}", n)))
    };
    Ok(InvoiceStats {
        invoice_count: as_u32(count)?,
        average_delay_days: average,
        repaid_count: as_u32(repaid)?,
    })
}

pub(crate) async fn insert_invoice(conn: &mut PgConnection, invoice: &Invoice) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO invoices
            (id, business_id, invoice_number, amount, due_date, delay_days, status,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::from(invoice.id))
    .bind(Uuid::from(invoice.business_id))
    .bind(&invoice.invoice_number)
    .bind(invoice.amount.amount())
    .bind(invoice.due_date)
    .bind(invoice.delay_days)
    .bind(invoice.status.as_str())
    .bind(invoice.created_at)
    .bind(invoice.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn update_invoice(conn: &mut PgConnection, invoice: &Invoice) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE invoices
        SET amount = $2, due_date = $3, delay_days = $4, status = $5, updated_at = $6
        WHERE id = $1
        "#,
    )
    .bind(Uuid::from(invoice.id))
    .bind(invoice.amount.amount())
    .bind(invoice.due_date)
    .bind(invoice.delay_days)
    .bind(invoice.status.as_str())
    .bind(invoice.updated_at)
    .execute(&mut *conn)
    .await?;
    expect_one(result.rows_affected(), "invoice", invoice.id)
}

// ============================================================================
// Credit scores
// ============================================================================

pub(crate) async fn latest_score(
    conn: &mut PgConnection,
    business_id: BusinessId,
) -> Result<Option<CreditScore>> {
    let sql = format!(
        "SELECT {} FROM credit_scores WHERE business_id = $1 \
         ORDER BY created_at DESC, id DESC LIMIT 1",
        SCORE_COLUMNS
    );
    sqlx::query_as::<_, ScoreRow>(&sql)
        .bind(Uuid::from(business_id))
        .fetch_optional(&mut *conn)
        .await?
        .map(CreditScore::try_from)
        .transpose()
}

pub(crate) async fn score_grade_counts(conn: &mut PgConnection) -> Result<Vec<(RiskGrade, u64)>> {
    let rows = sqlx::query_as::<_, (String, i64)>(
        "SELECT risk_grade, COUNT(*) FROM credit_scores GROUP BY risk_grade",
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut counts = Vec::with_capacity(rows.len());
    for (raw, n) in rows {
        let grade = RiskGrade::parse_code(&raw)
            .ok_or_else(|| DatabaseError::corrupt("credit_scores", "risk_grade", &raw))?;
        counts.push((grade, n.max(0) as u64));
    }
    counts.sort_by_key(|(grade, _)| RiskGrade::ALL.iter().position(|g| g == grade));
    Ok(counts)
}

pub(crate) async fn insert_score(conn: &mut PgConnection, score: &CreditScore) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO credit_scores
            (id, business_id, external_score, internal_score, final_score, risk_grade, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::from(score.id))
    .bind(Uuid::from(score.business_id))
    .bind(score.external_score)
    .bind(score.internal_score)
    .bind(score.final_score)
    .bind(score.risk_grade.as_str())
    .bind(score.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

// ============================================================================
// Offers
// ============================================================================

pub(crate) async fn offer(
    conn: &mut PgConnection,
    id: OfferId,
    lock: Lock,
) -> Result<Option<Offer>> {
    let sql = format!("SELECT {} FROM offers WHERE id = $1{}", OFFER_COLUMNS, lock.clause());
    sqlx::query_as::<_, OfferRow>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await?
        .map(Offer::try_from)
        .transpose()
}

pub(crate) async fn offers_for_invoice(
    conn: &mut PgConnection,
    invoice_id: InvoiceId,
    lock: Lock,
) -> Result<Vec<Offer>> {
    let sql = format!(
        "SELECT {} FROM offers WHERE invoice_id = $1 ORDER BY created_at, id{}",
        OFFER_COLUMNS,
        lock.clause()
    );
    let rows = sqlx::query_as::<_, OfferRow>(&sql)
        .bind(Uuid::from(invoice_id))
        .fetch_all(&mut *conn)
        .await?;
    map_all(rows)
}

pub(crate) async fn insert_offer(conn: &mut PgConnection, offer: &Offer) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO offers
            (id, invoice_id, loan_type, financed_percentage, interest_rate, tenure_months, status,
             expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(Uuid::from(offer.id))
    .bind(Uuid::from(offer.invoice_id))
    .bind(offer.loan_type.as_str())
    .bind(offer.financed_percentage)
    .bind(offer.interest_rate.as_decimal())
    .bind(to_i32(offer.tenure_months, "tenure_months")?)
    .bind(offer.status.as_str())
    .bind(offer.expires_at)
    .bind(offer.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn update_offer(conn: &mut PgConnection, offer: &Offer) -> Result<()> {
    let result = sqlx::query("UPDATE offers SET status = $2 WHERE id = $1")
        .bind(Uuid::from(offer.id))
        .bind(offer.status.as_str())
        .execute(&mut *conn)
        .await?;
    expect_one(result.rows_affected(), "offer", offer.id)
}

pub(crate) async fn expired_offer_ids(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<OfferId>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM offers WHERE status = 'GENERATED' AND expires_at <= $1 \
         ORDER BY expires_at, id",
    )
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids.into_iter().map(OfferId::from).collect())
}

// ============================================================================
// Loans
// ============================================================================

pub(crate) async fn loan(conn: &mut PgConnection, id: LoanId, lock: Lock) -> Result<Option<Loan>> {
    let sql = format!("SELECT {} FROM loans WHERE id = $1{}", LOAN_COLUMNS, lock.clause());
    sqlx::query_as::<_, LoanRow>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await?
        .map(Loan::try_from)
        .transpose()
}

pub(crate) async fn loans_by_status(
    conn: &mut PgConnection,
    status: LoanStatus,
) -> Result<Vec<Loan>> {
    let sql =
        format!("SELECT {} FROM loans WHERE status = $1 ORDER BY created_at, id", LOAN_COLUMNS);
    let rows = sqlx::query_as::<_, LoanRow>(&sql)
        .bind(status.as_str())
        .fetch_all(&mut *conn)
        .await?;
    map_all(rows)
}

pub(crate) async fn insert_loan(conn: &mut PgConnection, loan: &Loan) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO loans
            (id, offer_id, invoice_id, business_id, loan_type, status, principal, disbursed_amount,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(Uuid::from(loan.id))
    .bind(Uuid::from(loan.offer_id))
    .bind(Uuid::from(loan.invoice_id))
    .bind(Uuid::from(loan.business_id))
    .bind(loan.loan_type.as_str())
    .bind(loan.status.as_str())
    .bind(loan.principal.amount())
    .bind(loan.disbursed_amount.amount())
    .bind(loan.created_at)
    .bind(loan.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn update_loan(conn: &mut PgConnection, loan: &Loan) -> Result<()> {
    let result = sqlx::query(
        "UPDATE loans SET status = $2, disbursed_amount = $3, updated_at = $4 WHERE id = $1",
    )
    .bind(Uuid::from(loan.id))
    .bind(loan.status.as_str())
    .bind(loan.disbursed_amount.amount())
    .bind(loan.updated_at)
    .execute(&mut *conn)
    .await?;
    expect_one(result.rows_affected(), "loan", loan.id)
}

/// Disbursed principal of loans that still count toward exposure
pub(crate) async fn exposure(conn: &mut PgConnection, scope: &ExposureScope) -> Result<Money> {
    let statuses: Vec<String> = LoanStatus::ALL
        .iter()
        .filter(|s| s.counts_toward_exposure())
        .map(|s| s.as_str().to_string())
        .collect();

    let (user_id, gst_number) = match scope {
        ExposureScope::Portfolio => (None, None),
        ExposureScope::User(user_id) => (Some(Uuid::from(*user_id)), None),
        ExposureScope::Gst(gst) => (None, Some(gst.as_str())),
    };

    let total = sqlx::query_scalar::<_, Decimal>(
        r#"
        SELECT COALESCE(SUM(l.disbursed_amount), 0)::NUMERIC
        FROM loans l
        JOIN businesses b ON b.id = l.business_id
        WHERE l.status = ANY($1)
          AND ($2::UUID IS NULL OR b.user_id = $2)
          AND ($3::TEXT IS NULL OR b.gst_number = $3)
        "#,
    )
    .bind(statuses)
    .bind(user_id)
    .bind(gst_number)
    .fetch_one(&mut *conn)
    .await?;
    Ok(Money::inr(total))
}

/// Open exposure grouped by owning user, largest first
pub(crate) async fn borrower_exposures(conn: &mut PgConnection) -> Result<Vec<BorrowerExposure>> {
    let statuses: Vec<String> = LoanStatus::ALL
        .iter()
        .filter(|s| s.counts_toward_exposure())
        .map(|s| s.as_str().to_string())
        .collect();

    let rows = sqlx::query_as::<_, (Uuid, Decimal, i64)>(
        r#"
        SELECT b.user_id, SUM(l.disbursed_amount)::NUMERIC, COUNT(*)
        FROM loans l
        JOIN businesses b ON b.id = l.business_id
        WHERE l.status = ANY($1)
        GROUP BY b.user_id
        ORDER BY 2 DESC, b.user_id
        "#,
    )
    .bind(statuses)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(user_id, exposure, loans)| BorrowerExposure {
            user_id: UserId::from(user_id),
            exposure: Money::inr(exposure),
            open_loans: loans.max(0) as u64,
        })
        .collect())
}

// ============================================================================
// EMIs
// ============================================================================

pub(crate) async fn emi(conn: &mut PgConnection, id: EmiId, lock: Lock) -> Result<Option<Emi>> {
    let sql = format!("SELECT {} FROM emis WHERE id = $1{}", EMI_COLUMNS, lock.clause());
    sqlx::query_as::<_, EmiRow>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await?
        .map(Emi::try_from)
        .transpose()
}

pub(crate) async fn emis_for_loan(conn: &mut PgConnection, loan_id: LoanId) -> Result<Vec<Emi>> {
    let sql = format!(
        "SELECT {} FROM emis WHERE loan_id = $1 ORDER BY installment_number",
        EMI_COLUMNS
    );
    let rows = sqlx::query_as::<_, EmiRow>(&sql)
        .bind(Uuid::from(loan_id))
        .fetch_all(&mut *conn)
        .await?;
    map_all(rows)
}

pub(crate) async fn insert_emi(conn: &mut PgConnection, emi: &Emi) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO emis
            (id, loan_id, installment_number, due_date, amount, status, retry_count, paid_at,
             created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(Uuid::from(emi.id))
    .bind(Uuid::from(emi.loan_id))
    .bind(to_i32(emi.installment_number, "installment_number")?)
    .bind(emi.due_date)
    .bind(emi.amount.amount())
    .bind(emi.status.as_str())
    .bind(to_i32(emi.retry_count, "retry_count")?)
    .bind(emi.paid_at)
    .bind(emi.created_at)
    .bind(emi.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn update_emi(conn: &mut PgConnection, emi: &Emi) -> Result<()> {
    let result = sqlx::query(
        "UPDATE emis SET status = $2, retry_count = $3, paid_at = $4, updated_at = $5 \
         WHERE id = $1",
    )
    .bind(Uuid::from(emi.id))
    .bind(emi.status.as_str())
    .bind(to_i32(emi.retry_count, "retry_count")?)
    .bind(emi.paid_at)
    .bind(emi.updated_at)
    .execute(&mut *conn)
    .await?;
    expect_one(result.rows_affected(), "emi", emi.id)
}

pub(crate) async fn overdue_emi_ids(
    conn: &mut PgConnection,
    now: DateTime<Utc>,
) -> Result<Vec<EmiId>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT id FROM emis WHERE status = 'PENDING' AND due_date < $1 ORDER BY due_date, id",
    )
    .bind(now)
    .fetch_all(&mut *conn)
    .await?;
    Ok(ids.into_iter().map(EmiId::from).collect())
}

pub(crate) async fn pending_emis_due_between(
    conn: &mut PgConnection,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<Emi>> {
    let sql = format!(
        "SELECT {} FROM emis WHERE status = 'PENDING' AND due_date BETWEEN $1 AND $2 \
         ORDER BY due_date, id",
        EMI_COLUMNS
    );
    let rows = sqlx::query_as::<_, EmiRow>(&sql)
        .bind(from)
        .bind(to)
        .fetch_all(&mut *conn)
        .await?;
    map_all(rows)
}

// ============================================================================
// Collaterals
// ============================================================================

pub(crate) async fn collaterals_for_loan(
    conn: &mut PgConnection,
    loan_id: LoanId,
    lock: Lock,
) -> Result<Vec<Collateral>> {
    let sql = format!(
        "SELECT {} FROM collaterals WHERE loan_id = $1 ORDER BY created_at, id{}",
        COLLATERAL_COLUMNS,
        lock.clause()
    );
    let rows = sqlx::query_as::<_, CollateralRow>(&sql)
        .bind(Uuid::from(loan_id))
        .fetch_all(&mut *conn)
        .await?;
    map_all(rows)
}

pub(crate) async fn collaterals_by_status(
    conn: &mut PgConnection,
    status: CollateralStatus,
) -> Result<Vec<Collateral>> {
    let sql = format!(
        "SELECT {} FROM collaterals WHERE status = $1 ORDER BY created_at, id",
        COLLATERAL_COLUMNS
    );
    let rows = sqlx::query_as::<_, CollateralRow>(&sql)
        .bind(status.as_str())
        .fetch_all(&mut *conn)
        .await?;
    map_all(rows)
}

pub(crate) async fn insert_collateral(
    conn: &mut PgConnection,
    collateral: &Collateral,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO collaterals
            (id, loan_id, asset_description, asset_value, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::from(collateral.id))
    .bind(Uuid::from(collateral.loan_id))
    .bind(&collateral.asset_description)
    .bind(collateral.asset_value.amount())
    .bind(collateral.status.as_str())
    .bind(collateral.created_at)
    .bind(collateral.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn update_collateral(
    conn: &mut PgConnection,
    collateral: &Collateral,
) -> Result<()> {
    let result = sqlx::query("UPDATE collaterals SET status = $2, updated_at = $3 WHERE id = $1")
        .bind(Uuid::from(collateral.id))
        .bind(collateral.status.as_str())
        .bind(collateral.updated_at)
        .execute(&mut *conn)
        .await?;
    expect_one(result.rows_affected(), "collateral", collateral.id)
}

// ============================================================================
// Recovery actions
// ============================================================================

pub(crate) async fn recovery(
    conn: &mut PgConnection,
    id: RecoveryId,
    lock: Lock,
) -> Result<Option<RecoveryAction>> {
    let sql = format!(
        "SELECT {} FROM recovery_actions WHERE id = $1{}",
        RECOVERY_COLUMNS,
        lock.clause()
    );
    sqlx::query_as::<_, RecoveryRow>(&sql)
        .bind(Uuid::from(id))
        .fetch_optional(&mut *conn)
        .await?
        .map(RecoveryAction::try_from)
        .transpose()
}

pub(crate) async fn recoveries(
    conn: &mut PgConnection,
    loan_id: Option<LoanId>,
) -> Result<Vec<RecoveryAction>> {
    let sql = format!(
        "SELECT {} FROM recovery_actions WHERE ($1::UUID IS NULL OR loan_id = $1) \
         ORDER BY created_at DESC, id DESC",
        RECOVERY_COLUMNS
    );
    let rows = sqlx::query_as::<_, RecoveryRow>(&sql)
        .bind(loan_id.map(Uuid::from))
        .fetch_all(&mut *conn)
        .await?;
    map_all(rows)
}

pub(crate) async fn insert_recovery(
    conn: &mut PgConnection,
    recovery: &RecoveryAction,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO recovery_actions
            (id, loan_id, action_type, status, amount_recovered, notes, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(Uuid::from(recovery.id))
    .bind(Uuid::from(recovery.loan_id))
    .bind(recovery.action_type.as_str())
    .bind(recovery.status.as_str())
    .bind(recovery.amount_recovered.amount())
    .bind(&recovery.notes)
    .bind(recovery.created_at)
    .bind(recovery.updated_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub(crate) async fn update_recovery(
    conn: &mut PgConnection,
    recovery: &RecoveryAction,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE recovery_actions
        SET status = $2, amount_recovered = $3, notes = $4, updated_at = $5
        WHERE id = $1
        "#,
    )
    .bind(Uuid::from(recovery.id))
    .bind(recovery.status.as_str())
    .bind(recovery.amount_recovered.amount())
    .bind(&recovery.notes)
    .bind(recovery.updated_at)
    .execute(&mut *conn)
    .await?;
    expect_one(result.rows_affected(), "recovery action", recovery.id)
}

// ============================================================================
// Ledger
// ============================================================================

pub(crate) async fn ledger_for_loan(
    conn: &mut PgConnection,
    loan_id: LoanId,
) -> Result<Vec<LedgerEntry>> {
    let sql = format!(
        "SELECT {} FROM ledger_entries WHERE loan_id = $1 ORDER BY created_at, id",
        LEDGER_COLUMNS
    );
    let rows = sqlx::query_as::<_, LedgerRow>(&sql)
        .bind(Uuid::from(loan_id))
        .fetch_all(&mut *conn)
        .await?;
    map_all(rows)
}

pub(crate) async fn ledger_sums(
    conn: &mut PgConnection,
) -> Result<Vec<(LedgerAccount, EntryType, Money)>> {
    let rows = sqlx::query_as::<_, (String, String, Decimal)>(
        r#"
        SELECT account, entry_type, SUM(amount)::NUMERIC
        FROM ledger_entries
        GROUP BY account, entry_type
        ORDER BY account, entry_type
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    let mut sums = Vec::with_capacity(rows.len());
    for (account, side, total) in rows {
        let account: LedgerAccount = account
            .parse()
            .map_err(|_| DatabaseError::corrupt("ledger_entries", "account", &account))?;
        let side: EntryType = side
            .parse()
            .map_err(|_| DatabaseError::corrupt("ledger_entries", "entry_type", &side))?;
        sums.push((account, side, Money::inr(total)));
    }
    Ok(sums)
}

pub(crate) async fn append_ledger_entry(
    conn: &mut PgConnection,
    entry: &LedgerEntry,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO ledger_entries
            (id, loan_id, entry_type, account, amount, description, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::from(entry.id))
    .bind(Uuid::from(entry.loan_id))
    .bind(entry.entry_type.as_str())
    .bind(entry.account.as_str())
    .bind(entry.amount.amount())
    .bind(&entry.description)
    .bind(entry.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

fn expect_one(affected: u64, entity: &str, id: impl std::fmt::Display) -> Result<()> {
    if affected == 1 {
        Ok(())
    } else {
        Err(DatabaseError::NotFound(format!("{} with id '{}' not found", entity, id)))
    }
}
