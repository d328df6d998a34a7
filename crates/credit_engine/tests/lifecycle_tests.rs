//! End-to-end lifecycle tests over the in-memory store

mod common;

use chrono::Duration;
use rust_decimal_macros::dec;

use common::Harness;
use core_kernel::{AuditAction, EntityType, Money, UserId};
use credit_engine::{EngineConfig, EngineError, ErrorKind, LendingStore};
use domain_credit::{CapKind, InvoiceStatus, LoanType, OfferStatus, RiskGrade};
use domain_ledger::{EntryType, LedgerAccount};
use domain_lending::{
    CollateralInput, CollateralStatus, EmiStatus, LoanStatus, RecoveryActionType, RecoveryStatus,
};

const GST: &str = "27AAPFU0939F1ZV";

async fn scored_harness() -> (Harness, UserId) {
    let h = Harness::new();
    h.bureau.set_score(GST, dec!(800)).await;
    h.bureau.set_returns(GST, 12, 12).await;
    (h, UserId::new_v7())
}

// ============================================================================
// Offers
// ============================================================================

mod offer_generation {
    use super::*;

    #[tokio::test]
    async fn test_generates_priced_pair_and_flips_invoice() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;

        let [unsecured, secured] = h.offers(invoice.id, user).await;

        // external 800, internal 200 + 10 = 210, final 564 -> B
        let score = h.engine.scoring().latest_score(business.id).await.unwrap().unwrap();
        assert_eq!(score.final_score, dec!(564.0));
        assert_eq!(score.risk_grade, RiskGrade::B);

        assert_eq!(unsecured.loan_type, LoanType::Unsecured);
        assert_eq!(unsecured.interest_rate.as_percentage(), dec!(20));
        assert_eq!(unsecured.tenure_months, 8);
        assert_eq!(secured.loan_type, LoanType::Secured);
        assert_eq!(secured.interest_rate.as_percentage(), dec!(14));
        assert_eq!(secured.tenure_months, 4);
        assert_eq!(unsecured.expires_at, h.clock_now() + Duration::hours(24));

        assert_eq!(h.invoice_status(&invoice).await, InvoiceStatus::OfferGenerated);
        assert_eq!(h.audited(AuditAction::OfferGenerated).await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_generation_yields_one_pair() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;

        let offers = h.engine.offers();
        let (a, b) = tokio::join!(
            offers.generate_offers(invoice.id, user),
            offers.generate_offers(invoice.id, user)
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert_eq!(h.engine.offers().offers_for_invoice(invoice.id).await.unwrap().len(), 2);
        assert_eq!(h.audited(AuditAction::OfferGenerated).await, 1);
    }

    #[tokio::test]
    async fn test_existing_score_skips_provider() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        h.engine.scoring().compute_score(business.id, None).await.unwrap();
        assert_eq!(h.bureau.evaluate_calls(), 1);

        h.offers(invoice.id, user).await;
        assert_eq!(h.bureau.evaluate_calls(), 1);
    }

    #[tokio::test]
    async fn test_rejects_foreign_user_and_wrong_state() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;

        let err = h
            .engine
            .offers()
            .generate_offers(invoice.id, UserId::new_v7())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert_eq!(h.invoice_status(&invoice).await, InvoiceStatus::Unpaid);

        h.offers(invoice.id, user).await;
        let err = h.engine.offers().generate_offers(invoice.id, user).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_unknown_invoice_is_not_found() {
        let (h, user) = scored_harness().await;
        let err = h
            .engine
            .offers()
            .generate_offers(core_kernel::InvoiceId::new_v7(), user)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

// ============================================================================
// Exposure caps
// ============================================================================

mod exposure_caps {
    use super::*;

    #[tokio::test]
    async fn test_per_user_cap_rejects_then_approves_smaller_request() {
        let (h, user) = scored_harness().await;
        let other = h.business(user, "29AAACR5055K1Z5").await;
        h.active_loan(&other, dec!(9500000)).await;

        let business = h.business(user, GST).await;
        // 85 % of 800000 = 680000, over the remaining 500000 headroom
        let large = h.invoice(&business, "INV-L", dec!(800000)).await;
        // 85 % of 470000 = 399500
        let small = h.invoice(&business, "INV-S", dec!(470000)).await;

        let exposure = h.engine.exposure().user_exposure(user).await.unwrap();
        assert_eq!(exposure, Money::inr(dec!(9500000)));
        assert!(h.engine.exposure().gst_exposure(GST).await.unwrap().is_zero());

        let err = h.engine.offers().generate_offers(large.id, user).await.unwrap_err();
        match err {
            EngineError::CapExceeded {
                cap,
                current,
                requested,
                limit,
            } => {
                assert_eq!(cap, CapKind::PerUser);
                assert_eq!(current, Money::inr(dec!(9500000)));
                assert_eq!(requested, Money::inr(dec!(680000)));
                assert_eq!(limit, Money::inr(dec!(10000000)));
            }
            other => panic!("expected cap breach, got {other:?}"),
        }
        assert_eq!(h.invoice_status(&large).await, InvoiceStatus::Unpaid);
        assert!(h.engine.offers().offers_for_invoice(large.id).await.unwrap().is_empty());
        assert_eq!(h.audited(AuditAction::OfferGenerated).await, 0);

        let offers = h.engine.offers().generate_offers(small.id, user).await.unwrap();
        assert_eq!(offers.len(), 2);
    }

    #[tokio::test]
    async fn test_portfolio_cap_is_checked_first() {
        let mut config = EngineConfig::default();
        config.caps.portfolio = Money::inr(dec!(1000000));
        let h = Harness::with_config(config);
        let user = UserId::new_v7();
        let neighbour = h.business(UserId::new_v7(), "29AAACR5055K1Z5").await;
        h.active_loan(&neighbour, dec!(900000)).await;

        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(200000)).await;

        let err = h.engine.offers().generate_offers(invoice.id, user).await.unwrap_err();
        assert!(matches!(err, EngineError::CapExceeded { cap: CapKind::Portfolio, .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}

// ============================================================================
// Sanction, repayment and closure
// ============================================================================

mod repayment_path {
    use super::*;

    #[tokio::test]
    async fn test_sanction_disburses_and_expires_sibling() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        let [unsecured, secured] = h.offers(invoice.id, user).await;

        let loan = h.engine.loans().sanction(unsecured.id, user, None).await.unwrap();

        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(loan.principal, Money::inr(dec!(100000)));
        assert_eq!(loan.disbursed_amount, loan.principal);
        assert_eq!(h.invoice_status(&invoice).await, InvoiceStatus::Financed);
        assert_eq!(h.offer_status(unsecured.id).await, OfferStatus::Accepted);
        assert_eq!(h.offer_status(secured.id).await, OfferStatus::Expired);

        let schedule = h.engine.loans().emi_schedule(loan.id).await.unwrap();
        assert_eq!(schedule.len(), 8);
        assert!(schedule.iter().all(|e| e.amount == schedule[0].amount));
        assert_eq!(schedule[0].due_date, h.clock_now() + Duration::days(30));
        assert_eq!(schedule[7].due_date, h.clock_now() + Duration::days(240));

        let ledger = h.engine.loans().ledger(loan.id).await.unwrap();
        assert_eq!(ledger.entries.len(), 2);
        assert_eq!(ledger.total_debits, ledger.total_credits);
        assert_eq!(ledger.count(LedgerAccount::BankCapital, EntryType::Debit), 1);
        assert_eq!(ledger.count(LedgerAccount::Borrower, EntryType::Credit), 1);

        let exposure = h.engine.exposure().user_exposure(user).await.unwrap();
        assert_eq!(exposure, Money::inr(dec!(100000)));
        assert_eq!(h.audited(AuditAction::LoanSanctionedAndDisbursed).await, 1);

        let expired = h.audit.with_action(AuditAction::OfferExpired).await;
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].entity_type, EntityType::Offer);
        assert_eq!(expired[0].entity_id, uuid::Uuid::from(secured.id));
        assert_eq!(expired[0].actor, Some(user));

        let err = h.engine.loans().sanction(secured.id, user, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_out_of_order_payments_close_loan_once() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        let [unsecured, _] = h.offers(invoice.id, user).await;
        let loan = h.engine.loans().sanction(unsecured.id, user, None).await.unwrap();

        let schedule = h.engine.loans().emi_schedule(loan.id).await.unwrap();
        for emi in schedule.iter().rev() {
            let paid = h.engine.repayments().pay_emi(emi.id, Some(user)).await.unwrap();
            assert_eq!(paid.status, EmiStatus::Paid);
        }

        assert_eq!(h.engine.loans().loan(loan.id).await.unwrap().status, LoanStatus::Closed);
        assert_eq!(h.invoice_status(&invoice).await, InvoiceStatus::Repaid);
        assert_eq!(h.audited(AuditAction::LoanClosed).await, 1);
        assert_eq!(h.audited(AuditAction::EmiPaid).await, 8);

        let ledger = h.engine.loans().ledger(loan.id).await.unwrap();
        assert_eq!(ledger.entries.len(), 2 + 2 * 8);
        assert_eq!(ledger.total_debits, ledger.total_credits);
        assert!(h.engine.exposure().user_exposure(user).await.unwrap().is_zero());
        assert!(h.engine.repayments().outstanding(loan.id).await.unwrap().is_zero());

        let err = h.engine.repayments().pay_emi(schedule[0].id, Some(user)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_secured_offer_requires_collateral() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        let [_, secured] = h.offers(invoice.id, user).await;

        let err = h.engine.loans().sanction(secured.id, user, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let bad = CollateralInput::new("  ", Money::inr(dec!(50000)));
        let err = h.engine.loans().sanction(secured.id, user, Some(bad)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        assert_eq!(h.offer_status(secured.id).await, OfferStatus::Generated);
        assert_eq!(h.invoice_status(&invoice).await, InvoiceStatus::OfferGenerated);
        assert!(h.store.loans_by_status(LoanStatus::Active).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_expired_offer_is_marked_on_accept() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        let [unsecured, secured] = h.offers(invoice.id, user).await;

        h.advance(Duration::hours(24));
        let err = h.engine.loans().sanction(unsecured.id, user, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Expired);
        assert_eq!(h.offer_status(unsecured.id).await, OfferStatus::Expired);
        assert_eq!(h.offer_status(secured.id).await, OfferStatus::Generated);
        assert_eq!(h.invoice_status(&invoice).await, InvoiceStatus::OfferGenerated);
        assert_eq!(h.audited(AuditAction::OfferExpired).await, 1);
    }

    #[tokio::test]
    async fn test_failed_ledger_write_rolls_back_sanction() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        let [unsecured, secured] = h.offers(invoice.id, user).await;

        h.store.fail_ledger_appends(true);
        let err = h.engine.loans().sanction(unsecured.id, user, None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);

        assert_eq!(h.offer_status(unsecured.id).await, OfferStatus::Generated);
        assert_eq!(h.offer_status(secured.id).await, OfferStatus::Generated);
        assert_eq!(h.invoice_status(&invoice).await, InvoiceStatus::OfferGenerated);
        assert!(h.store.loans_by_status(LoanStatus::Active).await.unwrap().is_empty());
        assert!(h.store.all_ledger_entries().await.is_empty());
        assert_eq!(h.audited(AuditAction::LoanSanctionedAndDisbursed).await, 0);

        h.store.fail_ledger_appends(false);
        let loan = h.engine.loans().sanction(unsecured.id, user, None).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
    }
}

// ============================================================================
// Concurrent acceptance and settlement
// ============================================================================

mod races {
    use super::*;

    #[tokio::test]
    async fn test_double_acceptance_yields_one_loan() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        let [unsecured, secured] = h.offers(invoice.id, user).await;

        let loans = h.engine.loans();
        let (a, b) = tokio::join!(
            loans.sanction(unsecured.id, user, None),
            loans.sanction(unsecured.id, user, None)
        );

        let results = [a, b];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert_eq!(h.store.loans_by_status(LoanStatus::Active).await.unwrap().len(), 1);
        assert_eq!(h.audited(AuditAction::LoanSanctionedAndDisbursed).await, 1);
        assert_eq!(h.offer_status(unsecured.id).await, OfferStatus::Accepted);
        assert_eq!(h.offer_status(secured.id).await, OfferStatus::Expired);
        assert_eq!(h.store.all_ledger_entries().await.len(), 2);
    }

    #[tokio::test]
    async fn test_double_settlement_posts_one_repayment() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        let [unsecured, _] = h.offers(invoice.id, user).await;
        let loan = h.engine.loans().sanction(unsecured.id, user, None).await.unwrap();
        let first = h.engine.loans().emi_schedule(loan.id).await.unwrap()[0].clone();

        let repayments = h.engine.repayments();
        let (a, b) = tokio::join!(
            repayments.pay_emi(first.id, Some(user)),
            repayments.pay_emi(first.id, Some(user))
        );

        let results = [a, b];
        let paid: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].status, EmiStatus::Paid);
        let err = results.into_iter().find_map(Result::err).unwrap();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let ledger = h.engine.loans().ledger(loan.id).await.unwrap();
        assert_eq!(ledger.entries.len(), 2 + 2);
        assert_eq!(ledger.count(LedgerAccount::Borrower, EntryType::Debit), 1);
        assert_eq!(ledger.count(LedgerAccount::BankCapital, EntryType::Credit), 1);
        assert_eq!(ledger.total_debits, ledger.total_credits);
        assert_eq!(h.audited(AuditAction::EmiPaid).await, 1);
    }
}

// ============================================================================
// Default and recovery
// ============================================================================

mod default_and_recovery {
    use super::*;

    async fn secured_loan(
        h: &Harness,
        user: UserId,
    ) -> (domain_lending::Loan, domain_credit::Invoice) {
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        let [_, secured] = h.offers(invoice.id, user).await;
        let collateral = CollateralInput::new("Warehouse stock", Money::inr(dec!(50000)));
        let loan = h.engine.loans().sanction(secured.id, user, Some(collateral)).await.unwrap();
        (loan, invoice)
    }

    #[tokio::test]
    async fn test_second_bounce_defaults_exactly_once() {
        let (h, user) = scored_harness().await;
        let (loan, invoice) = secured_loan(&h, user).await;
        let emi = h.engine.loans().emi_schedule(loan.id).await.unwrap()[0].clone();

        let first = h.engine.repayments().bounce_emi(emi.id, None).await.unwrap();
        assert_eq!(first.retry_count, 1);
        assert_eq!(h.engine.loans().loan(loan.id).await.unwrap().status, LoanStatus::Active);

        h.engine.repayments().bounce_emi(emi.id, None).await.unwrap();
        let third = h.engine.repayments().bounce_emi(emi.id, None).await.unwrap();
        assert_eq!(third.retry_count, 3);
        assert_eq!(third.status, EmiStatus::Bounced);

        assert_eq!(h.engine.loans().loan(loan.id).await.unwrap().status, LoanStatus::Default);
        assert_eq!(h.invoice_status(&invoice).await, InvoiceStatus::Defaulted);
        let collaterals = h.engine.loans().collaterals(loan.id).await.unwrap();
        assert_eq!(collaterals.len(), 1);
        assert_eq!(collaterals[0].status, CollateralStatus::Seized);

        let ledger = h.engine.loans().ledger(loan.id).await.unwrap();
        assert_eq!(ledger.count(LedgerAccount::Provisioning, EntryType::Debit), 1);
        assert_eq!(ledger.count(LedgerAccount::Recovery, EntryType::Credit), 1);
        let provision = ledger
            .entries
            .iter()
            .find(|e| e.account == LedgerAccount::Provisioning)
            .unwrap();
        assert_eq!(provision.amount, Money::inr(dec!(100000)));
        let seized = ledger.entries.iter().find(|e| e.account == LedgerAccount::Recovery).unwrap();
        assert_eq!(seized.amount, Money::inr(dec!(50000)));

        assert_eq!(h.audited(AuditAction::LoanDefaulted).await, 1);
        assert_eq!(h.audited(AuditAction::EmiBounced).await, 3);
        assert!(h.engine.exposure().user_exposure(user).await.unwrap().is_zero());
    }

    #[tokio::test]
    async fn test_manual_default_without_collateral_posts_provision_only() {
        let (h, user) = scored_harness().await;
        let business = h.business(user, GST).await;
        let invoice = h.invoice(&business, "INV-1", dec!(100000)).await;
        let [unsecured, _] = h.offers(invoice.id, user).await;
        let loan = h.engine.loans().sanction(unsecured.id, user, None).await.unwrap();

        let defaulted = h.engine.repayments().trigger_default(loan.id, Some(user)).await.unwrap();
        assert_eq!(defaulted.status, LoanStatus::Default);

        let ledger = h.engine.loans().ledger(loan.id).await.unwrap();
        assert_eq!(ledger.count(LedgerAccount::Provisioning, EntryType::Debit), 1);
        assert_eq!(ledger.count(LedgerAccount::Recovery, EntryType::Credit), 0);

        let err = h.engine.repayments().trigger_default(loan.id, Some(user)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn test_payment_on_defaulted_loan_never_closes_it() {
        let (h, user) = scored_harness().await;
        let (loan, _) = secured_loan(&h, user).await;
        h.engine.repayments().trigger_default(loan.id, None).await.unwrap();

        for emi in h.engine.loans().emi_schedule(loan.id).await.unwrap() {
            h.engine.repayments().pay_emi(emi.id, Some(user)).await.unwrap();
        }
        assert_eq!(h.engine.loans().loan(loan.id).await.unwrap().status, LoanStatus::Default);
        assert_eq!(h.audited(AuditAction::LoanClosed).await, 0);
    }

    #[tokio::test]
    async fn test_recovery_lifecycle() {
        let (h, user) = scored_harness().await;
        let (loan, _) = secured_loan(&h, user).await;

        let err = h
            .engine
            .recovery()
            .initiate(loan.id, RecoveryActionType::LegalNotice, None, user)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        h.engine.repayments().trigger_default(loan.id, None).await.unwrap();
        let action = h
            .engine
            .recovery()
            .initiate(loan.id, RecoveryActionType::Settlement, Some("settlement call".into()), user)
            .await
            .unwrap();
        assert_eq!(action.status, RecoveryStatus::Initiated);

        let started = h.engine.recovery().mark_in_progress(action.id, user).await.unwrap();
        assert_eq!(started.status, RecoveryStatus::InProgress);

        let err = h
            .engine
            .recovery()
            .complete(action.id, Money::inr(dec!(0)), user)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let done = h
            .engine
            .recovery()
            .complete(action.id, Money::inr(dec!(30000)), user)
            .await
            .unwrap();
        assert_eq!(done.status, RecoveryStatus::Completed);
        assert_eq!(done.amount_recovered, Money::inr(dec!(30000)));

        let err = h
            .engine
            .recovery()
            .complete(action.id, Money::inr(dec!(30000)), user)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        // seizure credit plus the settlement credit
        let ledger = h.engine.loans().ledger(loan.id).await.unwrap();
        assert_eq!(ledger.count(LedgerAccount::Recovery, EntryType::Credit), 2);
        assert_eq!(h.engine.loans().loan(loan.id).await.unwrap().status, LoanStatus::Default);

        let listed = h.engine.recovery().list(Some(loan.id)).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(h.audited(AuditAction::RecoveryCompleted).await, 1);
    }

    #[tokio::test]
    async fn test_failed_recovery_keeps_reason() {
        let (h, user) = scored_harness().await;
        let (loan, _) = secured_loan(&h, user).await;
        h.engine.repayments().trigger_default(loan.id, None).await.unwrap();
        let action = h
            .engine
            .recovery()
            .initiate(loan.id, RecoveryActionType::LegalNotice, Some("notice sent".into()), user)
            .await
            .unwrap();

        let failed = h
            .engine
            .recovery()
            .fail(action.id, Some("borrower unreachable".into()), user)
            .await
            .unwrap();
        assert_eq!(failed.status, RecoveryStatus::Failed);
        assert_eq!(failed.notes.as_deref(), Some("notice sent\nborrower unreachable"));

        let err = h
            .engine
            .recovery()
            .complete(action.id, Money::inr(dec!(100)), user)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
