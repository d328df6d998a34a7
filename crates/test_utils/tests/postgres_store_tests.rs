//! Engine scenarios against a real PostgreSQL
//!
//! Run with `cargo test -p test_utils -- --ignored` on a host with Docker.

use chrono::Duration;
use rust_decimal_macros::dec;

use core_kernel::{
    AdapterHealth, AuditAction, AuditRecord, AuditSink, EntityType, HealthCheckable, ManualClock,
    Money, UserId,
};
use credit_engine::{ErrorKind, LendingStore};
use domain_credit::{InvoiceStatus, LoanType, MockCreditBureau, OfferStatus};
use domain_ledger::{EntryType, LedgerAccount};
use domain_lending::{EmiStatus, LoanStatus};
use test_utils::{
    assert_ledger_consistent, assert_schedule_well_formed, business, create_isolated_test_database,
    disbursed_loan, invoice, start, InvoiceBuilder,
};

async fn seed_business(
    store: &dyn LendingStore,
    user: UserId,
    gst: &str,
) -> domain_credit::BusinessProfile {
    let profile = business(user, gst);
    let mut uow = store.begin().await.unwrap();
    uow.insert_business(&profile).await.unwrap();
    uow.commit().await.unwrap();
    profile
}

async fn seed_invoice(store: &dyn LendingStore, invoice: &domain_credit::Invoice) {
    let mut uow = store.begin().await.unwrap();
    uow.insert_invoice(invoice).await.unwrap();
    uow.commit().await.unwrap();
}

mod schema {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_store_is_healthy_after_migrations() {
        let db = create_isolated_test_database().await.unwrap();
        let health = db.store().health_check().await;
        assert_eq!(health.status, AdapterHealth::Healthy);
        assert_eq!(db.count_rows("loans").await.unwrap(), 0);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_duplicate_gst_is_a_conflict() {
        let db = create_isolated_test_database().await.unwrap();
        let store = db.store();
        seed_business(&store, UserId::new_v7(), "27AAPFU0939F1ZV").await;

        let mut uow = store.begin().await.unwrap();
        let err = uow
            .insert_business(&business(UserId::new_v7(), "27AAPFU0939F1ZV"))
            .await
            .unwrap_err();
        assert!(matches!(err, core_kernel::PortError::Conflict { .. }));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_ledger_rejects_updates() {
        let db = create_isolated_test_database().await.unwrap();
        let store = db.store();
        let profile = seed_business(&store, UserId::new_v7(), "29ABCDE1234F1Z5").await;
        let fixture = disbursed_loan(profile.id, dec!(40000));
        fixture.persist(&store).await.unwrap();

        let journal =
            domain_ledger::LendingJournals::disbursement(fixture.loan.id, fixture.principal());
        let entries = journal.seal(start()).unwrap();
        let mut uow = store.begin().await.unwrap();
        uow.append_ledger(&entries).await.unwrap();
        uow.commit().await.unwrap();

        let result = sqlx::query("UPDATE ledger_entries SET amount = 1")
            .execute(db.pool())
            .await;
        assert!(result.is_err());
        assert_eq!(db.count_rows("ledger_entries").await.unwrap(), 2);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_audit_sink_is_idempotent_per_record() {
        let db = create_isolated_test_database().await.unwrap();
        let sink = db.audit_sink();
        let record = AuditRecord::new(
            None,
            AuditAction::OfferExpired,
            EntityType::Offer,
            uuid::Uuid::new_v4(),
            start(),
        );

        sink.record(std::slice::from_ref(&record)).await.unwrap();
        sink.record(std::slice::from_ref(&record)).await.unwrap();

        assert_eq!(db.count_rows("audit_logs").await.unwrap(), 1);
    }
}

mod lifecycle {
    use super::*;

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_invoice_to_closed_loan() {
        let db = create_isolated_test_database().await.unwrap();
        let bureau = MockCreditBureau::new();
        let clock = ManualClock::new(start());
        let pg = db.engine(&bureau, &clock).unwrap();
        let store = db.store();

        let user = UserId::new_v7();
        let profile = seed_business(&store, user, "27AAPFU0939F1ZV").await;
        bureau.set_score("27AAPFU0939F1ZV", dec!(820)).await;
        bureau.set_returns("27AAPFU0939F1ZV", 12, 12).await;
        let inv = invoice(profile.id, "INV-1", dec!(200000));
        seed_invoice(&store, &inv).await;

        let [unsecured, secured] = pg.engine.offers().generate_offers(inv.id, user).await.unwrap();
        assert_eq!(unsecured.loan_type, LoanType::Unsecured);
        assert_eq!(secured.loan_type, LoanType::Secured);

        let loan = pg.engine.loans().sanction(unsecured.id, user, None).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Active);
        assert_eq!(
            pg.engine.offers().offer(secured.id).await.unwrap().status,
            OfferStatus::Expired
        );

        let schedule = pg.engine.loans().emi_schedule(loan.id).await.unwrap();
        assert_schedule_well_formed(&schedule);

        for emi in schedule.iter().rev() {
            clock.advance(Duration::days(1));
            pg.engine.repayments().pay_emi(emi.id, Some(user)).await.unwrap();
        }

        let closed = pg.engine.loans().loan(loan.id).await.unwrap();
        assert_eq!(closed.status, LoanStatus::Closed);
        assert_eq!(store.invoice(inv.id).await.unwrap().unwrap().status, InvoiceStatus::Repaid);

        let ledger = pg.engine.loans().ledger(loan.id).await.unwrap();
        assert_ledger_consistent(&ledger);
        assert_eq!(
            ledger.count(LedgerAccount::Borrower, EntryType::Debit),
            schedule.len()
        );
        assert_eq!(pg.audit.with_action(AuditAction::LoanClosed).await.len(), 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_sibling_sanctions_race_to_one_loan() {
        let db = create_isolated_test_database().await.unwrap();
        let bureau = MockCreditBureau::new();
        let clock = ManualClock::new(start());
        let pg = db.engine(&bureau, &clock).unwrap();
        let store = db.store();

        let user = UserId::new_v7();
        let profile = seed_business(&store, user, "27AAPFU0939F1ZV").await;
        let inv = InvoiceBuilder::new(profile.id).amount(dec!(150000)).build();
        seed_invoice(&store, &inv).await;
        let [unsecured, secured] = pg.engine.offers().generate_offers(inv.id, user).await.unwrap();

        let loans = pg.engine.loans();
        let collateral =
            domain_lending::CollateralInput::new("Warehouse stock", Money::inr(dec!(90000)));
        let (a, b) = tokio::join!(
            loans.sanction(unsecured.id, user, None),
            loans.sanction(secured.id, user, Some(collateral)),
        );

        let outcomes = [a, b];
        assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
        let err = outcomes.into_iter().find_map(Result::err).unwrap();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        assert_eq!(db.count_rows("loans").await.unwrap(), 1);
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_repeated_bounces_default_once_and_post_one_provision() {
        let db = create_isolated_test_database().await.unwrap();
        let bureau = MockCreditBureau::new();
        let clock = ManualClock::new(start());
        let pg = db.engine(&bureau, &clock).unwrap();
        let store = db.store();

        let profile = seed_business(&store, UserId::new_v7(), "27AAPFU0939F1ZV").await;
        let fixture = disbursed_loan(profile.id, dec!(100000));
        fixture.persist(&store).await.unwrap();

        let first = &fixture.emis[0];
        for _ in 0..3 {
            pg.engine.repayments().bounce_emi(first.id, None).await.unwrap();
        }

        let loan = pg.engine.loans().loan(fixture.loan.id).await.unwrap();
        assert_eq!(loan.status, LoanStatus::Default);
        let emi = store.emi(first.id).await.unwrap().unwrap();
        assert_eq!(emi.status, EmiStatus::Bounced);
        assert_eq!(emi.retry_count, 3);

        let ledger = pg.engine.loans().ledger(loan.id).await.unwrap();
        assert_eq!(ledger.count(LedgerAccount::Provisioning, EntryType::Debit), 1);
        assert_eq!(pg.engine.exposure().portfolio_exposure().await.unwrap(), Money::inr(dec!(0)));
    }

    #[tokio::test]
    #[ignore = "requires Docker"]
    async fn test_book_read_models_aggregate_in_sql() {
        let db = create_isolated_test_database().await.unwrap();
        let bureau = MockCreditBureau::new();
        let clock = ManualClock::new(start());
        let pg = db.engine(&bureau, &clock).unwrap();
        let store = db.store();

        let owner = UserId::new_v7();
        let shop = seed_business(&store, owner, "27AAPFU0939F1ZV").await;
        let branch = seed_business(&store, owner, "29AAACR5055K1Z5").await;
        let inv = invoice(shop.id, "INV-1", dec!(100000));
        seed_invoice(&store, &inv).await;
        let [unsecured, _] = pg.engine.offers().generate_offers(inv.id, owner).await.unwrap();
        pg.engine.loans().sanction(unsecured.id, owner, None).await.unwrap();
        disbursed_loan(branch.id, dec!(40000)).persist(&store).await.unwrap();

        let exposures = pg.engine.portfolio().borrower_exposures().await.unwrap();
        assert_eq!(exposures.len(), 1);
        assert_eq!(exposures[0].user_id, owner);
        assert_eq!(exposures[0].exposure, Money::inr(dec!(140000)));
        assert_eq!(exposures[0].open_loans, 2);

        let book = pg.engine.portfolio().ledger_summary().await.unwrap();
        assert!(book.is_balanced());
        let capital = book.balance(LedgerAccount::BankCapital).unwrap();
        assert_eq!(capital.debits, Money::inr(dec!(100000)));
        let borrower = book.balance(LedgerAccount::Borrower).unwrap();
        assert_eq!(borrower.credits, Money::inr(dec!(100000)));
    }
}
