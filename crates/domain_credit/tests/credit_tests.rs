//! Credit domain tests: invoice lifecycle, scoring, decisions and offers

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use core_kernel::{BusinessId, Currency, Money, UserId};
use domain_credit::{
    decide, BusinessProfile, CapKind, CreditDecision, CreditError, CreditScore, ExposureCaps,
    ExposureSnapshot, ExternalScoreSource, GstReturnsSummary, Invoice, InvoiceStatus, LoanType,
    Offer, OfferPricing, OfferStatus, RiskGrade, ScoringConfig, ScoringSignals,
};

fn now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 30, 0).unwrap()
}

fn inr(v: Decimal) -> Money {
    Money::inr(v)
}

fn invoice(amount: Decimal) -> Invoice {
    let due = now() + Duration::days(60);
    Invoice::new(BusinessId::new_v7(), "INV-2026-0042", inr(amount), due, 0, now()).unwrap()
}

// ============================================================================
// Invoice lifecycle
// ============================================================================

mod invoice_tests {
    use super::*;

    #[test]
    fn test_happy_path_through_financing() {
        let mut inv = invoice(dec!(250000));
        assert!(inv.is_financeable());

        inv.transition_to(InvoiceStatus::OfferGenerated, now()).unwrap();
        assert!(!inv.is_financeable());
        inv.transition_to(InvoiceStatus::Financed, now()).unwrap();
        inv.transition_to(InvoiceStatus::Repaid, now()).unwrap();
        assert!(inv.status.is_terminal());
    }

    #[test]
    fn test_expired_offers_release_invoice() {
        let mut inv = invoice(dec!(250000));
        inv.transition_to(InvoiceStatus::OfferGenerated, now()).unwrap();
        inv.transition_to(InvoiceStatus::Unpaid, now()).unwrap();
        assert!(inv.is_financeable());
    }

    #[test]
    fn test_cannot_skip_offer_stage() {
        let mut inv = invoice(dec!(250000));
        let err = inv.transition_to(InvoiceStatus::Financed, now()).unwrap_err();
        assert_eq!(
            err,
            CreditError::InvalidInvoiceTransition {
                from: InvoiceStatus::Unpaid,
                to: InvoiceStatus::Financed,
            }
        );
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let result = Invoice::new(BusinessId::new_v7(), "INV-0", inr(dec!(0)), now(), 0, now());
        assert!(matches!(result, Err(CreditError::Validation(_))));
    }

    #[test]
    fn test_provider_refresh_only_touches_unpaid() {
        let mut inv = invoice(dec!(100000));
        assert!(inv.refresh_from_provider(inr(dec!(120000)), inv.due_date, 3, now()));
        assert_eq!(inv.amount, inr(dec!(120000)));
        assert_eq!(inv.delay_days, 3);

        inv.transition_to(InvoiceStatus::OfferGenerated, now()).unwrap();
        assert!(!inv.refresh_from_provider(inr(dec!(1)), inv.due_date, 0, now()));
        assert_eq!(inv.amount, inr(dec!(120000)));
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(InvoiceStatus::OfferGenerated.as_str(), "OFFER_GENERATED");
        assert_eq!(InvoiceStatus::parse("DEFAULTED").unwrap(), InvoiceStatus::Defaulted);
        assert!(InvoiceStatus::parse("LOST").is_err());
    }
}

// ============================================================================
// Scoring to decision
// ============================================================================

mod decision_flow_tests {
    use super::*;

    fn strong_signals() -> ScoringSignals {
        ScoringSignals {
            gst_returns: GstReturnsSummary { filed: 12, total: 12 },
            invoice_count: 15,
            average_delay_days: dec!(2),
            repaid_invoice_count: 3,
        }
    }

    #[test]
    fn test_strong_business_is_approved() {
        let business = BusinessProfile::new(UserId::new_v7(), "29ABCDE1234F1Z5", now());
        let config = ScoringConfig::default();
        let (score, source) =
            CreditScore::compute(business.id, Some(dec!(780)), &strong_signals(), &config, now());

        assert_eq!(source, ExternalScoreSource::Provider);
        // internal = 200 + 100 - 4 + 150 = 446, final = 468 + 178.4
        assert_eq!(score.internal_score, dec!(446));
        assert_eq!(score.final_score, dec!(646.4));
        assert_eq!(score.risk_grade, RiskGrade::B);

        let outcome = decide(
            score.risk_grade,
            inr(dec!(500000)),
            &ExposureSnapshot::empty(Currency::INR),
            &ExposureCaps::default(),
        )
        .unwrap();
        assert_eq!(outcome.decision, CreditDecision::ConditionalApproval);
        assert!(outcome.breach.is_none());
    }

    #[test]
    fn test_provider_outage_uses_fallback() {
        let (score, source) = CreditScore::compute(
            BusinessId::new_v7(),
            None,
            &ScoringSignals::default(),
            &ScoringConfig::default(),
            now(),
        );
        assert_eq!(source, ExternalScoreSource::Fallback);
        assert_eq!(score.external_score, dec!(600));
        assert_eq!(score.final_score, dec!(360));
        assert_eq!(score.risk_grade, RiskGrade::C);
    }

    #[test]
    fn test_per_user_cap_breach_is_reported() {
        let exposure = ExposureSnapshot {
            user: inr(dec!(9900000)),
            gst: inr(dec!(9900000)),
            portfolio: inr(dec!(9900000)),
        };
        let caps = ExposureCaps::default();
        let outcome = decide(RiskGrade::A, inr(dec!(200000)), &exposure, &caps).unwrap();

        assert!(outcome.is_rejected());
        let breach = outcome.breach.unwrap();
        assert_eq!(breach.cap, CapKind::PerUser);
        assert!(breach.to_string().starts_with("PER_USER exposure cap exceeded."));
    }

    #[test]
    fn test_exact_cap_is_allowed() {
        let exposure = ExposureSnapshot {
            user: inr(dec!(9800000)),
            gst: inr(dec!(9800000)),
            portfolio: inr(dec!(9800000)),
        };
        let caps = ExposureCaps::default();
        let outcome = decide(RiskGrade::A, inr(dec!(200000)), &exposure, &caps).unwrap();
        assert_eq!(outcome.decision, CreditDecision::Approved);
    }

    #[test]
    fn test_currency_mismatch_is_an_error() {
        let result = decide(
            RiskGrade::A,
            Money::new(dec!(100), Currency::USD),
            &ExposureSnapshot::empty(Currency::INR),
            &ExposureCaps::default(),
        );
        assert!(result.is_err());
    }
}

// ============================================================================
// Offers
// ============================================================================

mod offer_tests {
    use super::*;

    #[test]
    fn test_pair_for_invoice() {
        let inv = invoice(dec!(300000));
        let [unsecured, secured] =
            Offer::generate_pair(inv.id, RiskGrade::C, &OfferPricing::default(), now());

        assert_eq!(unsecured.loan_type, LoanType::Unsecured);
        assert_eq!(unsecured.interest_rate.as_percentage(), dec!(20));
        assert_eq!(unsecured.tenure_months, 8);
        assert_eq!(secured.loan_type, LoanType::Secured);
        assert_eq!(secured.interest_rate.as_percentage(), dec!(16));
        assert_eq!(secured.tenure_months, 4);
        assert_eq!(secured.expires_at, now() + Duration::hours(24));
        assert_eq!(unsecured.principal_for(&inv.amount), inr(dec!(300000)));
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let [offer, _] = Offer::generate_pair(
            invoice(dec!(1000)).id,
            RiskGrade::A,
            &OfferPricing::default(),
            now(),
        );
        assert!(!offer.is_expired(offer.expires_at - Duration::seconds(1)));
        assert!(offer.is_expired(offer.expires_at));
    }

    #[test]
    fn test_accepted_offer_cannot_expire() {
        let [mut offer, _] = Offer::generate_pair(
            invoice(dec!(1000)).id,
            RiskGrade::A,
            &OfferPricing::default(),
            now(),
        );
        offer.transition_to(OfferStatus::Accepted).unwrap();
        assert!(offer.transition_to(OfferStatus::Expired).is_err());
    }
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_final_score_stays_in_range(
        external in 0u32..=1000,
        filed in 0u32..24,
        total in 0u32..24,
        invoices in 0u32..200,
        delay in 0u32..400,
        repaid in 0u32..30,
    ) {
        let signals = ScoringSignals {
            gst_returns: GstReturnsSummary { filed, total },
            invoice_count: invoices,
            average_delay_days: Decimal::from(delay),
            repaid_invoice_count: repaid,
        };
        let (score, _) = CreditScore::compute(
            BusinessId::new_v7(),
            Some(Decimal::from(external)),
            &signals,
            &ScoringConfig::default(),
            now(),
        );
        prop_assert!(score.internal_score >= Decimal::ZERO && score.internal_score <= dec!(800));
        prop_assert!(score.final_score >= Decimal::ZERO && score.final_score <= dec!(920));
    }

    #[test]
    fn prop_approval_never_breaches_caps(
        current in 0u64..30000000,
        requested in 1u64..5000000,
    ) {
        let exposure = ExposureSnapshot {
            user: inr(Decimal::from(current)),
            gst: inr(Decimal::from(current)),
            portfolio: inr(Decimal::from(current)),
        };
        let caps = ExposureCaps::default();
        let requested_amount = inr(Decimal::from(requested));
        let outcome = decide(RiskGrade::A, requested_amount, &exposure, &caps).unwrap();

        let would_be = Decimal::from(current + requested);
        if outcome.is_rejected() {
            prop_assert!(would_be > caps.per_user.amount());
        } else {
            prop_assert!(would_be <= caps.per_user.amount());
        }
    }
}
