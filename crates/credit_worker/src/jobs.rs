//! The lifecycle sweeps the worker runs
//!
//! Every task calls exactly one engine operation; the engine logs its own
//! sweep report.

use std::time::Duration;

use credit_engine::CreditEngine;

use crate::config::ScheduleConfig;
use crate::scheduler::{Schedule, ScheduledTask};

pub const OFFER_EXPIRY: &str = "offer_expiry";
pub const EMI_REMINDERS: &str = "emi_reminders";
pub const NPA_CLASSIFICATION: &str = "npa_classification";
pub const SCORE_RECALCULATION: &str = "score_recalculation";

pub fn lifecycle_tasks(engine: &CreditEngine, schedule: &ScheduleConfig) -> Vec<ScheduledTask> {
    let expiry = engine.clone();
    let reminders = engine.clone();
    let npa = engine.clone();
    let scores = engine.clone();

    vec![
        ScheduledTask::new(
            OFFER_EXPIRY,
            Schedule::Every(Duration::from_secs(schedule.offer_expiry_interval_secs)),
            move || {
                let engine = expiry.clone();
                async move { engine.offers().expire_stale_offers().await.map(drop) }
            },
        ),
        ScheduledTask::new(EMI_REMINDERS, Schedule::Daily(schedule.emi_reminder_at), move || {
            let engine = reminders.clone();
            async move { engine.repayments().upcoming_emi_reminders().await.map(drop) }
        }),
        ScheduledTask::new(
            NPA_CLASSIFICATION,
            Schedule::Daily(schedule.npa_classification_at),
            move || {
                let engine = npa.clone();
                async move { engine.repayments().classify_overdue_emis().await.map(drop) }
            },
        ),
        ScheduledTask::new(
            SCORE_RECALCULATION,
            Schedule::Weekly(schedule.score_recalculation_day, schedule.score_recalculation_at),
            move || {
                let engine = scores.clone();
                async move { engine.scoring().recalculate_all().await.map(drop) }
            },
        ),
    ]
}
