//! Monthly quota accounting

use super::types::Plan;
use chrono::{DateTime, Datelike, TimeZone, Utc};
use typed_rpc::{RichValue, RpcError, RpcResult};

/// Usage of a user in the current billing month.
#[derive(Debug, Clone, PartialEq)]
pub struct Usage {
    pub categories_used: usize,
    pub categories_limit: usize,
    pub events_used: u64,
    pub events_limit: u64,
    pub reset_date: DateTime<Utc>,
}

impl Usage {
    pub fn new(plan: Plan, categories_used: usize, events_used: u64, reset_date: DateTime<Utc>) -> Self {
        Self {
            categories_used,
            categories_limit: plan.category_limit(),
            events_used,
            events_limit: plan.monthly_event_limit(),
            reset_date,
        }
    }
}

impl From<&Usage> for RichValue {
    fn from(usage: &Usage) -> Self {
        RichValue::object([
            ("categoriesUsed", RichValue::from(usage.categories_used)),
            ("categoriesLimit", RichValue::from(usage.categories_limit)),
            ("eventsUsed", RichValue::from(usage.events_used)),
            ("eventsLimit", RichValue::from(usage.events_limit)),
            ("resetDate", RichValue::from(usage.reset_date)),
        ])
    }
}

/// Midnight UTC on the first day of the month containing `now`.
pub fn start_of_month(now: DateTime<Utc>) -> RpcResult<DateTime<Utc>> {
    first_day(now.year(), now.month())
}

/// Midnight UTC on the first day of the month after `now`.
pub fn first_of_next_month(now: DateTime<Utc>) -> RpcResult<DateTime<Utc>> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    first_day(year, month)
}

fn first_day(year: i32, month: u32) -> RpcResult<DateTime<Utc>> {
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .ok_or_else(|| RpcError::internal(format!("No first day for {}-{:02}", year, month)))
}
