use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::config::DEFAULT_LOOKBACK_DAYS;
use crate::date_util::{day_range, lookback_since, DayRange};
use crate::error::Result;
use crate::metrics::MemberMetrics;
use crate::model::Issue;

/// Parameters for one dashboard load.
#[derive(Debug, Clone)]
pub struct DashboardRequest {
    pub team_id: String,
    pub date: NaiveDate,
    /// How far back before `date` to look for comment threads.
    pub lookback_days: u32,
}

impl DashboardRequest {
    pub fn new(team_id: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            team_id: team_id.into(),
            date,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn range(&self) -> DayRange {
        day_range(self.date)
    }

    pub fn comments_since(&self) -> Result<DateTime<Utc>> {
        lookback_since(self.date, self.lookback_days)
    }
}

/// Ranked per-member metrics for one team and day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub team_id: String,
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    pub members: Vec<MemberMetrics>,
}

/// Team-wide counts shown above the member list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardTotals {
    pub members: usize,
    pub active_members: usize,
    pub issues_touched: usize,
    pub issues_created: usize,
    pub issues_completed: usize,
    pub unresponsive_mentions: usize,
}

impl Dashboard {
    /// Distinct issue counts across all members. A member is active when
    /// they interacted with at least one issue; unanswered mentions alone
    /// do not count.
    pub fn totals(&self) -> DashboardTotals {
        let distinct = |pick: fn(&MemberMetrics) -> &[Issue]| {
            self.members
                .iter()
                .flat_map(|m| pick(m).iter().map(|i| i.id.as_str()))
                .collect::<HashSet<_>>()
                .len()
        };
        DashboardTotals {
            members: self.members.len(),
            active_members: self
                .members
                .iter()
                .filter(|m| !m.interacted.is_empty())
                .count(),
            issues_touched: distinct(|m| &m.interacted),
            issues_created: distinct(|m| &m.created),
            issues_completed: distinct(|m| &m.completed),
            unresponsive_mentions: self
                .members
                .iter()
                .map(|m| m.unresponsive_mentions.len())
                .sum(),
        }
    }
}
