//! Account records and quota period arithmetic.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::tier::TierPolicy;

/// Stable account identifier assigned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// An account that issues upload links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub email: String,
    pub tier: String,
    /// Links issued since the last period reset.
    pub issued_this_period: u32,
    /// Instant at which `issued_this_period` next returns to 0.
    pub period_reset_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Fresh account with an empty counter and a boundary at the start of
    /// next month.
    pub fn new(
        account_id: AccountId,
        email: impl Into<String>,
        tier: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            account_id,
            email: email.into(),
            tier: tier.into(),
            issued_this_period: 0,
            period_reset_at: next_period_boundary(now),
            created_at: now,
        }
    }

    /// Reset the counter if `now` has reached the boundary.
    ///
    /// The new boundary is the first instant of the month after `now`, so
    /// missed periods are skipped rather than banked. Returns true if a reset
    /// happened.
    pub fn roll_period(&mut self, now: DateTime<Utc>) -> bool {
        if now < self.period_reset_at {
            return false;
        }
        self.issued_this_period = 0;
        self.period_reset_at = next_period_boundary(now);
        true
    }

    pub fn limit(&self, policy: &TierPolicy) -> u32 {
        policy.limit(&self.tier)
    }

    pub fn remaining(&self, policy: &TierPolicy) -> u32 {
        self.limit(policy).saturating_sub(self.issued_this_period)
    }
}

/// First instant (UTC) of the calendar month following `now`.
pub fn next_period_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_next_period_boundary_mid_month() {
        assert_eq!(next_period_boundary(at(2024, 3, 15, 12)), at(2024, 4, 1, 0));
    }

    #[test]
    fn test_next_period_boundary_december_wraps_year() {
        assert_eq!(next_period_boundary(at(2024, 12, 31, 23)), at(2025, 1, 1, 0));
    }

    #[test]
    fn test_next_period_boundary_exactly_on_boundary() {
        // Standing on the first instant of a month moves to the next month.
        assert_eq!(next_period_boundary(at(2024, 4, 1, 0)), at(2024, 5, 1, 0));
    }

    #[test]
    fn test_new_account_boundary() {
        let account = Account::new("u1".into(), "u1@example.com", "free", at(2024, 2, 10, 8));
        assert_eq!(account.issued_this_period, 0);
        assert_eq!(account.period_reset_at, at(2024, 3, 1, 0));
    }

    #[test]
    fn test_roll_period_before_boundary_is_noop() {
        let mut account = Account::new("u1".into(), "e", "free", at(2024, 2, 10, 8));
        account.issued_this_period = 4;
        assert!(!account.roll_period(at(2024, 2, 29, 23)));
        assert_eq!(account.issued_this_period, 4);
        assert_eq!(account.period_reset_at, at(2024, 3, 1, 0));
    }

    #[test]
    fn test_roll_period_skips_missed_months() {
        let mut account = Account::new("u1".into(), "e", "free", at(2024, 1, 10, 8));
        account.issued_this_period = 10;

        // Dormant from February through mid-May.
        assert!(account.roll_period(at(2024, 5, 20, 9)));
        assert_eq!(account.issued_this_period, 0);
        assert_eq!(account.period_reset_at, at(2024, 6, 1, 0));
    }

    #[test]
    fn test_remaining_saturates() {
        let policy = TierPolicy::default();
        let mut account = Account::new("u1".into(), "e", "free", at(2024, 1, 1, 0));
        account.issued_this_period = 12;
        assert_eq!(account.remaining(&policy), 0);

        account.tier = "premium".to_string();
        assert_eq!(account.remaining(&policy), 8);
    }
}
