//! Per-tenant quota ledger with calendar-aligned resets.
//!
//! Usage is recorded additively between resets; at a period boundary the
//! bucket rolls atomically on the next touch (`check` or `record`). A
//! `quota_limit` of zero means unlimited.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Timelike, Utc};
use parking_lot::Mutex;

/// Reset cadence for quota buckets. Calendar periods align to their UTC
/// boundaries; weeks start on Monday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaPeriod {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    /// No automatic rollover.
    Never,
}

impl QuotaPeriod {
    /// Parses the configuration spelling of a period.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "hourly" => Some(Self::Hourly),
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            "never" => Some(Self::Never),
            _ => None,
        }
    }

    /// The end of the period containing `now`, or `None` for [`Self::Never`].
    pub fn boundary_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let date = now.date_naive();
        let naive = match self {
            Self::Hourly => date
                .and_hms_opt(now.hour(), 0, 0)
                .map(|t| t + chrono::Duration::hours(1)),
            Self::Daily => date
                .checked_add_days(Days::new(1))
                .and_then(|d| d.and_hms_opt(0, 0, 0)),
            Self::Weekly => {
                let monday =
                    date.checked_sub_days(Days::new(now.weekday().num_days_from_monday().into()));
                monday
                    .and_then(|d| d.checked_add_days(Days::new(7)))
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            }
            Self::Monthly => {
                let (year, month) = (date.year(), date.month());
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1)
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1)
                };
                next.and_then(|d| d.and_hms_opt(0, 0, 0))
            }
            Self::Never => None,
        };
        naive.map(|t| Utc.from_utc_datetime(&t))
    }
}

/// Ledger configuration.
#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub enabled: bool,
    /// Limit assigned to tenants on first use; 0 means unlimited.
    pub default_quota: u64,
    pub period: QuotaPeriod,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_quota: 0,
            period: QuotaPeriod::Monthly,
        }
    }
}

/// One tenant's usage record.
#[derive(Debug, Clone)]
pub struct TenantUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub quota_limit: u64,
    pub reset_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl TenantUsage {
    fn fresh(limit: u64, period: QuotaPeriod, now: DateTime<Utc>) -> Self {
        Self {
            input_tokens: 0,
            output_tokens: 0,
            total_tokens: 0,
            quota_limit: limit,
            reset_at: period.boundary_after(now),
            last_updated: now,
        }
    }

    fn roll_if_due(&mut self, period: QuotaPeriod, now: DateTime<Utc>) {
        let Some(reset_at) = self.reset_at else {
            return;
        };
        if now >= reset_at {
            self.input_tokens = 0;
            self.output_tokens = 0;
            self.total_tokens = 0;
            self.reset_at = period.boundary_after(now);
        }
    }
}

/// Thread-safe cumulative token ledger.
#[derive(Debug)]
pub struct QuotaLedger {
    config: QuotaConfig,
    tenants: Mutex<HashMap<String, TenantUsage>>,
}

impl QuotaLedger {
    /// Creates a ledger.
    pub fn new(config: QuotaConfig) -> Self {
        Self {
            config,
            tenants: Mutex::new(HashMap::new()),
        }
    }

    /// A ledger that always permits and never records.
    pub fn disabled() -> Self {
        Self::new(QuotaConfig {
            enabled: false,
            ..QuotaConfig::default()
        })
    }

    /// Adds usage for `tenant`, creating the record on first use and
    /// rolling the bucket first when the period boundary has passed.
    pub fn record(&self, tenant: &str, input: u64, output: u64, total: u64) {
        self.record_at(tenant, input, output, total, Utc::now());
    }

    /// Whether `tenant` is under its limit (rolls the bucket when due).
    pub fn check(&self, tenant: &str) -> bool {
        self.check_at(tenant, Utc::now())
    }

    /// A snapshot of the tenant's record with any due roll applied.
    pub fn get_usage(&self, tenant: &str) -> Option<TenantUsage> {
        if !self.config.enabled {
            return None;
        }
        let now = Utc::now();
        let mut tenants = self.tenants.lock();
        let usage = tenants.get_mut(tenant)?;
        usage.roll_if_due(self.config.period, now);
        Some(usage.clone())
    }

    /// Overrides the limit for one tenant (0 = unlimited).
    pub fn set_limit(&self, tenant: &str, limit: u64) {
        if !self.config.enabled {
            return;
        }
        let now = Utc::now();
        let mut tenants = self.tenants.lock();
        tenants
            .entry(tenant.to_string())
            .or_insert_with(|| TenantUsage::fresh(self.config.default_quota, self.config.period, now))
            .quota_limit = limit;
    }

    fn record_at(&self, tenant: &str, input: u64, output: u64, total: u64, now: DateTime<Utc>) {
        if !self.config.enabled {
            return;
        }
        let mut tenants = self.tenants.lock();
        let usage = tenants
            .entry(tenant.to_string())
            .or_insert_with(|| TenantUsage::fresh(self.config.default_quota, self.config.period, now));
        usage.roll_if_due(self.config.period, now);
        usage.input_tokens += input;
        usage.output_tokens += output;
        usage.total_tokens += total;
        usage.last_updated = now;
    }

    fn check_at(&self, tenant: &str, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return true;
        }
        let mut tenants = self.tenants.lock();
        let Some(usage) = tenants.get_mut(tenant) else {
            return true;
        };
        usage.roll_if_due(self.config.period, now);
        usage.quota_limit == 0 || usage.total_tokens < usage.quota_limit
    }
}
