use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;

use crate::date_util::{end_of_day, last_day_of_month, month_start, months_back, start_of_day};

static RE_DAYS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,3})$").unwrap());
static RE_MONTHS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,2})m$").unwrap());

/// Fallback span when a period token is unrecognized.
const DEFAULT_MONTHS: u32 = 6;

/// A dashboard time period, parsed from a selector token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Period {
    Today,
    Yesterday,
    /// Trailing N days ("7", "14", "30").
    Days(u32),
    CurrentMonth,
    LastMonth,
    /// Trailing N calendar months ("3m", "6m", "12m", "24m").
    Months(u32),
}

/// How a resolved window should be bucketed for charts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodShape {
    Daily,
    Monthly,
}

/// A concrete time window resolved from a [`Period`] at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PeriodWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub shape: PeriodShape,
}

impl PeriodWindow {
    /// Window membership. Both endpoints are inclusive.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// One chart bucket inside a resolved window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodBucket {
    pub label: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    /// Parse a period selector token.
    ///
    /// Supported tokens:
    /// - `today`, `yesterday`
    /// - `7`, `14`, `30` — trailing day counts (any 1–3 digit count)
    /// - `current_month`, `last_month`
    /// - `3m`, `6m`, `12m`, `24m` — trailing month spans (any `Nm`)
    ///
    /// Unrecognized tokens fall back to the six-month span. Selector values
    /// come straight from the UI and a stale or misspelled token must never
    /// take the dashboard down.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        match s {
            "today" => return Period::Today,
            "yesterday" => return Period::Yesterday,
            "current_month" => return Period::CurrentMonth,
            "last_month" => return Period::LastMonth,
            _ => {}
        }

        if let Some(caps) = RE_DAYS.captures(s) {
            if let Ok(n) = caps[1].parse::<u32>() {
                if n > 0 {
                    return Period::Days(n);
                }
            }
        }

        if let Some(caps) = RE_MONTHS.captures(s) {
            if let Ok(n) = caps[1].parse::<u32>() {
                if n > 0 {
                    return Period::Months(n);
                }
            }
        }

        log::debug!("unrecognized period token '{s}', using {DEFAULT_MONTHS}m");
        Period::Months(DEFAULT_MONTHS)
    }

    /// Convert to a canonical key string for display and caching.
    pub fn to_key(&self) -> String {
        match self {
            Period::Today => "today".to_string(),
            Period::Yesterday => "yesterday".to_string(),
            Period::Days(n) => format!("{n}"),
            Period::CurrentMonth => "current_month".to_string(),
            Period::LastMonth => "last_month".to_string(),
            Period::Months(n) => format!("{n}m"),
        }
    }

    /// Resolve to a concrete window relative to `now`. Deterministic: the
    /// caller supplies the clock.
    pub fn resolve(&self, now: DateTime<Utc>) -> PeriodWindow {
        let today = now.date_naive();
        match self {
            Period::Today => PeriodWindow {
                start: start_of_day(today),
                end: now,
                shape: PeriodShape::Daily,
            },
            Period::Yesterday => {
                let d = today - Duration::days(1);
                PeriodWindow {
                    start: start_of_day(d),
                    end: end_of_day(d),
                    shape: PeriodShape::Daily,
                }
            }
            Period::Days(n) => PeriodWindow {
                start: now - Duration::days(*n as i64),
                end: now,
                shape: PeriodShape::Daily,
            },
            Period::CurrentMonth => PeriodWindow {
                start: start_of_day(month_start(today)),
                end: now,
                shape: PeriodShape::Daily,
            },
            Period::LastMonth => {
                let first = months_back(today, 1);
                PeriodWindow {
                    start: start_of_day(first),
                    end: end_of_day(last_day_of_month(first.year(), first.month())),
                    shape: PeriodShape::Daily,
                }
            }
            Period::Months(n) => PeriodWindow {
                start: start_of_day(months_back(today, *n)),
                end: now,
                shape: PeriodShape::Monthly,
            },
        }
    }

    /// Chart buckets for the window, oldest first. Daily windows cap at 30
    /// buckets; month spans get one bucket per month.
    pub fn buckets(&self, now: DateTime<Utc>) -> Vec<PeriodBucket> {
        let today = now.date_naive();
        match self {
            Period::Today => vec![day_bucket(today)],
            Period::Yesterday => vec![day_bucket(today - Duration::days(1))],
            Period::Days(n) => {
                let count = (*n + 1).min(30);
                day_buckets_ending(today, count)
            }
            Period::CurrentMonth => {
                let count = today.day();
                day_buckets_ending(today, count)
            }
            Period::LastMonth => {
                let first = months_back(today, 1);
                let last = last_day_of_month(first.year(), first.month());
                day_buckets_ending(last, last.day())
            }
            Period::Months(n) => {
                let first = months_back(today, *n);
                (0..*n)
                    .map(|i| {
                        let m = first
                            .checked_add_months(chrono::Months::new(i))
                            .unwrap_or(first);
                        PeriodBucket {
                            label: m.format("%b %Y").to_string(),
                            start: start_of_day(m),
                            end: end_of_day(last_day_of_month(m.year(), m.month())),
                        }
                    })
                    .collect()
            }
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_key())
    }
}

fn day_bucket(d: NaiveDate) -> PeriodBucket {
    PeriodBucket {
        label: d.format("%d %b").to_string(),
        start: start_of_day(d),
        end: end_of_day(d),
    }
}

/// `count` consecutive day buckets ending on `last`, oldest first.
fn day_buckets_ending(last: NaiveDate, count: u32) -> Vec<PeriodBucket> {
    (0..count)
        .rev()
        .map(|back| day_bucket(last - Duration::days(back as i64)))
        .collect()
}
