use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate};
use serde_json::Value;

use crate::error::Error;
use crate::report::ReportRow;

/// Label that blank or absent partner names collapse to.
pub const UNKNOWN_PARTNER: &str = "(unknown)";

/// Inclusive range of calendar days covered by a report query.
///
/// Always ends the day before the run date; same-day rows are considered
/// incomplete and are filtered out of both tables regardless of what the
/// report API returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Builds a window of `days` calendar days ending on `today - 1`.
    pub fn ending_yesterday(days: u32, today: NaiveDate) -> Result<Self, Error> {
        if days == 0 {
            return Err(Error::EmptyWindow);
        }
        let end = today - Duration::days(1);
        let start = end - Duration::days(i64::from(days) - 1);
        Ok(DateWindow { start, end })
    }

    /// Renders the window as the API's `date_period` value, e.g.
    /// `2024-03-01:2024-03-07`.
    pub fn date_period(&self) -> String {
        format!("{}:{}", self.start, self.end)
    }
}

/// Global metrics for one finalized calendar day.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyMetrics {
    pub installs: u64,
    pub cost: f64,
    pub ecpi_all: f64,
}

/// Per-day global metrics, keyed and iterated in chronological order.
#[derive(Debug, Default)]
pub struct DailyTable {
    by_day: BTreeMap<NaiveDate, DailyMetrics>,
}

impl DailyTable {
    pub fn days(&self) -> impl Iterator<Item = &NaiveDate> {
        self.by_day.keys()
    }

    pub fn get(&self, day: NaiveDate) -> Option<&DailyMetrics> {
        self.by_day.get(&day)
    }

    pub fn installs_on(&self, day: NaiveDate) -> u64 {
        self.by_day.get(&day).map_or(0, |m| m.installs)
    }

    pub fn cost_on(&self, day: NaiveDate) -> f64 {
        self.by_day.get(&day).map_or(0.0, |m| m.cost)
    }

    pub fn ecpi_on(&self, day: NaiveDate) -> f64 {
        self.by_day.get(&day).map_or(0.0, |m| m.ecpi_all)
    }

    pub fn is_empty(&self) -> bool {
        self.by_day.is_empty()
    }
}

/// Spend accumulated per day and partner, plus the set of partner names
/// seen anywhere in the window (lexical order).
#[derive(Debug, Default)]
pub struct PartnerTable {
    partners: BTreeSet<String>,
    spend: BTreeMap<NaiveDate, BTreeMap<String, f64>>,
}

impl PartnerTable {
    pub fn partners(&self) -> impl Iterator<Item = &str> {
        self.partners.iter().map(String::as_str)
    }

    pub fn days(&self) -> impl Iterator<Item = &NaiveDate> {
        self.spend.keys()
    }

    pub fn spend_on(&self, day: NaiveDate, partner: &str) -> f64 {
        self.spend
            .get(&day)
            .and_then(|by_partner| by_partner.get(partner))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.spend.is_empty()
    }
}

/// Builds the per-day global metrics table from `dimensions=day` rows.
///
/// Rows whose `day` equals `today` are dropped as incomplete; rows without
/// a day are skipped. At most one record is kept per day.
pub fn build_daily_table(rows: &[ReportRow], today: NaiveDate) -> Result<DailyTable, Error> {
    let mut by_day = BTreeMap::new();

    for row in rows {
        let Some(day) = row_day(row)? else { continue };
        if day == today {
            continue;
        }
        let metrics = DailyMetrics {
            installs: coerce_count("installs", row.get("installs"))?,
            cost: coerce_amount("cost", row.get("cost"))?,
            ecpi_all: coerce_amount("ecpi_all", row.get("ecpi_all"))?,
        };
        by_day.insert(day, metrics);
    }

    Ok(DailyTable { by_day })
}

/// Builds the per-day, per-partner spend table from
/// `dimensions=day,partner_name` rows.
///
/// Rows sharing a (day, partner) key have their costs summed, never
/// overwritten; the report API may split one logical bucket across several
/// rows when paginating.
pub fn build_partner_table(rows: &[ReportRow], today: NaiveDate) -> Result<PartnerTable, Error> {
    let mut partners = BTreeSet::new();
    let mut spend: BTreeMap<NaiveDate, BTreeMap<String, f64>> = BTreeMap::new();

    for row in rows {
        let Some(day) = row_day(row)? else { continue };
        if day == today {
            continue;
        }
        let partner = normalize_partner(row.get("partner_name"));
        let cost = coerce_amount("network_cost", row.get("network_cost"))?;

        partners.insert(partner.clone());
        *spend
            .entry(day)
            .or_default()
            .entry(partner)
            .or_insert(0.0) += cost;
    }

    Ok(PartnerTable { partners, spend })
}

/// Sorted union of both tables' day sets.
///
/// Chart series iterate this view and look each table up independently with
/// a zero default, so a day present in only one table still renders.
pub fn union_days(daily: &DailyTable, partners: &PartnerTable) -> Vec<NaiveDate> {
    let mut days: BTreeSet<NaiveDate> = daily.days().copied().collect();
    days.extend(partners.days().copied());
    days.into_iter().collect()
}

/// Trims a partner name; blank, absent, or non-string values collapse to
/// [`UNKNOWN_PARTNER`].
pub fn normalize_partner(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(name)) => {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                UNKNOWN_PARTNER.to_string()
            } else {
                trimmed.to_string()
            }
        }
        _ => UNKNOWN_PARTNER.to_string(),
    }
}

fn row_day(row: &ReportRow) -> Result<Option<NaiveDate>, Error> {
    match row.get("day") {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.is_empty() => Ok(None),
        Some(Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| Error::InvalidDate { date: s.clone() }),
        Some(other) => Err(Error::InvalidDate {
            date: other.to_string(),
        }),
    }
}

/// Integer-truncating coercion for count metrics: `"12.7"` and `12.7` both
/// become `12`.
fn coerce_count(field: &str, value: Option<&Value>) -> Result<u64, Error> {
    Ok(coerce_amount(field, value)?.trunc() as u64)
}

/// Float coercion for currency metrics.
///
/// Absent fields, `null`, blank strings, and `false` coerce to zero; any
/// other value that does not parse as a non-negative finite number is a
/// fatal coercion error. A malformed-but-present value is a data-quality
/// problem distinct from a genuinely absent one and must not be zeroed.
fn coerce_amount(field: &str, value: Option<&Value>) -> Result<f64, Error> {
    let parsed = match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => return Ok(0.0),
        Some(Value::Number(n)) => n.as_f64().ok_or_else(|| coercion(field, &n.to_string()))?,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(0.0);
            }
            trimmed.parse::<f64>().map_err(|_| coercion(field, s))?
        }
        Some(other) => return Err(coercion(field, &other.to_string())),
    };

    if !parsed.is_finite() || parsed < 0.0 {
        return Err(coercion(field, &parsed.to_string()));
    }

    Ok(parsed)
}

fn coercion(field: &str, value: &str) -> Error {
    Error::Coercion {
        field: field.to_string(),
        value: value.to_string(),
    }
}
