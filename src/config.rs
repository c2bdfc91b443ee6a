use std::str::FromStr;
use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc, Weekday};

use crate::engine::{CalendarRules, HolidayCalendar};
use crate::limits::*;
use crate::model::*;

/// Runtime configuration, read from `RENTSPAN_*` environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub min_lead_days: u32,
    pub max_total_days: u32,
    pub buffer: BufferPolicy,
    pub presets: Vec<StayPreset>,
    pub disallowed_weekdays: Vec<Weekday>,
    /// Dated holidays plus month/day entries that repeat every year.
    pub holidays: HolidayCalendar,
    pub holiday_overrides: Vec<CalendarDate>,
    pub blackout_days: Vec<CalendarDate>,
    /// The single locale calendar every "today" is computed in.
    pub utc_offset: FixedOffset,
    pub metrics_port: Option<u16>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_lead_days: 4,
            max_total_days: 10,
            buffer: BufferPolicy::default(),
            presets: StayPreset::ALL.to_vec(),
            disallowed_weekdays: vec![Weekday::Sun],
            holidays: HolidayCalendar::new(),
            holiday_overrides: Vec::new(),
            blackout_days: Vec::new(),
            utc_offset: Utc.fix(),
            metrics_port: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { key: &'static str, value: String },
    LimitExceeded(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { key, value } => write!(f, "invalid value for {key}: {value:?}"),
            ConfigError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse from any key → value source. Unset keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut cfg = Self::default();

        if let Some(v) = lookup("RENTSPAN_MIN_LEAD_DAYS") {
            cfg.min_lead_days = parse_one("RENTSPAN_MIN_LEAD_DAYS", &v)?;
        }
        if let Some(v) = lookup("RENTSPAN_MAX_TOTAL_DAYS") {
            cfg.max_total_days = parse_one("RENTSPAN_MAX_TOTAL_DAYS", &v)?;
        }
        if let Some(v) = lookup("RENTSPAN_LEAD_BUFFER_DAYS") {
            cfg.buffer.lead_days = parse_one("RENTSPAN_LEAD_BUFFER_DAYS", &v)?;
        }
        if let Some(v) = lookup("RENTSPAN_TRAIL_BUFFER_DAYS") {
            cfg.buffer.trail_days = parse_one("RENTSPAN_TRAIL_BUFFER_DAYS", &v)?;
        }
        if let Some(v) = lookup("RENTSPAN_PRESETS") {
            cfg.presets = parse_list("RENTSPAN_PRESETS", &v)?;
        }
        if let Some(v) = lookup("RENTSPAN_DISALLOWED_WEEKDAYS") {
            cfg.disallowed_weekdays = parse_list("RENTSPAN_DISALLOWED_WEEKDAYS", &v)?;
        }
        if let Some(v) = lookup("RENTSPAN_HOLIDAYS") {
            let dates: Vec<CalendarDate> = parse_list("RENTSPAN_HOLIDAYS", &v)?;
            for date in dates {
                cfg.holidays.add_date(date);
            }
        }
        if let Some(v) = lookup("RENTSPAN_RECURRING_HOLIDAYS") {
            for entry in v.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let (month, day) = parse_month_day("RENTSPAN_RECURRING_HOLIDAYS", entry)?;
                cfg.holidays
                    .add_recurring(month, day)
                    .map_err(|_| ConfigError::Invalid {
                        key: "RENTSPAN_RECURRING_HOLIDAYS",
                        value: entry.to_string(),
                    })?;
            }
        }
        if let Some(v) = lookup("RENTSPAN_HOLIDAY_OVERRIDES") {
            cfg.holiday_overrides = parse_list("RENTSPAN_HOLIDAY_OVERRIDES", &v)?;
        }
        if let Some(v) = lookup("RENTSPAN_BLACKOUT_DAYS") {
            cfg.blackout_days = parse_list("RENTSPAN_BLACKOUT_DAYS", &v)?;
        }
        if let Some(v) = lookup("RENTSPAN_UTC_OFFSET_HOURS") {
            let hours: i32 = parse_one("RENTSPAN_UTC_OFFSET_HOURS", &v)?;
            cfg.utc_offset = hours
                .checked_mul(3600)
                .and_then(FixedOffset::east_opt)
                .ok_or(ConfigError::Invalid {
                    key: "RENTSPAN_UTC_OFFSET_HOURS",
                    value: v,
                })?;
        }
        if let Some(v) = lookup("RENTSPAN_METRICS_PORT") {
            cfg.metrics_port = Some(parse_one("RENTSPAN_METRICS_PORT", &v)?);
        }

        cfg.check()?;
        Ok(cfg)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.buffer.lead_days > MAX_BUFFER_DAYS || self.buffer.trail_days > MAX_BUFFER_DAYS {
            return Err(ConfigError::LimitExceeded("buffer too wide"));
        }
        self.rules()
            .check()
            .map_err(|_| ConfigError::LimitExceeded("calendar rules out of range"))
    }

    /// Calendar policy built from this configuration.
    pub fn rules(&self) -> CalendarRules {
        CalendarRules {
            min_lead_days: self.min_lead_days,
            max_total_days: self.max_total_days,
            offered_presets: self.presets.clone(),
            disallowed_weekdays: self.disallowed_weekdays.clone(),
            holiday_overrides: self.holiday_overrides.iter().copied().collect(),
            blackout_days: self.blackout_days.iter().copied().collect(),
            holidays: Arc::new(self.holidays.clone()),
        }
    }

    /// Today's date in the configured locale.
    pub fn today(&self) -> CalendarDate {
        Utc::now().with_timezone(&self.utc_offset).date_naive()
    }
}

fn parse_one<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

/// `MM-DD`, e.g. `12-25`.
fn parse_month_day(key: &'static str, value: &str) -> Result<(u32, u32), ConfigError> {
    let invalid = || ConfigError::Invalid {
        key,
        value: value.to_string(),
    };
    let (month, day) = value.split_once('-').ok_or_else(invalid)?;
    let month = month.parse().map_err(|_| invalid())?;
    let day = day.parse().map_err(|_| invalid())?;
    Ok((month, day))
}

/// Comma-separated list; blank entries are skipped, so an empty value means "none".
fn parse_list<T: FromStr>(key: &'static str, value: &str) -> Result<Vec<T>, ConfigError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| parse_one(key, s))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::HolidaySource;
    use chrono::NaiveDate;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = EngineConfig::from_lookup(|_| None).unwrap();
        assert_eq!(cfg, EngineConfig::default());
        assert_eq!(cfg.buffer, BufferPolicy { lead_days: 3, trail_days: 3 });
        assert_eq!(cfg.disallowed_weekdays, vec![Weekday::Sun]);
    }

    #[test]
    fn parses_every_key() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("RENTSPAN_MIN_LEAD_DAYS", "2"),
            ("RENTSPAN_MAX_TOTAL_DAYS", "14"),
            ("RENTSPAN_LEAD_BUFFER_DAYS", "1"),
            ("RENTSPAN_TRAIL_BUFFER_DAYS", "4"),
            ("RENTSPAN_PRESETS", "long"),
            ("RENTSPAN_DISALLOWED_WEEKDAYS", "sun, sat"),
            ("RENTSPAN_HOLIDAYS", "2025-01-01,2025-05-05"),
            ("RENTSPAN_HOLIDAY_OVERRIDES", "2025-05-05"),
            ("RENTSPAN_BLACKOUT_DAYS", "2025-12-31"),
            ("RENTSPAN_UTC_OFFSET_HOURS", "9"),
            ("RENTSPAN_METRICS_PORT", "9100"),
        ]))
        .unwrap();

        assert_eq!(cfg.min_lead_days, 2);
        assert_eq!(cfg.max_total_days, 14);
        assert_eq!(cfg.buffer, BufferPolicy { lead_days: 1, trail_days: 4 });
        assert_eq!(cfg.presets, vec![StayPreset::Long]);
        assert_eq!(cfg.disallowed_weekdays, vec![Weekday::Sun, Weekday::Sat]);
        assert_eq!(cfg.holidays.len(), 2);
        assert_eq!(cfg.utc_offset.local_minus_utc(), 9 * 3600);
        assert_eq!(cfg.metrics_port, Some(9100));

        let rules = cfg.rules();
        let new_year = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        assert!(rules.holidays.is_holiday(new_year));
        assert!(rules.is_disallowed_start_day(new_year));
        // Overridden holiday on a Monday.
        assert!(!rules.is_disallowed_start_day(NaiveDate::from_ymd_opt(2025, 5, 5).unwrap()));
        assert_eq!(rules.blackout_days.len(), 1);
    }

    #[test]
    fn recurring_holidays_repeat_every_year() {
        let cfg = EngineConfig::from_lookup(lookup(&[
            ("RENTSPAN_HOLIDAYS", "2025-05-06"),
            ("RENTSPAN_RECURRING_HOLIDAYS", "12-25, 01-01,"),
        ]))
        .unwrap();
        assert_eq!(cfg.holidays.len(), 3);

        let rules = cfg.rules();
        for (y, m, day) in [(2025, 12, 25), (2031, 12, 25), (2026, 1, 1), (2025, 5, 6)] {
            let date = NaiveDate::from_ymd_opt(y, m, day).unwrap();
            assert!(rules.holidays.is_holiday(date), "{date} should be a holiday");
        }
        assert!(!rules.holidays.is_holiday(NaiveDate::from_ymd_opt(2026, 5, 6).unwrap()));
    }

    #[test]
    fn recurring_holiday_must_be_a_calendar_day() {
        for bad in ["02-30", "13-01", "1225", "xx-01"] {
            assert_eq!(
                EngineConfig::from_lookup(lookup(&[("RENTSPAN_RECURRING_HOLIDAYS", bad)])),
                Err(ConfigError::Invalid {
                    key: "RENTSPAN_RECURRING_HOLIDAYS",
                    value: bad.into()
                }),
                "{bad}"
            );
        }
    }

    #[test]
    fn empty_weekday_list_allows_every_day() {
        let cfg =
            EngineConfig::from_lookup(lookup(&[("RENTSPAN_DISALLOWED_WEEKDAYS", "")])).unwrap();
        assert!(cfg.disallowed_weekdays.is_empty());
    }

    #[test]
    fn malformed_values_are_reported() {
        let err =
            EngineConfig::from_lookup(lookup(&[("RENTSPAN_MIN_LEAD_DAYS", "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "RENTSPAN_MIN_LEAD_DAYS",
                value: "soon".into()
            }
        );
        assert!(EngineConfig::from_lookup(lookup(&[("RENTSPAN_HOLIDAYS", "2025-02-30")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("RENTSPAN_PRESETS", "weekend")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[("RENTSPAN_UTC_OFFSET_HOURS", "30")])).is_err());
    }

    #[test]
    fn limits_are_enforced() {
        assert_eq!(
            EngineConfig::from_lookup(lookup(&[("RENTSPAN_TRAIL_BUFFER_DAYS", "90")])),
            Err(ConfigError::LimitExceeded("buffer too wide"))
        );
        // Cap below the long preset.
        assert!(EngineConfig::from_lookup(lookup(&[("RENTSPAN_MAX_TOTAL_DAYS", "5")])).is_err());
    }
}
