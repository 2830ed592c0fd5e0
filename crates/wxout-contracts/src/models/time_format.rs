use std::fmt::Write as _;

use chrono::format::{self, Item, Numeric, Parsed, StrftimeItems};
use chrono::NaiveDateTime;

use crate::error::{ConfigError, Result};

/// A strftime pattern describing how a model family writes valid times.
///
/// Patterns are checked when the format is built, so formatting never hits
/// an invalid item later on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeFormat {
    pattern: String,
}

impl TimeFormat {
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        if pattern.trim().is_empty() {
            return Err(ConfigError::InvalidTemplate {
                template: pattern,
                reason: "time format is empty".to_string(),
            });
        }
        if let Err(reason) = check_naive_pattern(&pattern) {
            return Err(ConfigError::InvalidTemplate {
                template: pattern,
                reason,
            });
        }
        Ok(Self { pattern })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    /// Parses `value`, which must match the whole pattern.
    ///
    /// Hour and minute default to zero when the pattern carries none
    /// (`%Y%m%d%H` cycles, date-only directories).
    pub fn parse(&self, value: &str) -> Result<NaiveDateTime> {
        let malformed = || ConfigError::MalformedTimestamp {
            value: value.to_string(),
            format: self.pattern.clone(),
        };

        let mut parsed = Parsed::new();
        format::parse(&mut parsed, value, StrftimeItems::new(&self.pattern))
            .map_err(|_| malformed())?;
        if !self.has_field(|numeric| matches!(numeric, Numeric::Hour | Numeric::Hour12)) {
            parsed.set_hour(0).map_err(|_| malformed())?;
        }
        if !self.has_field(|numeric| matches!(numeric, Numeric::Minute)) {
            parsed.set_minute(0).map_err(|_| malformed())?;
        }
        parsed
            .to_naive_datetime_with_offset(0)
            .map_err(|_| malformed())
    }

    pub fn format(&self, time: &NaiveDateTime) -> String {
        time.format(&self.pattern).to_string()
    }

    fn has_field(&self, wanted: impl Fn(&Numeric) -> bool) -> bool {
        StrftimeItems::new(&self.pattern).any(|item| match item {
            Item::Numeric(numeric, _) => wanted(&numeric),
            _ => false,
        })
    }
}

/// Checks that `pattern` can format a naive (offset-free) time.
///
/// `%z`, `%Z` and friends parse as valid items but fail when formatting a
/// `NaiveDateTime`, so the pattern is exercised against a sample time.
pub(crate) fn check_naive_pattern(pattern: &str) -> std::result::Result<(), String> {
    if pattern.is_empty() || StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(format!("'{pattern}' is not a valid strftime pattern"));
    }
    let sample = NaiveDateTime::default();
    let mut rendered = String::new();
    write!(rendered, "{}", sample.format(pattern))
        .map_err(|_| format!("'{pattern}' needs a time zone, which model times do not carry"))
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Timelike};

    use super::TimeFormat;
    use crate::error::ConfigError;

    #[test]
    fn parses_wrf_timestamps() -> anyhow::Result<()> {
        let format = TimeFormat::new("%Y-%m-%d_%H:%M:%S")?;
        let parsed = format.parse("2021-01-01_22:00:00")?;
        let expected = NaiveDate::from_ymd_opt(2021, 1, 1)
            .and_then(|date| date.and_hms_opt(22, 0, 0))
            .unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(format.format(&parsed), "2021-01-01_22:00:00");
        Ok(())
    }

    #[test]
    fn hourly_cycle_format_defaults_minutes() -> anyhow::Result<()> {
        let format = TimeFormat::new("%Y%m%d%H")?;
        let parsed = format.parse("2021010106")?;
        assert_eq!(parsed.hour(), 6);
        assert_eq!(parsed.minute(), 0);
        assert_eq!(format.format(&parsed), "2021010106");
        Ok(())
    }

    #[test]
    fn rejects_timestamp_in_wrong_layout() -> anyhow::Result<()> {
        let format = TimeFormat::new("%Y-%m-%d_%H:%M:%S")?;
        for value in ["2021010122", "2021-01-01 22:00:00", "2021-01-01_22:00:00Z", ""] {
            let err = format.parse(value).unwrap_err();
            assert!(
                matches!(err, ConfigError::MalformedTimestamp { .. }),
                "{value}: {err}"
            );
        }
        Ok(())
    }

    #[test]
    fn rejects_out_of_range_fields() -> anyhow::Result<()> {
        let format = TimeFormat::new("%Y%m%d%H")?;
        assert!(format.parse("2021013125").is_err());
        assert!(format.parse("2021023100").is_err());
        Ok(())
    }

    #[test]
    fn rejects_invalid_patterns() {
        assert!(TimeFormat::new("%Y-%Q").is_err());
        assert!(TimeFormat::new("  ").is_err());
    }

    #[test]
    fn rejects_patterns_that_need_an_offset() {
        for pattern in ["%Y%m%d%H%z", "%Y-%m-%d %Z", "%Y%m%d%H%:z"] {
            assert!(
                matches!(
                    TimeFormat::new(pattern),
                    Err(ConfigError::InvalidTemplate { .. })
                ),
                "{pattern} should be rejected"
            );
        }
    }
}
