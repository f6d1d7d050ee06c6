//! Usage time-window resolution.
//!
//! Producers report timestamps in several textual layouts. Every value is
//! parsed into a `NaiveDateTime` (UTC, no offset) before any comparison, so
//! ordering never depends on string layout.

use chrono::{NaiveDateTime, Timelike};

use crate::error::{CoreError, Result};

/// Candidate layouts for values carrying a `Z` suffix.
const UTC_SUFFIX_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%SZ", "%Y-%m-%dT%H:%M:%S%.fZ"];

/// Candidate layouts for `T`-separated values without a suffix.
const T_SEPARATED_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"];

/// Candidate layouts for space-separated values.
const SPACE_SEPARATED_FORMATS: &[&str] =
    &["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%d %m %Y %H:%M:%S"];

/// Parses a producer timestamp.
///
/// The format family is picked from the content (`Z` first, then `T`, then
/// space-separated) and its candidates are tried in order; the first match
/// wins.
///
/// # Errors
///
/// Returns `CoreError::TimeParse` when no candidate in the family matches.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    let family = if trimmed.contains('Z') {
        UTC_SUFFIX_FORMATS
    } else if trimmed.contains('T') {
        T_SEPARATED_FORMATS
    } else {
        SPACE_SEPARATED_FORMATS
    };

    family
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .ok_or_else(|| CoreError::time_parse(value))
}

/// Formats a timestamp the way usage documents carry it.
///
/// `YYYY-MM-DD HH:MM:SS`, followed by `.ffffff` only when the microsecond
/// component is non-zero.
pub fn format_timestamp(when: &NaiveDateTime) -> String {
    if when.nanosecond() / 1_000 == 0 {
        when.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        when.format("%Y-%m-%d %H:%M:%S%.6f").to_string()
    }
}

/// Later of the activation time and the audit period start.
///
/// # Errors
///
/// Returns `CoreError::TimeParse` if either value cannot be parsed.
pub fn resolve_start(activation: &str, period_start: &str) -> Result<NaiveDateTime> {
    let activation = parse_timestamp(activation)?;
    let period_start = parse_timestamp(period_start)?;
    Ok(activation.max(period_start))
}

/// Earlier of the deactivation time and the audit period end.
///
/// An absent or blank deactivation means the resource is still alive, so the
/// period end is returned unchanged.
///
/// # Errors
///
/// Returns `CoreError::TimeParse` if a present value cannot be parsed.
pub fn resolve_end(deactivation: Option<&str>, period_end: &str) -> Result<NaiveDateTime> {
    let period_end = parse_timestamp(period_end)?;
    match deactivation.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(period_end),
        Some(deactivation) => Ok(parse_timestamp(deactivation)?.min(period_end)),
    }
}

/// A resolved usage interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    /// Start of billable usage.
    pub start: NaiveDateTime,
    /// End of billable usage.
    pub end: NaiveDateTime,
}

impl TimeWindow {
    /// Resolves a record window clamped into the audit period.
    ///
    /// Starts from `resolve_start`/`resolve_end` and then pins both ends into
    /// `[period_start, period_end]` with `start <= end`, so a resource
    /// deleted before the period began collapses to an empty window at its
    /// start instead of running backwards.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::TimeParse` for unparseable values and
    /// `CoreError::MalformedNotification` when the audit period ends before
    /// it begins.
    pub fn resolve(
        activation: &str,
        deactivation: Option<&str>,
        period_start: &str,
        period_end: &str,
    ) -> Result<Self> {
        let lower = parse_timestamp(period_start)?;
        let upper = parse_timestamp(period_end)?;
        if upper < lower {
            return Err(CoreError::MalformedNotification(format!(
                "audit period ends ({period_end}) before it begins ({period_start})"
            )));
        }

        let start = resolve_start(activation, period_start)?.min(upper);
        let end = resolve_end(deactivation, period_end)?.max(start);

        Ok(Self { start, end })
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32, micro: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .and_then(|date| date.and_hms_micro_opt(h, mi, s, micro))
            .unwrap()
    }

    #[test]
    fn parses_every_format_family() {
        let expected = at(2013, 9, 2, 16, 8, 10, 0);
        for value in [
            "2013-09-02T16:08:10Z",
            "2013-09-02T16:08:10.000000Z",
            "2013-09-02T16:08:10",
            "2013-09-02T16:08:10.0",
            "2013-09-02 16:08:10",
            "2013-09-02 16:08:10.000",
            "02 09 2013 16:08:10",
        ] {
            assert_eq!(parse_timestamp(value).unwrap(), expected, "value {value}");
        }
    }

    #[test]
    fn keeps_fractional_seconds() {
        assert_eq!(
            parse_timestamp("2013-09-02 23:59:59.999999").unwrap(),
            at(2013, 9, 2, 23, 59, 59, 999_999)
        );
        assert_eq!(
            parse_timestamp("2013-09-02T23:59:59.5Z").unwrap(),
            at(2013, 9, 2, 23, 59, 59, 500_000)
        );
    }

    #[test]
    fn unparseable_values_are_errors() {
        for value in ["", "yesterday", "2013/09/02 16:08:10", "2013-09-02T25:00:00Z"] {
            assert_eq!(parse_timestamp(value), Err(CoreError::time_parse(value)));
        }
    }

    #[test]
    fn numeric_offsets_are_rejected() {
        for value in ["2013-09-02T16:08:10+00:00", "2013-09-02 16:08:10-05:00"] {
            assert_eq!(parse_timestamp(value), Err(CoreError::time_parse(value)));
        }
    }

    #[test]
    fn family_is_chosen_by_content() {
        // A value containing 'T' is only tried against the T-separated layouts.
        assert!(parse_timestamp("02 09 2013T16:08:10").is_err());
    }

    #[test]
    fn formats_like_usage_documents() {
        assert_eq!(format_timestamp(&at(2013, 9, 2, 0, 0, 0, 0)), "2013-09-02 00:00:00");
        assert_eq!(
            format_timestamp(&at(2013, 9, 2, 23, 59, 59, 999_999)),
            "2013-09-02 23:59:59.999999"
        );
        assert_eq!(format_timestamp(&at(2013, 9, 2, 1, 2, 3, 40)), "2013-09-02 01:02:03.000040");
    }

    #[test]
    fn start_returns_later_value() {
        let start = resolve_start("2013-09-02 16:08:10", "2013-09-02 00:00:00").unwrap();
        assert_eq!(format_timestamp(&start), "2013-09-02 16:08:10");

        let start = resolve_start("2013-09-01T10:00:00Z", "2013-09-02 00:00:00").unwrap();
        assert_eq!(format_timestamp(&start), "2013-09-02 00:00:00");
    }

    #[test]
    fn end_returns_earlier_value() {
        let end = resolve_end(Some("2013-09-02 16:08:46"), "2013-09-02 23:59:59.999999").unwrap();
        assert_eq!(format_timestamp(&end), "2013-09-02 16:08:46");
    }

    #[test]
    fn end_defaults_to_period_end_without_deactivation() {
        for deactivation in [None, Some(""), Some("   ")] {
            let end = resolve_end(deactivation, "2013-09-02 23:59:59.999999").unwrap();
            assert_eq!(format_timestamp(&end), "2013-09-02 23:59:59.999999");
        }
    }

    #[test]
    fn window_clamps_into_audit_period() {
        let window = TimeWindow::resolve(
            "2012-09-15 11:51:11",
            Some("2012-09-15 09:51:11"),
            "2012-09-15 10:51:11",
            "2012-09-16 10:51:11",
        )
        .unwrap();

        assert_eq!(window.start, at(2012, 9, 15, 11, 51, 11, 0));
        assert_eq!(window.end, window.start);
    }

    #[test]
    fn window_rejects_crossed_audit_period() {
        let result = TimeWindow::resolve(
            "2012-09-15 11:51:11",
            None,
            "2012-09-16 10:51:11",
            "2012-09-15 10:51:11",
        );
        assert!(matches!(result, Err(CoreError::MalformedNotification(_))));
    }
}
