//! Cron recurrence rules
//!
//! [`CronExpr`] parses standard five-field cron expressions
//! (`minute hour day-of-month month day-of-week`) plus a handful of named
//! presets, and answers one question: when is the next fire time after a
//! given instant?
//!
//! ## Accepted syntax
//!
//! | Form | Example |
//! |------|---------|
//! | Presets | `daily`, `twice_daily`, `thrice_daily` |
//! | Descriptors | `@hourly`, `@daily`, `@midnight`, `@weekly`, `@monthly`, `@yearly`, `@annually` |
//! | Fields | `*`, `?`, `5`, `1-5`, `*/15`, `10-50/10`, `3/4`, `1,15,30` |
//! | Names | `JAN`-`DEC` for months, `SUN`-`SAT` for weekdays (case-insensitive) |
//!
//! Day-of-week accepts both `0` and `7` for Sunday. When both day-of-month
//! and day-of-week are restricted, a day matches if *either* matches.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike,
};

use super::errors::DomainError;

/// Named presets accepted in addition to raw cron expressions.
pub const PRESETS: &[(&str, &str)] = &[
    ("daily", "0 0 * * *"),
    ("twice_daily", "0 */12 * * *"),
    ("thrice_daily", "0 */8 * * *"),
];

const DESCRIPTORS: &[(&str, &str)] = &[
    ("@yearly", "0 0 1 1 *"),
    ("@annually", "0 0 1 1 *"),
    ("@monthly", "0 0 1 * *"),
    ("@weekly", "0 0 * * 0"),
    ("@daily", "0 0 * * *"),
    ("@midnight", "0 0 * * *"),
    ("@hourly", "0 * * * *"),
];

const MONTH_NAMES: &[&str] = &[
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const WEEKDAY_NAMES: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];

/// How far ahead `next_after` searches before giving up (covers Feb 29).
const MAX_SEARCH_YEARS: i32 = 8;

// ============================================================================
// CronField
// ============================================================================

/// Set of allowed values for a single cron field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronField {
    bits: u64,
    /// The field was written as `*` or `?` (possibly with a step)
    wildcard: bool,
}

impl CronField {
    /// Returns true if `value` is allowed by this field.
    pub fn matches(&self, value: u32) -> bool {
        value < 64 && self.bits & (1u64 << value) != 0
    }

    /// Returns true if the field was written as a wildcard.
    pub fn is_wildcard(&self) -> bool {
        self.wildcard
    }

    fn parse(field: &str, min: u32, max: u32, names: Option<&[&str]>) -> Result<Self, String> {
        let mut result = CronField {
            bits: 0,
            wildcard: false,
        };

        for item in field.split(',') {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => {
                    let step: u32 = step
                        .parse()
                        .map_err(|_| format!("invalid step '{step}' in '{item}'"))?;
                    if step == 0 || step > max {
                        return Err(format!("step must be between 1 and {max} in '{item}'"));
                    }
                    (range, Some(step))
                }
                None => (item, None),
            };

            let (start, end) = if range == "*" || range == "?" {
                result.wildcard = true;
                (min, max)
            } else if let Some((lo, hi)) = range.split_once('-') {
                (parse_value(lo, names)?, parse_value(hi, names)?)
            } else {
                let value = parse_value(range, names)?;
                // `a/n` means "from a to the end of the range, every n"
                if step.is_some() {
                    (value, max)
                } else {
                    (value, value)
                }
            };

            if start < min || end > max {
                return Err(format!(
                    "value out of range in '{item}' (allowed {min}-{max})"
                ));
            }
            if start > end {
                return Err(format!("range start exceeds end in '{item}'"));
            }

            let step = step.unwrap_or(1);
            let mut value = start;
            while value <= end {
                result.bits |= 1u64 << value;
                value += step;
            }
        }

        Ok(result)
    }
}

fn parse_value(raw: &str, names: Option<&[&str]>) -> Result<u32, String> {
    if raw.is_empty() {
        return Err("empty value".to_string());
    }
    if let Ok(value) = raw.parse::<u32>() {
        return Ok(value);
    }
    let lower = raw.to_ascii_lowercase();
    names
        .and_then(|names| names.iter().position(|name| *name == lower))
        .map(|index| index as u32)
        .ok_or_else(|| format!("unrecognized value '{raw}'"))
}

// ============================================================================
// CronExpr
// ============================================================================

/// A parsed recurrence rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpr {
    /// The expression exactly as written (preset name or cron text)
    source: String,
    /// Five-field cron text the rule was built from
    resolved: String,
    minute: CronField,
    hour: CronField,
    day_of_month: CronField,
    month: CronField,
    day_of_week: CronField,
}

impl CronExpr {
    /// Parses a preset name, an `@` descriptor or a five-field expression.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::ScheduleParse`] if the expression matches no
    /// preset and is not valid cron grammar.
    pub fn parse(expression: &str) -> Result<Self, DomainError> {
        let trimmed = expression.trim();
        let resolved = PRESETS
            .iter()
            .chain(DESCRIPTORS.iter())
            .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
            .map(|(_, cron)| *cron)
            .unwrap_or(trimmed);

        let parse_err = |reason: String| DomainError::ScheduleParse {
            expression: expression.to_string(),
            reason,
        };

        let fields: Vec<&str> = resolved.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(parse_err(format!(
                "expected 5 fields, found {}",
                fields.len()
            )));
        }

        let minute = CronField::parse(fields[0], 0, 59, None).map_err(&parse_err)?;
        let hour = CronField::parse(fields[1], 0, 23, None).map_err(&parse_err)?;
        let day_of_month = CronField::parse(fields[2], 1, 31, None).map_err(&parse_err)?;
        let month = month_field(fields[3]).map_err(&parse_err)?;
        let day_of_week = weekday_field(fields[4]).map_err(&parse_err)?;

        Ok(Self {
            source: expression.to_string(),
            resolved: fields.join(" "),
            minute,
            hour,
            day_of_month,
            month,
            day_of_week,
        })
    }

    /// Returns true if `expression` would be accepted by [`CronExpr::parse`].
    pub fn is_valid(expression: &str) -> bool {
        Self::parse(expression).is_ok()
    }

    /// The expression as originally written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The five-field cron text this rule evaluates.
    pub fn as_cron(&self) -> &str {
        &self.resolved
    }

    /// Returns the first fire time strictly after `after`, evaluated in the
    /// wall-clock time of `after`'s timezone.
    ///
    /// Wall-clock times skipped by a DST transition never fire; ambiguous
    /// times fire once, at the earlier instant. Returns `None` if nothing
    /// matches within the search horizon (e.g. `0 0 30 2 *`).
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let tz = after.timezone();
        let local = after.naive_local();
        let mut candidate = local.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);
        let horizon = local.year() + MAX_SEARCH_YEARS;

        while candidate.year() <= horizon {
            if !self.month.matches(candidate.month()) {
                candidate = first_of_next_month(candidate)?;
                continue;
            }
            if !self.day_matches(candidate.date()) {
                candidate = (candidate.date() + Duration::days(1)).and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hour.matches(candidate.hour()) {
                candidate = candidate.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if !self.minute.matches(candidate.minute()) {
                candidate += Duration::minutes(1);
                continue;
            }

            match tz.from_local_datetime(&candidate) {
                LocalResult::Single(at) => return Some(at),
                LocalResult::Ambiguous(earliest, _) => return Some(earliest),
                LocalResult::None => candidate += Duration::minutes(1),
            }
        }

        None
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.day_of_month.matches(date.day());
        let dow = self
            .day_of_week
            .matches(date.weekday().num_days_from_sunday());

        if self.day_of_month.is_wildcard() || self.day_of_week.is_wildcard() {
            dom && dow
        } else {
            dom || dow
        }
    }
}

fn month_field(raw: &str) -> Result<CronField, String> {
    // Month names are 1-based; shift the lookup table by inserting a blank.
    let mut names = vec![""];
    names.extend_from_slice(MONTH_NAMES);
    CronField::parse(raw, 1, 12, Some(names.as_slice()))
}

fn weekday_field(raw: &str) -> Result<CronField, String> {
    let mut field = CronField::parse(raw, 0, 7, Some(WEEKDAY_NAMES))?;
    if field.matches(7) {
        field.bits = (field.bits & !(1u64 << 7)) | 1;
    }
    Ok(field)
}

fn first_of_next_month(at: NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = if at.month() == 12 {
        (at.year() + 1, 1)
    } else {
        (at.year(), at.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)
}

impl Display for CronExpr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.source.trim() == self.resolved {
            write!(f, "{}", self.resolved)
        } else {
            write!(f, "{} ({})", self.source.trim(), self.resolved)
        }
    }
}

impl FromStr for CronExpr {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
