//! Date, time, datetime and duration cell parsing
//!
//! Custom formats are built from the field tokens `yyyy MM dd HH mm ss`,
//! a fractional-second run of `S`, and a timezone suffix of `X`/`x`
//! repeated one to three times (optionally preceded by a space). Without a
//! format, ISO 8601 forms are parsed. Timezone extraction is always
//! attempted first so the remainder can be parsed on its own, then the
//! offset is normalized to `Z` or `±HH:MM`.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use once_cell::sync::Lazy;
use regex::Regex;

/// Which value space a format targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemporalKind {
    Date,
    Time,
    DateTime,
}

/// A compiled date/time format
#[derive(Debug, Clone, PartialEq)]
pub struct DateTimeFormat {
    /// chrono strftime translation of the field tokens
    chrono_format: String,
    kind: TemporalKind,
    /// The pattern declared a timezone token, so one must be present
    expects_timezone: bool,
}

impl DateTimeFormat {
    /// Translate a token pattern such as `M/d/yyyy` or `HH:mm:ss.SSS X`.
    pub fn new(pattern: &str, kind: TemporalKind) -> Result<Self, String> {
        let mut chrono_format = String::new();
        let mut expects_timezone = false;
        let mut has_date = false;
        let mut has_time = false;
        let mut chars = pattern.chars().peekable();

        while let Some(c) = chars.next() {
            let mut run = 1;
            while chars.peek() == Some(&c) {
                chars.next();
                run += 1;
            }
            match c {
                'y' => {
                    if run != 4 {
                        return Err(format!("unsupported year token length {run}"));
                    }
                    chrono_format.push_str("%Y");
                    has_date = true;
                }
                'M' => {
                    if run > 2 {
                        return Err(format!("unsupported month token length {run}"));
                    }
                    chrono_format.push_str("%m");
                    has_date = true;
                }
                'd' => {
                    if run > 2 {
                        return Err(format!("unsupported day token length {run}"));
                    }
                    chrono_format.push_str("%d");
                    has_date = true;
                }
                'H' => {
                    if run > 2 {
                        return Err(format!("unsupported hour token length {run}"));
                    }
                    chrono_format.push_str("%H");
                    has_time = true;
                }
                'm' => {
                    if run > 2 {
                        return Err(format!("unsupported minute token length {run}"));
                    }
                    chrono_format.push_str("%M");
                    has_time = true;
                }
                's' => {
                    if run > 2 {
                        return Err(format!("unsupported second token length {run}"));
                    }
                    chrono_format.push_str("%S");
                    has_time = true;
                }
                'S' => {
                    if run > 9 {
                        return Err("fractional second run too long".to_string());
                    }
                    // the dot separator was already emitted as a literal
                    if chrono_format.ends_with('.') {
                        chrono_format.pop();
                    }
                    chrono_format.push_str("%.f");
                }
                'X' | 'x' => {
                    if run > 3 {
                        return Err(format!("unsupported timezone token length {run}"));
                    }
                    expects_timezone = true;
                    // the offset is stripped before chrono sees the input;
                    // a preceding literal space is stripped with it
                    if chrono_format.ends_with(' ') {
                        chrono_format.pop();
                    }
                }
                '%' => return Err("literal '%' not supported in formats".to_string()),
                literal => {
                    for _ in 0..run {
                        chrono_format.push(literal);
                    }
                }
            }
        }

        let declared = match (has_date, has_time) {
            (true, true) => TemporalKind::DateTime,
            (true, false) => TemporalKind::Date,
            (false, true) => TemporalKind::Time,
            (false, false) => return Err("format contains no field tokens".to_string()),
        };
        match (kind, declared) {
            (TemporalKind::Date, TemporalKind::Date)
            | (TemporalKind::Time, TemporalKind::Time)
            | (TemporalKind::DateTime, _) => {}
            _ => {
                return Err(format!(
                    "format '{pattern}' does not fit a {kind:?} datatype"
                ))
            }
        }

        Ok(Self {
            chrono_format,
            kind: declared,
            expects_timezone,
        })
    }
}

static TIMEZONE_SUFFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r" ?(Z|[+-]\d{2}(:?\d{2})?)$").expect("valid regex"));

/// Split a trailing timezone designator off `raw` and normalize it to `Z`
/// or `±HH:MM`. Offsets with an hour field above 14 are not treated as
/// timezones (they are usually day-of-month digits in a separator-joined
/// date).
pub fn extract_timezone(raw: &str) -> (&str, Option<String>) {
    let Some(captures) = TIMEZONE_SUFFIX.captures(raw) else {
        return (raw, None);
    };
    let designator = captures.get(1).expect("group 1 always present");
    let text = designator.as_str();
    if text == "Z" {
        return (&raw[..captures.get(0).expect("match").start()], Some("Z".to_string()));
    }
    let sign = &text[..1];
    let hours = &text[1..3];
    let minutes = match text.len() {
        3 => "00",
        5 => &text[3..5],
        6 => &text[4..6],
        _ => return (raw, None),
    };
    if hours.parse::<u32>().unwrap_or(99) > 14 || minutes.parse::<u32>().unwrap_or(99) > 59 {
        return (raw, None);
    }
    let normalized = format!("{sign}{hours}:{minutes}");
    (
        &raw[..captures.get(0).expect("match").start()],
        Some(normalized),
    )
}

fn fraction_suffix(nanos: u32) -> String {
    if nanos == 0 {
        return String::new();
    }
    let digits = format!("{nanos:09}");
    format!(".{}", digits.trim_end_matches('0'))
}

fn canonical_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn canonical_time(t: NaiveTime) -> String {
    format!("{}{}", t.format("%H:%M:%S"), fraction_suffix(t.nanosecond()))
}

fn canonical_datetime(dt: NaiveDateTime) -> String {
    format!("{}T{}", canonical_date(dt.date()), canonical_time(dt.time()))
}

/// Parse a date/time/datetime string into its canonical lexical form.
///
/// `require_timezone` implements the `dateTimeStamp` rule. The returned
/// string carries the normalized timezone designator when one was present.
pub fn parse_temporal(
    raw: &str,
    kind: TemporalKind,
    format: Option<&DateTimeFormat>,
    require_timezone: bool,
) -> Result<String, String> {
    let (stripped, timezone) = extract_timezone(raw);

    if require_timezone && timezone.is_none() {
        return Err(format!("'{raw}' lacks the required timezone designator"));
    }
    if let Some(f) = format {
        if f.expects_timezone && timezone.is_none() {
            return Err(format!("'{raw}' lacks the timezone the format requires"));
        }
    }

    let attempt = |text: &str, tz: Option<&String>| -> Result<String, String> {
        let body = match format {
            Some(f) => parse_with_chrono(text, &f.chrono_format, f.kind)?,
            None => parse_iso(text, kind)?,
        };
        Ok(match tz {
            Some(tz) => format!("{body}{tz}"),
            None => body,
        })
    };

    // a stripped "timezone" may really be trailing date digits; retry with
    // the full string when the remainder does not parse
    match attempt(stripped, timezone.as_ref()) {
        Ok(v) => Ok(v),
        Err(first_error) => {
            if timezone.is_some() {
                attempt(raw, None).map_err(|_| first_error)
            } else {
                Err(first_error)
            }
        }
    }
}

fn parse_with_chrono(text: &str, chrono_format: &str, kind: TemporalKind) -> Result<String, String> {
    match kind {
        TemporalKind::Date => NaiveDate::parse_from_str(text, chrono_format)
            .map(canonical_date)
            .map_err(|e| format!("'{text}' does not match the date format: {e}")),
        TemporalKind::Time => NaiveTime::parse_from_str(text, chrono_format)
            .map(canonical_time)
            .map_err(|e| format!("'{text}' does not match the time format: {e}")),
        TemporalKind::DateTime => NaiveDateTime::parse_from_str(text, chrono_format)
            .map(canonical_datetime)
            .map_err(|e| format!("'{text}' does not match the datetime format: {e}")),
    }
}

fn parse_iso(text: &str, kind: TemporalKind) -> Result<String, String> {
    match kind {
        TemporalKind::Date => NaiveDate::parse_from_str(text, "%Y-%m-%d")
            .map(canonical_date)
            .map_err(|_| format!("'{text}' is not an ISO 8601 date")),
        TemporalKind::Time => NaiveTime::parse_from_str(text, "%H:%M:%S%.f")
            .map(canonical_time)
            .map_err(|_| format!("'{text}' is not an ISO 8601 time")),
        TemporalKind::DateTime => NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
            .map(canonical_datetime)
            .map_err(|_| format!("'{text}' is not an ISO 8601 datetime")),
    }
}

/// Which duration components a base type admits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationKind {
    /// `-?PnYnMnDTnHnMnS`
    Full,
    /// Days and below only
    DayTime,
    /// Years and months only
    YearMonth,
}

/// Structurally validate a duration against the `-?PnYnMnDTnHnMnS` grammar:
/// component order, non-empty numeric tokens, at least one component. The
/// value is not decomposed further.
pub fn validate_duration(raw: &str, kind: DurationKind) -> Result<(), String> {
    let err = || format!("'{raw}' is not a valid duration");
    let s = raw.strip_prefix('-').unwrap_or(raw);
    let s = s.strip_prefix('P').ok_or_else(err)?;
    if s.is_empty() {
        return Err(err());
    }

    let (date_part, time_part) = match s.split_once('T') {
        Some((d, t)) => {
            if t.is_empty() {
                return Err(err());
            }
            (d, Some(t))
        }
        None => (s, None),
    };

    let scan = |part: &str, designators: &[char]| -> Result<usize, String> {
        let mut components = 0;
        let mut digits = 0;
        let mut seen_fraction = false;
        let mut next_designator = 0;
        for c in part.chars() {
            if c.is_ascii_digit() {
                digits += 1;
            } else if c == '.' && designators.contains(&'S') && !seen_fraction && digits > 0 {
                seen_fraction = true;
            } else {
                let position = designators[next_designator..]
                    .iter()
                    .position(|d| *d == c)
                    .ok_or_else(err)?;
                if digits == 0 {
                    return Err(err());
                }
                if seen_fraction && c != 'S' {
                    return Err(err());
                }
                next_designator += position + 1;
                digits = 0;
                seen_fraction = false;
                components += 1;
            }
        }
        if digits > 0 || seen_fraction {
            // trailing digits without a designator
            return Err(err());
        }
        Ok(components)
    };

    let date_components = scan(date_part, &['Y', 'M', 'D'])?;
    let time_components = match time_part {
        Some(t) => scan(t, &['H', 'M', 'S'])?,
        None => 0,
    };
    if date_components + time_components == 0 {
        return Err(err());
    }

    match kind {
        DurationKind::Full => Ok(()),
        DurationKind::DayTime => {
            if date_part.contains('Y') || date_part.contains('M') {
                Err(format!("'{raw}' has year/month components in a dayTimeDuration"))
            } else {
                Ok(())
            }
        }
        DurationKind::YearMonth => {
            if time_part.is_some() || date_part.contains('D') {
                Err(format!("'{raw}' has day/time components in a yearMonthDuration"))
            } else {
                Ok(())
            }
        }
    }
}

static G_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d{4,}$").expect("valid regex"));
static G_YEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?\d{4,}-(0[1-9]|1[0-2])$").expect("valid regex"));
static G_MONTH: Lazy<Regex> = Lazy::new(|| Regex::new(r"^--(0[1-9]|1[0-2])$").expect("valid regex"));
static G_MONTH_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^--(0[1-9]|1[0-2])-(0[1-9]|[12]\d|3[01])$").expect("valid regex"));
static G_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^---(0[1-9]|[12]\d|3[01])$").expect("valid regex"));

/// Gregorian fragment kinds (`gYear`, `gMonth`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GregorianKind {
    Year,
    YearMonth,
    Month,
    MonthDay,
    Day,
}

/// Validate a Gregorian calendar fragment, tolerating a trailing timezone.
pub fn validate_gregorian(raw: &str, kind: GregorianKind) -> Result<String, String> {
    let (body, timezone) = extract_timezone(raw);
    // gYear/gYearMonth bodies can end in digits the timezone regex grabs;
    // fall back to the full string when the remainder fails
    let matches = |s: &str| match kind {
        GregorianKind::Year => G_YEAR.is_match(s),
        GregorianKind::YearMonth => G_YEAR_MONTH.is_match(s),
        GregorianKind::Month => G_MONTH.is_match(s),
        GregorianKind::MonthDay => G_MONTH_DAY.is_match(s),
        GregorianKind::Day => G_DAY.is_match(s),
    };
    if matches(body) {
        return Ok(match timezone {
            Some(tz) => format!("{body}{tz}"),
            None => body.to_string(),
        });
    }
    if timezone.is_some() && matches(raw) {
        return Ok(raw.to_string());
    }
    Err(format!("'{raw}' is not a valid calendar fragment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_custom_date_format() {
        let f = DateTimeFormat::new("M/d/yyyy", TemporalKind::Date).unwrap();
        assert_eq!(
            parse_temporal("3/22/2015", TemporalKind::Date, Some(&f), false).unwrap(),
            "2015-03-22"
        );
        assert!(parse_temporal("22/3/2015", TemporalKind::Date, Some(&f), false).is_err());
    }

    #[test]
    fn test_custom_datetime_with_fraction() {
        let f = DateTimeFormat::new("yyyy-MM-dd HH:mm:ss.SSS", TemporalKind::DateTime).unwrap();
        assert_eq!(
            parse_temporal("2015-03-22 13:05:00.125", TemporalKind::DateTime, Some(&f), false)
                .unwrap(),
            "2015-03-22T13:05:00.125"
        );
    }

    #[test]
    fn test_timezone_extraction_and_normalization() {
        assert_eq!(extract_timezone("13:05:00Z"), ("13:05:00", Some("Z".to_string())));
        assert_eq!(
            extract_timezone("13:05:00+0530"),
            ("13:05:00", Some("+05:30".to_string()))
        );
        assert_eq!(
            extract_timezone("13:05:00 -06"),
            ("13:05:00", Some("-06:00".to_string()))
        );
        // day-of-month digits are not a timezone
        assert_eq!(extract_timezone("2015-03-22"), ("2015-03-22", None));
    }

    #[test]
    fn test_iso_fallbacks() {
        assert_eq!(
            parse_temporal("2015-03-22", TemporalKind::Date, None, false).unwrap(),
            "2015-03-22"
        );
        assert_eq!(
            parse_temporal("2015-03-22T13:05:00Z", TemporalKind::DateTime, None, false).unwrap(),
            "2015-03-22T13:05:00Z"
        );
        assert_eq!(
            parse_temporal("13:05:00.5", TemporalKind::Time, None, false).unwrap(),
            "13:05:00.5"
        );
    }

    #[test]
    fn test_datetime_stamp_requires_timezone() {
        assert!(parse_temporal("2015-03-22T13:05:00", TemporalKind::DateTime, None, true).is_err());
        assert_eq!(
            parse_temporal("2015-03-22T13:05:00+01:00", TemporalKind::DateTime, None, true)
                .unwrap(),
            "2015-03-22T13:05:00+01:00"
        );
    }

    #[test]
    fn test_format_with_timezone_token() {
        let f = DateTimeFormat::new("HH:mm:ss X", TemporalKind::Time).unwrap();
        assert_eq!(
            parse_temporal("13:05:00 +01:00", TemporalKind::Time, Some(&f), false).unwrap(),
            "13:05:00+01:00"
        );
        assert!(parse_temporal("13:05:00", TemporalKind::Time, Some(&f), false).is_err());
    }

    #[test]
    fn test_duration_grammar() {
        assert!(validate_duration("P1Y2M3DT4H5M6S", DurationKind::Full).is_ok());
        assert!(validate_duration("-P30D", DurationKind::Full).is_ok());
        assert!(validate_duration("PT0.5S", DurationKind::Full).is_ok());
        assert!(validate_duration("P", DurationKind::Full).is_err());
        assert!(validate_duration("PT", DurationKind::Full).is_err());
        assert!(validate_duration("P1M2Y", DurationKind::Full).is_err());
        assert!(validate_duration("P1YT", DurationKind::Full).is_err());
        assert!(validate_duration("P1X", DurationKind::Full).is_err());
        assert!(validate_duration("PT1H", DurationKind::DayTime).is_ok());
        assert!(validate_duration("P1Y", DurationKind::DayTime).is_err());
        assert!(validate_duration("P1Y2M", DurationKind::YearMonth).is_ok());
        assert!(validate_duration("P1D", DurationKind::YearMonth).is_err());
    }

    #[test]
    fn test_gregorian_fragments() {
        assert_eq!(validate_gregorian("2015", GregorianKind::Year).unwrap(), "2015");
        assert_eq!(validate_gregorian("--03", GregorianKind::Month).unwrap(), "--03");
        assert_eq!(
            validate_gregorian("--03-22", GregorianKind::MonthDay).unwrap(),
            "--03-22"
        );
        assert_eq!(validate_gregorian("---22", GregorianKind::Day).unwrap(), "---22");
        assert_eq!(
            validate_gregorian("2015-03", GregorianKind::YearMonth).unwrap(),
            "2015-03"
        );
        assert!(validate_gregorian("13", GregorianKind::Year).is_err());
        assert!(validate_gregorian("--13", GregorianKind::Month).is_err());
    }
}
