//! The time sub-parser: reads a field and sets the entry timestamp.

use chrono::{
    DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc,
};
use lumber_entry::{Entry, Field, Value};
use serde::Deserialize;

use crate::error::BuildError;

/// How the layout string is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutType {
    /// The value is already a typed time (RFC 3339); no layout needed.
    Native,
    /// A Go-style reference-time layout (`Jan 2 2006 15:04:05`).
    Gotime,
    /// A POSIX `strftime`-style layout (`%Y-%m-%d %H:%M:%S`).
    #[default]
    Strptime,
}

/// How a zone-less parsed time is placed on the timeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Location {
    /// The host's local zone.
    #[default]
    Local,
    /// UTC.
    Utc,
}

/// Configuration of the time sub-parser.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeParserConfig {
    /// The field holding the raw time value.
    pub parse_from: Field,
    /// Layout interpretation. Defaults to `strptime`.
    #[serde(default)]
    pub layout_type: LayoutType,
    /// The layout string. Required unless `layout_type` is `native`.
    #[serde(default)]
    pub layout: String,
    /// Zone for zone-less layouts: `local` (default) or `utc`.
    #[serde(default)]
    pub location: Option<String>,
    /// Move the raw value here after a successful parse.
    #[serde(default)]
    pub preserve_to: Option<Field>,
}

impl TimeParserConfig {
    /// Validate the configuration and build the runtime parser.
    pub fn build(&self, id: &str) -> Result<TimeParser, BuildError> {
        let layout = match self.layout_type {
            LayoutType::Native => String::new(),
            LayoutType::Strptime => {
                if self.layout.is_empty() {
                    return Err(BuildError::InvalidConfig {
                        id: id.to_string(),
                        message: "missing required configuration parameter `layout`".to_string(),
                    });
                }
                self.layout.clone()
            }
            LayoutType::Gotime => {
                if self.layout.is_empty() {
                    return Err(BuildError::InvalidConfig {
                        id: id.to_string(),
                        message: "missing required configuration parameter `layout`".to_string(),
                    });
                }
                gotime_to_chrono(&self.layout)
            }
        };
        let location = match self.location.as_deref() {
            None => Location::Local,
            Some(name) => match name.to_ascii_lowercase().as_str() {
                "local" => Location::Local,
                "utc" => Location::Utc,
                _ => {
                    return Err(BuildError::InvalidConfig {
                        id: id.to_string(),
                        message: format!("unsupported location `{name}`"),
                    });
                }
            },
        };
        Ok(TimeParser {
            parse_from: self.parse_from.clone(),
            layout_type: self.layout_type,
            layout,
            location,
            preserve_to: self.preserve_to.clone(),
        })
    }
}

/// Runtime time sub-parser.
#[derive(Debug, Clone)]
pub struct TimeParser {
    parse_from: Field,
    layout_type: LayoutType,
    /// The layout, already translated to chrono format specs.
    layout: String,
    location: Location,
    preserve_to: Option<Field>,
}

/// A time sub-parser failure.
#[derive(Debug, thiserror::Error)]
pub enum TimeParseError {
    /// The entry does not have the `parse_from` field.
    #[error("entry does not have the expected parse_from field `{0}`")]
    MissingField(String),

    /// The field's value is not a string.
    #[error("time value is not a string")]
    NotAString,

    /// The value did not match the layout.
    ///
    /// The raw value is deliberately not included; entry payloads must
    /// stay out of error chains and logs.
    #[error("failed to parse time with layout `{layout}`: {message}")]
    Invalid {
        /// The configured layout.
        layout: String,
        /// The underlying parse failure.
        message: String,
    },
}

impl TimeParser {
    /// Parse the configured field and set the entry's timestamp.
    ///
    /// On success the raw value is moved to `preserve_to` when one is
    /// configured; otherwise it is left in place.
    pub fn parse(&self, entry: &mut Entry) -> Result<(), TimeParseError> {
        let value = entry
            .get(&self.parse_from)
            .ok_or_else(|| TimeParseError::MissingField(self.parse_from.to_string()))?;

        let timestamp = match self.layout_type {
            LayoutType::Native => self.parse_native(&value)?,
            LayoutType::Gotime | LayoutType::Strptime => {
                let raw = value.as_str().ok_or(TimeParseError::NotAString)?;
                self.parse_layout(raw)?
            }
        };

        entry.timestamp = timestamp;
        if let Some(preserve_to) = &self.preserve_to {
            entry.delete(&self.parse_from);
            entry.set(preserve_to, value);
        }
        Ok(())
    }

    /// Pass-through of an already-typed time value (RFC 3339 string or
    /// integer epoch seconds).
    fn parse_native(&self, value: &Value) -> Result<DateTime<Utc>, TimeParseError> {
        match value {
            Value::String(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|err| TimeParseError::Invalid {
                    layout: "rfc3339".to_string(),
                    message: err.to_string(),
                }),
            Value::Number(n) => n
                .as_i64()
                .and_then(|secs| DateTime::from_timestamp(secs, 0))
                .ok_or(TimeParseError::NotAString),
            _ => Err(TimeParseError::NotAString),
        }
    }

    /// Parse a raw string against the translated layout.
    ///
    /// Layouts with a zone parse as absolute instants; zone-less layouts
    /// are interpreted in the configured location. Layouts missing the
    /// date resolve on the zero date, and layouts missing the time
    /// resolve at midnight, as the reference-layout convention has it.
    fn parse_layout(&self, raw: &str) -> Result<DateTime<Utc>, TimeParseError> {
        let layout = self.layout.as_str();
        if layout_has_zone(layout) {
            return DateTime::parse_from_str(raw, layout)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|err| self.invalid(err));
        }

        let naive = NaiveDateTime::parse_from_str(raw, layout)
            .or_else(|_| {
                NaiveDate::parse_from_str(raw, layout).map(|d| {
                    d.and_time(NaiveTime::default())
                })
            })
            .or_else(|_| {
                NaiveTime::parse_from_str(raw, layout).map(|t| zero_date().and_time(t))
            })
            .map_err(|err| self.invalid(err))?;
        self.localize(naive)
    }

    fn localize(&self, naive: NaiveDateTime) -> Result<DateTime<Utc>, TimeParseError> {
        match self.location {
            Location::Utc => Ok(Utc.from_utc_datetime(&naive)),
            Location::Local => Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc))
                .ok_or_else(|| TimeParseError::Invalid {
                    layout: self.layout.clone(),
                    message: "time does not exist in the local zone".to_string(),
                }),
        }
    }

    fn invalid(&self, err: chrono::ParseError) -> TimeParseError {
        TimeParseError::Invalid {
            layout: self.layout.clone(),
            message: err.to_string(),
        }
    }
}

/// The date used when the layout carries no date component.
fn zero_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(0, 1, 1).expect("the zero date is representable")
}

/// Whether the chrono layout contains a zone item.
fn layout_has_zone(layout: &str) -> bool {
    let mut chars = layout.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '%' {
            continue;
        }
        match chars.next() {
            Some('z') | Some('Z') => return true,
            Some(':') | Some('#') => {
                if chars.peek() == Some(&'z') {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

/// Translate a Go reference-time layout into chrono format specs.
///
/// Longest-match over the reference tokens; anything unrecognized is
/// copied through as a literal.
fn gotime_to_chrono(layout: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("2006", "%Y"),
        ("January", "%B"),
        ("Jan", "%b"),
        ("Monday", "%A"),
        ("Mon", "%a"),
        (".000000000", "%.9f"),
        (".000000", "%.6f"),
        (".000", "%.3f"),
        (".999999999", "%.f"),
        (".999999", "%.f"),
        (".999", "%.f"),
        ("15", "%H"),
        ("01", "%m"),
        ("02", "%d"),
        ("03", "%I"),
        ("04", "%M"),
        ("05", "%S"),
        ("06", "%y"),
        ("_2", "%e"),
        ("Z07:00", "%:z"),
        ("Z0700", "%z"),
        ("-07:00", "%:z"),
        ("-0700", "%z"),
        ("-07", "%#z"),
        ("MST", "%Z"),
        ("PM", "%p"),
        ("pm", "%P"),
        ("1", "%-m"),
        ("2", "%-d"),
        ("3", "%-I"),
        ("4", "%-M"),
        ("5", "%-S"),
    ];

    let mut out = String::with_capacity(layout.len() * 2);
    let mut rest = layout;
    'outer: while let Some(ch) = rest.chars().next() {
        for (token, spec) in TOKENS {
            if let Some(remaining) = rest.strip_prefix(token) {
                out.push_str(spec);
                rest = remaining;
                continue 'outer;
            }
        }
        if ch == '%' {
            out.push_str("%%");
        } else {
            out.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parser(layout_type: LayoutType, layout: &str, location: Option<&str>) -> TimeParser {
        TimeParserConfig {
            parse_from: "ts".parse().expect("valid field"),
            layout_type,
            layout: layout.to_string(),
            location: location.map(str::to_string),
            preserve_to: None,
        }
        .build("test-id")
        .expect("valid config")
    }

    #[test]
    fn translates_reference_layouts() {
        assert_eq!(gotime_to_chrono("2006-01-02 15:04:05"), "%Y-%m-%d %H:%M:%S");
        assert_eq!(gotime_to_chrono("3:04PM"), "%-I:%M%p");
        assert_eq!(gotime_to_chrono("Jan _2 15:04:05"), "%b %e %H:%M:%S");
        assert_eq!(gotime_to_chrono("2006-01-02T15:04:05Z07:00"), "%Y-%m-%dT%H:%M:%S%:z");
    }

    #[test]
    fn strptime_full_datetime_utc() {
        let parser = parser(LayoutType::Strptime, "%Y-%m-%d %H:%M:%S", Some("utc"));
        let mut entry = Entry::from_record(json!({"ts": "2024-06-01 10:30:00"}));
        parser.parse(&mut entry).expect("parses");
        assert_eq!(entry.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn gotime_kitchen_resolves_on_zero_date() {
        let parser = parser(LayoutType::Gotime, "3:04PM", Some("utc"));
        let mut entry = Entry::from_record(json!({"ts": "12:34PM"}));
        parser.parse(&mut entry).expect("parses");
        let expected = Utc.from_utc_datetime(
            &zero_date().and_time(NaiveTime::from_hms_opt(12, 34, 0).unwrap()),
        );
        assert_eq!(entry.timestamp, expected);
    }

    #[test]
    fn zone_aware_layout_keeps_instant() {
        let parser = parser(LayoutType::Strptime, "%Y-%m-%d %H:%M:%S %z", None);
        let mut entry = Entry::from_record(json!({"ts": "2024-06-01 10:30:00 +0200"}));
        parser.parse(&mut entry).expect("parses");
        assert_eq!(entry.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 8, 30, 0).unwrap());
    }

    #[test]
    fn native_passes_through_rfc3339() {
        let parser = parser(LayoutType::Native, "", None);
        let mut entry = Entry::from_record(json!({"ts": "2024-06-01T10:30:00Z"}));
        parser.parse(&mut entry).expect("parses");
        assert_eq!(entry.timestamp, Utc.with_ymd_and_hms(2024, 6, 1, 10, 30, 0).unwrap());
    }

    #[test]
    fn missing_field_is_typed_error() {
        let parser = parser(LayoutType::Strptime, "%H:%M", Some("utc"));
        let mut entry = Entry::from_record(json!({"other": 1}));
        let err = parser.parse(&mut entry).unwrap_err();
        assert!(matches!(err, TimeParseError::MissingField(_)));
        assert!(err.to_string().contains("parse_from"));
    }

    #[test]
    fn layout_required_unless_native() {
        let config = TimeParserConfig {
            parse_from: "ts".parse().unwrap(),
            layout_type: LayoutType::Strptime,
            layout: String::new(),
            location: None,
            preserve_to: None,
        };
        let err = config.build("test-id").unwrap_err();
        assert!(err.to_string().contains("layout"));

        let config = TimeParserConfig {
            parse_from: "ts".parse().unwrap(),
            layout_type: LayoutType::Native,
            layout: String::new(),
            location: None,
            preserve_to: None,
        };
        assert!(config.build("test-id").is_ok());
    }

    #[test]
    fn unsupported_location_is_rejected() {
        let config = TimeParserConfig {
            parse_from: "ts".parse().unwrap(),
            layout_type: LayoutType::Strptime,
            layout: "%H:%M".to_string(),
            location: Some("America/New_York".to_string()),
            preserve_to: None,
        };
        let err = config.build("test-id").unwrap_err();
        assert!(err.to_string().contains("location"));
    }

    #[test]
    fn preserve_to_moves_raw_value() {
        let mut parser = parser(LayoutType::Strptime, "%Y-%m-%d", Some("utc"));
        parser.preserve_to = Some("raw_ts".parse().unwrap());
        let mut entry = Entry::from_record(json!({"ts": "2024-06-01"}));
        parser.parse(&mut entry).expect("parses");
        assert_eq!(entry.get(&"ts".parse().unwrap()), None);
        assert_eq!(entry.get(&"raw_ts".parse().unwrap()), Some(json!("2024-06-01")));
    }
}
