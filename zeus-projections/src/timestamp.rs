//! Lenient timestamp handling
//!
//! On-disk entities carry timestamps in one of three shapes: full RFC3339,
//! RFC3339 with a literal `Z`, or a bare `YYYY-MM-DD` date. Reads accept
//! all three; anything else is treated as *absent*, not as an error —
//! analyzers skip entities whose dates do not apply. Writes always emit
//! RFC3339.

use chrono::{DateTime, NaiveDate, SecondsFormat, TimeZone, Utc};

/// Parse a timestamp in any accepted shape; `None` when nothing matches
pub fn parse_flexible(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }

    // RFC3339 without offset, e.g. "2025-06-01T12:00:00"
    if let Ok(naive) = chrono::NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }

    None
}

/// Canonical emission format
pub fn to_rfc3339(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Snapshot file names embed the timestamp with `:` and `+` replaced by `-`
pub fn sanitize_for_filename(value: &DateTime<Utc>) -> String {
    to_rfc3339(value).replace([':', '+'], "-")
}

/// Serde adapter for optional lenient timestamps.
///
/// Use with `#[serde(default, with = "timestamp::lenient")]`: missing,
/// null and unparseable values all read as `None`; `Some` writes RFC3339.
pub mod lenient {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(ts) => serializer.serialize_str(&to_rfc3339(ts)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(parse_flexible))
    }
}

/// Serde adapter for required lenient timestamps (snapshots)
pub mod lenient_required {
    use super::*;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&to_rfc3339(value))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse_flexible(&raw)
            .ok_or_else(|| D::Error::custom(format!("unrecognized timestamp: {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn accepts_the_three_shapes() {
        let full = parse_flexible("2025-06-01T12:30:00+02:00").unwrap();
        assert_eq!(full.hour(), 10);

        let zulu = parse_flexible("2025-06-01T12:30:00Z").unwrap();
        assert_eq!(zulu.hour(), 12);

        let date_only = parse_flexible("2025-06-01").unwrap();
        assert_eq!(date_only.hour(), 0);
    }

    #[test]
    fn garbage_reads_as_absent() {
        assert!(parse_flexible("").is_none());
        assert!(parse_flexible("tomorrow").is_none());
        assert!(parse_flexible("01/06/2025").is_none());
    }

    #[test]
    fn filename_sanitization_strips_reserved_chars() {
        let ts = parse_flexible("2025-06-01T12:30:00Z").unwrap();
        let name = sanitize_for_filename(&ts);
        assert!(!name.contains(':'));
        assert!(!name.contains('+'));
        assert_eq!(name, "2025-06-01T12-30-00Z");
    }

    #[test]
    fn emission_is_rfc3339() {
        let ts = parse_flexible("2025-06-01").unwrap();
        assert_eq!(to_rfc3339(&ts), "2025-06-01T00:00:00Z");
    }
}
