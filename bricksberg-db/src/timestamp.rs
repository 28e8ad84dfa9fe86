//! Timestamp encoding shared by the job and lock tables.
//!
//! Stored as RFC 3339 UTC with millisecond precision, which sorts correctly
//! as text.

use chrono::{DateTime, SecondsFormat, Utc};

use crate::operations::OperationError;

pub(crate) fn encode(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn decode(field: &str, value: &str) -> Result<DateTime<Utc>, OperationError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| OperationError::invalid(field, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn encoded_timestamps_sort_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 3, 9, 23, 59, 59).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap();
        assert!(encode(early) < encode(late));
        assert_eq!(decode("t", &encode(late)).unwrap(), late);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("last_activity", "yesterday").is_err());
    }
}
