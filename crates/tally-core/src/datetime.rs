use chrono::{DateTime, Days, Months, NaiveDate, NaiveTime, Utc};

use anyhow::anyhow;

/// Serde bridge between in-memory `DateTime<Utc>` values and the epoch
/// millisecond integers the persisted blob uses.
pub mod epoch_millis_serde {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i64(value.timestamp_millis())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = i64::deserialize(deserializer)?;
        DateTime::<Utc>::from_timestamp_millis(millis)
            .ok_or_else(|| serde::de::Error::custom(format!("timestamp out of range: {millis}")))
    }

    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(
            value: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(date) => serializer.serialize_some(&date.timestamp_millis()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            match Option::<i64>::deserialize(deserializer)? {
                None => Ok(None),
                Some(millis) => DateTime::<Utc>::from_timestamp_millis(millis)
                    .map(Some)
                    .ok_or_else(|| {
                        serde::de::Error::custom(format!("timestamp out of range: {millis}"))
                    }),
            }
        }
    }
}

pub fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Parses a due-date expression: `today`, `tomorrow`, `YYYY-MM-DD`,
/// RFC 3339, or a relative offset like `+3d`, `+2w`, `+1m`.
pub fn parse_due_expr(input: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("empty date expression"));
    }

    match trimmed.to_ascii_lowercase().as_str() {
        "today" => return Ok(start_of_day(now)),
        "tomorrow" => {
            return start_of_day(now)
                .checked_add_days(Days::new(1))
                .ok_or_else(|| anyhow!("date out of range"));
        }
        _ => {}
    }

    if let Some(offset) = trimmed.strip_prefix('+') {
        return parse_offset(offset, now);
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(parsed.with_timezone(&Utc));
    }

    Err(anyhow!("unrecognized date expression: {input}"))
}

fn parse_offset(offset: &str, now: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    let unit = offset
        .chars()
        .last()
        .ok_or_else(|| anyhow!("empty date offset"))?;
    let count: u32 = offset[..offset.len() - unit.len_utf8()]
        .parse()
        .map_err(|_| anyhow!("invalid date offset: +{offset}"))?;

    let next = match unit.to_ascii_lowercase() {
        'd' => now.checked_add_days(Days::new(u64::from(count))),
        'w' => now.checked_add_days(Days::new(u64::from(count) * 7)),
        'm' => now.checked_add_months(Months::new(count)),
        other => return Err(anyhow!("unknown date offset unit: {other}")),
    };

    next.ok_or_else(|| anyhow!("date out of range: +{offset}"))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::parse_due_expr;

    #[test]
    fn parses_iso_date_at_midnight() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 10, 15, 30, 0)
            .single()
            .expect("valid now");
        let parsed = parse_due_expr("2026-04-01", now).expect("parse iso date");
        assert_eq!(parsed.to_rfc3339(), "2026-04-01T00:00:00+00:00");
    }

    #[test]
    fn parses_today_and_tomorrow() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 10, 15, 30, 0)
            .single()
            .expect("valid now");

        let today = parse_due_expr("today", now).expect("parse today");
        assert_eq!(today.to_rfc3339(), "2026-03-10T00:00:00+00:00");

        let tomorrow = parse_due_expr("Tomorrow", now).expect("parse tomorrow");
        assert_eq!(tomorrow.to_rfc3339(), "2026-03-11T00:00:00+00:00");
    }

    #[test]
    fn parses_relative_offsets() {
        let now = Utc
            .with_ymd_and_hms(2026, 1, 31, 12, 0, 0)
            .single()
            .expect("valid now");

        let in_two_weeks = parse_due_expr("+2w", now).expect("parse +2w");
        assert_eq!(in_two_weeks.to_rfc3339(), "2026-02-14T12:00:00+00:00");

        // Month offsets clamp to the last valid day.
        let next_month = parse_due_expr("+1m", now).expect("parse +1m");
        assert_eq!(next_month.to_rfc3339(), "2026-02-28T12:00:00+00:00");
    }

    #[test]
    fn rejects_garbage() {
        let now = Utc
            .with_ymd_and_hms(2026, 3, 10, 15, 30, 0)
            .single()
            .expect("valid now");
        assert!(parse_due_expr("someday", now).is_err());
        assert!(parse_due_expr("+xd", now).is_err());
    }
}
