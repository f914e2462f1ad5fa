use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

/// This is the standard way of converting a date to a string understood by the graph service.
pub fn date_to_graph_name(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Calendar date an instant falls on in `tz`.
pub fn date_of<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    instant.with_timezone(tz).date_naive()
}

/// Returns the instant of local midnight for the day containing `instant`.
///
/// `00:00:00.000` belongs to the new day, the millisecond before it to the previous one. When
/// midnight is skipped by a DST transition the first local instant that exists on that day is
/// used, and when it is repeated the earliest one wins.
pub fn start_of_day<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    midnight_of(date_of(instant, tz), tz)
}

/// Returns start of the day following the one containing `instant`.
pub fn next_day_start<Tz: TimeZone>(instant: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
    let date = date_of(instant, tz);
    midnight_of(date.succ_opt().unwrap_or(date), tz)
}

fn midnight_of<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    if let Some(v) = tz.from_local_datetime(&naive).earliest() {
        return v.with_timezone(&Utc);
    }

    // Midnight falls into a gap. Gaps are never longer than a few hours, walk forward a minute
    // at a time until local time exists again.
    (1..=24 * 60)
        .find_map(|minutes| {
            tz.from_local_datetime(&(naive + Duration::minutes(minutes)))
                .earliest()
        })
        .map(|v| v.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}


#[cfg(test)]
mod day_boundary_tests {
    use chrono::{FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::{
        date_of, date_to_graph_name, next_day_start, start_of_day, test_zone::ShiftingZone,
    };

    const TEST_DATE: NaiveDate = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();

    fn utc(date: NaiveDate, h: u32, m: u32, s: u32, ms: u32) -> chrono::DateTime<Utc> {
        Utc.from_utc_datetime(&NaiveDateTime::new(
            date,
            NaiveTime::from_hms_milli_opt(h, m, s, ms).unwrap(),
        ))
    }

    #[test]
    fn test_start_of_day_utc() {
        let start = start_of_day(utc(TEST_DATE, 13, 45, 12, 500), &Utc);
        assert_eq!(start, utc(TEST_DATE, 0, 0, 0, 0));
    }

    #[test]
    fn test_start_of_day_edges() {
        let midnight = utc(TEST_DATE, 0, 0, 0, 0);
        assert_eq!(start_of_day(midnight, &Utc), midnight);

        let last_ms = utc(TEST_DATE, 23, 59, 59, 999);
        assert_eq!(start_of_day(last_ms, &Utc), midnight);

        let next = utc(TEST_DATE.succ_opt().unwrap(), 0, 0, 0, 0);
        assert_eq!(start_of_day(next, &Utc), next);
    }

    #[test]
    fn test_start_of_day_with_offset() {
        // 2024-01-01T20:00Z is already 2024-01-02T05:00 in UTC+9.
        let tokyo = FixedOffset::east_opt(9 * 3600).unwrap();
        let start = start_of_day(utc(TEST_DATE, 20, 0, 0, 0), &tokyo);
        assert_eq!(start, utc(TEST_DATE, 15, 0, 0, 0));
        assert_eq!(
            date_of(utc(TEST_DATE, 20, 0, 0, 0), &tokyo),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
    }

    #[test]
    fn test_next_day_start() {
        let next = next_day_start(utc(TEST_DATE, 23, 55, 0, 0), &Utc);
        assert_eq!(next, utc(TEST_DATE.succ_opt().unwrap(), 0, 0, 0, 0));
    }

    #[test]
    fn test_start_of_day_when_midnight_is_skipped() {
        // Clocks jump from 00:00 (UTC-3) straight to 01:00 (UTC-2).
        let zone = ShiftingZone::new(TEST_DATE.and_hms_opt(3, 0, 0).unwrap(), -3, -2);
        let first_instant = utc(TEST_DATE, 3, 0, 0, 0);

        assert_eq!(start_of_day(utc(TEST_DATE, 12, 0, 0, 0), &zone), first_instant);
        assert_eq!(start_of_day(first_instant, &zone), first_instant);

        // 23:59 of the previous local day.
        let before = utc(TEST_DATE, 2, 59, 0, 0);
        assert_eq!(date_of(before, &zone), NaiveDate::from_ymd_opt(2023, 12, 31).unwrap());
        assert_eq!(next_day_start(before, &zone), first_instant);
    }

    #[test]
    fn test_start_of_day_when_midnight_repeats() {
        // At 01:00 (UTC-4) clocks go back to 00:00 (UTC-5), so midnight happens twice.
        let zone = ShiftingZone::new(TEST_DATE.and_hms_opt(5, 0, 0).unwrap(), -4, -5);
        let first_midnight = utc(TEST_DATE, 4, 0, 0, 0);

        assert_eq!(start_of_day(utc(TEST_DATE, 17, 0, 0, 0), &zone), first_midnight);
        // 00:30 on the second pass still belongs to the same day.
        assert_eq!(start_of_day(utc(TEST_DATE, 5, 30, 0, 0), &zone), first_midnight);
        assert_eq!(
            next_day_start(utc(TEST_DATE, 3, 0, 0, 0), &zone),
            first_midnight
        );
    }

    #[test]
    fn test_graph_date_format() {
        assert_eq!(date_to_graph_name(TEST_DATE), "2024-01-01");
    }
}
