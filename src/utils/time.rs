use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};

/// Current UTC time at the precision Postgres stores.
pub fn now() -> NaiveDateTime {
    Utc::now().naive_utc().trunc_subsecs(6)
}

pub fn to_iso(dt: NaiveDateTime) -> String {
    DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc).to_rfc3339()
}

pub fn opt_iso(dt: Option<NaiveDateTime>) -> Option<String> {
    dt.map(to_iso)
}

pub fn naive(dt: Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
    dt.map(|value| value.naive_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Timelike};

    #[test]
    fn renders_utc_offset() {
        let dt = NaiveDate::from_ymd_opt(2024, 6, 1)
            .unwrap()
            .and_hms_opt(9, 0, 0)
            .unwrap();
        assert_eq!(to_iso(dt), "2024-06-01T09:00:00+00:00");
    }

    #[test]
    fn now_has_microsecond_precision() {
        assert_eq!(now().nanosecond() % 1_000, 0);
    }
}
