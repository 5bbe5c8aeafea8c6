use chrono::{Datelike, Duration, NaiveDate, Weekday};

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Move `days` business days forward, skipping Saturdays and Sundays.
///
/// Zero days on a weekend rolls forward to Monday.
pub fn add_business_days(start: NaiveDate, days: u32) -> NaiveDate {
    let mut date = start;
    if days == 0 {
        while is_weekend(date) {
            date += Duration::days(1);
        }
        return date;
    }

    let mut remaining = days;
    while remaining > 0 {
        date += Duration::days(1);
        if !is_weekend(date) {
            remaining -= 1;
        }
    }
    date
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn weekday_plus_one() {
        // Thursday -> Friday
        assert_eq!(add_business_days(d(2017, 8, 10), 1), d(2017, 8, 11));
    }

    #[test]
    fn friday_skips_weekend() {
        assert_eq!(add_business_days(d(2017, 8, 11), 1), d(2017, 8, 14));
        assert_eq!(add_business_days(d(2017, 8, 11), 3), d(2017, 8, 16));
    }

    #[test]
    fn saturday_start_lands_on_monday() {
        assert_eq!(add_business_days(d(2017, 8, 12), 1), d(2017, 8, 14));
    }

    #[test]
    fn ten_days_spans_two_weekends() {
        assert_eq!(add_business_days(d(2017, 8, 7), 10), d(2017, 8, 21));
    }

    #[test]
    fn zero_days() {
        assert_eq!(add_business_days(d(2017, 8, 9), 0), d(2017, 8, 9));
        assert_eq!(add_business_days(d(2017, 8, 13), 0), d(2017, 8, 14));
    }
}
