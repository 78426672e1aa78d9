//! Calendar arithmetic for bucketing reports by day and month.

use time::{Date, Month};

/// Formats a date as its `YYYY-MM` month key.
pub(super) fn month_key(date: Date) -> String {
    format!("{:04}-{:02}", date.year(), u8::from(date.month()))
}

/// Adds `months` to a date, rolling over year boundaries in either
/// direction and clamping the day to the length of the target month
/// (e.g. 31 January + 1 month = 28 or 29 February).
pub(super) fn month_add(date: Date, months: i32) -> Date {
    let zero_based_month = date.year() * 12 + i32::from(u8::from(date.month())) - 1 + months;
    let year = zero_based_month.div_euclid(12);
    let month = Month::try_from((zero_based_month.rem_euclid(12) + 1) as u8).unwrap();
    let day = date.day().min(month.length(year));

    Date::from_calendar_date(year, month, day).unwrap()
}

/// The first day of the month `date` falls in.
pub(super) fn start_of_month(date: Date) -> Date {
    date.replace_day(1).unwrap()
}

/// The last day of the month `date` falls in.
pub(super) fn end_of_month(date: Date) -> Date {
    date.replace_day(date.month().length(date.year())).unwrap()
}

/// The trailing `n` month keys in chronological order, ending with the
/// month `today` falls in.
pub(super) fn last_n_month_keys(n: usize, today: Date) -> Vec<String> {
    let mut keys = Vec::with_capacity(n);
    let mut current = start_of_month(today);

    for _ in 0..n {
        keys.push(month_key(current));
        current = month_add(current, -1);
    }

    keys.reverse();
    keys
}

/// The `YYYY-MM` key of the month after the one `today` falls in.
pub(super) fn next_month_key(today: Date) -> String {
    month_key(month_add(start_of_month(today), 1))
}

/// Every date from `start` through `end`, inclusive.
pub(super) fn date_range(start: Date, end: Date) -> Vec<Date> {
    let mut dates = Vec::new();
    let mut current = start;

    while current <= end {
        dates.push(current);
        current = current.next_day().unwrap();
    }

    dates
}

#[cfg(test)]
mod calendar_tests {
    use time::macros::date;

    use super::{date_range, end_of_month, last_n_month_keys, month_add, month_key, next_month_key};

    #[test]
    fn month_key_pads_year_and_month() {
        assert_eq!(month_key(date!(2025 - 08 - 25)), "2025-08");
        assert_eq!(month_key(date!(987 - 01 - 01)), "0987-01");
    }

    #[test]
    fn month_add_rolls_over_year_boundaries() {
        assert_eq!(month_add(date!(2024 - 11 - 15), 3), date!(2025 - 02 - 15));
        assert_eq!(month_add(date!(2025 - 01 - 15), -1), date!(2024 - 12 - 15));
        assert_eq!(month_add(date!(2025 - 03 - 15), -15), date!(2023 - 12 - 15));
    }

    #[test]
    fn month_add_clamps_day_to_target_month_length() {
        assert_eq!(month_add(date!(2024 - 01 - 31), 1), date!(2024 - 02 - 29));
        assert_eq!(month_add(date!(2023 - 01 - 31), 1), date!(2023 - 02 - 28));
        assert_eq!(month_add(date!(2024 - 03 - 31), -1), date!(2024 - 02 - 29));
        assert_eq!(month_add(date!(2024 - 05 - 31), 1), date!(2024 - 06 - 30));
    }

    #[test]
    fn last_n_month_keys_crosses_january_backwards() {
        let keys = last_n_month_keys(3, date!(2025 - 01 - 20));

        assert_eq!(keys, vec!["2024-11", "2024-12", "2025-01"]);
    }

    #[test]
    fn last_n_month_keys_ends_with_current_month() {
        let keys = last_n_month_keys(12, date!(2024 - 06 - 01));

        assert_eq!(keys.len(), 12);
        assert_eq!(keys.first().map(String::as_str), Some("2023-07"));
        assert_eq!(keys.last().map(String::as_str), Some("2024-06"));
    }

    #[test]
    fn next_month_key_rolls_over_december() {
        assert_eq!(next_month_key(date!(2024 - 12 - 31)), "2025-01");
        assert_eq!(next_month_key(date!(2025 - 08 - 25)), "2025-09");
    }

    #[test]
    fn end_of_month_handles_leap_years() {
        assert_eq!(end_of_month(date!(2024 - 02 - 10)), date!(2024 - 02 - 29));
        assert_eq!(end_of_month(date!(2023 - 02 - 10)), date!(2023 - 02 - 28));
        assert_eq!(end_of_month(date!(2025 - 08 - 01)), date!(2025 - 08 - 31));
    }

    #[test]
    fn date_range_is_inclusive_of_both_ends() {
        let range = date_range(date!(2025 - 02 - 27), date!(2025 - 03 - 02));

        assert_eq!(
            range,
            vec![
                date!(2025 - 02 - 27),
                date!(2025 - 02 - 28),
                date!(2025 - 03 - 01),
                date!(2025 - 03 - 02),
            ]
        );
    }

    #[test]
    fn date_range_with_inverted_bounds_is_empty() {
        assert!(date_range(date!(2025 - 03 - 02), date!(2025 - 02 - 27)).is_empty());
    }
}
