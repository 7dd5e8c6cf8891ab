//! Proleptic Gregorian date equations used by the compiler.
//!
//! All values are computed over `i64` so that the sentinel instants
//! (`i64::MIN`/`i64::MAX`) and the sentinel years (`i32::MIN`/`i32::MAX`)
//! can pass through without overflowing. Instant conversions saturate.

pub(crate) const MILLIS_PER_DAY: i64 = 86_400_000;

/// Computational rata die of 1970-01-01 (days from 0000-03-01).
const EPOCH_COMPUTATIONAL_RATA_DIE: i64 = 719_468;
const DAYS_IN_A_400Y_CYCLE: i64 = 146_097;

pub(crate) const fn is_leap(year: i64) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

pub(crate) const fn days_in_month(year: i64, month: u8) -> i64 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Returns the epoch days for a year, month, and day.
///
/// `day` is allowed to exceed the month's length, in which case the
/// result spills over into the following month.
pub(crate) const fn epoch_days_for_date(year: i64, month: u8, day: i64) -> i64 {
    let j = (month <= 2) as i64;
    let computational_year = year - j;
    let era = computational_year.div_euclid(400);
    let year_of_era = computational_year - era * 400;
    let computational_month = (month as i64 + 9) % 12;
    let day_of_year = (153 * computational_month + 2) / 5 + day - 1;
    let day_of_era = year_of_era * 365 + year_of_era / 4 - year_of_era / 100 + day_of_year;
    era * DAYS_IN_A_400Y_CYCLE + day_of_era - EPOCH_COMPUTATIONAL_RATA_DIE
}

/// Returns the `(year, month, day)` for the provided epoch days.
pub(crate) const fn ymd_from_epoch_days(epoch_days: i64) -> (i64, u8, u8) {
    let rata_die = epoch_days + EPOCH_COMPUTATIONAL_RATA_DIE;
    let era = rata_die.div_euclid(DAYS_IN_A_400Y_CYCLE);
    let day_of_era = rata_die - era * DAYS_IN_A_400Y_CYCLE;
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    let computational_month = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * computational_month + 2) / 5 + 1;
    let month = if computational_month < 10 {
        computational_month + 3
    } else {
        computational_month - 9
    };
    let year = year_of_era + era * 400 + (month <= 2) as i64;
    (year, month as u8, day as u8)
}

/// ISO week day for the epoch days, 1 (Monday) through 7 (Sunday).
pub(crate) const fn iso_week_day(epoch_days: i64) -> u8 {
    // 1970-01-01 was a Thursday.
    ((epoch_days + 3).rem_euclid(7) + 1) as u8
}

pub(crate) const fn epoch_days_for_millis(epoch_millis: i64) -> i64 {
    epoch_millis.div_euclid(MILLIS_PER_DAY)
}

pub(crate) const fn year_for_epoch_millis(epoch_millis: i64) -> i64 {
    ymd_from_epoch_days(epoch_days_for_millis(epoch_millis)).0
}

pub(crate) const fn epoch_millis_for_epoch_days(epoch_days: i64) -> i64 {
    epoch_days.saturating_mul(MILLIS_PER_DAY)
}

/// The instant of midnight UTC on January 1st of `year`.
pub(crate) const fn epoch_millis_for_year(year: i64) -> i64 {
    epoch_millis_for_epoch_days(epoch_days_for_date(year, 1, 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoch_date() {
        assert_eq!(epoch_days_for_date(1970, 1, 1), 0);
        assert_eq!(ymd_from_epoch_days(0), (1970, 1, 1));
        assert_eq!(ymd_from_epoch_days(-1), (1969, 12, 31));
        assert_eq!(iso_week_day(0), 4);
    }

    #[test]
    fn modern_dates() {
        assert_eq!(epoch_days_for_date(2025, 3, 29), 20176);
        assert_eq!(ymd_from_epoch_days(20176), (2025, 3, 29));
        // 2021-03-28 is a Sunday
        assert_eq!(iso_week_day(epoch_days_for_date(2021, 3, 28)), 7);
        assert_eq!(epoch_days_for_date(2024, 2, 30), epoch_days_for_date(2024, 3, 1));
    }

    #[test]
    fn year_instants() {
        assert_eq!(epoch_millis_for_year(1850), -3_786_825_600_000);
        assert_eq!(epoch_millis_for_year(2050), 2_524_608_000_000);
        assert_eq!(year_for_epoch_millis(-1), 1969);
        assert_eq!(year_for_epoch_millis(2_524_608_000_000), 2050);
    }

    #[test]
    fn extreme_values_do_not_overflow() {
        let _ = year_for_epoch_millis(i64::MIN);
        let _ = year_for_epoch_millis(i64::MAX);
        assert!(epoch_millis_for_year(i64::from(i32::MAX) + 1) > 0);
        assert!(epoch_millis_for_year(i64::from(i32::MIN)) < 0);
        assert!(!is_leap(1900));
        assert!(is_leap(2000));
    }
}
