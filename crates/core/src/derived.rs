//! Derived-field calculation.
//!
//! Pure, deterministic functions computing values from raw section data. These are the
//! only definitions of age and body-mass index in the system; every caller (validation,
//! read projections, export) goes through them so the values cannot drift between call
//! sites.

use chrono::{Datelike, NaiveDate};

/// Computes age in whole years at `as_of`, calendar-aware.
///
/// The year difference is decremented by one if the birthday anniversary has not yet
/// occurred in the `as_of` year. A birth date in the future yields a negative value;
/// the validator rejects future birth dates before they are stored.
pub fn compute_age(birth_date: NaiveDate, as_of: NaiveDate) -> i32 {
    let mut years = as_of.year() - birth_date.year();
    let anniversary_passed = (as_of.month(), as_of.day()) >= (birth_date.month(), birth_date.day());
    if !anniversary_passed {
        years -= 1;
    }
    years
}

/// Computes body-mass index rounded to two decimal places.
///
/// Defined only when both inputs are present and height is positive; `None` otherwise.
/// Callers must treat `None` as "undefined", never as zero — collapsing missing data
/// into a numeric value would mask it as a valid extreme reading.
pub fn compute_bmi(weight_kg: Option<f64>, height_cm: Option<f64>) -> Option<f64> {
    let weight = weight_kg?;
    let height_cm = height_cm?;
    if height_cm <= 0.0 || weight <= 0.0 {
        return None;
    }
    let height_m = height_cm / 100.0;
    let bmi = weight / (height_m * height_m);
    Some((bmi * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn age_decrements_before_the_anniversary() {
        let birth = date(1990, 6, 15);
        assert_eq!(compute_age(birth, date(2024, 6, 14)), 33);
        assert_eq!(compute_age(birth, date(2024, 6, 15)), 34);
        assert_eq!(compute_age(birth, date(2024, 6, 16)), 34);
    }

    #[test]
    fn age_handles_leap_day_births() {
        let birth = date(2000, 2, 29);
        // In non-leap years the anniversary counts from 1 March.
        assert_eq!(compute_age(birth, date(2023, 2, 28)), 22);
        assert_eq!(compute_age(birth, date(2023, 3, 1)), 23);
    }

    #[test]
    fn bmi_matches_reference_value() {
        assert_eq!(compute_bmi(Some(70.0), Some(170.0)), Some(24.22));
    }

    #[test]
    fn bmi_rounds_to_two_places() {
        assert_eq!(compute_bmi(Some(80.0), Some(180.0)), Some(24.69));
    }

    #[test]
    fn bmi_is_undefined_not_zero_when_inputs_are_missing() {
        assert_eq!(compute_bmi(None, Some(170.0)), None);
        assert_eq!(compute_bmi(Some(70.0), None), None);
        assert_eq!(compute_bmi(Some(70.0), Some(0.0)), None);
        assert_eq!(compute_bmi(Some(0.0), Some(170.0)), None);
    }

    #[test]
    fn bmi_is_monotonic_in_weight_and_height() {
        let base = compute_bmi(Some(70.0), Some(170.0)).expect("defined");
        let heavier = compute_bmi(Some(75.0), Some(170.0)).expect("defined");
        let taller = compute_bmi(Some(70.0), Some(180.0)).expect("defined");
        assert!(heavier > base);
        assert!(taller < base);
    }
}
