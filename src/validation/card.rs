//! Card payload checks run before a submission consumes the one-time attempt.

use chrono::{DateTime, NaiveDate, Utc};

use super::{ValidationError, ValidationResult};

pub const PAN_MIN_DIGITS: usize = 12;
pub const PAN_MAX_DIGITS: usize = 19;

pub fn validate_luhn(pan: &str) -> ValidationResult {
    let digits: Vec<u32> = pan.chars().filter_map(|ch| ch.to_digit(10)).collect();

    if digits.len() < PAN_MIN_DIGITS || digits.len() > PAN_MAX_DIGITS {
        return Err(ValidationError::new(
            "pan",
            format!("must contain {}-{} digits", PAN_MIN_DIGITS, PAN_MAX_DIGITS),
        ));
    }

    let sum: u32 = digits
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();

    if sum % 10 != 0 {
        return Err(ValidationError::new("pan", "failed Luhn check"));
    }

    Ok(())
}

/// A card is valid through the last day of its expiry month.
pub fn validate_expiry(month: u32, year: i32, now: DateTime<Utc>) -> ValidationResult {
    if !(1..=12).contains(&month) {
        return Err(ValidationError::new("expiry_month", "must be between 1 and 12"));
    }
    if !(2000..=2100).contains(&year) {
        return Err(ValidationError::new("expiry_year", "must be between 2000 and 2100"));
    }

    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_invalid_day = NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .ok_or_else(|| ValidationError::new("expiry_year", "is not a valid date"))?;

    if now.date_naive() >= first_invalid_day {
        return Err(ValidationError::new(
            "expiry",
            format!("card expired {:02}/{}", month, year),
        ));
    }

    Ok(())
}

pub fn validate_cvv(cvv: &str) -> ValidationResult {
    if !(3..=4).contains(&cvv.len()) || !cvv.chars().all(|ch| ch.is_ascii_digit()) {
        return Err(ValidationError::new("cvv", "must be 3 or 4 digits"));
    }

    Ok(())
}

pub fn validate_card(
    pan: &str,
    expiry_month: u32,
    expiry_year: i32,
    cvv: &str,
    now: DateTime<Utc>,
) -> ValidationResult {
    validate_luhn(pan)?;
    validate_expiry(expiry_month, expiry_year, now)?;
    validate_cvv(cvv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 12, 0, 0).unwrap()
    }

    #[test]
    fn accepts_luhn_valid_pans() {
        assert!(validate_luhn("4111111111111111").is_ok());
        assert!(validate_luhn("4111 1111 1111 1111").is_ok());
        assert!(validate_luhn("5555555555554444").is_ok());
    }

    #[test]
    fn rejects_bad_pans() {
        assert!(validate_luhn("4111111111111112").is_err());
        assert!(validate_luhn("41111111").is_err());
        assert!(validate_luhn("").is_err());
        assert!(validate_luhn(&"4".repeat(20)).is_err());
    }

    #[test]
    fn expiry_is_valid_through_end_of_month() {
        let now = at(2026, 10, 31);
        assert!(validate_expiry(10, 2026, now).is_ok());
        assert!(validate_expiry(9, 2026, now).is_err());
        assert!(validate_expiry(12, 2030, now).is_ok());
    }

    #[test]
    fn expiry_rejects_out_of_range_values() {
        let now = at(2026, 1, 1);
        assert!(validate_expiry(0, 2027, now).is_err());
        assert!(validate_expiry(13, 2027, now).is_err());
        assert!(validate_expiry(5, 2101, now).is_err());
    }

    #[test]
    fn validates_cvv() {
        assert!(validate_cvv("123").is_ok());
        assert!(validate_cvv("1234").is_ok());
        assert!(validate_cvv("12").is_err());
        assert!(validate_cvv("12a").is_err());
        assert!(validate_cvv("12345").is_err());
    }

    #[test]
    fn validates_full_card() {
        let now = at(2026, 10, 14);
        assert!(validate_card("4111111111111111", 12, 2030, "123", now).is_ok());
        assert_eq!(
            validate_card("4111111111111111", 12, 2030, "1", now)
                .unwrap_err()
                .field,
            "cvv"
        );
    }
}
