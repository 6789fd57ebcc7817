//! Formatting helpers for the statistics snapshot consumed by the
//! visualization client. Field formats are part of the wire contract.

/// `numerator / denominator` as a percentage with two decimals and a
/// trailing `%`. A zero denominator renders `"0%"`.
pub fn percentage(numerator: u64, denominator: u64) -> String {
    if denominator == 0 {
        return "0%".to_string();
    }
    format!("{:.2}%", numerator as f64 / denominator as f64 * 100.0)
}

/// Plain decimal with two places, `"0.00"` when `denominator` is zero.
pub fn decimal(numerator: u64, denominator: u64) -> String {
    if denominator == 0 {
        return "0.00".to_string();
    }
    format!("{:.2}", numerator as f64 / denominator as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_formats_two_places() {
        assert_eq!(percentage(1, 3), "33.33%");
        assert_eq!(percentage(2, 2), "100.00%");
        assert_eq!(percentage(0, 5), "0.00%");
    }

    #[test]
    fn zero_denominator() {
        assert_eq!(percentage(0, 0), "0%");
        assert_eq!(decimal(0, 0), "0.00");
        assert_eq!(decimal(7, 4), "1.75");
    }
}
