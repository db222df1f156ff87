use bigdecimal::BigDecimal;
use num_traits::FromPrimitive;

/// Monetary amounts are kept to two decimal places. `None` for NaN and infinities.
pub fn money_from_f64(value: f64) -> Option<BigDecimal> {
    BigDecimal::from_f64(value).map(|amount| amount.round(2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn rounds_to_cents() {
        let amount = money_from_f64(149.999).unwrap();
        assert_eq!(amount, BigDecimal::from_str("150.00").unwrap());
    }

    #[test]
    fn rejects_non_finite() {
        assert!(money_from_f64(f64::NAN).is_none());
        assert!(money_from_f64(f64::INFINITY).is_none());
    }
}
