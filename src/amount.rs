//! Output amount arithmetic
//!
//! The relayer pays out `input * fill_rate`, re-scaled from the input token's
//! decimals to the output token's decimals. All arithmetic is exact: the fill
//! rate is a decimal rational and intermediates are 512-bit.

use ethereum_types::{U256, U512};

use crate::error::RelayError;

/// Decimal places accepted for a fill rate or token.
const MAX_DECIMALS: u32 = 36;

/// The relayer's payout ratio, `numerator / 10^scale`, in `(0, 1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillRate {
    numerator: U256,
    scale: u32,
}

impl FillRate {
    /// Parses a decimal string such as `"0.9"` or `"0.9995"`.
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        let text = text.trim();
        let (int_part, frac_part) = text.split_once('.').unwrap_or((text, ""));
        let all_digits = |s: &str| s.chars().all(|c| c.is_ascii_digit());
        if (int_part.is_empty() && frac_part.is_empty())
            || !all_digits(int_part)
            || !all_digits(frac_part)
        {
            return Err(RelayError::Amount(format!("invalid fill rate '{}'", text)));
        }
        let scale = frac_part.len() as u32;
        if scale > MAX_DECIMALS {
            return Err(RelayError::Amount(format!("fill rate '{}' has too many decimals", text)));
        }

        let digits = format!("{}{}", int_part, frac_part);
        let numerator = U256::from_dec_str(if digits.is_empty() { "0" } else { &digits })
            .map_err(|e| RelayError::Amount(format!("invalid fill rate '{}': {:?}", text, e)))?;
        let rate = Self { numerator, scale };

        if rate.numerator.is_zero() || rate.numerator > rate.denominator() {
            return Err(RelayError::Amount(format!(
                "fill rate '{}' must be greater than 0 and at most 1",
                text
            )));
        }
        Ok(rate)
    }

    fn denominator(&self) -> U256 {
        U256::exp10(self.scale as usize)
    }
}

impl std::fmt::Display for FillRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let digits = format!("{:0>width$}", self.numerator.to_string(), width = self.scale as usize + 1);
        let (int_part, frac_part) = digits.split_at(digits.len() - self.scale as usize);
        if frac_part.is_empty() {
            write!(f, "{}", int_part)
        } else {
            write!(f, "{}.{}", int_part, frac_part)
        }
    }
}

/// Computes `round_half_up(input / 10^decimals_in * rate * 10^decimals_out)`.
///
/// The human amount is never materialised; the whole expression is evaluated
/// as one fraction so no precision is lost for any decimals combination.
pub fn compute_output_amount(
    input_amount: U256,
    decimals_in: u8,
    decimals_out: u8,
    rate: &FillRate,
) -> Result<U256, RelayError> {
    if u32::from(decimals_in) > MAX_DECIMALS || u32::from(decimals_out) > MAX_DECIMALS {
        return Err(RelayError::Amount(format!(
            "unsupported token decimals ({} -> {})",
            decimals_in, decimals_out
        )));
    }

    let numerator = U512::from(input_amount)
        .checked_mul(U512::from(rate.numerator))
        .and_then(|n| n.checked_mul(U512::exp10(decimals_out as usize)))
        .ok_or_else(|| RelayError::Amount("output amount overflow".to_string()))?;
    let denominator = U512::from(rate.denominator()) * U512::exp10(decimals_in as usize);

    let quotient = numerator / denominator;
    let remainder = numerator % denominator;
    let rounded = if remainder * 2 >= denominator { quotient + 1 } else { quotient };

    U256::try_from(rounded).map_err(|_| RelayError::Amount("output amount exceeds uint256".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_fill_rate() {
        assert_eq!(FillRate::parse("0.9995").unwrap().to_string(), "0.9995");
        assert_eq!(FillRate::parse(".5").unwrap().to_string(), "0.5");
        assert_eq!(FillRate::parse("1").unwrap().to_string(), "1");
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert!(FillRate::parse("0").is_err());
        assert!(FillRate::parse("1.01").is_err());
        assert!(FillRate::parse("-0.9").is_err());
        assert!(FillRate::parse("abc").is_err());
        assert!(FillRate::parse("").is_err());
    }

    #[test]
    fn test_rounds_half_up() {
        let rate = FillRate::parse("1").unwrap();
        // 5 units at 1 decimal -> 0.5 whole units -> rounds to 1
        assert_eq!(compute_output_amount(U256::from(5), 1, 0, &rate).unwrap(), U256::from(1));
        assert_eq!(compute_output_amount(U256::from(4), 1, 0, &rate).unwrap(), U256::zero());
    }
}
