//! # Quantities
//!
//! Parses Kubernetes resource quantities ("3920m", "15Gi", "1e3") into base units.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum QuantityError {
    #[error("unknown suffix {suffix:?} in quantity {quantity:?}")]
    UnknownSuffix { quantity: String, suffix: String },
    #[error("failed to parse amount in quantity {0:?}")]
    UnparseableAmount(String),
}

/// Parse a quantity into its base unit (cores for CPU, bytes for memory)
pub fn parse_quantity(quantity: &str) -> Result<f64, QuantityError> {
    let quantity = quantity.trim();
    let start_of_suffix = quantity
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
        .unwrap_or(quantity.len());
    let (amount, suffix) = quantity.split_at(start_of_suffix);

    let amount: f64 = amount
        .parse()
        .ok()
        .ok_or_else(|| QuantityError::UnparseableAmount(quantity.to_string()))?;

    let factor = match suffix {
        "" => 1.0,
        "n" => 1e-9,
        "u" => 1e-6,
        "m" => 1e-3,
        "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        "Ki" => 1024.0,
        "Mi" => 1024.0 * 1024.0,
        "Gi" => 1024.0 * 1024.0 * 1024.0,
        "Ti" => 1024.0_f64.powi(4),
        "Pi" => 1024.0_f64.powi(5),
        "Ei" => 1024.0_f64.powi(6),
        exponent if exponent.starts_with(['e', 'E']) && exponent.len() > 1 => {
            let power: i32 = exponent[1..]
                .parse()
                .ok()
                .ok_or_else(|| QuantityError::UnknownSuffix {
                    quantity: quantity.to_string(),
                    suffix: suffix.to_string(),
                })?;
            10.0_f64.powi(power)
        }
        unknown => {
            return Err(QuantityError::UnknownSuffix {
                quantity: quantity.to_string(),
                suffix: unknown.to_string(),
            })
        }
    };

    Ok(amount * factor)
}
