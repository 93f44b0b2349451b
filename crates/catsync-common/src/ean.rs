//! EAN-13 barcodes for internally issued codes
//!
//! When the ERP does not supply a barcode for a variant, one is derived from the
//! local product and variant identifiers:
//!
//! ```text
//! 2 PPPPPP VVVVV C
//! | |      |     +-- check digit (weighted mod-10)
//! | |      +-------- variant id mod 100_000, zero padded
//! | +--------------- product id mod 1_000_000, zero padded
//! +----------------- prefix reserved for codes not registered with GS1
//! ```
//!
//! A code is a pure function of the two identifiers and can be recomputed at
//! any time.

use crate::error::{CatsyncError, Result};

/// Total length of an EAN-13 code
pub const EAN13_LENGTH: usize = 13;

/// Leading digit of internally issued codes
pub const INTERNAL_PREFIX: char = '2';

const PAYLOAD_LENGTH: usize = EAN13_LENGTH - 1;
const PRODUCT_MODULUS: u64 = 1_000_000;
const VARIANT_MODULUS: u64 = 100_000;

/// Generate the internal EAN-13 code for a product/variant pair
///
/// Identifiers wider than the reserved digits are truncated by modulus, so two
/// pairs only share a code when both identifiers collide after truncation.
pub fn generate(product_id: u64, variant_id: u64) -> String {
    let payload = format!(
        "{INTERNAL_PREFIX}{:06}{:05}",
        product_id % PRODUCT_MODULUS,
        variant_id % VARIANT_MODULUS
    );
    let check = weighted_check_digit(payload.as_bytes());
    format!("{payload}{check}")
}

/// Compute the check digit for a 12-digit payload
///
/// Digits at odd positions (1-indexed from the left) weigh 3, digits at even
/// positions weigh 1. The check digit is `(10 - sum mod 10) mod 10`.
pub fn calculate_check_digit(payload: &str) -> Result<u8> {
    if payload.len() != PAYLOAD_LENGTH {
        return Err(CatsyncError::InvalidBarcode(format!(
            "expected {} digits, got {}",
            PAYLOAD_LENGTH,
            payload.len()
        )));
    }

    if !payload.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CatsyncError::InvalidBarcode(format!(
            "payload contains non-digit characters: {:?}",
            payload
        )));
    }

    Ok(weighted_check_digit(payload.as_bytes()))
}

/// Check whether `code` is a well-formed EAN-13 under this scheme
pub fn is_valid(code: &str) -> bool {
    if code.len() != EAN13_LENGTH || !code.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }

    let (payload, check) = code.split_at(PAYLOAD_LENGTH);
    match calculate_check_digit(payload) {
        Ok(expected) => check.as_bytes()[0] - b'0' == expected,
        Err(_) => false,
    }
}

/// Caller guarantees every byte is an ASCII digit.
fn weighted_check_digit(digits: &[u8]) -> u8 {
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(index, byte)| {
            let digit = u32::from(byte - b'0');
            if index % 2 == 0 {
                digit * 3
            } else {
                digit
            }
        })
        .sum();

    ((10 - sum % 10) % 10) as u8
}
