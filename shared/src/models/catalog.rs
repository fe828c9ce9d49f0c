//! Barcode rules for catalog items

/// Length of the in-store EAN codes minted here
pub const BARCODE_LENGTH: usize = 13;

/// How a newly materialized item gets its barcode
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarcodeAssignment {
    /// Another item already carries this exact price; take over its code
    Shared(String),
    /// Freshly minted code
    Fresh(String),
}

impl BarcodeAssignment {
    /// Items priced identically share one barcode string; `mint` only runs
    /// when no such code exists
    pub fn choose<E>(
        same_price_barcode: Option<String>,
        mint: impl FnOnce() -> Result<String, E>,
    ) -> Result<Self, E> {
        match same_price_barcode {
            Some(code) => Ok(BarcodeAssignment::Shared(code)),
            None => mint().map(BarcodeAssignment::Fresh),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            BarcodeAssignment::Shared(code) | BarcodeAssignment::Fresh(code) => code,
        }
    }

    pub fn is_shared(&self) -> bool {
        matches!(self, BarcodeAssignment::Shared(_))
    }
}

/// EAN-13 check digit for the first twelve digits
pub fn ean13_check_digit(first_twelve: &str) -> Option<u32> {
    if first_twelve.len() != BARCODE_LENGTH - 1 {
        return None;
    }
    let mut sum = 0;
    for (i, c) in first_twelve.chars().enumerate() {
        let digit = c.to_digit(10)?;
        sum += if i % 2 == 0 { digit } else { digit * 3 };
    }
    Some((10 - sum % 10) % 10)
}

/// Check length, digits and check digit of an EAN-13 code
pub fn is_valid_ean13(code: &str) -> bool {
    if code.len() != BARCODE_LENGTH {
        return false;
    }
    let (body, check) = code.split_at(BARCODE_LENGTH - 1);
    match (ean13_check_digit(body), check.chars().next().and_then(|c| c.to_digit(10))) {
        (Some(expected), Some(actual)) => expected == actual,
        _ => false,
    }
}

/// Mint an in-store EAN-13 code from a numeric prefix and a random seed.
///
/// Prefixes in the `2` range are reserved for in-store use. Returns `None`
/// when the prefix is empty, too long or not numeric.
pub fn generate_barcode(prefix: &str, seed: u128) -> Option<String> {
    if prefix.is_empty()
        || prefix.len() >= BARCODE_LENGTH - 1
        || !prefix.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }
    let body_len = BARCODE_LENGTH - 1 - prefix.len();
    let modulus = 10u128.pow(body_len as u32);
    let body = format!("{}{:0width$}", prefix, seed % modulus, width = body_len);
    let check = ean13_check_digit(&body)?;
    Some(format!("{}{}", body, check))
}
