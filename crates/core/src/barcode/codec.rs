//! Barcode string format.
//!
//! A barcode is `REX` + two-digit year + random symbols drawn from the
//! configured alphabet, e.g. `REX25K7M2QX9PZ4HB`. The format is persisted and
//! printed on packaging, so it must stay stable across versions.

use chrono::Datelike;

use crate::config::GeneratorConfig;
use crate::types::Timestamp;

/// Fixed prefix of every barcode.
pub const BARCODE_PREFIX: &str = "REX";

/// Number of year digits following the prefix.
pub const YEAR_DIGITS: usize = 2;

/// Why a string is not a well-formed barcode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BarcodeFormatError {
    #[error("expected {expected} characters, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("barcode must start with 'REX'")]
    Prefix,

    #[error("year part '{0}' is not numeric")]
    Year(String),

    #[error("character '{character}' at position {position} is not in the barcode alphabet")]
    Character { character: char, position: usize },
}

/// The components of a validated barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBarcode {
    /// Last two digits of the generation year.
    pub year: u8,
    /// The random symbols.
    pub random: String,
}

/// Formats, parses and validates barcode strings for one alphabet.
#[derive(Debug, Clone)]
pub struct BarcodeCodec {
    alphabet: Vec<char>,
    random_length: usize,
}

impl BarcodeCodec {
    pub fn new(config: &GeneratorConfig) -> Self {
        Self {
            alphabet: config.alphabet().to_vec(),
            random_length: config.random_length(),
        }
    }

    /// Total length of a barcode string.
    pub fn barcode_length(&self) -> usize {
        BARCODE_PREFIX.len() + YEAR_DIGITS + self.random_length
    }

    pub fn random_length(&self) -> usize {
        self.random_length
    }

    /// Map raw entropy bytes onto the alphabet, one symbol per byte.
    ///
    /// With a 32-symbol alphabet `256 % 32 == 0`, so the fold is unbiased.
    pub fn encode_random(&self, bytes: &[u8]) -> String {
        let len = self.alphabet.len();
        bytes
            .iter()
            .map(|b| self.alphabet[*b as usize % len])
            .collect()
    }

    /// Compose a barcode from the generation time and a random part.
    pub fn format(&self, now: Timestamp, random: &str) -> String {
        format!("{BARCODE_PREFIX}{:02}{random}", year_suffix(now))
    }

    /// Parse a barcode, reporting the first rule it breaks.
    pub fn parse(&self, s: &str) -> Result<ParsedBarcode, BarcodeFormatError> {
        let chars: Vec<char> = s.chars().collect();
        let expected = self.barcode_length();
        if chars.len() != expected {
            return Err(BarcodeFormatError::Length {
                expected,
                actual: chars.len(),
            });
        }

        if !s.starts_with(BARCODE_PREFIX) {
            return Err(BarcodeFormatError::Prefix);
        }

        let year_start = BARCODE_PREFIX.len();
        let year_part: String = chars[year_start..year_start + YEAR_DIGITS].iter().collect();
        if !year_part.chars().all(|c| c.is_ascii_digit()) {
            return Err(BarcodeFormatError::Year(year_part));
        }
        let year: u8 = year_part
            .parse()
            .map_err(|_| BarcodeFormatError::Year(year_part.clone()))?;

        let random_start = year_start + YEAR_DIGITS;
        for (offset, c) in chars[random_start..].iter().enumerate() {
            if !self.alphabet.contains(c) {
                return Err(BarcodeFormatError::Character {
                    character: *c,
                    position: random_start + offset,
                });
            }
        }

        Ok(ParsedBarcode {
            year,
            random: chars[random_start..].iter().collect(),
        })
    }

    /// Check that `s` is a well-formed barcode.
    pub fn validate(&self, s: &str) -> Result<(), BarcodeFormatError> {
        self.parse(s).map(|_| ())
    }

    /// Clean up scanner or keyboard input before validation.
    pub fn normalize(input: &str) -> String {
        input.trim().to_ascii_uppercase()
    }

    /// Deep link encoded into the printed QR code.
    pub fn qr_payload(host: &str, barcode: &str) -> String {
        format!("https://warranty.{host}/claim/{barcode}")
    }
}

impl Default for BarcodeCodec {
    fn default() -> Self {
        Self::new(&GeneratorConfig::default())
    }
}

/// Last two digits of the year of `ts`.
pub fn year_suffix(ts: Timestamp) -> u8 {
    ts.year().rem_euclid(100) as u8
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::{TimeZone, Utc};

    use super::*;

    fn at_year(year: i32) -> Timestamp {
        Utc.with_ymd_and_hms(year, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn format_concatenates_prefix_year_and_random() {
        let codec = BarcodeCodec::default();
        assert_eq!(
            codec.format(at_year(2025), "ABCDEFGHJKLM"),
            "REX25ABCDEFGHJKLM"
        );
    }

    #[test]
    fn year_is_zero_padded() {
        let codec = BarcodeCodec::default();
        assert!(codec.format(at_year(2105), "ABCDEFGHJKLM").starts_with("REX05"));
    }

    #[test]
    fn encode_random_folds_bytes_onto_alphabet() {
        let codec = BarcodeCodec::default();
        // 0 -> 'A', 31 -> '9', 32 wraps back to 'A', 255 -> '9'.
        assert_eq!(codec.encode_random(&[0, 31, 32, 255]), "A9A9");
    }

    #[test]
    fn parse_round_trips_with_format() {
        let codec = BarcodeCodec::default();
        let barcode = codec.format(at_year(2024), "Z23456789ABC");
        let parsed = codec.parse(&barcode).unwrap();
        assert_eq!(parsed.year, 24);
        assert_eq!(codec.format(at_year(2024), &parsed.random), barcode);
    }

    #[test]
    fn wrong_length_rejected() {
        let codec = BarcodeCodec::default();
        assert_matches!(
            codec.validate("REX25ABC"),
            Err(BarcodeFormatError::Length {
                expected: 17,
                actual: 8
            })
        );
    }

    #[test]
    fn wrong_prefix_rejected() {
        let codec = BarcodeCodec::default();
        assert_matches!(
            codec.validate("ABC25ABCDEFGHJKLM"),
            Err(BarcodeFormatError::Prefix)
        );
    }

    #[test]
    fn non_numeric_year_rejected() {
        let codec = BarcodeCodec::default();
        assert_matches!(
            codec.validate("REXA5ABCDEFGHJKLM"),
            Err(BarcodeFormatError::Year(y)) if y == "A5"
        );
    }

    #[test]
    fn confusable_character_rejected() {
        let codec = BarcodeCodec::default();
        assert_matches!(
            codec.validate("REX25ABCDEFGHIKLM"),
            Err(BarcodeFormatError::Character {
                character: 'I',
                position: 13
            })
        );
        assert!(codec.validate("REX25ABCDEFGH0KLM").is_err());
        assert!(codec.validate("REX25abcdefghjklm").is_err());
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(
            BarcodeCodec::normalize("  rex25abcdefghjklm\n"),
            "REX25ABCDEFGHJKLM"
        );
    }

    #[test]
    fn qr_payload_uses_injected_host() {
        assert_eq!(
            BarcodeCodec::qr_payload("shop.example", "REX25ABCDEFGHJKLM"),
            "https://warranty.shop.example/claim/REX25ABCDEFGHJKLM"
        );
    }

    #[test]
    fn multibyte_input_reports_length_in_characters() {
        let codec = BarcodeCodec::default();
        assert_matches!(
            codec.validate("REX25ÄBCDEFGHJKLM"),
            Err(BarcodeFormatError::Character { character: 'Ä', .. })
        );
    }
}
