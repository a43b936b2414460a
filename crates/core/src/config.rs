//! Warranty engine configuration.
//!
//! [`GeneratorConfig`] is validated once at construction and is immutable
//! afterwards. [`WarrantyConfig`] bundles it with the remaining knobs and can
//! be loaded from environment variables.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Symbols used for the random part of a barcode (`I`, `O`, `1`, `0` excluded).
pub const DEFAULT_ALPHABET: &str = "ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Characters that are easily misread on printed packaging.
pub const CONFUSABLE_CHARS: &[char] = &['I', 'O', '1', '0'];

/// Number of random symbols in a barcode.
pub const DEFAULT_RANDOM_LENGTH: usize = 12;

/// Total candidate draws allowed per barcode before giving up.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Collision rate (percent) above which generation is worth monitoring.
pub const DEFAULT_COLLISION_WARN_PCT: f64 = 0.01;

/// Collision rate (percent) above which the algorithm must be reviewed.
pub const DEFAULT_COLLISION_CRITICAL_PCT: f64 = 0.1;

/// Largest batch a seller may request in a single run.
pub const DEFAULT_MAX_BATCH_QUANTITY: u32 = 10_000;

/// Width of the zero-padded sequence in claim numbers.
pub const DEFAULT_CLAIM_NUMBER_PADDING: usize = 6;

/// Host used for QR deep links when none is configured.
pub const DEFAULT_QR_HOST: &str = "localhost";

/// The alphabet must be exactly this size so a byte folds into it without bias.
const REQUIRED_ALPHABET_LEN: usize = 32;

// ---------------------------------------------------------------------------
// GeneratorConfig
// ---------------------------------------------------------------------------

/// Parameters of the secure barcode generator.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    alphabet: Vec<char>,
    random_length: usize,
    max_retries: u32,
    collision_warn_pct: f64,
    collision_critical_pct: f64,
}

impl GeneratorConfig {
    /// Build a validated generator configuration.
    ///
    /// Rules:
    /// - The alphabet has exactly 32 distinct uppercase ASCII alphanumerics.
    /// - The alphabet contains none of the confusable characters.
    /// - `random_length` and `max_retries` are at least 1.
    /// - `0 <= warn < critical`.
    pub fn new(
        alphabet: &str,
        random_length: usize,
        max_retries: u32,
        collision_warn_pct: f64,
        collision_critical_pct: f64,
    ) -> Result<Self, CoreError> {
        let symbols: Vec<char> = alphabet.chars().collect();

        if symbols.len() != REQUIRED_ALPHABET_LEN {
            return Err(CoreError::Validation(format!(
                "Barcode alphabet must have exactly {REQUIRED_ALPHABET_LEN} symbols (got {})",
                symbols.len()
            )));
        }
        if let Some(c) = symbols
            .iter()
            .find(|c| !(c.is_ascii_uppercase() || c.is_ascii_digit()))
        {
            return Err(CoreError::Validation(format!(
                "Barcode alphabet contains unsupported symbol '{c}'"
            )));
        }
        if let Some(c) = symbols.iter().find(|c| CONFUSABLE_CHARS.contains(c)) {
            return Err(CoreError::Validation(format!(
                "Barcode alphabet must not contain confusable symbol '{c}'"
            )));
        }
        let mut sorted = symbols.clone();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() != symbols.len() {
            return Err(CoreError::Validation(
                "Barcode alphabet must not repeat symbols".to_string(),
            ));
        }
        if random_length == 0 {
            return Err(CoreError::Validation(
                "Barcode random length must be at least 1".to_string(),
            ));
        }
        if max_retries == 0 {
            return Err(CoreError::Validation(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if !(collision_warn_pct >= 0.0 && collision_warn_pct < collision_critical_pct) {
            return Err(CoreError::Validation(format!(
                "Collision thresholds must satisfy 0 <= warn < critical (got {collision_warn_pct}, {collision_critical_pct})"
            )));
        }

        Ok(Self {
            alphabet: symbols,
            random_length,
            max_retries,
            collision_warn_pct,
            collision_critical_pct,
        })
    }

    pub fn alphabet(&self) -> &[char] {
        &self.alphabet
    }

    pub fn random_length(&self) -> usize {
        self.random_length
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn collision_warn_pct(&self) -> f64 {
        self.collision_warn_pct
    }

    pub fn collision_critical_pct(&self) -> f64 {
        self.collision_critical_pct
    }

    /// Bits of entropy carried by the random part (`length * log2(|alphabet|)`).
    pub fn entropy_bits(&self) -> u32 {
        self.random_length as u32 * (self.alphabet.len() as f64).log2() as u32
    }

    /// Size of the random key space (`|alphabet| ^ length`).
    pub fn total_combinations(&self) -> f64 {
        (self.alphabet.len() as f64).powi(self.random_length as i32)
    }
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            alphabet: DEFAULT_ALPHABET.chars().collect(),
            random_length: DEFAULT_RANDOM_LENGTH,
            max_retries: DEFAULT_MAX_RETRIES,
            collision_warn_pct: DEFAULT_COLLISION_WARN_PCT,
            collision_critical_pct: DEFAULT_COLLISION_CRITICAL_PCT,
        }
    }
}

// ---------------------------------------------------------------------------
// WarrantyConfig
// ---------------------------------------------------------------------------

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct WarrantyConfig {
    /// Secure generator parameters.
    pub generator: GeneratorConfig,
    /// Host used in QR deep links (`https://warranty.<host>/claim/<barcode>`).
    pub qr_host: String,
    /// Upper bound on a single batch request.
    pub max_batch_quantity: u32,
    /// Zero-padding width of the claim sequence.
    pub claim_number_padding: usize,
}

impl Default for WarrantyConfig {
    fn default() -> Self {
        Self {
            generator: GeneratorConfig::default(),
            qr_host: DEFAULT_QR_HOST.to_string(),
            max_batch_quantity: DEFAULT_MAX_BATCH_QUANTITY,
            claim_number_padding: DEFAULT_CLAIM_NUMBER_PADDING,
        }
    }
}

impl WarrantyConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default     |
    /// |------------------------------|-------------|
    /// | `REX_QR_HOST`                | `localhost` |
    /// | `REX_MAX_RETRIES`            | `3`         |
    /// | `REX_COLLISION_WARN_PCT`     | `0.01`      |
    /// | `REX_COLLISION_CRITICAL_PCT` | `0.1`       |
    /// | `REX_MAX_BATCH_QUANTITY`     | `10000`     |
    pub fn from_env() -> Result<Self, CoreError> {
        let qr_host = std::env::var("REX_QR_HOST").unwrap_or_else(|_| DEFAULT_QR_HOST.into());
        let max_retries = env_or("REX_MAX_RETRIES", DEFAULT_MAX_RETRIES)?;
        let warn = env_or("REX_COLLISION_WARN_PCT", DEFAULT_COLLISION_WARN_PCT)?;
        let critical = env_or("REX_COLLISION_CRITICAL_PCT", DEFAULT_COLLISION_CRITICAL_PCT)?;
        let max_batch_quantity = env_or("REX_MAX_BATCH_QUANTITY", DEFAULT_MAX_BATCH_QUANTITY)?;

        let generator = GeneratorConfig::new(
            DEFAULT_ALPHABET,
            DEFAULT_RANDOM_LENGTH,
            max_retries,
            warn,
            critical,
        )?;

        Ok(Self {
            generator,
            qr_host,
            max_batch_quantity,
            claim_number_padding: DEFAULT_CLAIM_NUMBER_PADDING,
        })
    }
}

/// Parse an environment variable, falling back to `default` when unset.
fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, CoreError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| CoreError::Validation(format!("{key} has an invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sixty_bits_of_entropy() {
        let config = GeneratorConfig::default();
        assert_eq!(config.entropy_bits(), 60);
        assert_eq!(config.total_combinations(), 32f64.powi(12));
    }

    #[test]
    fn default_alphabet_passes_validation() {
        assert!(GeneratorConfig::new(DEFAULT_ALPHABET, 12, 3, 0.01, 0.1).is_ok());
    }

    #[test]
    fn confusable_symbol_rejected() {
        let alphabet = DEFAULT_ALPHABET.replace('A', "O");
        let err = GeneratorConfig::new(&alphabet, 12, 3, 0.01, 0.1).unwrap_err();
        assert!(err.to_string().contains("confusable"));
    }

    #[test]
    fn short_alphabet_rejected() {
        assert!(GeneratorConfig::new("ABCDEF", 12, 3, 0.01, 0.1).is_err());
    }

    #[test]
    fn repeated_symbol_rejected() {
        let alphabet = DEFAULT_ALPHABET.replace('B', "A");
        let err = GeneratorConfig::new(&alphabet, 12, 3, 0.01, 0.1).unwrap_err();
        assert!(err.to_string().contains("repeat"));
    }

    #[test]
    fn zero_retries_rejected() {
        assert!(GeneratorConfig::new(DEFAULT_ALPHABET, 12, 0, 0.01, 0.1).is_err());
    }

    #[test]
    fn inverted_thresholds_rejected() {
        assert!(GeneratorConfig::new(DEFAULT_ALPHABET, 12, 3, 0.5, 0.1).is_err());
    }
}
