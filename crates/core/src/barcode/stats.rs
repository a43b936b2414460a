//! Generation monitoring: collision rates and the derived security score.

use serde::{Deserialize, Serialize};

use crate::config::GeneratorConfig;

status_enum! {
    /// Health grade of a generation run, derived from its collision rate.
    pub enum SecurityScore {
        Excellent => "EXCELLENT",
        Good => "GOOD",
        Fair => "FAIR",
        Poor => "POOR",
    }
}

status_enum! {
    /// What operations should do after a generation run.
    pub enum RecommendedAction {
        Continue => "continue",
        Monitor => "monitor",
        ReviewAlgorithm => "review_algorithm",
    }
}

impl SecurityScore {
    /// Grade a collision rate (percent) against the configured thresholds.
    ///
    /// - no collisions: `EXCELLENT`
    /// - below the warn threshold: `GOOD`
    /// - below the critical threshold: `FAIR`
    /// - otherwise: `POOR`
    pub fn from_collision_rate(rate_pct: f64, config: &GeneratorConfig) -> Self {
        if rate_pct <= 0.0 {
            Self::Excellent
        } else if rate_pct < config.collision_warn_pct() {
            Self::Good
        } else if rate_pct < config.collision_critical_pct() {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    pub fn recommended_action(self) -> RecommendedAction {
        match self {
            Self::Excellent | Self::Good => RecommendedAction::Continue,
            Self::Fair => RecommendedAction::Monitor,
            Self::Poor => RecommendedAction::ReviewAlgorithm,
        }
    }
}

/// Running counters of a generation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationStats {
    /// Candidates drawn.
    pub attempts: u32,
    /// Candidates that already existed.
    pub collisions: u32,
    /// Barcodes acquired.
    pub successes: u32,
    /// Barcodes given up on after exhausting retries.
    pub failures: u32,
    /// Draws beyond the first for each barcode.
    pub retries: u32,
}

impl GenerationStats {
    /// Collisions as a percentage of all candidate draws.
    pub fn collision_rate_pct(&self) -> f64 {
        if self.attempts == 0 {
            0.0
        } else {
            self.collisions as f64 / self.attempts as f64 * 100.0
        }
    }

    pub fn security_score(&self, config: &GeneratorConfig) -> SecurityScore {
        SecurityScore::from_collision_rate(self.collision_rate_pct(), config)
    }
}

/// Summary statistics reported for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub requested: u32,
    pub generated: u32,
    pub failed: u32,
    pub collisions: u32,
    pub attempts: u32,
    /// `generated / requested * 100`.
    pub success_rate_pct: f64,
    /// `collisions / attempts * 100`.
    pub collision_rate_pct: f64,
    /// Size of the random key space.
    pub total_possible_combinations: f64,
    pub entropy_bits: u32,
    pub security_score: SecurityScore,
    pub recommended_action: RecommendedAction,
    /// Whether the run stopped early on a cancellation request.
    pub cancelled: bool,
}

impl BatchStatistics {
    pub fn from_stats(
        requested: u32,
        stats: &GenerationStats,
        config: &GeneratorConfig,
        cancelled: bool,
    ) -> Self {
        let success_rate_pct = if requested == 0 {
            0.0
        } else {
            stats.successes as f64 / requested as f64 * 100.0
        };
        let security_score = stats.security_score(config);

        Self {
            requested,
            generated: stats.successes,
            failed: requested.saturating_sub(stats.successes),
            collisions: stats.collisions,
            attempts: stats.attempts,
            success_rate_pct,
            collision_rate_pct: stats.collision_rate_pct(),
            total_possible_combinations: config.total_combinations(),
            entropy_bits: config.entropy_bits(),
            security_score,
            recommended_action: security_score.recommended_action(),
            cancelled,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
