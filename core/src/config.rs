use crate::types::{Money, WalletAddress};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ── Reputation / suspension ────────────────────────────────────────

/// One rung of the suspension ladder. Tiers are evaluated lowest
/// `max_score` first; the first tier whose `max_score` is ≥ the account's
/// score applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionTier {
    /// Inclusive upper bound of the score band.
    pub max_score: u32,
    /// Suspension length. `None` suspends indefinitely.
    pub days:      Option<i64>,
    /// Human label used in the reason string, e.g. "Low score (75-79)".
    pub label:     String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReputationConfig {
    /// Score assumed for accounts that have never been scored.
    pub initial_score: u32,
    pub tiers:         Vec<SuspensionTier>,
}

impl Default for ReputationConfig {
    fn default() -> Self {
        Self {
            initial_score: 100,
            tiers: vec![
                SuspensionTier { max_score: 74, days: None,     label: "Score too low (≤74)".into() },
                SuspensionTier { max_score: 79, days: Some(60), label: "Low score (75-79)".into() },
                SuspensionTier { max_score: 84, days: Some(30), label: "Low score (80-84)".into() },
                SuspensionTier { max_score: 89, days: Some(7),  label: "Moderate score (85-89)".into() },
            ],
        }
    }
}

// ── Fund distribution ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DistributionConfig {
    /// Wallet that receives platform fees.
    pub platform_wallet:      WalletAddress,
    /// Fee levied on rent-sourced guest refunds that are not full refunds,
    /// and on the rent pool of host reclamations. 0.10 = 10%.
    pub platform_fee_percent: Money,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            platform_wallet:      "0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC".into(),
            platform_fee_percent: Decimal::new(10, 2),
        }
    }
}

// ── Engine ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub distribution:               DistributionConfig,
    pub reputation:                 ReputationConfig,
    /// Upper bound on attachments per reclamation.
    pub max_attachments:            usize,
    /// Penalty points at or above which the property is flagged for
    /// manual suspension.
    pub property_suspension_points: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            distribution:               DistributionConfig::default(),
            reputation:                 ReputationConfig::default(),
            max_attachments:            3,
            property_suspension_points: 15,
        }
    }
}

impl EngineConfig {
    /// Load from a JSON file. Missing sections fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let file: EngineConfigFile = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        let config = file.into_config();
        config.validate()?;
        Ok(config)
    }

    /// Config with hardcoded defaults for use in tests.
    pub fn default_test() -> Self {
        Self {
            distribution: DistributionConfig {
                platform_wallet:      "0xPLATFORM".into(),
                platform_fee_percent: Decimal::new(10, 2),
            },
            ..Self::default()
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        let fee = self.distribution.platform_fee_percent;
        if fee < Decimal::ZERO || fee >= Decimal::ONE {
            anyhow::bail!("platform_fee_percent must be in [0, 1), got {fee}");
        }
        if self.distribution.platform_wallet.trim().is_empty() {
            anyhow::bail!("platform_wallet must not be empty");
        }
        let mut previous: Option<u32> = None;
        for tier in &self.reputation.tiers {
            if previous.is_some_and(|p| tier.max_score <= p) {
                anyhow::bail!("suspension tiers must be in ascending max_score order");
            }
            previous = Some(tier.max_score);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct EngineConfigFile {
    #[serde(default)]
    distribution:               Option<DistributionConfig>,
    #[serde(default)]
    reputation:                 Option<ReputationConfig>,
    #[serde(default)]
    max_attachments:            Option<usize>,
    #[serde(default)]
    property_suspension_points: Option<u32>,
}

impl EngineConfigFile {
    fn into_config(self) -> EngineConfig {
        let defaults = EngineConfig::default();
        EngineConfig {
            distribution:               self.distribution.unwrap_or(defaults.distribution),
            reputation:                 self.reputation.unwrap_or(defaults.reputation),
            max_attachments:            self.max_attachments.unwrap_or(defaults.max_attachments),
            property_suspension_points: self
                .property_suspension_points
                .unwrap_or(defaults.property_suspension_points),
        }
    }
}
