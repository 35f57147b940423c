//! Loading gate configuration (rate caps, escalation policy, hint budgets)
//! from TOML.
//!
//! Every value has a default matching the reference policy, so the service
//! runs with no config file at all. See `GateConfig` for the schema.

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::Tier;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct GateConfig {
  #[serde(default)]
  pub guard: GuardConfig,
  #[serde(default)]
  pub chain: ChainConfig,
  #[serde(default)]
  pub policy: PolicyConfig,
}

/// Abuse-guard knobs: sliding-window caps and input size limit.
#[derive(Clone, Debug, Deserialize)]
pub struct GuardConfig {
  #[serde(default = "default_per_minute")] pub max_requests_per_minute: usize,
  #[serde(default = "default_per_hour")] pub max_requests_per_hour: usize,
  #[serde(default = "default_max_code_length")] pub max_code_length: usize,
  /// Upper bound on tracked users; idle windows are evicted past this.
  #[serde(default = "default_registry_cap")] pub max_tracked_users: usize,
}

/// Hint-chain knobs. The escalation streak is configuration on purpose:
/// the reference policy was described as both 2 and 3 in different places,
/// so the threshold is explicit rather than guessed.
#[derive(Clone, Debug, Deserialize)]
pub struct ChainConfig {
  #[serde(default = "default_escalation_streak")] pub escalation_streak: usize,
  #[serde(default = "default_registry_cap")] pub max_chains: usize,
}

/// Output-policy knobs: per-tier character budgets for generated hints.
#[derive(Clone, Debug, Deserialize)]
pub struct PolicyConfig {
  #[serde(default = "default_novice_chars")] pub novice_max_chars: usize,
  #[serde(default = "default_intermediate_chars")] pub intermediate_max_chars: usize,
  #[serde(default = "default_advanced_chars")] pub advanced_max_chars: usize,
  #[serde(default = "default_min_chars")] pub min_chars: usize,
}

impl PolicyConfig {
  pub fn max_chars(&self, tier: Tier) -> usize {
    match tier {
      Tier::Novice => self.novice_max_chars,
      Tier::Intermediate => self.intermediate_max_chars,
      Tier::Advanced => self.advanced_max_chars,
    }
  }
}

fn default_per_minute() -> usize { 10 }
fn default_per_hour() -> usize { 50 }
fn default_max_code_length() -> usize { 5000 }
fn default_registry_cap() -> usize { 10_000 }
fn default_escalation_streak() -> usize { 2 }
fn default_novice_chars() -> usize { 200 }
fn default_intermediate_chars() -> usize { 180 }
fn default_advanced_chars() -> usize { 200 }
fn default_min_chars() -> usize { 20 }

impl Default for GuardConfig {
  fn default() -> Self {
    Self {
      max_requests_per_minute: default_per_minute(),
      max_requests_per_hour: default_per_hour(),
      max_code_length: default_max_code_length(),
      max_tracked_users: default_registry_cap(),
    }
  }
}

impl Default for ChainConfig {
  fn default() -> Self {
    Self {
      escalation_streak: default_escalation_streak(),
      max_chains: default_registry_cap(),
    }
  }
}

impl Default for PolicyConfig {
  fn default() -> Self {
    Self {
      novice_max_chars: default_novice_chars(),
      intermediate_max_chars: default_intermediate_chars(),
      advanced_max_chars: default_advanced_chars(),
      min_chars: default_min_chars(),
    }
  }
}

/// Attempt to load `GateConfig` from GATE_CONFIG_PATH. On any parsing/IO
/// error, returns None and the caller falls back to defaults.
pub fn load_gate_config_from_env() -> Option<GateConfig> {
  let path = std::env::var("GATE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<GateConfig>(&s) {
      Ok(cfg) => {
        info!(target: "hintgate_backend", %path, "Loaded gate config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "hintgate_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "hintgate_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_reference_policy() {
    let cfg = GateConfig::default();
    assert_eq!(cfg.guard.max_requests_per_minute, 10);
    assert_eq!(cfg.guard.max_requests_per_hour, 50);
    assert_eq!(cfg.guard.max_code_length, 5000);
    assert_eq!(cfg.chain.escalation_streak, 2);
    assert_eq!(cfg.policy.max_chars(Tier::Intermediate), 180);
    assert_eq!(cfg.policy.min_chars, 20);
  }

  #[test]
  fn partial_toml_fills_defaults() {
    let cfg: GateConfig = toml::from_str(
      r#"
      [guard]
      max_requests_per_minute = 3

      [chain]
      escalation_streak = 3
      "#,
    )
    .unwrap();
    assert_eq!(cfg.guard.max_requests_per_minute, 3);
    assert_eq!(cfg.guard.max_requests_per_hour, 50);
    assert_eq!(cfg.chain.escalation_streak, 3);
    assert_eq!(cfg.policy.max_chars(Tier::Novice), 200);
  }
}
