//! Domain models shared across the pipeline: difficulty tiers, diagnosis
//! results, safety verdicts, hint records, and validation verdicts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Difficulty tier requested by the user for a hint.
/// Totally ordered: novice < intermediate < advanced. Always supplied by the
/// caller; the engine may advise on suitability but never overrides it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
  Novice,
  Intermediate,
  Advanced,
}

impl Tier {
  /// Escalation step: one tier up, saturating at advanced.
  pub fn escalated(self) -> Tier {
    match self {
      Tier::Novice => Tier::Intermediate,
      Tier::Intermediate | Tier::Advanced => Tier::Advanced,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Tier::Novice => "novice",
      Tier::Intermediate => "intermediate",
      Tier::Advanced => "advanced",
    }
  }
}

impl std::fmt::Display for Tier {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// An unknown tier string is a contract violation, not an expected rejection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TierParseError(pub String);

impl std::fmt::Display for TierParseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "unknown tier '{}' (expected novice|intermediate|advanced)", self.0)
  }
}
impl std::error::Error for TierParseError {}

impl std::str::FromStr for Tier {
  type Err = TierParseError;
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_lowercase().as_str() {
      "novice" => Ok(Tier::Novice),
      "intermediate" => Ok(Tier::Intermediate),
      "advanced" => Ok(Tier::Advanced),
      other => Err(TierParseError(other.to_string())),
    }
  }
}

/// Output of the diagnosis engine for one (submission, reference) pair.
/// Every field is a deterministic pure function of the three input texts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DiagnosisResult {
  /// Blended text/structural similarity, 0-100.
  pub similarity: f32,
  pub syntax_errors: u32,
  pub logic_errors: u32,
  /// Concept coverage, 1-5.
  pub concept_level: u8,
  pub missing_concepts: Vec<String>,
  pub error_details: Vec<String>,
}

/// Risk level reported by the abuse guard. Danger dominates warning.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
  Safe,
  Warning,
  Danger,
}

/// Outcome of the input safety screen. `sanitized` is always populated so a
/// caller can log or display the input safely even on a danger verdict.
#[derive(Clone, Debug, Serialize)]
pub struct SafetyVerdict {
  pub safe: bool,
  pub risk: RiskLevel,
  pub reasons: Vec<String>,
  pub sanitized: String,
}

/// Read-only usage counters for one user's rate window.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct UsageStats {
  pub total_requests: usize,
  pub requests_last_minute: usize,
  pub requests_last_hour: usize,
  pub remaining_minute: usize,
  pub remaining_hour: usize,
}

/// One emitted hint. Immutable once created.
#[derive(Clone, Debug, Serialize)]
pub struct HintRecord {
  pub id: Uuid,
  pub text: String,
  pub tier: Tier,
  pub created_at: DateTime<Utc>,
  /// Student code at the time the hint was issued, if the caller supplied it.
  pub student_snapshot: Option<String>,
}

/// Output of the hint policy validator. Pure function of (text, tier).
#[derive(Clone, Debug, Serialize)]
pub struct ValidationVerdict {
  pub valid: bool,
  pub errors: Vec<String>,
  pub warnings: Vec<String>,
  /// 0-100; starts at 100 and loses a fixed penalty per failing category.
  pub score: f32,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tier_order_and_escalation() {
    assert!(Tier::Novice < Tier::Intermediate);
    assert!(Tier::Intermediate < Tier::Advanced);
    assert_eq!(Tier::Novice.escalated(), Tier::Intermediate);
    assert_eq!(Tier::Advanced.escalated(), Tier::Advanced);
  }

  #[test]
  fn tier_parse_round_trip() {
    for t in [Tier::Novice, Tier::Intermediate, Tier::Advanced] {
      assert_eq!(t.as_str().parse::<Tier>().unwrap(), t);
    }
    assert!("expert".parse::<Tier>().is_err());
  }

  #[test]
  fn risk_level_danger_dominates() {
    assert_eq!(RiskLevel::Safe.max(RiskLevel::Warning), RiskLevel::Warning);
    assert_eq!(RiskLevel::Warning.max(RiskLevel::Danger), RiskLevel::Danger);
  }
}
