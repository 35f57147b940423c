//! Public protocol structs for the HTTP endpoints (serde ready).
//! Keep this small and stable so the gate and its callers can evolve
//! independently.

use serde::{Deserialize, Serialize};

use crate::domain::{DiagnosisResult, RiskLevel, Tier, UsageStats, ValidationVerdict};

//
// Safety / request validation
//

#[derive(Debug, Deserialize)]
pub struct SafetyCheckIn {
    pub text: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}
#[derive(Serialize)]
pub struct SafetyCheckOut {
    pub safe: bool,
    pub risk: RiskLevel,
    pub reasons: Vec<String>,
    pub sanitized: String,
}

#[derive(Debug, Deserialize)]
pub struct RequestValidateIn {
    pub text: String,
    #[serde(rename = "exerciseId")]
    pub exercise_id: String,
    /// Kept as a string on purpose: an unknown tier is one of the expected
    /// rejection reasons here, not a 422.
    pub tier: String,
    #[serde(rename = "userId")]
    pub user_id: String,
}
#[derive(Serialize)]
pub struct RequestValidateOut {
    pub ok: bool,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    #[serde(rename = "userId")]
    pub user_id: String,
}
#[derive(Serialize)]
pub struct UsageOut {
    #[serde(flatten)]
    pub stats: UsageStats,
}

//
// Diagnosis
//

#[derive(Debug, Deserialize)]
pub struct DiagnoseIn {
    pub submission: String,
    pub reference: String,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct TieredDiagnosisIn {
    pub diagnosis: DiagnosisResult,
    pub tier: Tier,
}
#[derive(Serialize)]
pub struct WeakAreasOut {
    #[serde(rename = "weakAreas")]
    pub weak_areas: Vec<String>,
}
#[derive(Serialize)]
pub struct SuitabilityOut {
    pub suitable: bool,
    pub message: String,
}

//
// Hint validation / recording
//

#[derive(Debug, Deserialize)]
pub struct HintTextIn {
    pub text: String,
    pub tier: Tier,
}
#[derive(Serialize)]
pub struct ValidationOut {
    #[serde(flatten)]
    pub verdict: ValidationVerdict,
}
#[derive(Serialize)]
pub struct AutoFixOut {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct HintRecordIn {
    #[serde(rename = "exerciseId")]
    pub exercise_id: String,
    pub text: String,
    pub tier: Tier,
    #[serde(default, rename = "studentSnapshot")]
    pub student_snapshot: Option<String>,
}
#[derive(Serialize)]
pub struct HintRecordOut {
    pub recorded: bool,
}

#[derive(Debug, Deserialize)]
pub struct ExerciseQuery {
    #[serde(rename = "exerciseId")]
    pub exercise_id: String,
}
#[derive(Serialize)]
pub struct HistoryOut {
    pub context: String,
}
#[derive(Serialize)]
pub struct EscalationOut {
    pub due: bool,
    /// Tier the caller should move up to if it follows the signal.
    #[serde(rename = "nextTier")]
    pub next_tier: Option<Tier>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}
