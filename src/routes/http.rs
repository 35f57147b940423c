//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs include parameters and basic result info.

use std::sync::Arc;
use axum::{extract::{State, Query}, Json, response::IntoResponse};
use tracing::{info, instrument};

use crate::diagnosis;
use crate::protocol::*;
use crate::state::AppState;
use crate::validator;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body), fields(%body.user_id, text_len = body.text.len()))]
pub async fn http_post_safety_check(
  State(state): State<Arc<AppState>>,
  Json(body): Json<SafetyCheckIn>,
) -> impl IntoResponse {
  let v = state.guard.check_safety(&body.text, &body.user_id);
  info!(target: "policy_gate", user_id = %body.user_id, safe = v.safe, risk = %format!("{:?}", v.risk), "HTTP safety check served");
  Json(SafetyCheckOut { safe: v.safe, risk: v.risk, reasons: v.reasons, sanitized: v.sanitized })
}

#[instrument(level = "info", skip(state, body), fields(%body.user_id, %body.exercise_id, %body.tier))]
pub async fn http_post_request_validate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<RequestValidateIn>,
) -> impl IntoResponse {
  let (ok, message) =
    state.guard.validate_request(&body.text, &body.exercise_id, &body.tier, &body.user_id);
  info!(target: "policy_gate", user_id = %body.user_id, %ok, "HTTP request validation served");
  Json(RequestValidateOut { ok, message })
}

#[instrument(level = "info", skip(state), fields(%q.user_id))]
pub async fn http_get_usage(
  State(state): State<Arc<AppState>>,
  Query(q): Query<UsageQuery>,
) -> impl IntoResponse {
  let stats = state.guard.usage_stats(&q.user_id);
  Json(UsageOut { stats })
}

#[instrument(level = "info", skip(body), fields(submission_len = body.submission.len(), reference_len = body.reference.len()))]
pub async fn http_post_diagnose(Json(body): Json<DiagnoseIn>) -> impl IntoResponse {
  let result = diagnosis::diagnose(&body.submission, &body.reference, &body.description);
  info!(
    target: "hintgate_backend",
    similarity = %format!("{:.1}", result.similarity),
    syntax_errors = result.syntax_errors,
    logic_errors = result.logic_errors,
    "HTTP diagnosis served"
  );
  Json(result)
}

#[instrument(level = "info", skip(body), fields(%body.tier))]
pub async fn http_post_weak_areas(Json(body): Json<TieredDiagnosisIn>) -> impl IntoResponse {
  let weak_areas = diagnosis::weak_areas(&body.diagnosis, body.tier);
  Json(WeakAreasOut { weak_areas })
}

#[instrument(level = "info", skip(body), fields(%body.tier))]
pub async fn http_post_suitability(Json(body): Json<TieredDiagnosisIn>) -> impl IntoResponse {
  let (suitable, message) = diagnosis::is_suitable(&body.diagnosis, body.tier);
  Json(SuitabilityOut { suitable, message })
}

#[instrument(level = "info", skip(state, body), fields(%body.tier, text_len = body.text.len()))]
pub async fn http_post_hint_validate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<HintTextIn>,
) -> impl IntoResponse {
  let verdict = validator::validate(&body.text, body.tier, &state.policy);
  info!(target: "policy_gate", tier = %body.tier, valid = verdict.valid, score = %format!("{:.0}", verdict.score), "HTTP hint validation served");
  Json(ValidationOut { verdict })
}

#[instrument(level = "info", skip(state, body), fields(%body.tier, text_len = body.text.len()))]
pub async fn http_post_hint_autofix(
  State(state): State<Arc<AppState>>,
  Json(body): Json<HintTextIn>,
) -> impl IntoResponse {
  let text = validator::auto_fix(&body.text, body.tier, &state.policy);
  Json(AutoFixOut { text })
}

#[instrument(level = "info", skip(state, body), fields(%body.exercise_id, %body.tier, text_len = body.text.len()))]
pub async fn http_post_hint_record(
  State(state): State<Arc<AppState>>,
  Json(body): Json<HintRecordIn>,
) -> impl IntoResponse {
  state
    .tracker
    .record(&body.exercise_id, &body.text, body.tier, body.student_snapshot);
  Json(HintRecordOut { recorded: true })
}

#[instrument(level = "info", skip(state), fields(%q.exercise_id))]
pub async fn http_get_hint_history(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ExerciseQuery>,
) -> impl IntoResponse {
  let context = state.tracker.history_context(&q.exercise_id);
  Json(HistoryOut { context })
}

#[instrument(level = "info", skip(state), fields(%q.exercise_id))]
pub async fn http_get_hint_escalation(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ExerciseQuery>,
) -> impl IntoResponse {
  let due = state.tracker.escalation_due(&q.exercise_id);
  let next_tier = due
    .then(|| state.tracker.last_tier(&q.exercise_id))
    .flatten()
    .map(|t| t.escalated());
  Json(EscalationOut { due, next_tier })
}
