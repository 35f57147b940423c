//! Application state: the process-wide guard and tracker registries plus
//! the output-policy configuration.
//!
//! This module owns:
//!   - the abuse guard (rate windows keyed by user id)
//!   - the hint tracker (chains keyed by exercise id)
//!   - the policy config used by the validator
//!
//! One instance is built at startup and injected into request handlers;
//! there is no ambient global. Tests construct fresh instances per case so
//! rate windows and chains never leak between them.

use tracing::{info, instrument};

use crate::chain::HintTracker;
use crate::config::{load_gate_config_from_env, GateConfig, PolicyConfig};
use crate::guard::AbuseGuard;

pub struct AppState {
    pub guard: AbuseGuard,
    pub tracker: HintTracker,
    pub policy: PolicyConfig,
}

impl AppState {
    /// Build state from env: load TOML config if provided, else defaults.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_gate_config_from_env().unwrap_or_default();
        info!(
            target: "hintgate_backend",
            per_minute = cfg.guard.max_requests_per_minute,
            per_hour = cfg.guard.max_requests_per_hour,
            max_code_length = cfg.guard.max_code_length,
            escalation_streak = cfg.chain.escalation_streak,
            "Gate policy loaded"
        );
        Self::from_config(cfg)
    }

    pub fn from_config(cfg: GateConfig) -> Self {
        Self {
            guard: AbuseGuard::new(cfg.guard),
            tracker: HintTracker::new(cfg.chain),
            policy: cfg.policy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnosis;
    use crate::domain::Tier;
    use crate::validator;

    /// The whole gate in one pass: screen the input, diagnose, advise on
    /// tier fit, validate a candidate hint, record it, and watch the
    /// escalation signal fire.
    #[test]
    fn full_request_pipeline() {
        let state = AppState::from_config(GateConfig::default());

        let verdict = state.guard.check_safety("x=1", "u1");
        assert!(verdict.safe);

        let (ok, _) = state.guard.validate_request("x=1", "e1", "novice", "u1");
        assert!(ok);

        let result = diagnosis::diagnose("x=1", "x=1", "assign a value");
        assert!((result.similarity - 100.0).abs() < 0.01);
        assert_eq!(result.syntax_errors, 0);

        let areas = diagnosis::weak_areas(&result, Tier::Novice);
        assert!(!areas.is_empty());

        let (_, msg) = diagnosis::is_suitable(&result, Tier::Novice);
        assert!(!msg.is_empty(), "suitability is advisory, never blocking");

        let hint = "Start from the value you already assigned.\nSay it out loud as a sentence.\nThen write the next line the same way.";
        let v = validator::validate(hint, Tier::Novice, &state.policy);
        assert!(v.valid, "errors: {:?}", v.errors);

        state.tracker.record("e1", hint, Tier::Novice, Some("x=1".to_string()));
        assert!(!state.tracker.escalation_due("e1"));
        state.tracker.record("e1", hint, Tier::Novice, None);
        assert!(state.tracker.escalation_due("e1"));
        assert_eq!(Tier::Novice.escalated(), Tier::Intermediate);

        let stats = state.guard.usage_stats("u1");
        assert_eq!(stats.total_requests, 2, "safety check and request validation each recorded");
    }

    /// Validate -> auto_fix -> validate, at most one repair attempt.
    #[test]
    fn failed_hint_gets_one_repair_pass() {
        let state = AppState::from_config(GateConfig::default());
        let hint = "You forgot the loop entirely here, start over.\nWalk one element through by hand.\nWrite down what changes at each step.\nRepeat until the pattern is obvious.";

        let first = validator::validate(hint, Tier::Novice, &state.policy);
        assert!(!first.warnings.is_empty());

        let fixed = validator::auto_fix(hint, Tier::Novice, &state.policy);
        let second = validator::validate(&fixed, Tier::Novice, &state.policy);
        assert!(second.valid, "errors: {:?}", second.errors);
    }
}
