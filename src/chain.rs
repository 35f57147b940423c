//! Hint-chain tracker: append-only per-exercise hint history and the
//! escalation-due signal.
//!
//! The tracker never decides a hint's tier. It records what was issued and
//! reports when the recent streak of same-tier hints suggests the caller
//! should escalate. The streak length is configuration (see `ChainConfig`).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::config::ChainConfig;
use crate::domain::{HintRecord, Tier};
use crate::util::trunc_chars;

const HISTORY_PREVIEW_CHARS: usize = 50;

/// One exercise's hint history. `hints` is append-only: no element is ever
/// mutated or removed once pushed.
#[derive(Debug)]
struct HintChain {
  hints: Vec<HintRecord>,
  touched_at: DateTime<Utc>,
}

/// Process-wide registry of hint chains keyed by exercise id, with one lock
/// per chain. Bounded: past `max_chains`, the least-recently-touched chain
/// is evicted to make room.
pub struct HintTracker {
  cfg: ChainConfig,
  chains: RwLock<HashMap<String, Arc<Mutex<HintChain>>>>,
}

impl HintTracker {
  pub fn new(cfg: ChainConfig) -> Self {
    Self {
      cfg,
      chains: RwLock::new(HashMap::new()),
    }
  }

  /// Append a hint to the exercise's chain, creating the chain lazily.
  #[instrument(level = "debug", skip(self, text, student_snapshot), fields(%exercise_id, %tier))]
  pub fn record(&self, exercise_id: &str, text: &str, tier: Tier, student_snapshot: Option<String>) {
    self.record_at(exercise_id, text, tier, student_snapshot, Utc::now());
  }

  pub(crate) fn record_at(
    &self,
    exercise_id: &str,
    text: &str,
    tier: Tier,
    student_snapshot: Option<String>,
    now: DateTime<Utc>,
  ) {
    let chain = self.chain_for(exercise_id, now);
    let mut chain = chain.lock().expect("chain lock poisoned");
    chain.hints.push(HintRecord {
      id: Uuid::new_v4(),
      text: text.to_string(),
      tier,
      created_at: now,
      student_snapshot,
    });
    chain.touched_at = now;
    debug!(target: "hint_chain", %exercise_id, %tier, total = chain.hints.len(), "hint recorded");
  }

  /// Deterministic, bounded summary of past hints for prompt assembly.
  /// Unknown exercise ids yield the neutral "none".
  #[instrument(level = "debug", skip(self), fields(%exercise_id))]
  pub fn history_context(&self, exercise_id: &str) -> String {
    let Some(chain) = self.existing_chain(exercise_id) else {
      return "none".to_string();
    };
    let chain = chain.lock().expect("chain lock poisoned");
    if chain.hints.is_empty() {
      return "none".to_string();
    }

    let mut lines = Vec::with_capacity(chain.hints.len());
    for (i, h) in chain.hints.iter().enumerate() {
      lines.push(format!(
        "hint {} ({}): {}",
        i + 1,
        h.tier,
        trunc_chars(&h.text, HISTORY_PREVIEW_CHARS)
      ));
      if h.student_snapshot.is_some() {
        lines.push("  -> student revised their code".to_string());
      }
    }
    lines.join("\n")
  }

  /// True iff at least `escalation_streak` hints exist and the most recent
  /// `escalation_streak` all share one tier. Advisory only.
  #[instrument(level = "debug", skip(self), fields(%exercise_id))]
  pub fn escalation_due(&self, exercise_id: &str) -> bool {
    let Some(chain) = self.existing_chain(exercise_id) else {
      return false;
    };
    let chain = chain.lock().expect("chain lock poisoned");
    let streak = self.cfg.escalation_streak.max(1);
    if chain.hints.len() < streak {
      return false;
    }
    let recent = &chain.hints[chain.hints.len() - streak..];
    let first = recent[0].tier;
    recent.iter().all(|h| h.tier == first)
  }

  /// Tier of the most recently recorded hint, if the chain has any.
  pub fn last_tier(&self, exercise_id: &str) -> Option<Tier> {
    let chain = self.existing_chain(exercise_id)?;
    let chain = chain.lock().expect("chain lock poisoned");
    chain.hints.last().map(|h| h.tier)
  }

  fn existing_chain(&self, exercise_id: &str) -> Option<Arc<Mutex<HintChain>>> {
    let map = self.chains.read().expect("chains lock poisoned");
    map.get(exercise_id).cloned()
  }

  fn chain_for(&self, exercise_id: &str, now: DateTime<Utc>) -> Arc<Mutex<HintChain>> {
    if let Some(c) = self.existing_chain(exercise_id) {
      return c;
    }
    let mut map = self.chains.write().expect("chains lock poisoned");
    if !map.contains_key(exercise_id) && map.len() >= self.cfg.max_chains {
      let oldest = map
        .iter()
        .min_by_key(|(_, c)| c.lock().map(|c| c.touched_at).unwrap_or(now))
        .map(|(k, _)| k.clone());
      if let Some(key) = oldest {
        info!(target: "hint_chain", exercise_id = %key, "evicting least-recently-touched chain");
        map.remove(&key);
      }
    }
    map
      .entry(exercise_id.to_string())
      .or_insert_with(|| {
        Arc::new(Mutex::new(HintChain {
          hints: Vec::new(),
          touched_at: now,
        }))
      })
      .clone()
  }
}
