//! Output policy validator: tier-keyed structural and format contracts on
//! generated hint text, a pass/fail quality score, and a one-shot repair
//! pass.
//!
//! Validation is pure and deterministic. The intended flow for one request
//! is validate -> (on failure) auto_fix -> validate; a second failure goes
//! back to the caller, never into a retry loop.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::PolicyConfig;
use crate::domain::{Tier, ValidationVerdict};

const PENALTY_STRUCTURE: f32 = 20.0;
const PENALTY_LENGTH: f32 = 15.0;
const PENALTY_FORBIDDEN: f32 = 25.0;
const PENALTY_EVALUATION: f32 = 10.0;
const PENALTY_CODE_EXAMPLE: f32 = 20.0;
const PENALTY_QUESTION: f32 = 15.0;

/// Core-language keywords a hint must not name outside the novice tier;
/// novice hints are allowed to name functions directly.
static KEYWORDS_INTERMEDIATE: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r"(?i)\b(def|for|while|if|elif|else|input|print|int|str|list|dict|append|len)\b")
    .unwrap()
});
static KEYWORDS_ADVANCED: Lazy<Regex> = Lazy::new(|| {
  Regex::new(
    r"(?i)\b(def|for|while|if|elif|else|input|print|int|str|list|dict|append|len|range|enumerate)\b",
  )
  .unwrap()
});
/// Directive phrasing ("use X", "add Y") is banned at the advanced tier:
/// the hint must ask, not instruct.
static DIRECTIVE_PHRASING: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)\b(use|add)\s+[a-z_][a-z0-9_]*|\btry\s+using\b").unwrap());

/// Judgmental framing. Style guidance, not a hard contract: warnings only.
const EVALUATION_PHRASES: &[&str] = &[
  "the student",
  "looking at your code",
  "you didn't write",
  "you haven't",
  "you forgot",
  "you failed to",
];

/// Closed-question suffixes a Socratic hint must avoid.
const CLOSED_QUESTION_SUFFIXES: &[&str] = &["is it?", "isn't it?", "right?", "correct?", "okay?"];

static CHOICE_PHRASING: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?i)\beither\b.+\bor\b|\b(choose|pick)\s+(between|one)\b").unwrap());

fn forbidden_patterns(tier: Tier) -> Vec<&'static Regex> {
  match tier {
    Tier::Novice => vec![],
    Tier::Intermediate => vec![&KEYWORDS_INTERMEDIATE],
    Tier::Advanced => vec![&KEYWORDS_ADVANCED, &DIRECTIVE_PHRASING],
  }
}

/// Validate candidate hint text against the tier's contract.
pub fn validate(text: &str, tier: Tier, policy: &PolicyConfig) -> ValidationVerdict {
  let mut errors = Vec::new();
  let mut warnings = Vec::new();
  let mut score = 100.0f32;

  let structure_errors = check_structure(text, tier);
  if !structure_errors.is_empty() {
    errors.extend(structure_errors);
    score -= PENALTY_STRUCTURE;
  }

  let length_errors = check_length(text, tier, policy);
  if !length_errors.is_empty() {
    errors.extend(length_errors);
    score -= PENALTY_LENGTH;
  }

  let pattern_errors = check_forbidden_patterns(text, tier);
  if !pattern_errors.is_empty() {
    errors.extend(pattern_errors);
    score -= PENALTY_FORBIDDEN;
  }

  let eval_warnings = check_evaluation_phrases(text);
  if !eval_warnings.is_empty() {
    warnings.extend(eval_warnings);
    score -= PENALTY_EVALUATION;
  }

  let code_findings = check_code_examples(text, tier);
  if !code_findings.is_empty() {
    if tier == Tier::Novice {
      warnings.extend(code_findings);
    } else {
      errors.extend(code_findings);
      score -= PENALTY_CODE_EXAMPLE;
    }
  }

  if tier == Tier::Advanced {
    let question_errors = check_question_format(text);
    if !question_errors.is_empty() {
      errors.extend(question_errors);
      score -= PENALTY_QUESTION;
    }
  }

  ValidationVerdict {
    valid: errors.is_empty(),
    errors,
    warnings,
    score: score.max(0.0),
  }
}

fn check_structure(text: &str, tier: Tier) -> Vec<String> {
  let mut errors = Vec::new();
  if text.trim().is_empty() {
    errors.push("hint is empty".to_string());
    return errors;
  }

  let non_empty_lines = text.lines().filter(|l| !l.trim().is_empty()).count();
  match tier {
    Tier::Novice => {
      if non_empty_lines < 3 {
        errors.push(
          "novice hints need at least 3 non-empty lines (summary, function, example, next step)"
            .to_string(),
        );
      }
    }
    Tier::Intermediate => {
      if non_empty_lines < 3 {
        errors.push(
          "intermediate hints need at least 3 non-empty lines (concept, explanation, approach, payoff)"
            .to_string(),
        );
      }
    }
    Tier::Advanced => {
      if !text.contains('?') {
        errors.push("advanced hints must include a Socratic question".to_string());
      }
    }
  }
  errors
}

fn check_length(text: &str, tier: Tier, policy: &PolicyConfig) -> Vec<String> {
  let mut errors = Vec::new();
  let length = text.chars().count();
  let limit = policy.max_chars(tier);

  if length > limit {
    errors.push(format!("hint too long ({} chars > {} limit)", length, limit));
  }
  if length < policy.min_chars {
    errors.push(format!("hint too short ({} chars)", length));
  }
  errors
}

fn check_forbidden_patterns(text: &str, tier: Tier) -> Vec<String> {
  let mut errors = Vec::new();
  for pattern in forbidden_patterns(tier) {
    let mut matches: Vec<&str> = pattern.find_iter(text).map(|m| m.as_str()).collect();
    if matches.is_empty() {
      continue;
    }
    matches.sort_unstable();
    matches.dedup();
    errors.push(format!("forbidden pattern ({}): {}", tier, matches.join(", ")));
  }
  if fenced_block(text) && tier != Tier::Novice {
    errors.push(format!("forbidden pattern ({}): fenced code block", tier));
  }
  errors
}

fn check_evaluation_phrases(text: &str) -> Vec<String> {
  let lower = text.to_lowercase();
  EVALUATION_PHRASES
    .iter()
    .filter(|p| lower.contains(*p))
    .map(|p| format!("evaluation phrasing found: '{}'", p))
    .collect()
}

fn fenced_block(text: &str) -> bool {
  text.contains("```")
}

fn indented_block(text: &str) -> bool {
  text.lines().any(|l| l.starts_with("    ") && !l.trim().is_empty())
}

fn check_code_examples(text: &str, tier: Tier) -> Vec<String> {
  if fenced_block(text) || indented_block(text) {
    vec![format!("{} hints must not include code examples", tier)]
  } else {
    vec![]
  }
}

fn check_question_format(text: &str) -> Vec<String> {
  let mut errors = Vec::new();
  if !text.contains('?') {
    errors.push("no Socratic question mark found".to_string());
  }

  let lower = text.to_lowercase();
  for suffix in CLOSED_QUESTION_SUFFIXES {
    if lower.contains(suffix) {
      errors.push(format!("closed question found: '{}'", suffix));
    }
  }
  if CHOICE_PHRASING.is_match(text) {
    errors.push("either/or choice phrasing found; ask an open question instead".to_string());
  }
  errors
}

/// Best-effort single-pass repair: drop evaluation-phrase lines, collapse
/// redundant blank lines, then truncate at the last sentence boundary that
/// fits the tier budget. Callers must re-validate the result.
pub fn auto_fix(text: &str, tier: Tier, policy: &PolicyConfig) -> String {
  static BLANK_RUNS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").unwrap());

  let kept: Vec<&str> = text
    .lines()
    .filter(|line| {
      let lower = line.to_lowercase();
      !EVALUATION_PHRASES.iter().any(|p| lower.contains(p))
    })
    .collect();
  let mut fixed = kept.join("\n");
  fixed = BLANK_RUNS.replace_all(&fixed, "\n\n").trim().to_string();

  let limit = policy.max_chars(tier);
  if fixed.chars().count() > limit {
    let mut result: Vec<&str> = Vec::new();
    let mut current_len = 0usize;
    for sentence in fixed.split('.') {
      let added = sentence.chars().count() + 1;
      if current_len + added <= limit {
        result.push(sentence);
        current_len += added;
      } else {
        break;
      }
    }
    fixed = result.join(".");
    if !fixed.is_empty() && !fixed.ends_with('.') {
      fixed.push('.');
    }
  }

  fixed
}

#[cfg(test)]
mod tests {
  use super::*;

  fn policy() -> PolicyConfig {
    PolicyConfig::default()
  }

  const NOVICE_GOOD: &str = "First, take one number from the user.\nStore it in a variable.\nThen move on to the summing step.";

  #[test]
  fn novice_hint_within_contract_passes() {
    let v = validate(NOVICE_GOOD, Tier::Novice, &policy());
    assert!(v.valid, "errors: {:?}", v.errors);
    assert_eq!(v.score, 100.0);
  }

  #[test]
  fn same_text_fails_advanced_structure() {
    let v = validate(NOVICE_GOOD, Tier::Advanced, &policy());
    assert!(!v.valid);
    assert!(v.errors.iter().any(|e| e.contains("Socratic")));
  }

  #[test]
  fn advanced_open_question_passes() {
    let hint = "Your current approach recomputes the total on every pass.\nWhat would change about the work done per step, in case you kept a running value instead?";
    let v = validate(hint, Tier::Advanced, &policy());
    assert!(v.valid, "errors: {:?}", v.errors);
  }

  #[test]
  fn advanced_rejects_closed_and_choice_questions() {
    let closed = "Your approach touches every element twice.\nThat seems wasteful, right?";
    let v = validate(closed, Tier::Advanced, &policy());
    assert!(v.errors.iter().any(|e| e.contains("closed question")));

    let choice = "Would you rather keep a counter, or either scan again or cache the result?";
    let v = validate(choice, Tier::Advanced, &policy());
    assert!(v.errors.iter().any(|e| e.contains("either/or")));
  }

  #[test]
  fn intermediate_forbids_keywords_and_code_blocks() {
    let hint = "Use a list to hold the values.\nThen append each one.\nFinally check its len.";
    let v = validate(hint, Tier::Intermediate, &policy());
    assert!(!v.valid);
    assert!(v.errors.iter().any(|e| e.contains("forbidden pattern")));

    let block = "Collect values into one ordered container.\nBuild it step by step.\n```\nnums = []\n```";
    let v = validate(block, Tier::Intermediate, &policy());
    assert!(v.errors.iter().any(|e| e.contains("code examples")));
  }

  #[test]
  fn novice_code_block_is_only_a_warning() {
    let hint = "Take one number first.\nFor example:\n    n = 5\nThen continue from there.";
    let v = validate(hint, Tier::Novice, &policy());
    assert!(v.valid);
    assert!(v.warnings.iter().any(|w| w.contains("code examples")));
  }

  #[test]
  fn evaluation_phrases_warn_and_cost_points() {
    let hint = "The student has not handled the second value.\nStart with one value only.\nThen extend the idea to many.";
    let v = validate(hint, Tier::Novice, &policy());
    assert!(v.valid, "warnings never block");
    assert!(v.warnings.iter().any(|w| w.contains("evaluation phrasing")));
    assert_eq!(v.score, 90.0);
  }

  #[test]
  fn length_bounds_are_enforced() {
    let short = "too short";
    let v = validate(short, Tier::Novice, &policy());
    assert!(v.errors.iter().any(|e| e.contains("too short")));

    let long = "A sentence. ".repeat(30);
    let v = validate(&long, Tier::Intermediate, &policy());
    assert!(v.errors.iter().any(|e| e.contains("too long")));
  }

  #[test]
  fn score_floors_at_zero() {
    let disaster = format!("The student forgot everything. Use print(x), right?\n```\nprint(x)\n```\n{}", "padding. ".repeat(40));
    let v = validate(&disaster, Tier::Advanced, &policy());
    assert!(!v.valid);
    assert!(v.score >= 0.0);
  }

  #[test]
  fn auto_fix_strips_evaluation_lines_and_truncates() {
    let hint = format!(
      "The student did not keep a running total.\nThink about what stays the same across steps. {}",
      "Another filler sentence here. ".repeat(10)
    );
    let fixed = auto_fix(&hint, Tier::Novice, &policy());
    assert!(!fixed.to_lowercase().contains("the student"));
    assert!(fixed.chars().count() <= policy().max_chars(Tier::Novice) + 1);
    assert!(fixed.ends_with('.'));
  }

  #[test]
  fn auto_fix_collapses_blank_runs() {
    let hint = "First line.\n\n\n\nSecond line.";
    let fixed = auto_fix(hint, Tier::Novice, &policy());
    assert_eq!(fixed, "First line.\n\nSecond line.");
  }

  #[test]
  fn fix_then_revalidate_can_recover() {
    let hint = "You forgot the loop condition check here entirely.\nWalk through the first three steps by hand.\nNotice which value changes between them.\nWhat you track there is your answer.";
    let before = validate(hint, Tier::Novice, &policy());
    assert!(!before.warnings.is_empty());

    let fixed = auto_fix(hint, Tier::Novice, &policy());
    let after = validate(&fixed, Tier::Novice, &policy());
    assert!(after.valid, "errors: {:?}", after.errors);
    assert!(after.warnings.is_empty());
    assert_eq!(after.score, 100.0);
  }
}
