//! Code diagnosis engine: scores a student submission against a reference
//! solution along four independent axes and derives tier-specific weak areas.
//!
//! Diagnosis never fails. Empty or unparseable input yields zeroed/neutral
//! metrics: a submission that cannot be scanned is diagnostic information in
//! itself, not an error condition.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::domain::{DiagnosisResult, Tier};
use crate::parse::{self, CodeSummary};
use crate::util::collapse_whitespace;

static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"#.*").unwrap());

/// Full diagnosis for one (submission, reference, description) triple.
pub fn diagnose(submission: &str, reference: &str, description: &str) -> DiagnosisResult {
  let similarity = similarity(submission, reference);
  let syntax_errors = count_syntax_errors(submission);
  let logic_errors = count_logic_errors(submission, reference);
  let (concept_level, missing_concepts) = assess_concepts(submission, description);
  let error_details = error_details(submission);

  DiagnosisResult {
    similarity,
    syntax_errors,
    logic_errors,
    concept_level,
    missing_concepts,
    error_details,
  }
}

// -------- similarity --------

/// Blended similarity, 0-100: 60% token-sequence ratio over normalized text,
/// 40% Jaccard overlap of structural node kinds. Pure text diff rewards
/// copy-paste noise and pure structure ignores naming, so neither is used
/// alone.
pub fn similarity(submission: &str, reference: &str) -> f32 {
  if submission.trim().is_empty() || reference.trim().is_empty() {
    return 0.0;
  }

  let text_ratio = token_ratio(
    &tokenize(&normalize(submission)),
    &tokenize(&normalize(reference)),
  ) * 100.0;

  let struct_ratio = match (parse::summarize(submission), parse::summarize(reference)) {
    (Ok(a), Ok(b)) => kind_overlap(&a, &b) * 100.0,
    _ => 0.0,
  };

  text_ratio * 0.6 + struct_ratio * 0.4
}

/// Strip comments and collapse whitespace before text comparison.
fn normalize(code: &str) -> String {
  collapse_whitespace(&COMMENT_RE.replace_all(code, ""))
}

/// Split into identifier/number tokens and single punctuation tokens.
fn tokenize(text: &str) -> Vec<String> {
  let mut tokens = Vec::new();
  let mut current = String::new();
  for ch in text.chars() {
    if ch.is_alphanumeric() || ch == '_' {
      current.push(ch);
    } else {
      if !current.is_empty() {
        tokens.push(std::mem::take(&mut current));
      }
      if !ch.is_whitespace() {
        tokens.push(ch.to_string());
      }
    }
  }
  if !current.is_empty() {
    tokens.push(current);
  }
  tokens
}

/// Ratcliff/Obershelp ratio over token sequences: 2M / (|a| + |b|) where M
/// is the total length of recursively matched common blocks.
fn token_ratio(a: &[String], b: &[String]) -> f32 {
  let total = a.len() + b.len();
  if total == 0 {
    return 0.0;
  }
  2.0 * matched_len(a, b) as f32 / total as f32
}

fn matched_len(a: &[String], b: &[String]) -> usize {
  if a.is_empty() || b.is_empty() {
    return 0;
  }
  let (ai, bi, len) = longest_common_block(a, b);
  if len == 0 {
    return 0;
  }
  len + matched_len(&a[..ai], &b[..bi]) + matched_len(&a[ai + len..], &b[bi + len..])
}

fn longest_common_block(a: &[String], b: &[String]) -> (usize, usize, usize) {
  let mut best = (0usize, 0usize, 0usize);
  let mut prev = vec![0usize; b.len() + 1];
  for (i, ta) in a.iter().enumerate() {
    let mut row = vec![0usize; b.len() + 1];
    for (j, tb) in b.iter().enumerate() {
      if ta == tb {
        let len = prev[j] + 1;
        row[j + 1] = len;
        if len > best.2 {
          best = (i + 1 - len, j + 1 - len, len);
        }
      }
    }
    prev = row;
  }
  best
}

fn kind_overlap(a: &CodeSummary, b: &CodeSummary) -> f32 {
  let common = a.node_kinds.intersection(&b.node_kinds).count();
  let total = a.node_kinds.union(&b.node_kinds).count();
  if total == 0 {
    0.0
  } else {
    common as f32 / total as f32
  }
}

// -------- syntax errors --------

/// Coarse syntax-failure count: 1 for a failed whole-document scan, plus 0.5
/// per non-blank non-comment line that fails in isolation, floored.
pub fn count_syntax_errors(code: &str) -> u32 {
  if code.trim().is_empty() {
    return 0;
  }
  if parse::summarize(code).is_ok() {
    return 0;
  }

  let mut errors = 1.0f32;
  for line in code.lines() {
    let stripped = line.trim();
    if stripped.is_empty() || stripped.starts_with('#') {
      continue;
    }
    if !parse::line_parses(line) {
      errors += 0.5;
    }
  }
  errors.floor() as u32
}

// -------- logic errors --------

/// Structural-delta heuristic. Only computed when both sides scan cleanly:
/// broken syntax is already captured by the syntax-error count. Tolerances
/// (1 for loops/branches, 2 for calls, call excess halved) are policy
/// values, not derived from first principles.
pub fn count_logic_errors(submission: &str, reference: &str) -> u32 {
  let (sub, refr) = match (parse::summarize(submission), parse::summarize(reference)) {
    (Ok(a), Ok(b)) => (a, b),
    _ => return 0,
  };

  let mut errors = 0u32;
  let loop_delta = sub.loops.abs_diff(refr.loops);
  if loop_delta > 1 {
    errors += loop_delta - 1;
  }
  let branch_delta = sub.branches.abs_diff(refr.branches);
  if branch_delta > 1 {
    errors += branch_delta - 1;
  }
  let call_delta = sub.calls.abs_diff(refr.calls);
  if call_delta > 2 {
    errors += (call_delta - 2) / 2;
  }
  errors
}

// -------- concept coverage --------

/// Fixed concept vocabulary: label plus the description keywords that imply
/// the problem requires it.
const CONCEPTS: &[(&str, &[&str])] = &[
  ("loop", &["repeat", "each", "every", "times", "loop"]),
  ("conditional", &["condition", "if ", "case", "when", "otherwise"]),
  ("input", &["input", "read", "given"]),
  ("output", &["output", "print", "display"]),
  ("sort", &["sort", "order", "ascending", "descending"]),
  ("search", &["search", "find", "locate"]),
  ("arithmetic", &["sum", "product", "calculate", "average", "multiply"]),
];

/// Concept coverage: 1 + one point per required concept the submission
/// exhibits, capped at 5. Concepts required but absent come back as the
/// missing list, in vocabulary order.
pub fn assess_concepts(submission: &str, description: &str) -> (u8, Vec<String>) {
  let summary = parse::summarize(submission).ok();
  let desc = description.to_lowercase();

  let mut score = 1u8;
  let mut missing = Vec::new();
  for (label, keys) in CONCEPTS {
    if !keys.iter().any(|k| desc.contains(k)) {
      continue;
    }
    if concept_in_code(label, submission, summary.as_ref()) {
      score = (score + 1).min(5);
    } else {
      missing.push((*label).to_string());
    }
  }
  (score, missing)
}

fn concept_in_code(label: &str, code: &str, summary: Option<&CodeSummary>) -> bool {
  match label {
    "loop" => summary
      .map(|s| s.node_kinds.contains("for") || s.node_kinds.contains("while"))
      .unwrap_or(false),
    "conditional" => summary
      .map(|s| s.node_kinds.contains("if") || s.node_kinds.contains("elif"))
      .unwrap_or(false),
    "input" => code.contains("input"),
    "output" => code.contains("print"),
    "sort" => code.contains("sort"),
    "search" => code.contains(" in ") || code.contains("find") || code.contains("index"),
    "arithmetic" => summary.map(|s| s.node_kinds.contains("binop")).unwrap_or(false),
    _ => false,
  }
}

// -------- error details --------

/// Human-readable diagnostics surfaced alongside the counters.
pub fn error_details(code: &str) -> Vec<String> {
  let mut details = Vec::new();

  if code.trim().is_empty() {
    details.push("code is empty".to_string());
    return details;
  }

  if let Err(e) = parse::summarize(code) {
    details.push(format!("syntax error: {}", e));
  }

  for (open, close, name) in [('(', ')', "parentheses"), ('[', ']', "square brackets"), ('{', '}', "curly braces")] {
    let opens = code.matches(open).count();
    let closes = code.matches(close).count();
    if opens != closes {
      details.push(format!("unbalanced {} ({} opening, {} closing)", name, opens, closes));
    }
  }

  let lines: Vec<&str> = code.lines().collect();
  for (i, line) in lines.iter().enumerate() {
    if line.is_empty() || line.starts_with(|c: char| c.is_whitespace()) || line.starts_with('#') {
      continue;
    }
    if i > 0 && lines[i - 1].trim_end().ends_with(':') {
      details.push(format!("possible indentation error (line {})", i + 1));
    }
  }

  details
}

// -------- tier policy --------

/// Tier-specific weak-area lookup. A pure table over the four metrics; never
/// empty thanks to the fallback label.
pub fn weak_areas(result: &DiagnosisResult, tier: Tier) -> Vec<String> {
  let mut areas = Vec::new();

  match tier {
    Tier::Novice => {
      if result.similarity < 40.0 {
        areas.push("basic code structure".to_string());
      }
      if result.syntax_errors >= 6 {
        areas.push("syntax fundamentals".to_string());
      }
      if result.logic_errors >= 3 {
        areas.push("logic structure design".to_string());
      }
      if result.concept_level <= 2 {
        areas.push("core concept understanding".to_string());
      }
      if !result.missing_concepts.is_empty() {
        let head: Vec<&str> = result.missing_concepts.iter().take(3).map(String::as_str).collect();
        areas.push(format!("missing concepts: {}", head.join(", ")));
      }
    }
    Tier::Intermediate => {
      if (40.0..75.0).contains(&result.similarity) {
        areas.push("algorithm completeness".to_string());
      }
      if (2..=5).contains(&result.syntax_errors) {
        areas.push("syntax detail accuracy".to_string());
      }
      if (1..=2).contains(&result.logic_errors) {
        areas.push("logic refinement".to_string());
      }
      if result.concept_level == 3 {
        areas.push("applying concepts in practice".to_string());
      }
      if !result.missing_concepts.is_empty() {
        let head: Vec<&str> = result.missing_concepts.iter().take(2).map(String::as_str).collect();
        areas.push(format!("needs work: {}", head.join(", ")));
      }
    }
    Tier::Advanced => {
      if result.similarity >= 76.0 {
        areas.push("final polish (nearly complete)".to_string());
      }
      if result.syntax_errors <= 1 {
        areas.push("fine tuning".to_string());
      }
      if result.logic_errors == 0 {
        areas.push("efficiency improvements".to_string());
      }
      if result.concept_level >= 4 {
        areas.push("advanced concept application".to_string());
      }
    }
  }

  if areas.is_empty() {
    areas.push("general improvement needed".to_string());
  }
  areas
}

/// Advisory check that the caller's chosen tier matches the diagnosis.
/// Informational only; a false verdict never blocks the request.
pub fn is_suitable(result: &DiagnosisResult, tier: Tier) -> (bool, String) {
  match tier {
    Tier::Novice => {
      if result.syntax_errors >= 3 || result.similarity < 30.0 {
        (true, "novice hints are a good fit here".to_string())
      } else if result.similarity >= 76.0 && result.syntax_errors <= 1 {
        (false, "code is nearly complete; advanced hints are recommended".to_string())
      } else {
        (true, "serving novice hints".to_string())
      }
    }
    Tier::Intermediate => {
      if (30.0..76.0).contains(&result.similarity) || (1..=5).contains(&result.syntax_errors) {
        (true, "intermediate hints are a good fit here".to_string())
      } else if result.similarity < 30.0 && result.syntax_errors >= 6 {
        (false, "fundamentals come first; novice hints are recommended".to_string())
      } else {
        (true, "serving intermediate hints".to_string())
      }
    }
    Tier::Advanced => {
      if result.similarity >= 60.0 && result.syntax_errors <= 2 {
        (true, "advanced hints are a good fit here".to_string())
      } else if result.similarity < 40.0 || result.syntax_errors >= 5 {
        (false, "base structure is incomplete; novice or intermediate hints are recommended".to_string())
      } else {
        (true, "serving advanced hints".to_string())
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const REFERENCE: &str = "n = int(input())\ntotal = 0\nfor i in range(n):\n    total = total + i\nprint(total)\n";

  #[test]
  fn identical_parseable_code_is_fully_similar() {
    let s = similarity(REFERENCE, REFERENCE);
    assert!((s - 100.0).abs() < 0.01, "similarity was {s}");
  }

  #[test]
  fn empty_side_means_zero_similarity() {
    assert_eq!(similarity(REFERENCE, ""), 0.0);
    assert_eq!(similarity("", REFERENCE), 0.0);
    assert_eq!(similarity("", ""), 0.0);
  }

  #[test]
  fn clean_code_has_no_syntax_errors() {
    assert_eq!(count_syntax_errors(REFERENCE), 0);
    assert_eq!(count_syntax_errors(""), 0);
  }

  #[test]
  fn unterminated_call_counts_at_least_one() {
    assert!(count_syntax_errors("print(n") >= 1);
  }

  #[test]
  fn logic_errors_track_structural_deltas() {
    // Reference has one loop; three extra loops puts the delta past the
    // tolerance of 1.
    let noisy = "for a in x:\n    pass\nfor b in x:\n    pass\nfor c in x:\n    pass\nfor d in x:\n    pass\n";
    let reference = "for a in x:\n    pass\n";
    assert_eq!(count_logic_errors(noisy, reference), 2);
    assert_eq!(count_logic_errors(reference, reference), 0);
    // Unparseable submission: logic is not assessed.
    assert_eq!(count_logic_errors("print(n", reference), 0);
  }

  #[test]
  fn concepts_found_and_missing() {
    let desc = "Read the input, then print the sum of each value.";
    let (level, missing) = assess_concepts(REFERENCE, desc);
    assert_eq!(level, 5, "loop, input, output, arithmetic all present");
    assert!(missing.is_empty());

    let (level, missing) = assess_concepts("x = 1", desc);
    assert_eq!(level, 1);
    assert_eq!(missing, vec!["loop", "input", "output", "arithmetic"]);
  }

  #[test]
  fn weak_areas_never_empty() {
    let perfect = diagnose(REFERENCE, REFERENCE, "print values");
    for tier in [Tier::Novice, Tier::Intermediate, Tier::Advanced] {
      assert!(!weak_areas(&perfect, tier).is_empty());
    }
    // A mid-quality submission with nothing firing under novice thresholds
    // still gets the fallback.
    let mid = DiagnosisResult {
      similarity: 60.0,
      syntax_errors: 0,
      logic_errors: 0,
      concept_level: 3,
      missing_concepts: vec![],
      error_details: vec![],
    };
    assert_eq!(weak_areas(&mid, Tier::Novice), vec!["general improvement needed"]);
  }

  #[test]
  fn suitability_is_advisory() {
    let nearly_done = DiagnosisResult {
      similarity: 90.0,
      syntax_errors: 0,
      logic_errors: 0,
      concept_level: 5,
      missing_concepts: vec![],
      error_details: vec![],
    };
    let (ok, msg) = is_suitable(&nearly_done, Tier::Novice);
    assert!(!ok);
    assert!(msg.contains("advanced"));

    let broken = DiagnosisResult {
      similarity: 10.0,
      syntax_errors: 7,
      logic_errors: 0,
      concept_level: 1,
      missing_concepts: vec![],
      error_details: vec![],
    };
    let (ok, _) = is_suitable(&broken, Tier::Novice);
    assert!(ok);
    let (ok, msg) = is_suitable(&broken, Tier::Intermediate);
    assert!(!ok);
    assert!(msg.contains("novice"));
  }

  #[test]
  fn error_details_flag_unbalanced_brackets() {
    let details = error_details("print(n");
    assert!(details.iter().any(|d| d.contains("unbalanced parentheses")));
    assert_eq!(error_details(""), vec!["code is empty"]);
  }

  #[test]
  fn diagnose_is_deterministic() {
    let a = diagnose("x=1", REFERENCE, "print the sum");
    let b = diagnose("x=1", REFERENCE, "print the sum");
    assert_eq!(a.similarity, b.similarity);
    assert_eq!(a.syntax_errors, b.syntax_errors);
    assert_eq!(a.missing_concepts, b.missing_concepts);
  }
}
