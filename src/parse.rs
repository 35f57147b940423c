//! Lightweight structural scanner for Python-style student submissions.
//!
//! This is not a compiler. It catches the failure modes that matter for
//! diagnosis (unbalanced brackets, unterminated strings, block headers with
//! no body) and produces a coarse structural summary: the set of node kinds
//! present plus counts of loops, conditionals, and call expressions. The
//! counts feed the logic-deviation heuristic; the kind set feeds structural
//! similarity.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

/// Structural summary of one parseable submission.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeSummary {
  pub node_kinds: BTreeSet<&'static str>,
  pub loops: u32,
  pub branches: u32,
  pub calls: u32,
}

const BLOCK_KEYWORDS: &[&str] = &[
  "def", "if", "elif", "else", "for", "while", "class", "try", "except", "finally", "with",
];

const NON_CALL_KEYWORDS: &[&str] = &[
  "if", "elif", "else", "for", "while", "def", "class", "return", "and", "or", "not", "in",
  "with", "try", "except", "lambda",
];

static CALL_RE: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap());

/// One physical line after comment removal, with string literal contents
/// blanked out so operator/keyword scans cannot be fooled by text.
struct LineScan {
  code: String,
  had_string: bool,
}

/// Strip a trailing `#` comment and blank string contents.
/// Errors if a quote is still open at end of line.
fn scan_line(raw: &str) -> Result<LineScan, String> {
  let mut code = String::with_capacity(raw.len());
  let mut in_string: Option<char> = None;
  let mut escaped = false;
  let mut had_string = false;

  for ch in raw.chars() {
    match in_string {
      Some(quote) => {
        if escaped {
          escaped = false;
        } else if ch == '\\' {
          escaped = true;
        } else if ch == quote {
          in_string = None;
          code.push(quote);
        }
      }
      None => {
        if ch == '#' {
          break;
        }
        if ch == '\'' || ch == '"' {
          in_string = Some(ch);
          had_string = true;
          code.push(ch);
        } else {
          code.push(ch);
        }
      }
    }
  }

  if in_string.is_some() {
    return Err("unterminated string literal".into());
  }
  Ok(LineScan { code, had_string })
}

fn indent_of(raw: &str) -> usize {
  raw.chars().take_while(|c| c.is_whitespace()).count()
}

fn first_word(code: &str) -> &str {
  let trimmed = code.trim_start();
  let end = trimmed
    .find(|c: char| !c.is_alphanumeric() && c != '_')
    .unwrap_or(trimmed.len());
  &trimmed[..end]
}

fn has_assignment(code: &str) -> bool {
  let bytes = code.as_bytes();
  for (i, &b) in bytes.iter().enumerate() {
    if b != b'=' {
      continue;
    }
    let prev = if i > 0 { bytes[i - 1] } else { 0 };
    let next = if i + 1 < bytes.len() { bytes[i + 1] } else { 0 };
    if prev != b'=' && prev != b'!' && prev != b'<' && prev != b'>' && next != b'=' {
      return true;
    }
  }
  false
}

fn has_comparison(code: &str) -> bool {
  ["==", "!=", "<=", ">="].iter().any(|op| code.contains(op))
    || code.chars().any(|c| c == '<' || c == '>')
}

fn has_binop(code: &str) -> bool {
  code.chars().any(|c| matches!(c, '+' | '-' | '*' | '/' | '%'))
}

/// Whether one line in isolation scans cleanly: terminated strings and
/// balanced brackets. Continuation lines of a multi-line expression fail
/// here, which is fine for a coarse per-line error weight.
pub fn line_parses(raw: &str) -> bool {
  let scan = match scan_line(raw) {
    Ok(s) => s,
    Err(_) => return false,
  };
  let mut stack: Vec<char> = Vec::new();
  for ch in scan.code.chars() {
    match ch {
      '(' | '[' | '{' => stack.push(ch),
      ')' => {
        if stack.pop() != Some('(') {
          return false;
        }
      }
      ']' => {
        if stack.pop() != Some('[') {
          return false;
        }
      }
      '}' => {
        if stack.pop() != Some('{') {
          return false;
        }
      }
      _ => {}
    }
  }
  stack.is_empty()
}

/// Scan a whole submission into a `CodeSummary`, or an error message naming
/// the first structural failure found.
pub fn summarize(code: &str) -> Result<CodeSummary, String> {
  let lines: Vec<&str> = code.lines().collect();
  let mut summary = CodeSummary::default();
  let mut bracket_stack: Vec<(char, usize)> = Vec::new();

  for (idx, raw) in lines.iter().enumerate() {
    let line_no = idx + 1;
    let scan = scan_line(raw).map_err(|e| format!("{} (line {})", e, line_no))?;
    let stripped = scan.code.trim();
    if stripped.is_empty() {
      continue;
    }

    for ch in scan.code.chars() {
      match ch {
        '(' | '[' | '{' => bracket_stack.push((ch, line_no)),
        ')' | ']' | '}' => {
          let expected = match ch {
            ')' => '(',
            ']' => '[',
            _ => '{',
          };
          match bracket_stack.pop() {
            Some((open, _)) if open == expected => {}
            _ => return Err(format!("mismatched '{}' (line {})", ch, line_no)),
          }
        }
        _ => {}
      }
    }

    let head = first_word(&scan.code);
    match head {
      "for" | "while" => {
        summary.loops += 1;
        summary.node_kinds.insert(if head == "for" { "for" } else { "while" });
      }
      "if" | "elif" => {
        summary.branches += 1;
        summary.node_kinds.insert(if head == "if" { "if" } else { "elif" });
      }
      "else" => {
        summary.node_kinds.insert("else");
      }
      "def" => {
        summary.node_kinds.insert("def");
      }
      "class" => {
        summary.node_kinds.insert("class");
      }
      "return" => {
        summary.node_kinds.insert("return");
      }
      "import" | "from" => {
        summary.node_kinds.insert("import");
      }
      _ => {}
    }

    for cap in CALL_RE.captures_iter(&scan.code) {
      let name = cap.get(1).map(|m| m.as_str()).unwrap_or("");
      if !NON_CALL_KEYWORDS.contains(&name) {
        summary.calls += 1;
        summary.node_kinds.insert("call");
      }
    }

    if has_assignment(&scan.code) {
      summary.node_kinds.insert("assign");
    }
    if has_comparison(&scan.code) {
      summary.node_kinds.insert("compare");
    }
    if has_binop(&scan.code) {
      summary.node_kinds.insert("binop");
    }
    if scan.had_string {
      summary.node_kinds.insert("string");
    }
    if scan.code.chars().any(|c| c.is_ascii_digit()) {
      summary.node_kinds.insert("number");
    }
    if scan.code.chars().any(|c| c.is_alphabetic() || c == '_') {
      summary.node_kinds.insert("name");
    }

    // A block header must be followed by a more-indented non-blank line.
    if stripped.ends_with(':') && BLOCK_KEYWORDS.contains(&head) && bracket_stack.is_empty() {
      let header_indent = indent_of(raw);
      let body = lines[idx + 1..]
        .iter()
        .find(|l| !l.trim().is_empty());
      match body {
        Some(next) if indent_of(next) > header_indent => {}
        _ => return Err(format!("block header with no indented body (line {})", line_no)),
      }
    }
  }

  if let Some((open, line_no)) = bracket_stack.first() {
    return Err(format!("unclosed '{}' (line {})", open, line_no));
  }
  Ok(summary)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn clean_code_summarizes() {
    let code = "n = int(input())\nfor i in range(n):\n    if i % 2 == 0:\n        print(i)\n";
    let s = summarize(code).expect("parseable");
    assert_eq!(s.loops, 1);
    assert_eq!(s.branches, 1);
    assert!(s.calls >= 3);
    assert!(s.node_kinds.contains("for"));
    assert!(s.node_kinds.contains("assign"));
  }

  #[test]
  fn unterminated_call_fails() {
    assert!(summarize("print(n").is_err());
    assert!(!line_parses("print(n"));
    assert!(line_parses("print(n)"));
  }

  #[test]
  fn unterminated_string_fails() {
    assert!(summarize("s = 'hello").is_err());
  }

  #[test]
  fn block_header_needs_body() {
    assert!(summarize("for i in range(3):").is_err());
    assert!(summarize("for i in range(3):\n    print(i)").is_ok());
  }

  #[test]
  fn comments_and_string_contents_are_ignored() {
    let s = summarize("x = 'for while if'  # if (broken\n").expect("parseable");
    assert_eq!(s.loops, 0);
    assert_eq!(s.branches, 0);
    assert!(s.node_kinds.contains("string"));
  }
}
