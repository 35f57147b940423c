//! Small utility helpers used across modules.

/// Truncate to at most `max` characters, never splitting a UTF-8 boundary.
/// Used for hint-history previews and pattern snippets in reasons.
pub fn trunc_chars(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    return s.to_string();
  }
  s.chars().take(max).collect()
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub fn collapse_whitespace(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  let mut in_ws = false;
  for ch in s.chars() {
    if ch.is_whitespace() {
      if !in_ws && !out.is_empty() {
        out.push(' ');
      }
      in_ws = true;
    } else {
      out.push(ch);
      in_ws = false;
    }
  }
  while out.ends_with(' ') {
    out.pop();
  }
  out
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.chars().count() <= max {
    s.to_string()
  } else {
    format!("{}… ({} bytes total)", trunc_chars(s, max), s.len())
  }
}
