//! Glob-style path matching, compiled to anchored regular expressions.
//!
//! `**` spans any number of directories, `*` any run of characters except `/`,
//! `?` exactly one non-separator character. Everything else is literal.

use regex::Regex;

use crate::error::EngineError;

/// A compiled glob pattern.
#[derive(Debug, Clone)]
pub struct Glob {
  raw: String,
  regex: Regex,
}

impl Glob {
  pub fn new(pattern: &str) -> Result<Self, EngineError> {
    let trimmed = pattern.trim();
    if trimmed.is_empty() {
      return Err(EngineError::validation("pattern", "glob pattern is empty"));
    }
    let regex = Regex::new(&translate(trimmed))
      .map_err(|e| EngineError::validation("pattern", format!("{}: {}", trimmed, e)))?;
    Ok(Self {
      raw: trimmed.to_string(),
      regex,
    })
  }

  pub fn as_str(&self) -> &str {
    &self.raw
  }

  /// Full-path match; a leading `./` on the path is ignored.
  pub fn is_match(&self, path: &str) -> bool {
    let path = path.strip_prefix("./").unwrap_or(path);
    self.regex.is_match(path)
  }
}

/// Compile every pattern, dropping (and logging) the ones that do not compile.
pub fn compile_all(patterns: &[String]) -> Vec<Glob> {
  patterns
    .iter()
    .filter_map(|p| match Glob::new(p) {
      Ok(g) => Some(g),
      Err(e) => {
        tracing::warn!(pattern = %p, error = %e, "ignoring unusable glob pattern");
        None
      }
    })
    .collect()
}

/// True when any glob matches the path.
pub fn any_match(globs: &[Glob], path: &str) -> bool {
  globs.iter().any(|g| g.is_match(path))
}

/// Translate a glob into an anchored regex source string.
fn translate(pattern: &str) -> String {
  let chars: Vec<char> = pattern.chars().collect();
  let mut out = String::with_capacity(pattern.len() * 2 + 2);
  out.push('^');

  let mut i = 0;
  while i < chars.len() {
    match chars[i] {
      '*' if chars.get(i + 1) == Some(&'*') => {
        if chars.get(i + 2) == Some(&'/') {
          // `**/` may also match zero directories.
          out.push_str("(?:.*/)?");
          i += 3;
        } else {
          out.push_str(".*");
          i += 2;
        }
      }
      '*' => {
        out.push_str("[^/]*");
        i += 1;
      }
      '?' => {
        out.push_str("[^/]");
        i += 1;
      }
      c => {
        let mut buf = [0u8; 4];
        out.push_str(&regex::escape(c.encode_utf8(&mut buf)));
        i += 1;
      }
    }
  }

  out.push('$');
  out
}
