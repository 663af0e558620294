//! Key namespacing and glob pattern compilation

use regex::Regex;

use crate::error::CacheError;

/// Namespace separator between the instance name and the user key
pub const NAMESPACE_SEPARATOR: &str = "::";

/// Prefixes non-global keys with the owning instance's name
#[derive(Debug, Clone)]
pub struct KeyNamer {
  name: String,
}

impl KeyNamer {
  pub fn new(name: &str) -> Self {
    Self {
      name: name.to_string(),
    }
  }

  /// Storage key for a namespaced key: `{name}::{key}`
  pub fn real(&self, key: &str) -> String {
    format!("{}{}{}", self.name, NAMESPACE_SEPARATOR, key)
  }

  /// Storage key for a global key: no prefix applied
  pub fn global(key: &str) -> String {
    key.to_string()
  }
}

/// Compile a glob pattern to an anchored regex. Only `*` and `?` are
/// metacharacters; character classes are not supported.
pub fn compile_pattern(pattern: &str) -> Result<Regex, CacheError> {
  let mut source = String::with_capacity(pattern.len() * 2);
  source.push('^');

  for c in pattern.chars() {
    match c {
      '*' => source.push_str("(.*)"),
      '?' => source.push_str("(.?)"),
      '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' | '\\' => {
        source.push('\\');
        source.push(c);
      }
      _ => source.push(c),
    }
  }

  source.push('$');
  Regex::new(&source)
    .map_err(|e| CacheError::InvalidArgument(format!("invalid pattern {}: {}", pattern, e)))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_real_and_global() {
    let namer = KeyNamer::new("svc");
    assert_eq!(namer.real("K"), "svc::K");
    assert_eq!(KeyNamer::global("K"), "K");
  }

  #[test]
  fn test_compile_pattern() {
    let re = compile_pattern("user:*").unwrap();
    assert!(re.is_match("user:123"));
    assert!(!re.is_match("order:123"));

    let re = compile_pattern("f?o").unwrap();
    assert!(re.is_match("foo"));
    assert!(re.is_match("fo"));
    assert!(!re.is_match("fooo"));

    let re = compile_pattern("*::unittest*").unwrap();
    assert!(re.is_match("DEL-3::unittest-ME"));
    assert!(!re.is_match("REMOVE-3-ME-3"));
  }

  #[test]
  fn test_compile_pattern_escapes_meta() {
    let re = compile_pattern("a.b+c").unwrap();
    assert!(re.is_match("a.b+c"));
    assert!(!re.is_match("aXb+c"));
  }
}
