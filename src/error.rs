//! Provider error types

/// Errors surfaced by cache operations
#[derive(Debug)]
pub enum CacheError {
  /// Missing key, missing value, or malformed options; no state was mutated
  InvalidArgument(String),
  /// A remote call failed or the connection was lost
  Backend(redis::RedisError),
  /// The provider was disposed and is no longer usable
  Disposed,
}

impl std::fmt::Display for CacheError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      CacheError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
      CacheError::Backend(e) => write!(f, "Backend unavailable: {}", e),
      CacheError::Disposed => write!(f, "Provider has been disposed"),
    }
  }
}

impl std::error::Error for CacheError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      CacheError::Backend(e) => Some(e),
      _ => None,
    }
  }
}

impl From<redis::RedisError> for CacheError {
  fn from(e: redis::RedisError) -> Self {
    CacheError::Backend(e)
  }
}
