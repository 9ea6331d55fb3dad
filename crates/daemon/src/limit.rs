//! Per-operation request limiter over a one-minute window. Exhausted
//! operations reject immediately with a typed error; nothing waits.

use crate::error::ToolError;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(60);

pub struct RateLimiter {
  rpm: usize,
  windows: Mutex<HashMap<&'static str, VecDeque<Instant>>>,
}

impl RateLimiter {
  /// `rpm == 0` disables limiting.
  pub fn new(rpm: usize) -> Self {
    Self {
      rpm,
      windows: Mutex::new(HashMap::new()),
    }
  }

  /// Claim one slot for `op`, or reject with the time until one frees up.
  pub fn check(&self, op: &'static str) -> Result<(), ToolError> {
    if self.rpm == 0 {
      return Ok(());
    }

    let now = Instant::now();
    let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());
    let window = windows.entry(op).or_default();

    while let Some(&oldest) = window.front() {
      if now.duration_since(oldest) >= WINDOW {
        window.pop_front();
      } else {
        break;
      }
    }

    if window.len() >= self.rpm {
      let retry_after = window
        .front()
        .map(|&oldest| WINDOW.saturating_sub(now.duration_since(oldest)))
        .unwrap_or(WINDOW);
      return Err(ToolError::RateLimited {
        retry_after_secs: retry_after.as_secs().max(1),
      });
    }

    window.push_back(now);
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_allows_up_to_rpm() {
    let limiter = RateLimiter::new(5);
    for _ in 0..5 {
      limiter.check("save_snippet").unwrap();
    }
    let err = limiter.check("save_snippet").unwrap_err();
    assert!(matches!(err, ToolError::RateLimited { .. }));
  }

  #[test]
  fn test_operations_are_independent() {
    let limiter = RateLimiter::new(1);
    limiter.check("semantic_search").unwrap();
    limiter.check("keyword_search").unwrap();
    assert!(limiter.check("semantic_search").is_err());
  }

  #[test]
  fn test_zero_rpm_is_unlimited() {
    let limiter = RateLimiter::new(0);
    for _ in 0..1000 {
      limiter.check("anything").unwrap();
    }
  }

  #[test]
  fn test_retry_after_is_positive() {
    let limiter = RateLimiter::new(1);
    limiter.check("op").unwrap();
    match limiter.check("op") {
      Err(ToolError::RateLimited { retry_after_secs }) => assert!(retry_after_secs >= 1),
      other => panic!("expected rate limit, got {:?}", other),
    }
  }
}
