//! Short tier: an in-process ordered ring of recent events. Lock-protected,
//! lost on restart.

use helpdex_core::MemoryEvent;
use std::collections::VecDeque;
use std::sync::Mutex;

pub struct EventRing {
  capacity: usize,
  events: Mutex<VecDeque<MemoryEvent>>,
}

impl EventRing {
  pub fn new(capacity: usize) -> Self {
    Self {
      capacity: capacity.max(1),
      events: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
    }
  }

  /// Append an event, evicting the oldest when full. Insertion order is
  /// preserved.
  pub fn push(&self, event: MemoryEvent) {
    let mut events = self.events.lock().unwrap_or_else(|e| e.into_inner());
    if events.len() == self.capacity {
      events.pop_front();
    }
    events.push_back(event);
  }

  /// The most recent `n` events, oldest first.
  pub fn recent(&self, n: usize) -> Vec<MemoryEvent> {
    let events = self.events.lock().unwrap_or_else(|e| e.into_inner());
    let skip = events.len().saturating_sub(n);
    events.iter().skip(skip).cloned().collect()
  }

  pub fn len(&self) -> usize {
    self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use helpdex_core::EventKind;

  fn event(n: u64) -> MemoryEvent {
    MemoryEvent::new(EventKind::TopicView, serde_json::json!({"n": n}))
  }

  #[test]
  fn test_preserves_insertion_order() {
    let ring = EventRing::new(8);
    for n in 0..5 {
      ring.push(event(n));
    }
    let recent = ring.recent(10);
    assert_eq!(recent.len(), 5);
    for (i, e) in recent.iter().enumerate() {
      assert_eq!(e.payload["n"], i as u64);
    }
  }

  #[test]
  fn test_evicts_oldest_at_capacity() {
    let ring = EventRing::new(3);
    for n in 0..5 {
      ring.push(event(n));
    }
    assert_eq!(ring.len(), 3);
    let recent = ring.recent(3);
    assert_eq!(recent[0].payload["n"], 2);
    assert_eq!(recent[2].payload["n"], 4);
  }

  #[test]
  fn test_recent_takes_tail() {
    let ring = EventRing::new(10);
    for n in 0..6 {
      ring.push(event(n));
    }
    let recent = ring.recent(2);
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].payload["n"], 4);
    assert_eq!(recent[1].payload["n"], 5);
  }
}
