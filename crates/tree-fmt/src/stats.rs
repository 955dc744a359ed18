use std::fmt;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

/// Counters for a single run, shared between the pipeline's tasks.
#[derive(Debug, Default)]
pub struct RunStatistics {
  traversed: AtomicUsize,
  matched: AtomicUsize,
  formatted: AtomicUsize,
  changed: AtomicUsize,
}

impl RunStatistics {
  /// Paths produced by the path source.
  pub fn traversed(&self) -> usize {
    self.traversed.load(Ordering::SeqCst)
  }

  /// Paths at least one formatter wants.
  pub fn matched(&self) -> usize {
    self.matched.load(Ordering::SeqCst)
  }

  /// Paths that made it through every formatter on their route.
  pub fn formatted(&self) -> usize {
    self.formatted.load(Ordering::SeqCst)
  }

  /// Formatted paths whose content is different afterwards.
  pub fn changed(&self) -> usize {
    self.changed.load(Ordering::SeqCst)
  }

  pub fn add_traversed(&self, count: usize) {
    self.traversed.fetch_add(count, Ordering::SeqCst);
  }

  pub fn add_matched(&self, count: usize) {
    self.matched.fetch_add(count, Ordering::SeqCst);
  }

  pub fn add_formatted(&self, count: usize) {
    self.formatted.fetch_add(count, Ordering::SeqCst);
  }

  pub fn add_changed(&self, count: usize) {
    self.changed.fetch_add(count, Ordering::SeqCst);
  }
}

impl fmt::Display for RunStatistics {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "traversed {} files, matched {}, formatted {} ({} changed)",
      self.traversed(),
      self.matched(),
      self.formatted(),
      self.changed()
    )
  }
}
