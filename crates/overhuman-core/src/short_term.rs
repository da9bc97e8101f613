//! Short-term conversational memory.
//!
//! A fixed-capacity cyclic buffer of recent exchanges. The pipeline
//! appends one user entry and one assistant entry per run; when the
//! buffer is full the oldest entry is overwritten. All operations
//! serialize on one mutex, so readers never observe a torn entry.

use parking_lot::Mutex;

use overhuman_types::memory::ShortTermEntry;

/// Capacity used when a zero or unusable capacity is requested.
pub const DEFAULT_CAPACITY: usize = 50;

struct Ring {
    slots: Vec<Option<ShortTermEntry>>,
    /// Next write position.
    head: usize,
    /// Total writes ever made; `len = min(writes, capacity)`.
    writes: u64,
}

/// Fixed-capacity ring of recent exchanges. Concurrent-safe; all methods
/// take `&self`.
pub struct ShortTermMemory {
    inner: Mutex<Ring>,
    capacity: usize,
}

impl ShortTermMemory {
    /// Create a buffer with the given capacity. Zero defaults to
    /// [`DEFAULT_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_CAPACITY
        } else {
            capacity
        };
        Self {
            inner: Mutex::new(Ring {
                slots: (0..capacity).map(|_| None).collect(),
                head: 0,
                writes: 0,
            }),
            capacity,
        }
    }

    /// The configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an entry, overwriting the oldest when full.
    pub fn push(&self, entry: ShortTermEntry) {
        let mut ring = self.inner.lock();
        let head = ring.head;
        ring.slots[head] = Some(entry);
        ring.head = (head + 1) % self.capacity;
        ring.writes += 1;
    }

    /// Current number of held entries.
    pub fn len(&self) -> usize {
        let ring = self.inner.lock();
        (ring.writes as usize).min(self.capacity)
    }

    /// True when nothing has been appended yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `n` most recent entries in chronological order (oldest of the
    /// `n` first).
    pub fn recent(&self, n: usize) -> Vec<ShortTermEntry> {
        let all = self.all();
        let skip = all.len().saturating_sub(n);
        all.into_iter().skip(skip).collect()
    }

    /// All held entries in chronological order.
    pub fn all(&self) -> Vec<ShortTermEntry> {
        let ring = self.inner.lock();
        let len = (ring.writes as usize).min(self.capacity);
        let mut out = Vec::with_capacity(len);
        // The oldest entry sits at head when the ring has wrapped, at
        // slot 0 otherwise.
        let start = if ring.writes as usize > self.capacity {
            ring.head
        } else {
            0
        };
        for i in 0..len {
            let idx = (start + i) % self.capacity;
            if let Some(entry) = &ring.slots[idx] {
                out.push(entry.clone());
            }
        }
        out
    }

    /// Drop every entry and reset the write counter.
    pub fn clear(&self) {
        let mut ring = self.inner.lock();
        for slot in ring.slots.iter_mut() {
            *slot = None;
        }
        ring.head = 0;
        ring.writes = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overhuman_types::memory::Role;

    fn entry(content: &str) -> ShortTermEntry {
        ShortTermEntry::new(Role::User, content)
    }

    #[test]
    fn zero_capacity_defaults_to_fifty() {
        let mem = ShortTermMemory::new(0);
        assert_eq!(mem.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn push_and_len() {
        let mem = ShortTermMemory::new(10);
        assert!(mem.is_empty());
        mem.push(entry("one"));
        mem.push(entry("two"));
        assert_eq!(mem.len(), 2);
    }

    #[test]
    fn all_is_chronological() {
        let mem = ShortTermMemory::new(5);
        for i in 0..3 {
            mem.push(entry(&format!("m{i}")));
        }
        let all = mem.all();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].content, "m0");
        assert_eq!(all[2].content, "m2");
    }

    #[test]
    fn overflow_keeps_last_capacity_entries_in_order() {
        let capacity = 4;
        let mem = ShortTermMemory::new(capacity);
        for i in 0..9 {
            mem.push(entry(&format!("m{i}")));
        }
        assert_eq!(mem.len(), capacity);
        let all = mem.all();
        let contents: Vec<&str> = all.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["m5", "m6", "m7", "m8"]);
    }

    #[test]
    fn exactly_full_is_not_wrapped() {
        let mem = ShortTermMemory::new(3);
        for i in 0..3 {
            mem.push(entry(&format!("m{i}")));
        }
        let contents: Vec<String> = mem.all().into_iter().map(|e| e.content).collect();
        assert_eq!(contents, vec!["m0", "m1", "m2"]);
    }

    #[test]
    fn recent_returns_tail_in_order() {
        let mem = ShortTermMemory::new(10);
        for i in 0..6 {
            mem.push(entry(&format!("m{i}")));
        }
        let recent = mem.recent(3);
        let contents: Vec<&str> = recent.iter().map(|e| e.content.as_str()).collect();
        assert_eq!(contents, vec!["m3", "m4", "m5"]);
    }

    #[test]
    fn recent_larger_than_len_returns_everything() {
        let mem = ShortTermMemory::new(10);
        mem.push(entry("only"));
        assert_eq!(mem.recent(100).len(), 1);
    }

    #[test]
    fn clear_resets() {
        let mem = ShortTermMemory::new(3);
        for i in 0..5 {
            mem.push(entry(&format!("m{i}")));
        }
        mem.clear();
        assert!(mem.is_empty());
        assert!(mem.all().is_empty());

        mem.push(entry("fresh"));
        assert_eq!(mem.all()[0].content, "fresh");
    }

    #[test]
    fn concurrent_pushes_never_lose_capacity_invariant() {
        use std::sync::Arc;
        let mem = Arc::new(ShortTermMemory::new(8));
        let mut handles = Vec::new();
        for t in 0..4 {
            let mem = Arc::clone(&mem);
            handles.push(std::thread::spawn(move || {
                for i in 0..50 {
                    mem.push(ShortTermEntry::new(Role::User, format!("t{t}-{i}")));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(mem.len(), 8);
        assert_eq!(mem.all().len(), 8);
    }
}
