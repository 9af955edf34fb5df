use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;

use crate::types::MemoryFlag;

pub const DEFAULT_ARCHIVE_CAPACITY: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryOrigin {
    Translator,
    Cognitive,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArchivedMemory {
    pub summary: String,
    pub importance: f32,
    pub origin: MemoryOrigin,
    pub recorded_at: DateTime<Utc>,
}

/// Bounded in-memory log of memories flagged during cycles. Oldest entries
/// are dropped first once the capacity is reached.
#[derive(Debug, Clone)]
pub struct MemoryArchive {
    entries: VecDeque<ArchivedMemory>,
    capacity: usize,
}

impl Default for MemoryArchive {
    fn default() -> Self {
        Self::new(DEFAULT_ARCHIVE_CAPACITY)
    }
}

impl MemoryArchive {
    pub fn new(capacity: usize) -> Self {
        MemoryArchive {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, flags: &[MemoryFlag], origin: MemoryOrigin) {
        let now = Utc::now();
        for flag in flags {
            if self.entries.len() == self.capacity {
                self.entries.pop_front();
            }
            self.entries.push_back(ArchivedMemory {
                summary: flag.summary.clone(),
                importance: flag.importance,
                origin,
                recorded_at: now,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Up to `limit` entries, newest first.
    pub fn recent(&self, limit: usize) -> Vec<ArchivedMemory> {
        self.entries.iter().rev().take(limit).cloned().collect()
    }
}
