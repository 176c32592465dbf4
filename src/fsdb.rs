// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Map host paths to 16-bit wire handles and cache dir snapshots.
// Author: Lukas Bower

//! Handle and directory-listing cache.
//!
//! The wire protocol needs file and directory handles that fit in 16 bits
//! and survive across requests, so the slot index doubles as the handle.
//! A slot holds the host path it was interned for, a last-used stamp, and
//! optionally the directory snapshot driving FINDFIRST/FINDNEXT pagination.

use std::time::{Duration, Instant};

use etherdfs_wire::FileProps;
use log::debug;

/// Sentinel meaning "no slot"; never a valid handle.
pub const NO_SLOT: u16 = 0xffff;

const SLOT_COUNT: usize = NO_SLOT as usize;
const IDLE_EXPIRY: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct Entry {
    path: String,
    last_used: Instant,
    snapshot: Option<Vec<FileProps>>,
}

/// Bounded path-to-handle arena with LRU reclamation.
#[derive(Debug)]
pub struct Fsdb {
    slots: Vec<Option<Entry>>,
}

impl Fsdb {
    /// Full-size table covering the whole 16-bit handle space.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(SLOT_COUNT)
    }

    /// Reduced-capacity table; used by tests exercising eviction.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    /// Return the slot holding `path`, allocating one if needed.
    ///
    /// A hit refreshes the last-used stamp. The scan frees entries idle
    /// beyond one hour as it goes; allocation prefers the first free slot
    /// and otherwise evicts the least recently used one, dropping its
    /// snapshot.
    pub fn intern(&mut self, path: &str) -> u16 {
        let now = Instant::now();
        let mut first_free = None;
        let mut oldest: Option<(usize, Instant)> = None;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            match slot {
                Some(entry) if entry.path == path => {
                    entry.last_used = now;
                    return i as u16;
                }
                Some(entry) => {
                    if now.duration_since(entry.last_used) > IDLE_EXPIRY {
                        debug!("expiring idle handle {} ('{}')", i, entry.path);
                        *slot = None;
                        if first_free.is_none() {
                            first_free = Some(i);
                        }
                    } else if oldest.map_or(true, |(_, t)| entry.last_used < t) {
                        oldest = Some((i, entry.last_used));
                    }
                }
                None => {
                    if first_free.is_none() {
                        first_free = Some(i);
                    }
                }
            }
        }
        let idx = match (first_free, oldest) {
            (Some(i), _) => i,
            (None, Some((i, _))) => {
                debug!("evicting handle {} ('{}')", i, self.path_of(i));
                i
            }
            (None, None) => 0,
        };
        self.slots[idx] = Some(Entry {
            path: path.to_string(),
            last_used: now,
            snapshot: None,
        });
        idx as u16
    }

    fn path_of(&self, idx: usize) -> &str {
        self.slots[idx]
            .as_ref()
            .map(|e| e.path.as_str())
            .unwrap_or("")
    }

    /// Host path held by `slot`, if occupied.
    #[must_use]
    pub fn lookup(&self, slot: u16) -> Option<&str> {
        self.slots
            .get(slot as usize)?
            .as_ref()
            .map(|e| e.path.as_str())
    }

    /// Directory snapshot attached to `slot`, if any.
    #[must_use]
    pub fn snapshot(&self, slot: u16) -> Option<&[FileProps]> {
        self.slots
            .get(slot as usize)?
            .as_ref()?
            .snapshot
            .as_deref()
    }

    /// Attach a freshly generated directory snapshot to `slot`.
    pub fn set_snapshot(&mut self, slot: u16, snapshot: Vec<FileProps>) {
        if let Some(Some(entry)) = self.slots.get_mut(slot as usize) {
            entry.snapshot = Some(snapshot);
        }
    }
}

impl Default for Fsdb {
    fn default() -> Self {
        Self::new()
    }
}
