// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Map drive letters C: through Z: onto canonical host roots.
// Author: Lukas Bower

//! Drive table.
//!
//! Drives are numbered 0=A: .. 25=Z:; the first mapped letter is C: (2).
//! Each root is canonicalized once at startup and probed once for FAT
//! backing; a root remounted under a running server is not re-detected.

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::debug;

use crate::fsops;

/// First assignable drive number (C:).
pub const FIRST_DRIVE: u8 = 2;
/// Last assignable drive number (Z:).
pub const LAST_DRIVE: u8 = 25;

/// One mapped drive.
#[derive(Debug, Clone)]
pub struct DriveRoot {
    /// Absolute canonical host root.
    pub root: PathBuf,
    /// Whether the backing filesystem is a real FAT mount.
    pub fat: bool,
}

/// Fixed 26-entry drive table.
#[derive(Debug)]
pub struct DriveTable {
    entries: [Option<DriveRoot>; 26],
}

impl DriveTable {
    /// Assign `paths` to consecutive letters starting at C:.
    ///
    /// Fails when a path cannot be canonicalized; this aborts startup.
    pub fn from_roots(paths: &[PathBuf]) -> Result<Self> {
        let mut entries: [Option<DriveRoot>; 26] = Default::default();
        for (i, path) in paths.iter().enumerate() {
            let root = path
                .canonicalize()
                .with_context(|| format!("failed to resolve path '{}'", path.display()))?;
            let fat = fsops::is_fat(&root);
            if !fat {
                debug!(
                    "path '{}' is not FAT-backed; DOS attributes will be synthesized",
                    root.display()
                );
            }
            entries[FIRST_DRIVE as usize + i] = Some(DriveRoot { root, fat });
        }
        Ok(Self { entries })
    }

    /// The mapping for `drive`, if any.
    #[must_use]
    pub fn get(&self, drive: u8) -> Option<&DriveRoot> {
        self.entries.get(drive as usize)?.as_ref()
    }

    /// All mapped drives as `(drive number, root)` pairs.
    pub fn mapped(&self) -> impl Iterator<Item = (u8, &DriveRoot)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|r| (i as u8, r)))
    }

    /// Build a table from pre-resolved roots without probing; test seam.
    pub fn from_resolved(roots: Vec<(u8, PathBuf)>) -> Self {
        let mut entries: [Option<DriveRoot>; 26] = Default::default();
        for (drive, root) in roots {
            entries[drive as usize] = Some(DriveRoot { root, fat: false });
        }
        Self { entries }
    }
}
