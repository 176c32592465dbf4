// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Guard against concurrent server instances with a lock file.
// Author: Lukas Bower

//! Instance lock.
//!
//! The lock is the existence of the file: creation is atomic-exclusive, so
//! a second instance fails to start, and the guard removes the file again
//! on every clean exit path.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

/// Default lock path used by the server binary.
pub const LOCK_PATH: &str = "/var/run/ethersrv.lock";

/// Held instance lock; dropping it releases the file.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Atomically create the lock file, failing if it already exists.
    pub fn acquire<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        debug!("acquired lock '{}'", path.display());
        Ok(Self { path })
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            debug!("failed to remove lock '{}': {}", self.path.display(), err);
        }
    }
}
