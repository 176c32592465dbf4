// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Library root wiring the EtherDFS server subsystems together.
// Author: Lukas Bower

//! EtherDFS server library.
//!
//! The binary in `main.rs` owns the process lifecycle (CLI, lockfile,
//! signals, daemonization, raw socket loop); everything protocol- and
//! filesystem-shaped lives here so the request engine can be driven by
//! tests without a socket or root privileges.

/// DOS attribute adapter over host inodes
pub mod attrs;
/// Per-client reply memo for retransmit suppression
pub mod answercache;
/// Command-line interface definition
pub mod cli;
/// Request engine: validation, replay probe, subfunction routing
pub mod dispatch;
/// Drive-letter table and FAT-backing probe
pub mod drives;
/// Handle and directory-listing cache
pub mod fsdb;
/// Thin host-filesystem verbs
pub mod fsops;
/// Instance lock file
pub mod lock;
/// DOS 8.3 name handling and short-to-long path resolution
pub mod names;
/// Raw AF_PACKET frame I/O
pub mod net;
