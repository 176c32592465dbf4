// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Emulate DOS attribute bytes over host inodes.
// Author: Lukas Bower

//! DOS attribute adapter.
//!
//! Directories always read as `0x10` with size zero. Regular files on a
//! FAT-backed drive carry the filesystem's own DOS attribute byte (fetched
//! through the FAT ioctls); on any other backing store the attribute is
//! synthesized as `0x20` (archive). Modification times are packed into the
//! DOS date+time dword in all cases.

use std::fs;
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::time::UNIX_EPOCH;

use etherdfs_wire::{dos_time_from_unix, FileProps};
use log::debug;

use crate::names::fcb_from_name;

const FAT_IOCTL_GET_ATTRIBUTES: libc::c_ulong = 0x8004_7210;
const FAT_IOCTL_SET_ATTRIBUTES: libc::c_ulong = 0x4004_7211;

fn mtime_to_dos(meta: &fs::Metadata) -> u32 {
    let secs = meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map_or(0, |d| d.as_secs() as i64);
    dos_time_from_unix(secs)
}

/// Stat `path` and build its wire-visible properties.
///
/// `None` maps to the 0xFF "no such item" attribute on the wire.
#[must_use]
pub fn item_props(path: &Path, fat: bool) -> Option<FileProps> {
    let meta = fs::metadata(path).ok()?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut props = FileProps {
        fattr: 0,
        fcbname: fcb_from_name(&name),
        ftime: mtime_to_dos(&meta),
        fsize: 0,
    };
    if meta.is_dir() {
        props.fattr = FileProps::ATTR_DIR;
        return Some(props);
    }
    props.fsize = meta.len() as u32;
    if !fat {
        props.fattr = FileProps::ATTR_ARC;
        return Some(props);
    }
    let file = fs::File::open(path).ok()?;
    let mut attr: u32 = 0;
    let rc = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            FAT_IOCTL_GET_ATTRIBUTES,
            &mut attr as *mut u32,
        )
    };
    if rc < 0 {
        debug!(
            "FAT attribute read failed for '{}': {}",
            path.display(),
            std::io::Error::last_os_error()
        );
        // attribute stays 0; the entry is still listed
    } else {
        props.fattr = attr as u8;
    }
    Some(props)
}

/// DOS attribute byte of `path`, with 0xFF standing in for a failed stat.
#[must_use]
pub fn attr_byte(path: &Path, fat: bool) -> u8 {
    item_props(path, fat).map_or(0xff, |p| p.fattr)
}

/// Write a DOS attribute byte through to a FAT-backed file.
pub fn set_item_attr(path: &Path, fattr: u8) -> std::io::Result<()> {
    let file = fs::File::open(path)?;
    let attr: u32 = u32::from(fattr);
    let rc = unsafe {
        libc::ioctl(
            file.as_raw_fd(),
            FAT_IOCTL_SET_ATTRIBUTES,
            &attr as *const u32,
        )
    };
    if rc < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}
