// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Thin host-filesystem verbs backing the request handlers.
// Author: Lukas Bower

//! Host filesystem operations.
//!
//! Each verb maps onto one host call and reports failure through
//! `io::Result`; the dispatcher folds errors into DOS `AX` codes. Nothing
//! here knows about frames or drive letters.

use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

use log::debug;

use crate::names::{explode_virtual, fcb_from_name, matches_mask};

/// Read up to `len` bytes from `path` starting at `offset`.
///
/// Short reads happen only at end of file.
pub fn read_at(path: &Path, offset: u64, len: usize) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    let mut total = 0;
    while total < len {
        let n = file.read(&mut buf[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    buf.truncate(total);
    Ok(buf)
}

/// Write `data` to `path` at `offset`, returning the byte count.
///
/// An empty `data` reinterprets `offset` as a size: the file is resized to
/// that length (grown or shrunk). Resize failures are not reported, only
/// logged, mirroring how DOS clients use zero-length writes.
pub fn write_at(path: &Path, offset: u64, data: &[u8]) -> io::Result<usize> {
    if data.is_empty() {
        match OpenOptions::new().write(true).open(path) {
            Ok(file) => {
                if let Err(err) = file.set_len(offset) {
                    debug!("resize of '{}' to {} failed: {}", path.display(), offset, err);
                }
            }
            Err(err) => debug!("resize open of '{}' failed: {}", path.display(), err),
        }
        return Ok(0);
    }
    let mut file = OpenOptions::new().write(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)?;
    Ok(data.len())
}

/// Create `path` as an empty file, truncating any existing content.
pub fn create_truncate(path: &Path) -> io::Result<()> {
    File::create(path)?;
    Ok(())
}

/// Create a directory. Mode 0, as DOS clients carry no permission notion.
pub fn make_dir(path: &Path) -> io::Result<()> {
    fs::DirBuilder::new().mode(0).create(path)
}

/// Remove an (empty) directory.
pub fn remove_dir(path: &Path) -> io::Result<()> {
    fs::remove_dir(path)
}

/// Change the process working directory.
pub fn change_dir(path: &Path) -> io::Result<()> {
    std::env::set_current_dir(path)
}

/// Rename `from` to `to`.
pub fn rename_entry(from: &Path, to: &Path) -> io::Result<()> {
    fs::rename(from, to)
}

/// Delete by literal path or `?`-pattern.
///
/// A pattern enumerates its directory and unlinks every non-directory entry
/// whose FCB form matches; individual unlink failures are logged and
/// skipped. Without a `?` the path is unlinked directly.
pub fn delete_glob(pattern: &str) -> io::Result<()> {
    if !pattern.contains('?') {
        return fs::remove_file(pattern);
    }
    let (dir, file) = explode_virtual(pattern);
    let mask = fcb_from_name(file);
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if matches_mask(&mask, &fcb_from_name(&name.to_string_lossy())) {
            if let Err(err) = fs::remove_file(entry.path()) {
                debug!("failed to delete '{}': {}", entry.path().display(), err);
            }
        }
    }
    Ok(())
}

/// Total and free bytes of the volume holding `path`.
pub fn disk_info(path: &Path) -> io::Result<(u64, u64)> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    let mut vfs: libc::statvfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statvfs(cpath.as_ptr(), &mut vfs) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    let total = u64::from(vfs.f_blocks) * u64::from(vfs.f_frsize);
    let free = u64::from(vfs.f_bfree) * u64::from(vfs.f_bsize);
    Ok((total, free))
}

/// Whether `path` resides on a real FAT mount.
#[must_use]
pub fn is_fat(path: &Path) -> bool {
    const MSDOS_SUPER_MAGIC: libc::c_long = 0x4d44;
    let Ok(cpath) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    let mut sfs: libc::statfs = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::statfs(cpath.as_ptr(), &mut sfs) };
    rc == 0 && sfs.f_type == MSDOS_SUPER_MAGIC
}
