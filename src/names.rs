// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Translate DOS 8.3 paths onto the case-sensitive host tree.
// Author: Lukas Bower

//! DOS name handling: FCB canonicalization, `?`-mask matching and
//! component-wise short-to-long path resolution.
//!
//! The wire carries uppercase-ish 8.3 components separated by backslashes;
//! the host has case-sensitive long names. Every comparison goes through the
//! canonical 11-byte FCB form so `readme.txt`, `README.TXT` and `Readme.Txt`
//! are the same file.

use std::fs;
use std::path::{Path, PathBuf};

use etherdfs_wire::{FileProps, FCB_LEN};
use log::debug;

/// Outcome of resolving a virtual path against the host tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Every component matched a host entry; the path exists (modulo races).
    Resolved(PathBuf),
    /// Resolution stopped at `tail`; `dir` is the deepest resolved prefix.
    ///
    /// Components after `tail` are dropped. Lookup-style callers treat this
    /// as "not found"; create-style callers join `dir` and `tail` to name
    /// the entry they are about to make.
    Partial {
        /// Deepest host prefix that resolved.
        dir: PathBuf,
        /// First virtual component with no matching host entry.
        tail: String,
        /// Whether further components followed the unresolved one.
        more: bool,
    },
}

impl Resolution {
    /// The resolved host path, if resolution completed.
    #[must_use]
    pub fn resolved(&self) -> Option<&Path> {
        match self {
            Resolution::Resolved(p) => Some(p),
            Resolution::Partial { .. } => None,
        }
    }

    /// Host path for this outcome: the resolved path, or `dir/tail`.
    #[must_use]
    pub fn joined(&self) -> PathBuf {
        match self {
            Resolution::Resolved(p) => p.clone(),
            Resolution::Partial { dir, tail, .. } => dir.join(tail),
        }
    }
}

/// Normalize a wire path: strip an optional drive prefix, map backslashes to
/// slashes and downcase.
#[must_use]
pub fn virtual_path(raw: &[u8]) -> String {
    let mut s = String::from_utf8_lossy(raw).into_owned();
    if s.len() >= 2 && s.as_bytes()[1] == b':' {
        s.drain(..2);
    }
    s = s.replace('\\', "/");
    s.make_ascii_lowercase();
    s
}

/// Split a normalized path at its last slash into directory (slash kept) and
/// file/mask parts.
#[must_use]
pub fn explode_virtual(v: &str) -> (&str, &str) {
    match v.rfind('/') {
        Some(i) => (&v[..=i], &v[i + 1..]),
        None => ("", v),
    }
}

/// Whether `dir` names the drive root under `root`: after the root prefix
/// and any leading slashes, no further slash remains.
#[must_use]
pub fn is_drive_root(root: &str, dir: &str) -> bool {
    let tail = dir.get(root.len()..).unwrap_or("");
    !tail.trim_start_matches('/').contains('/')
}

/// Canonicalize a filename into the 11-byte FCB form: up to 8 basename
/// characters (embedded spaces skipped), then up to 3 extension characters
/// after the first literal dot, uppercased and space-padded. A leading run
/// of dots is kept verbatim so `.` and `..` stay addressable.
#[must_use]
pub fn fcb_from_name(name: &str) -> [u8; FCB_LEN] {
    let s = name.as_bytes();
    let mut fcb = [b' '; FCB_LEN];
    let mut out = 0;
    while out < 8 && s.get(out) == Some(&b'.') {
        fcb[out] = b'.';
        out += 1;
    }
    let mut idx = out;
    while out < 8 {
        match s.get(idx) {
            None | Some(&b'.') => break,
            Some(&b' ') => idx += 1,
            Some(&c) => {
                fcb[out] = c.to_ascii_uppercase();
                out += 1;
                idx += 1;
            }
        }
    }
    while idx < s.len() && s[idx] != b'.' {
        idx += 1;
    }
    if idx < s.len() {
        for (i, &c) in s[idx + 1..].iter().take(3).enumerate() {
            if c == b'.' || c == b' ' {
                break;
            }
            fcb[8 + i] = c.to_ascii_uppercase();
        }
    }
    fcb
}

/// Match an 11-byte FCB name against an FCB mask: `?` matches any single
/// byte, everything else compares case-insensitively.
#[must_use]
pub fn matches_mask(mask: &[u8; FCB_LEN], fcb: &[u8; FCB_LEN]) -> bool {
    mask.iter()
        .zip(fcb.iter())
        .all(|(&m, &f)| m == b'?' || m.to_ascii_uppercase() == f.to_ascii_uppercase())
}

/// Attribute filter for directory searches.
///
/// A volume-label query (0x08) selects only entries with the VOL bit. Any
/// other query uses inclusive semantics over the hide-set {HID, SYS, DIR}:
/// the entry's masked bits must all be permitted by the query attribute.
#[must_use]
pub fn attr_allows(query: u8, fattr: u8) -> bool {
    if query == FileProps::ATTR_VOL {
        fattr & FileProps::ATTR_VOL != 0
    } else {
        (query | (fattr & 0x16)) == query
    }
}

/// Resolve a normalized virtual path component-by-component under `root`.
///
/// Each component's FCB form is compared against the FCB form of every host
/// entry in the resolved prefix; the first match wins, and intermediate
/// matches must be directories. The first component with no match stops the
/// walk and yields [`Resolution::Partial`].
#[must_use]
pub fn resolve(root: &Path, virt: &str) -> Resolution {
    let mut cur = root.to_path_buf();
    let mut components = virt.split('/').filter(|c| !c.is_empty()).peekable();
    while let Some(comp) = components.next() {
        let more = components.peek().is_some();
        let want = fcb_from_name(comp);
        let mut matched = None;
        match fs::read_dir(&cur) {
            Ok(entries) => {
                for entry in entries.flatten() {
                    let name = entry.file_name();
                    let name = name.to_string_lossy();
                    if fcb_from_name(&name) != want {
                        continue;
                    }
                    if more && !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                        continue;
                    }
                    matched = Some(name.into_owned());
                    break;
                }
            }
            Err(err) => {
                debug!("failed to scan '{}': {}", cur.display(), err);
            }
        }
        match matched {
            Some(name) => cur.push(name),
            None => {
                return Resolution::Partial {
                    dir: cur,
                    tail: comp.to_string(),
                    more,
                };
            }
        }
    }
    Resolution::Resolved(cur)
}
