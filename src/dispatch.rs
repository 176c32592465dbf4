// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Decode EtherDFS requests and produce finalized replies.
// Author: Lukas Bower

//! Request engine.
//!
//! `Engine::handle_frame` is the whole per-frame pipeline: well-formedness
//! and addressing checks, the replay probe against the answer cache, drive
//! validation, subfunction routing and reply finalization. Anything
//! malformed, unknown or aimed at an unmapped drive is dropped without a
//! reply so polling clients cannot flood the log or the wire.

use std::fs;
use std::path::{Path, PathBuf};

use etherdfs_wire::{
    doserr, finalize_in_place, FileProps, ReplyFrame, RequestFrame, Subfunction, FCB_LEN,
};
use log::{debug, warn};

use crate::answercache::AnswerCache;
use crate::attrs;
use crate::drives::{DriveTable, FIRST_DRIVE, LAST_DRIVE};
use crate::fsdb::Fsdb;
use crate::fsops;
use crate::names::{
    self, attr_allows, explode_virtual, fcb_from_name, is_drive_root, matches_mask, virtual_path,
    Resolution,
};

/// Byte count below which a link frame cannot carry an EtherDFS header.
pub const MIN_FRAME_LEN: usize = etherdfs_wire::HEADER_LEN;

/// Server state driven by the event loop: one instance per process.
pub struct Engine {
    mac: [u8; 6],
    drives: DriveTable,
    fsdb: Fsdb,
    cache: AnswerCache,
}

impl Engine {
    /// Build an engine answering as `mac` for the given drive table.
    #[must_use]
    pub fn new(mac: [u8; 6], drives: DriveTable) -> Self {
        Self {
            mac,
            drives,
            fsdb: Fsdb::new(),
            cache: AnswerCache::new(),
        }
    }

    /// The MAC address replies are sourced from.
    #[must_use]
    pub fn server_mac(&self) -> [u8; 6] {
        self.mac
    }

    /// Process one received frame end to end.
    ///
    /// Returns the finalized reply to transmit, or `None` when the frame is
    /// to be ignored silently.
    pub fn handle_frame(&mut self, raw: &[u8]) -> Option<Vec<u8>> {
        let req = match RequestFrame::parse(raw) {
            Ok(req) => req,
            Err(err) => {
                debug!("dropping frame: {err}");
                return None;
            }
        };
        if !req.is_for(&self.mac) {
            return None;
        }
        let slot = self.cache.slot_for(req.src_mac());
        if let Some(frame) = self.cache.replay_frame_mut(slot, req.src_mac(), req.seq()) {
            debug!("answer cache hit (seq {:#04x})", req.seq());
            finalize_in_place(frame, req.wants_checksum());
            return Some(frame.clone());
        }
        match self.dispatch(&req) {
            Some(reply) => {
                let frame = reply.finalize(req.wants_checksum());
                self.cache.store(slot, frame.clone());
                Some(frame)
            }
            None => {
                self.cache.invalidate(slot);
                None
            }
        }
    }

    fn dispatch(&mut self, req: &RequestFrame<'_>) -> Option<ReplyFrame> {
        let drive = req.drive();
        if !(FIRST_DRIVE..=LAST_DRIVE).contains(&drive) {
            debug!("invalid drive value: {drive:#04x}");
            return None;
        }
        let Some(entry) = self.drives.get(drive) else {
            debug!("unknown drive: {}:", (b'A' + drive) as char);
            return None;
        };
        let root = entry.root.clone();
        let fat = entry.fat;
        let sub = match req.subfunction() {
            Ok(sub) => sub,
            Err(raw) => {
                debug!("unknown subfunction {raw:#04x}");
                return None;
            }
        };
        let payload = req.payload();
        debug!("query {:#04x} on drive {}:", sub as u8, (b'A' + drive) as char);

        let mut reply = ReplyFrame::for_request(req, &self.mac);
        match sub {
            Subfunction::InstallChk => reply.echo_drive_byte(req),
            Subfunction::CloseFile | Subfunction::CommitFile => {}
            Subfunction::LockFile | Subfunction::UnlockFile => {
                // lying that lock/unlock succeeded
            }
            Subfunction::DiskSpace => self.op_disk_space(&root, &mut reply),
            Subfunction::ReadFile => self.op_read(payload, &mut reply)?,
            Subfunction::WriteFile => self.op_write(payload, &mut reply)?,
            Subfunction::MkDir | Subfunction::RmDir => {
                self.op_make_remove_dir(sub, payload, &root, &mut reply);
            }
            Subfunction::ChDir => self.op_chdir(payload, &root, &mut reply),
            Subfunction::SetAttr => self.op_setattr(payload, &root, fat, &mut reply)?,
            Subfunction::GetAttr => self.op_getattr(payload, &root, fat, &mut reply)?,
            Subfunction::Rename => self.op_rename(payload, &root, &mut reply)?,
            Subfunction::Delete => self.op_delete(payload, &root, fat, &mut reply),
            Subfunction::Open | Subfunction::Create | Subfunction::SpecialOpen => {
                self.op_open_create(sub, payload, &root, fat, &mut reply)?;
            }
            Subfunction::FindFirst => self.op_find_first(payload, &root, fat, &mut reply)?,
            Subfunction::FindNext => self.op_find_next(payload, &root, fat, &mut reply)?,
            Subfunction::SeekFromEnd => self.op_seek_from_end(payload, &mut reply)?,
        }
        Some(reply)
    }

    fn op_disk_space(&mut self, root: &Path, reply: &mut ReplyFrame) {
        let (mut total, mut free) = fsops::disk_info(root).unwrap_or((0, 0));
        // MS-DOS is confused by anything at or above 2 GiB
        total = total.min(2_147_483_647);
        free = free.min(2_147_483_647);
        debug!("diskspace: total {} KiB, free {} KiB", total >> 10, free >> 10);
        // AX: media id | sectors per cluster; BX/DX in 32 KiB clusters
        reply.set_ax(1);
        reply.put_u16((total >> 15) as u16);
        reply.put_u16(32_768);
        reply.put_u16((free >> 15) as u16);
    }

    fn op_read(&mut self, payload: &[u8], reply: &mut ReplyFrame) -> Option<()> {
        if payload.len() != 8 {
            return None;
        }
        let offset = u32::from_le_bytes(payload[0..4].try_into().ok()?);
        let handle = u16::from_le_bytes(payload[4..6].try_into().ok()?);
        let len = u16::from_le_bytes(payload[6..8].try_into().ok()?);
        debug!("read {len} bytes of handle #{handle} at offset {offset}");
        match self.fsdb.lookup(handle) {
            Some(path) => match fsops::read_at(Path::new(path), u64::from(offset), len.into()) {
                Ok(data) => reply.put_bytes(&data),
                Err(err) => {
                    debug!("read failed: {err}");
                    reply.set_ax(doserr::ACCESS_DENIED);
                }
            },
            None => {
                debug!("read with invalid handle #{handle}");
                reply.set_ax(doserr::ACCESS_DENIED);
            }
        }
        Some(())
    }

    fn op_write(&mut self, payload: &[u8], reply: &mut ReplyFrame) -> Option<()> {
        if payload.len() < 6 {
            return None;
        }
        let offset = u32::from_le_bytes(payload[0..4].try_into().ok()?);
        let handle = u16::from_le_bytes(payload[4..6].try_into().ok()?);
        let data = &payload[6..];
        debug!("write {} bytes into handle #{handle} at offset {offset}", data.len());
        match self.fsdb.lookup(handle) {
            Some(path) => match fsops::write_at(Path::new(path), u64::from(offset), data) {
                Ok(written) => reply.put_u16(written as u16),
                Err(err) => {
                    debug!("write failed: {err}");
                    reply.set_ax(doserr::ACCESS_DENIED);
                }
            },
            None => {
                debug!("write with invalid handle #{handle}");
                reply.set_ax(doserr::ACCESS_DENIED);
            }
        }
        Some(())
    }

    fn op_make_remove_dir(
        &mut self,
        sub: Subfunction,
        payload: &[u8],
        root: &Path,
        reply: &mut ReplyFrame,
    ) {
        let virt = virtual_path(payload);
        let resolution = names::resolve(root, &virt);
        // a partial resolution still names the create target for MKDIR
        let host = resolution.joined();
        let result = if sub == Subfunction::MkDir {
            debug!("mkdir '{}'", host.display());
            fsops::make_dir(&host)
        } else {
            debug!("rmdir '{}'", host.display());
            fsops::remove_dir(&host)
        };
        if let Err(err) = result {
            debug!("mkdir/rmdir failed: {err}");
            reply.set_ax(doserr::WRITE_FAULT);
        }
    }

    fn op_chdir(&mut self, payload: &[u8], root: &Path, reply: &mut ReplyFrame) {
        let virt = virtual_path(payload);
        match names::resolve(root, &virt).resolved() {
            Some(host) => {
                debug!("chdir '{}'", host.display());
                if let Err(err) = fsops::change_dir(host) {
                    debug!("chdir failed: {err}");
                    reply.set_ax(doserr::PATH_NOT_FOUND);
                }
            }
            None => {
                debug!("chdir: no host path for '{virt}'");
                reply.set_ax(doserr::PATH_NOT_FOUND);
            }
        }
    }

    fn op_setattr(
        &mut self,
        payload: &[u8],
        root: &Path,
        fat: bool,
        reply: &mut ReplyFrame,
    ) -> Option<()> {
        if payload.len() < 2 {
            return None;
        }
        let fattr = payload[0];
        let virt = virtual_path(&payload[1..]);
        debug!("setattr {fattr:#04x} on '{virt}'");
        match names::resolve(root, &virt).resolved() {
            Some(host) => {
                if fat {
                    if let Err(err) = attrs::set_item_attr(host, fattr) {
                        debug!("setattr failed: {err}");
                        reply.set_ax(doserr::FILE_NOT_FOUND);
                    }
                }
                // non-FAT roots accept and drop attribute changes
            }
            None => reply.set_ax(doserr::FILE_NOT_FOUND),
        }
        Some(())
    }

    fn op_getattr(
        &mut self,
        payload: &[u8],
        root: &Path,
        fat: bool,
        reply: &mut ReplyFrame,
    ) -> Option<()> {
        if payload.is_empty() {
            return None;
        }
        let virt = virtual_path(payload);
        debug!("getattr on '{virt}'");
        match names::resolve(root, &virt).resolved() {
            Some(host) => match attrs::item_props(host, fat) {
                Some(props) => {
                    debug!("found ({} bytes, attr {:#04x})", props.fsize, props.fattr);
                    reply.put_u32(props.ftime);
                    reply.put_u32(props.fsize);
                    reply.put_u8(props.fattr);
                }
                None => reply.set_ax(doserr::FILE_NOT_FOUND),
            },
            None => reply.set_ax(doserr::FILE_NOT_FOUND),
        }
        Some(())
    }

    fn op_rename(&mut self, payload: &[u8], root: &Path, reply: &mut ReplyFrame) -> Option<()> {
        if payload.len() < 3 {
            return None;
        }
        let len1 = payload[0] as usize;
        if payload.len() <= len1 {
            reply.set_ax(doserr::FILE_NOT_FOUND);
            return Some(());
        }
        let src_virt = virtual_path(&payload[1..1 + len1]);
        let dst_virt = virtual_path(&payload[1 + len1..]);
        debug!("rename '{src_virt}' -> '{dst_virt}'");
        match names::resolve(root, &src_virt).resolved() {
            Some(src) => {
                // destination is deliberately taken literally, not resolved
                let dst = PathBuf::from(format!("{}/{}", root.display(), dst_virt));
                if fs::metadata(&dst).is_ok() {
                    debug!("rename: '{}' exists already", dst.display());
                    reply.set_ax(doserr::ACCESS_DENIED);
                } else if let Err(err) = fsops::rename_entry(src, &dst) {
                    debug!("rename failed: {err}");
                    reply.set_ax(doserr::ACCESS_DENIED);
                }
            }
            None => {
                // unresolvable source leaves AX at success without renaming
                debug!("rename: no host path for '{src_virt}'");
            }
        }
        Some(())
    }

    fn op_delete(&mut self, payload: &[u8], root: &Path, fat: bool, reply: &mut ReplyFrame) {
        let virt = virtual_path(payload);
        debug!("delete '{virt}'");
        match names::resolve(root, &virt) {
            Resolution::Resolved(host) => {
                if attrs::attr_byte(&host, fat) & FileProps::ATTR_RO != 0 {
                    reply.set_ax(doserr::ACCESS_DENIED);
                } else if let Err(err) = fsops::delete_glob(&host.to_string_lossy()) {
                    debug!("delete failed: {err}");
                    reply.set_ax(doserr::FILE_NOT_FOUND);
                }
            }
            Resolution::Partial { dir, tail, more } if !more && tail.contains('?') => {
                let pattern = dir.join(&tail);
                if let Err(err) = fsops::delete_glob(&pattern.to_string_lossy()) {
                    debug!("glob delete failed: {err}");
                    reply.set_ax(doserr::FILE_NOT_FOUND);
                }
            }
            Resolution::Partial { .. } => {
                debug!("delete: no host path for '{virt}'");
                reply.set_ax(doserr::FILE_NOT_FOUND);
            }
        }
    }

    fn op_open_create(
        &mut self,
        sub: Subfunction,
        payload: &[u8],
        root: &Path,
        fat: bool,
        reply: &mut ReplyFrame,
    ) -> Option<()> {
        if payload.len() < 7 {
            return None;
        }
        let stackattr = u16::from_le_bytes(payload[0..2].try_into().ok()?);
        let action = u16::from_le_bytes(payload[2..4].try_into().ok()?);
        let spopen_mode = u16::from_le_bytes(payload[4..6].try_into().ok()?);
        let full_virt = virtual_path(&payload[6..]);
        let (dir_virt, fname_raw) = explode_virtual(&full_virt);

        let Some(host_dir) = names::resolve(root, dir_virt).resolved().map(Path::to_path_buf)
        else {
            debug!("open/create: directory of '{full_virt}' does not resolve");
            reply.set_ax(doserr::PATH_NOT_FOUND);
            return Some(());
        };
        if !host_dir.is_dir() {
            debug!("open/create: '{}' is not a directory", host_dir.display());
            reply.set_ax(doserr::PATH_NOT_FOUND);
            return Some(());
        }
        let (host_full, fname) = match names::resolve(root, &full_virt) {
            Resolution::Resolved(p) => {
                let name = p
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                (p, name)
            }
            Resolution::Partial { .. } => (host_dir.join(fname_raw), fname_raw.to_string()),
        };
        debug!(
            "looking for '{}' (FCB '{}') in '{}'",
            fname,
            String::from_utf8_lossy(&fcb_from_name(&fname)),
            host_dir.display()
        );

        let mut spopres: u16 = 0;
        let resopenmode: u8;
        let outcome = match sub {
            Subfunction::Create => {
                debug!("create, attr {stackattr:#06x}");
                resopenmode = 2;
                self.create_file(&host_full, (stackattr & 0xff) as u8, fat)
            }
            Subfunction::SpecialOpen => {
                debug!("special open, action {action:#06x}");
                resopenmode = (spopen_mode & 0x7f) as u8;
                match attrs::item_props(&host_full, fat) {
                    None if action & 0xf0 == 0x10 => {
                        spopres = 2;
                        self.create_file(&host_full, (stackattr & 0xff) as u8, fat)
                    }
                    None => None,
                    Some(props)
                        if props.fattr & (FileProps::ATTR_VOL | FileProps::ATTR_DIR) != 0 =>
                    {
                        None
                    }
                    Some(props) => match action & 0x0f {
                        1 => {
                            spopres = 1;
                            Some(props)
                        }
                        2 => {
                            spopres = 3;
                            self.create_file(&host_full, (stackattr & 0xff) as u8, fat)
                        }
                        _ => None,
                    },
                }
            }
            _ => {
                debug!("open");
                resopenmode = (stackattr & 0xff) as u8;
                match attrs::item_props(&host_full, fat) {
                    Some(props)
                        if props.fattr & (FileProps::ATTR_VOL | FileProps::ATTR_DIR) == 0 =>
                    {
                        Some(props)
                    }
                    _ => None,
                }
            }
        };

        match outcome {
            Some(props) => {
                let handle = self.fsdb.intern(&host_full.to_string_lossy());
                props.put(reply);
                reply.put_u16(handle);
                reply.put_u16(spopres);
                reply.put_u8(resopenmode);
            }
            None => {
                debug!("open/create failed for '{}'", host_full.display());
                reply.set_ax(doserr::FILE_NOT_FOUND);
            }
        }
        Some(())
    }

    fn op_find_first(
        &mut self,
        payload: &[u8],
        root: &Path,
        fat: bool,
        reply: &mut ReplyFrame,
    ) -> Option<()> {
        if payload.is_empty() {
            return None;
        }
        let fattr = payload[0];
        let virt = virtual_path(&payload[1..]);
        let (dir_virt, mask) = explode_virtual(&virt);
        let mask_fcb = fcb_from_name(mask);
        let root_str = root.to_string_lossy();
        let is_root = is_drive_root(&root_str, &format!("{root_str}/{dir_virt}"));
        debug!(
            "findfirst in '{dir_virt}', mask '{}' (attr {fattr:#04x})",
            String::from_utf8_lossy(&mask_fcb)
        );
        let host_dir = names::resolve(root, dir_virt).joined();
        let slot = self.fsdb.intern(&host_dir.to_string_lossy());
        let mut pos: u16 = 0;
        match self.find_file(slot, &mask_fcb, fattr, &mut pos, is_root, fat) {
            Some(props) => {
                props.put(reply);
                reply.put_u16(slot);
                reply.put_u16(pos);
            }
            None => {
                debug!("no matching file found");
                reply.set_ax(doserr::NO_MORE_FILES);
            }
        }
        Some(())
    }

    fn op_find_next(
        &mut self,
        payload: &[u8],
        root: &Path,
        fat: bool,
        reply: &mut ReplyFrame,
    ) -> Option<()> {
        if payload.len() < 5 + FCB_LEN {
            return None;
        }
        let slot = u16::from_le_bytes(payload[0..2].try_into().ok()?);
        let mut pos = u16::from_le_bytes(payload[2..4].try_into().ok()?);
        let fattr = payload[4];
        let mask_fcb: [u8; FCB_LEN] = payload[5..5 + FCB_LEN].try_into().ok()?;
        let root_str = root.to_string_lossy();
        let is_root = self
            .fsdb
            .lookup(slot)
            .map(|p| is_drive_root(&root_str, p))
            .unwrap_or(false);
        debug!(
            "findnext after position {pos} in dir #{slot}, mask '{}'",
            String::from_utf8_lossy(&mask_fcb)
        );
        match self.find_file(slot, &mask_fcb, fattr, &mut pos, is_root, fat) {
            Some(props) => {
                props.put(reply);
                reply.put_u16(slot);
                reply.put_u16(pos);
            }
            None => {
                debug!("no more matching files");
                reply.set_ax(doserr::NO_MORE_FILES);
            }
        }
        Some(())
    }

    fn op_seek_from_end(&mut self, payload: &[u8], reply: &mut ReplyFrame) -> Option<()> {
        if payload.len() != 6 {
            return None;
        }
        let mut offset = i64::from(i32::from_le_bytes(payload[0..4].try_into().ok()?));
        let handle = u16::from_le_bytes(payload[4..6].try_into().ok()?);
        debug!("seek-from-end on handle #{handle} at offset {offset}");
        if offset > 0 {
            offset = 0;
        }
        let size = self
            .fsdb
            .lookup(handle)
            .and_then(|p| attrs::item_props(Path::new(p), false))
            .map(|props| i64::from(props.fsize));
        match size {
            Some(size) => {
                let new = (offset + size).max(0);
                reply.put_u32(new as u32);
            }
            None => reply.set_ax(doserr::FILE_NOT_FOUND),
        }
        Some(())
    }

    /// Scan the snapshot attached to `slot` for the first entry past `nth`
    /// matching the mask and attribute rules. Position 0 (or a missing
    /// snapshot) regenerates the listing first; on a hit, `nth` becomes the
    /// entry's 1-based position.
    fn find_file(
        &mut self,
        slot: u16,
        mask: &[u8; FCB_LEN],
        attr: u8,
        nth: &mut u16,
        is_root: bool,
        fat: bool,
    ) -> Option<FileProps> {
        if *nth == 0 || self.fsdb.snapshot(slot).is_none() {
            let path = self.fsdb.lookup(slot)?.to_owned();
            let snapshot = dir_snapshot(Path::new(&path), fat)?;
            self.fsdb.set_snapshot(slot, snapshot);
        }
        let snapshot = self.fsdb.snapshot(slot)?;
        for (i, props) in snapshot.iter().enumerate() {
            let n = (i + 1) as u16;
            if n <= *nth {
                continue;
            }
            if is_root && props.fcbname[0] == b'.' {
                continue;
            }
            if !matches_mask(mask, &props.fcbname) {
                continue;
            }
            if !attr_allows(attr, props.fattr) {
                continue;
            }
            *nth = n;
            return Some(*props);
        }
        None
    }

    fn create_file(&self, path: &Path, attr: u8, fat: bool) -> Option<FileProps> {
        if let Err(err) = fsops::create_truncate(path) {
            debug!("create of '{}' failed: {err}", path.display());
            return None;
        }
        if fat {
            if let Err(err) = attrs::set_item_attr(path, attr) {
                warn!("failed to set attribute {attr:#04x} on '{}': {err}", path.display());
            }
        }
        attrs::item_props(path, fat)
    }
}

/// Enumerate a host directory into snapshot order: the `.` and `..`
/// entries first, then the host's native listing order. A failed stat
/// leaves a zeroed entry, like a file deleted mid-scan.
fn dir_snapshot(dir: &Path, fat: bool) -> Option<Vec<FileProps>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("failed to scan dir '{}': {err}", dir.display());
            return None;
        }
    };
    let mut snapshot = Vec::new();
    let mut dot = attrs::item_props(dir, fat).unwrap_or_default();
    dot.fcbname = fcb_from_name(".");
    snapshot.push(dot);
    let mut dotdot = attrs::item_props(dir.parent().unwrap_or(dir), fat).unwrap_or_default();
    dotdot.fcbname = fcb_from_name("..");
    snapshot.push(dotdot);
    for entry in entries.flatten() {
        let full = dir.join(entry.file_name());
        snapshot.push(attrs::item_props(&full, fat).unwrap_or_default());
    }
    Some(snapshot)
}
