// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define EtherDFS wire constants, opcodes and shared frame types.
// Author: Lukas Bower

//! EtherDFS data model definitions shared by the codec and the server.

/// EtherType carried in Ethernet header bytes 12..14 (big-endian on the wire).
pub const ETHERTYPE_DFS: u16 = 0xEDF5;

/// Protocol version encoded in the low seven bits of the proto byte.
pub const PROTO_VERSION: u8 = 2;

/// Fixed EtherDFS header length; every valid frame is at least this long.
pub const HEADER_LEN: usize = 60;

/// Upper bound on an outgoing frame, matching the answer-cache slot size.
pub const MAX_REPLY_LEN: usize = 1520;

/// Length of an FCB-style 8.3 name block.
pub const FCB_LEN: usize = 11;

/// Offset of the big-endian EtherType word.
pub const OFF_ETHERTYPE: usize = 12;
/// Offset of the little-endian total EDF5 frame length (0 = use link length).
pub const OFF_EDF5_LEN: usize = 52;
/// Offset of the little-endian BSD checksum.
pub const OFF_CHECKSUM: usize = 54;
/// Offset of the version/checksum-flag byte (bit 7 = checksum present).
pub const OFF_PROTO: usize = 56;
/// Offset of the per-client sequence byte, echoed verbatim in replies.
pub const OFF_SEQ: usize = 57;
/// Offset of the drive/flags byte (low 5 bits drive, high 3 bits flags).
pub const OFF_DRIVE: usize = 58;
/// Offset of the subfunction (AL) byte.
pub const OFF_SUBFUNCTION: usize = 59;
/// Offset of the request-specific payload.
pub const OFF_PAYLOAD: usize = 60;

/// Ethernet broadcast address; requests may target it instead of the server.
pub const BROADCAST_MAC: [u8; 6] = [0xff; 6];

/// DOS error codes surfaced in the reply `AX` word.
pub mod doserr {
    /// Operation completed.
    pub const SUCCESS: u16 = 0;
    /// File not found.
    pub const FILE_NOT_FOUND: u16 = 2;
    /// Path not found.
    pub const PATH_NOT_FOUND: u16 = 3;
    /// Access denied.
    pub const ACCESS_DENIED: u16 = 5;
    /// No more files (find-family exhausted).
    pub const NO_MORE_FILES: u16 = 0x12;
    /// Write fault (mkdir/rmdir failure).
    pub const WRITE_FAULT: u16 = 29;
}

/// Possible errors produced while validating an inbound frame.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum WireError {
    /// Frame shorter than the 60-byte EtherDFS header.
    #[error("truncated frame")]
    Truncated,
    /// EtherType word does not identify an EtherDFS frame.
    #[error("unexpected ethertype {0:#06x}")]
    BadEtherType(u16),
    /// Protocol version bits differ from the supported version.
    #[error("protocol version {0} not supported")]
    VersionMismatch(u8),
    /// Declared EDF5 length is below the header size or beyond the link length.
    #[error("declared frame length {0} out of range")]
    BadDeclaredLength(u16),
    /// Stored checksum does not match the computed BSD sum.
    #[error("checksum mismatch: computed {computed:#06x} stored {stored:#06x}")]
    ChecksumMismatch {
        /// Checksum computed over the received bytes.
        computed: u16,
        /// Checksum carried in the frame.
        stored: u16,
    },
}

/// DOS INT 2Fh redirector subfunctions carried in the AL byte.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subfunction {
    /// Redirector installation check.
    InstallChk = 0x00,
    /// Remove a directory.
    RmDir = 0x01,
    /// Create a directory.
    MkDir = 0x03,
    /// Change the current directory.
    ChDir = 0x05,
    /// Close a file handle.
    CloseFile = 0x06,
    /// Commit (flush) a file handle.
    CommitFile = 0x07,
    /// Read from a file at an offset.
    ReadFile = 0x08,
    /// Write to a file at an offset.
    WriteFile = 0x09,
    /// Lock a file region (accepted, not enforced).
    LockFile = 0x0A,
    /// Unlock a file region (accepted, not enforced).
    UnlockFile = 0x0B,
    /// Query free/total disk space.
    DiskSpace = 0x0C,
    /// Set DOS attributes on a path.
    SetAttr = 0x0E,
    /// Get DOS attributes for a path.
    GetAttr = 0x0F,
    /// Rename a file.
    Rename = 0x11,
    /// Delete files matching a path or `?` pattern.
    Delete = 0x13,
    /// Open an existing file.
    Open = 0x16,
    /// Create (or truncate) a file.
    Create = 0x17,
    /// Begin a directory search.
    FindFirst = 0x1B,
    /// Continue a directory search.
    FindNext = 0x1C,
    /// Seek relative to end of file.
    SeekFromEnd = 0x21,
    /// Extended open (open/create/truncate decision table).
    SpecialOpen = 0x2E,
}

impl TryFrom<u8> for Subfunction {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use Subfunction::*;
        Ok(match value {
            0x00 => InstallChk,
            0x01 => RmDir,
            0x03 => MkDir,
            0x05 => ChDir,
            0x06 => CloseFile,
            0x07 => CommitFile,
            0x08 => ReadFile,
            0x09 => WriteFile,
            0x0A => LockFile,
            0x0B => UnlockFile,
            0x0C => DiskSpace,
            0x0E => SetAttr,
            0x0F => GetAttr,
            0x11 => Rename,
            0x13 => Delete,
            0x16 => Open,
            0x17 => Create,
            0x1B => FindFirst,
            0x1C => FindNext,
            0x21 => SeekFromEnd,
            0x2E => SpecialOpen,
            other => return Err(other),
        })
    }
}

/// Directory-entry properties as serialized into find and open replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileProps {
    /// DOS attribute byte (RO/HID/SYS/VOL/DIR/ARC bits).
    pub fattr: u8,
    /// Canonical 11-byte FCB name (8+3, space-padded, uppercase).
    pub fcbname: [u8; FCB_LEN],
    /// DOS-packed modification date and time.
    pub ftime: u32,
    /// File size in bytes; 0 for directories.
    pub fsize: u32,
}

impl FileProps {
    /// DOS read-only attribute bit.
    pub const ATTR_RO: u8 = 0x01;
    /// DOS hidden attribute bit.
    pub const ATTR_HID: u8 = 0x02;
    /// DOS system attribute bit.
    pub const ATTR_SYS: u8 = 0x04;
    /// DOS volume-label attribute bit.
    pub const ATTR_VOL: u8 = 0x08;
    /// DOS directory attribute bit.
    pub const ATTR_DIR: u8 = 0x10;
    /// DOS archive attribute bit.
    pub const ATTR_ARC: u8 = 0x20;

    /// Append the 20-byte wire form: attribute, FCB name, ftime, fsize.
    pub fn put(&self, reply: &mut super::ReplyFrame) {
        reply.put_u8(self.fattr);
        reply.put_bytes(&self.fcbname);
        reply.put_u32(self.ftime);
        reply.put_u32(self.fsize);
    }
}
