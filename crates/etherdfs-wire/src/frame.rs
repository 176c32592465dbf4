// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Parse inbound EtherDFS frames and build finalized replies.
// Author: Lukas Bower

//! Request parsing, reply construction and checksum discipline.

use crate::types::*;

/// Compute the 16-bit BSD checksum of `bytes`: rotate the accumulator right
/// by one, then add each byte (mod 2^16).
#[must_use]
pub fn bsd_checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |sum, &b| sum.rotate_right(1).wrapping_add(u16::from(b)))
}

/// Write length and checksum trailer fields into a complete reply frame.
///
/// Sets the total EDF5 length at offset 52. When `checksum` is requested the
/// BSD sum over bytes `[56..len)` is stored at offset 54 and bit 7 of the
/// proto byte is raised; otherwise the checksum field is zeroed and the flag
/// cleared. Replayed cache entries run through this again, which for an
/// identical retransmission leaves the frame byte-identical.
pub fn finalize_in_place(frame: &mut [u8], checksum: bool) {
    let len = frame.len() as u16;
    frame[OFF_EDF5_LEN..OFF_EDF5_LEN + 2].copy_from_slice(&len.to_le_bytes());
    if checksum {
        frame[OFF_PROTO] |= 0x80;
        let sum = bsd_checksum(&frame[OFF_PROTO..]);
        frame[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&sum.to_le_bytes());
    } else {
        frame[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&[0, 0]);
        frame[OFF_PROTO] &= 0x7f;
    }
}

/// A validated inbound EtherDFS request, borrowing the receive buffer.
///
/// `parse` enforces the well-formedness rules; everything else is cheap
/// field access into the (possibly truncated) frame.
#[derive(Debug, Clone, Copy)]
pub struct RequestFrame<'a> {
    buf: &'a [u8],
    checksum: bool,
}

impl<'a> RequestFrame<'a> {
    /// Validate a received frame.
    ///
    /// Rules: link length >= 60; EtherType 0xEDF5; protocol version bits
    /// equal to [`PROTO_VERSION`]; a non-zero declared length must lie in
    /// `60..=link length` and truncates the frame; when bit 7 of the proto
    /// byte is set, the BSD checksum over `[56..end)` must match.
    pub fn parse(buf: &'a [u8]) -> Result<Self, WireError> {
        if buf.len() < HEADER_LEN {
            return Err(WireError::Truncated);
        }
        let ethertype = u16::from_be_bytes([buf[OFF_ETHERTYPE], buf[OFF_ETHERTYPE + 1]]);
        if ethertype != ETHERTYPE_DFS {
            return Err(WireError::BadEtherType(ethertype));
        }
        let version = buf[OFF_PROTO] & 0x7f;
        if version != PROTO_VERSION {
            return Err(WireError::VersionMismatch(version));
        }
        let declared = u16::from_le_bytes([buf[OFF_EDF5_LEN], buf[OFF_EDF5_LEN + 1]]);
        let mut buf = buf;
        if declared != 0 {
            if (declared as usize) < HEADER_LEN || (declared as usize) > buf.len() {
                return Err(WireError::BadDeclaredLength(declared));
            }
            buf = &buf[..declared as usize];
        }
        let checksum = buf[OFF_PROTO] & 0x80 != 0;
        if checksum {
            let computed = bsd_checksum(&buf[OFF_PROTO..]);
            let stored = u16::from_le_bytes([buf[OFF_CHECKSUM], buf[OFF_CHECKSUM + 1]]);
            if computed != stored {
                return Err(WireError::ChecksumMismatch { computed, stored });
            }
        }
        Ok(Self { buf, checksum })
    }

    /// Destination MAC address (server or broadcast).
    #[must_use]
    pub fn dst_mac(&self) -> &'a [u8] {
        &self.buf[0..6]
    }

    /// Source (client) MAC address.
    #[must_use]
    pub fn src_mac(&self) -> &'a [u8] {
        &self.buf[6..12]
    }

    /// True if the frame targets `mac` or the broadcast address.
    #[must_use]
    pub fn is_for(&self, mac: &[u8; 6]) -> bool {
        self.dst_mac() == mac || self.dst_mac() == BROADCAST_MAC
    }

    /// Per-client sequence byte.
    #[must_use]
    pub fn seq(&self) -> u8 {
        self.buf[OFF_SEQ]
    }

    /// Drive number (0=A: .. 25=Z:) from the low five bits of byte 58.
    #[must_use]
    pub fn drive(&self) -> u8 {
        self.buf[OFF_DRIVE] & 31
    }

    /// Request flags from the high three bits of byte 58.
    #[must_use]
    pub fn flags(&self) -> u8 {
        self.buf[OFF_DRIVE] >> 5
    }

    /// Raw subfunction (AL) byte.
    #[must_use]
    pub fn subfunction_raw(&self) -> u8 {
        self.buf[OFF_SUBFUNCTION]
    }

    /// Decoded subfunction, if known.
    pub fn subfunction(&self) -> Result<Subfunction, u8> {
        Subfunction::try_from(self.subfunction_raw())
    }

    /// Request-specific payload after the 60-byte header.
    #[must_use]
    pub fn payload(&self) -> &'a [u8] {
        &self.buf[OFF_PAYLOAD..]
    }

    /// Whether the request carried (and the reply must carry) a checksum.
    #[must_use]
    pub fn wants_checksum(&self) -> bool {
        self.checksum
    }

    /// The validated (truncated) frame bytes.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        self.buf
    }
}

/// An outgoing reply under construction.
///
/// Construction reuses the inbound header: bytes 0..60 are copied, the MACs
/// swapped with the server's own address in the source field, and the `AX`
/// status word (bytes 58..60, little-endian) zeroed for the default success.
/// Payload writers append little-endian fields after the header.
#[derive(Debug)]
pub struct ReplyFrame {
    buf: Vec<u8>,
}

impl ReplyFrame {
    /// Start a reply for `req`, sourcing it from `server_mac`.
    #[must_use]
    pub fn for_request(req: &RequestFrame<'_>, server_mac: &[u8; 6]) -> Self {
        let mut buf = Vec::with_capacity(MAX_REPLY_LEN);
        buf.extend_from_slice(&req.bytes()[..HEADER_LEN]);
        buf[0..6].copy_from_slice(req.src_mac());
        buf[6..12].copy_from_slice(server_mac);
        buf[OFF_DRIVE] = 0;
        buf[OFF_SUBFUNCTION] = 0;
        Self { buf }
    }

    /// Store the DOS status word `AX` at bytes 58..60.
    pub fn set_ax(&mut self, ax: u16) {
        self.buf[OFF_DRIVE..OFF_DRIVE + 2].copy_from_slice(&ax.to_le_bytes());
    }

    /// Restore the request's drive and subfunction bytes instead of `AX`.
    ///
    /// The installation-check reply echoes the header untouched so the
    /// client can recognize its own probe.
    pub fn echo_drive_byte(&mut self, req: &RequestFrame<'_>) {
        self.buf[OFF_DRIVE] = req.bytes()[OFF_DRIVE];
        self.buf[OFF_SUBFUNCTION] = req.bytes()[OFF_SUBFUNCTION];
    }

    /// Append one byte to the payload.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Append a little-endian word to the payload.
    pub fn put_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append a little-endian dword to the payload.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    /// Append raw bytes to the payload.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Current payload length (bytes after the 60-byte header).
    #[must_use]
    pub fn payload_len(&self) -> usize {
        self.buf.len() - HEADER_LEN
    }

    /// Finalize length and checksum fields and return the frame bytes.
    #[must_use]
    pub fn finalize(mut self, checksum: bool) -> Vec<u8> {
        finalize_in_place(&mut self.buf, checksum);
        self.buf
    }
}
