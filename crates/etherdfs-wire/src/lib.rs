// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode EtherDFS (0xEDF5) wire frames.
// Author: Lukas Bower

//! Frame codec for the EtherDFS layer-2 remote-drive protocol.
//!
//! EtherDFS carries MS-DOS redirector requests in raw Ethernet frames with
//! EtherType `0xEDF5`. This crate owns the wire layout only: header offsets,
//! well-formedness validation, the BSD checksum, reply construction, the
//! `FileProps` directory-entry encoding and DOS-packed timestamps. It opens
//! no sockets and touches no filesystem; the server crate supplies both.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod frame;
mod time;
mod types;

pub use frame::{bsd_checksum, finalize_in_place, ReplyFrame, RequestFrame};
pub use time::{dos_time_from_unix, pack_dos_datetime, unpack_dos_datetime};
pub use types::{
    doserr, FileProps, Subfunction, WireError, BROADCAST_MAC, ETHERTYPE_DFS, FCB_LEN, HEADER_LEN,
    MAX_REPLY_LEN, OFF_CHECKSUM, OFF_DRIVE, OFF_EDF5_LEN, OFF_ETHERTYPE, OFF_PAYLOAD, OFF_PROTO,
    OFF_SEQ, OFF_SUBFUNCTION, PROTO_VERSION,
};
