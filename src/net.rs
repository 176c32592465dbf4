// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Raw AF_PACKET socket bound to the EtherDFS EtherType.
// Author: Lukas Bower

//! Raw-frame I/O.
//!
//! One datagram-less layer-2 socket, filtered to EtherType 0xEDF5, bound to
//! a named interface in promiscuous mode and switched to non-blocking.
//! Readiness comes from a signal-interruptible `poll`, so the event loop
//! can observe termination requests between frames.

use std::io;
use std::os::unix::io::RawFd;

use anyhow::{bail, Context, Result};
use log::{debug, log_enabled, warn, Level};

use etherdfs_wire::ETHERTYPE_DFS;

/// Receive buffer size; ample for any Ethernet frame.
pub const RECV_BUF_LEN: usize = 2048;

/// An open EtherDFS raw socket.
#[derive(Debug)]
pub struct RawSocket {
    fd: RawFd,
    mac: [u8; 6],
}

fn ifreq_for(interface: &str) -> Result<libc::ifreq> {
    let bytes = interface.as_bytes();
    if bytes.is_empty() || bytes.len() >= libc::IFNAMSIZ {
        bail!("invalid interface name '{interface}'");
    }
    let mut req: libc::ifreq = unsafe { std::mem::zeroed() };
    for (dst, &src) in req.ifr_name.iter_mut().zip(bytes) {
        *dst = src as libc::c_char;
    }
    Ok(req)
}

impl RawSocket {
    /// Open, configure and bind the socket; fatal on any failure.
    pub fn open(interface: &str) -> Result<Self> {
        let proto = u16::to_be(ETHERTYPE_DFS);
        let fd = unsafe { libc::socket(libc::AF_PACKET, libc::SOCK_RAW, i32::from(proto)) };
        if fd < 0 {
            return Err(io::Error::last_os_error()).context("failed to open raw socket");
        }
        let sock = Self { fd, mac: [0; 6] };
        sock.configure(interface)
    }

    fn configure(mut self, interface: &str) -> Result<Self> {
        let mut req = ifreq_for(interface)?;
        if unsafe { libc::ioctl(self.fd, libc::SIOCGIFINDEX, &mut req) } < 0 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("no such interface '{interface}'"));
        }
        let ifindex = unsafe { req.ifr_ifru.ifru_ifindex };

        let mut req = ifreq_for(interface)?;
        if unsafe { libc::ioctl(self.fd, libc::SIOCGIFFLAGS, &mut req) } < 0 {
            return Err(io::Error::last_os_error()).context("failed to read interface flags");
        }
        unsafe {
            req.ifr_ifru.ifru_flags |= libc::IFF_PROMISC as libc::c_short;
        }
        if unsafe { libc::ioctl(self.fd, libc::SIOCSIFFLAGS, &mut req) } < 0 {
            return Err(io::Error::last_os_error()).context("failed to enable promiscuous mode");
        }

        let mut req = ifreq_for(interface)?;
        if unsafe { libc::ioctl(self.fd, libc::SIOCGIFHWADDR, &mut req) } < 0 {
            return Err(io::Error::last_os_error()).context("failed to read hardware address");
        }
        let hwaddr = unsafe { req.ifr_ifru.ifru_hwaddr };
        for (dst, &src) in self.mac.iter_mut().zip(hwaddr.sa_data.iter()) {
            *dst = src as u8;
        }

        let mut addr: libc::sockaddr_ll = unsafe { std::mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as libc::c_ushort;
        addr.sll_protocol = u16::to_be(ETHERTYPE_DFS);
        addr.sll_ifindex = ifindex;
        addr.sll_hatype = 0;
        addr.sll_pkttype = (libc::PACKET_HOST | libc::PACKET_BROADCAST) as u8;
        addr.sll_halen = 6;
        addr.sll_addr[..6].copy_from_slice(&self.mac);
        let rc = unsafe {
            libc::bind(
                self.fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error())
                .with_context(|| format!("failed to bind to '{interface}'"));
        }

        let flags = unsafe { libc::fcntl(self.fd, libc::F_GETFL) };
        if flags < 0
            || unsafe { libc::fcntl(self.fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0
        {
            return Err(io::Error::last_os_error()).context("failed to set non-blocking mode");
        }
        Ok(self)
    }

    /// The interface's hardware address, used as the server MAC.
    #[must_use]
    pub fn mac(&self) -> [u8; 6] {
        self.mac
    }

    /// Block until a frame is readable.
    ///
    /// Returns `Ok(false)` when interrupted by a signal so the caller can
    /// re-check the termination flag.
    pub fn wait_readable(&self) -> io::Result<bool> {
        let mut pfd = libc::pollfd {
            fd: self.fd,
            events: libc::POLLIN,
            revents: 0,
        };
        let rc = unsafe { libc::poll(&mut pfd, 1, -1) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(false);
            }
            return Err(err);
        }
        Ok(true)
    }

    /// Receive one frame; `Ok(0)` when nothing was available.
    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe {
            libc::recv(
                self.fd,
                buf.as_mut_ptr().cast(),
                buf.len(),
                libc::MSG_DONTWAIT,
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(n as usize)
    }

    /// Send one frame, best-effort: failures are logged and dropped.
    pub fn send(&self, frame: &[u8]) {
        let n = unsafe { libc::send(self.fd, frame.as_ptr().cast(), frame.len(), 0) };
        if n < 0 {
            warn!("send failed: {}", io::Error::last_os_error());
        }
    }
}

impl Drop for RawSocket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

/// Render a MAC address in the usual colon form.
#[must_use]
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}

/// Hex+ASCII dump of a frame at debug level, 16 bytes per line.
pub fn dump_frame(frame: &[u8]) {
    if !log_enabled!(Level::Debug) {
        return;
    }
    for chunk in frame.chunks(16) {
        let mut hex = String::with_capacity(16 * 3 + 1);
        let mut ascii = String::with_capacity(17);
        for (i, &b) in chunk.iter().enumerate() {
            if i == 8 {
                hex.push(' ');
                ascii.push(' ');
            }
            hex.push_str(&format!(" {b:02X}"));
            ascii.push(if (b' '..=b'~').contains(&b) { b as char } else { '.' });
        }
        debug!("{hex:<50} | {ascii}");
    }
}
