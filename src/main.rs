// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Entry point and event loop for the EtherDFS server.
// Author: Lukas Bower

//! EtherDFS server binary.
//!
//! Single-threaded and event-driven: one raw socket, one frame dispatched
//! to completion at a time. Signals set a flag checked between iterations;
//! the readiness wait returns early on EINTR so shutdown is prompt.

use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{bail, Context, Result};
use log::{debug, error, info, LevelFilter};

use ethersrv::cli;
use ethersrv::dispatch::{Engine, MIN_FRAME_LEN};
use ethersrv::drives::DriveTable;
use ethersrv::lock::{LockFile, LOCK_PATH};
use ethersrv::net::{dump_frame, format_mac, RawSocket, RECV_BUF_LEN};

static TERMINATE: AtomicBool = AtomicBool::new(false);

extern "C" fn on_terminate(_sig: libc::c_int) {
    TERMINATE.store(true, Ordering::Relaxed);
}

fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, on_terminate as libc::sighandler_t);
        libc::signal(libc::SIGQUIT, on_terminate as libc::sighandler_t);
        libc::signal(libc::SIGINT, on_terminate as libc::sighandler_t);
    }
}

/// Fork into the background; the parent exits without running destructors
/// so the lock file stays with the child.
fn daemonize() -> Result<()> {
    unsafe {
        libc::signal(libc::SIGHUP, libc::SIG_IGN);
        let pid = libc::fork();
        if pid < 0 {
            bail!("failed to daemonize: {}", std::io::Error::last_os_error());
        }
        if pid > 0 {
            std::process::exit(0);
        }
    }
    Ok(())
}

fn run(args: cli::Args) -> Result<()> {
    let drives = DriveTable::from_roots(&args.roots)?;
    let socket =
        RawSocket::open(&args.interface).context("failed to open socket (are you root?)")?;
    install_signal_handlers();
    let _lock = LockFile::acquire(LOCK_PATH)
        .with_context(|| format!("failed to acquire a lock on {LOCK_PATH}"))?;

    println!(
        "Listening on '{}' [{}]",
        args.interface,
        format_mac(&socket.mac())
    );
    for (drive, entry) in drives.mapped() {
        println!("Drive {}: mapped to {}", (b'A' + drive) as char, entry.root.display());
    }
    if !args.foreground {
        daemonize()?;
    }

    let mut engine = Engine::new(socket.mac(), drives);
    let mut buf = [0u8; RECV_BUF_LEN];
    while !TERMINATE.load(Ordering::Relaxed) {
        match socket.wait_readable() {
            Ok(true) => {}
            Ok(false) => continue, // interrupted; re-check the flag
            Err(err) => {
                error!("wait for socket failed: {err}");
                break;
            }
        }
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(err) => {
                debug!("recv failed: {err}");
                continue;
            }
        };
        if len < MIN_FRAME_LEN {
            continue;
        }
        debug!("received frame of {len} bytes");
        dump_frame(&buf[..len]);
        if let Some(reply) = engine.handle_frame(&buf[..len]) {
            debug!("sending back an answer of {} bytes", reply.len());
            dump_frame(&reply);
            socket.send(&reply);
        }
    }
    info!("terminating");
    Ok(())
}

fn main() {
    let args = cli::parse();
    env_logger::Builder::new()
        .filter_level(if args.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Warn
        })
        .parse_default_env()
        .init();
    if let Err(err) = run(args) {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}
