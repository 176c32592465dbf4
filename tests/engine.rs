// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Drive the request engine end to end over temporary host trees.
// Author: Lukas Bower

use std::fs;
use std::path::Path;

use etherdfs_wire::{bsd_checksum, FileProps, ETHERTYPE_DFS, PROTO_VERSION};
use ethersrv::attrs;
use ethersrv::dispatch::Engine;
use ethersrv::drives::DriveTable;
use tempfile::TempDir;

const SERVER_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const CLIENT_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

fn request(seq: u8, drive: u8, al: u8, payload: &[u8], checksum: bool) -> Vec<u8> {
    let mut frame = vec![0u8; 60];
    frame[0..6].copy_from_slice(&SERVER_MAC);
    frame[6..12].copy_from_slice(&CLIENT_MAC);
    frame[12..14].copy_from_slice(&ETHERTYPE_DFS.to_be_bytes());
    frame[56] = PROTO_VERSION;
    frame[57] = seq;
    frame[58] = drive;
    frame[59] = al;
    frame.extend_from_slice(payload);
    if checksum {
        frame[56] |= 0x80;
        let sum = bsd_checksum(&frame[56..]);
        frame[54..56].copy_from_slice(&sum.to_le_bytes());
    }
    frame
}

fn ax(reply: &[u8]) -> u16 {
    u16::from_le_bytes([reply[58], reply[59]])
}

fn payload(reply: &[u8]) -> &[u8] {
    &reply[60..]
}

fn engine_over(root: &Path) -> Engine {
    let drives = DriveTable::from_resolved(vec![(2, root.to_path_buf())]);
    Engine::new(SERVER_MAC, drives)
}

fn sample_tree() -> TempDir {
    let tmp = tempfile::tempdir().expect("tempdir");
    fs::write(tmp.path().join("readme.txt"), b"hello world").expect("write");
    fs::create_dir(tmp.path().join("games")).expect("mkdir");
    tmp
}

fn open_handle(engine: &mut Engine, seq: u8, dos_path: &[u8]) -> u16 {
    let mut req_payload = vec![0u8; 6];
    req_payload.extend_from_slice(dos_path);
    let reply = engine
        .handle_frame(&request(seq, 2, 0x16, &req_payload, false))
        .expect("open reply");
    assert_eq!(ax(&reply), 0, "open failed");
    u16::from_le_bytes([payload(&reply)[20], payload(&reply)[21]])
}

#[test]
fn installcheck_echoes_header() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let reply = engine
        .handle_frame(&request(0x11, 2, 0x00, &[], false))
        .expect("reply");
    assert_eq!(reply.len(), 60);
    assert_eq!(reply[57], 0x11);
    assert_eq!(reply[58] & 0x0f, 2);
    assert_eq!(&reply[0..6], &CLIENT_MAC);
    assert_eq!(&reply[6..12], &SERVER_MAC);
}

#[test]
fn diskspace_reports_fixed_geometry() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let reply = engine
        .handle_frame(&request(0x01, 2, 0x0C, &[], false))
        .expect("reply");
    assert_eq!(ax(&reply), 1);
    let p = payload(&reply);
    assert_eq!(p.len(), 6);
    let total_clusters = u16::from_le_bytes([p[0], p[1]]);
    let bytes_per_sector = u16::from_le_bytes([p[2], p[3]]);
    let free_clusters = u16::from_le_bytes([p[4], p[5]]);
    assert_eq!(bytes_per_sector, 32_768);
    assert!(total_clusters > 0);
    // both sides clamped below 2 GiB: 2^31 / 2^15 = 65536 never reached
    assert!(u32::from(total_clusters) * 32_768 < 2_147_483_648);
    assert!(u32::from(free_clusters) * 32_768 < 2_147_483_648);
}

#[test]
fn getattr_reports_size_time_and_attr() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let reply = engine
        .handle_frame(&request(0x02, 2, 0x0F, b"\\README.TXT", false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    let p = payload(&reply);
    assert_eq!(p.len(), 9);
    let expected = attrs::item_props(&tmp.path().join("readme.txt"), false).expect("props");
    assert_eq!(u32::from_le_bytes([p[0], p[1], p[2], p[3]]), expected.ftime);
    assert_eq!(u32::from_le_bytes([p[4], p[5], p[6], p[7]]), 11);
    assert_eq!(p[8], FileProps::ATTR_ARC);
}

#[test]
fn getattr_missing_file_is_not_found() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let reply = engine
        .handle_frame(&request(0x03, 2, 0x0F, b"\\NOPE.TXT", false))
        .expect("reply");
    assert_eq!(ax(&reply), 2);
}

#[test]
fn open_then_read_at_offsets() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let handle = open_handle(&mut engine, 0x10, b"\\README.TXT");

    let mut read_req = Vec::new();
    read_req.extend_from_slice(&0u32.to_le_bytes());
    read_req.extend_from_slice(&handle.to_le_bytes());
    read_req.extend_from_slice(&5u16.to_le_bytes());
    let reply = engine
        .handle_frame(&request(0x11, 2, 0x08, &read_req, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert_eq!(payload(&reply), b"hello");

    let mut read_req = Vec::new();
    read_req.extend_from_slice(&6u32.to_le_bytes());
    read_req.extend_from_slice(&handle.to_le_bytes());
    read_req.extend_from_slice(&100u16.to_le_bytes());
    let reply = engine
        .handle_frame(&request(0x12, 2, 0x08, &read_req, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert_eq!(payload(&reply), b"world");
}

#[test]
fn read_with_bad_handle_is_denied() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let mut read_req = Vec::new();
    read_req.extend_from_slice(&0u32.to_le_bytes());
    read_req.extend_from_slice(&0x1234u16.to_le_bytes());
    read_req.extend_from_slice(&5u16.to_le_bytes());
    let reply = engine
        .handle_frame(&request(0x20, 2, 0x08, &read_req, false))
        .expect("reply");
    assert_eq!(ax(&reply), 5);
}

#[test]
fn write_patches_and_zero_length_resizes() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let handle = open_handle(&mut engine, 0x30, b"\\README.TXT");

    let mut write_req = Vec::new();
    write_req.extend_from_slice(&0u32.to_le_bytes());
    write_req.extend_from_slice(&handle.to_le_bytes());
    write_req.extend_from_slice(b"HELLO");
    let reply = engine
        .handle_frame(&request(0x31, 2, 0x09, &write_req, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert_eq!(payload(&reply), &5u16.to_le_bytes());
    assert_eq!(
        fs::read(tmp.path().join("readme.txt")).expect("read"),
        b"HELLO world"
    );

    let mut trunc_req = Vec::new();
    trunc_req.extend_from_slice(&5u32.to_le_bytes());
    trunc_req.extend_from_slice(&handle.to_le_bytes());
    let reply = engine
        .handle_frame(&request(0x32, 2, 0x09, &trunc_req, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert_eq!(
        fs::read(tmp.path().join("readme.txt")).expect("read"),
        b"HELLO"
    );
}

#[test]
fn findfirst_findnext_paginate_until_exhausted() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let mut first_req = vec![0x10u8];
    first_req.extend_from_slice(b"\\????????.???");
    let reply = engine
        .handle_frame(&request(0x40, 2, 0x1B, &first_req, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    let p = payload(&reply);
    assert_eq!(p.len(), 24);
    let mut names = vec![p[1..12].to_vec()];
    let mut attrs_seen = vec![p[0]];
    let slot = u16::from_le_bytes([p[20], p[21]]);
    let mut pos = u16::from_le_bytes([p[22], p[23]]);
    assert!(pos >= 1);

    loop {
        let mut next_req = Vec::new();
        next_req.extend_from_slice(&slot.to_le_bytes());
        next_req.extend_from_slice(&pos.to_le_bytes());
        next_req.push(0x10);
        next_req.extend_from_slice(b"???????????");
        let reply = engine
            .handle_frame(&request(0x41, 2, 0x1C, &next_req, false))
            .expect("reply");
        if ax(&reply) == 0x12 {
            break;
        }
        let p = payload(&reply);
        let new_pos = u16::from_le_bytes([p[22], p[23]]);
        assert!(new_pos > pos, "positions must advance");
        pos = new_pos;
        names.push(p[1..12].to_vec());
        attrs_seen.push(p[0]);
        assert!(names.len() <= 4, "listing did not terminate");
    }

    // dot entries are suppressed in the drive root
    assert_eq!(names.len(), 2);
    assert!(names.contains(&b"GAMES      ".to_vec()));
    assert!(names.contains(&b"README  TXT".to_vec()));
    for (name, attr) in names.iter().zip(attrs_seen) {
        if name == b"GAMES      " {
            assert_eq!(attr, 0x10);
        } else {
            assert_eq!(attr, 0x20);
        }
    }
}

#[test]
fn findfirst_with_no_match_reports_no_more_files() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let mut first_req = vec![0x10u8];
    first_req.extend_from_slice(b"\\ZZZZZZZZ.ZZZ");
    let reply = engine
        .handle_frame(&request(0x42, 2, 0x1B, &first_req, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0x12);
}

#[test]
fn findfirst_in_subdir_lists_dot_entries() {
    let tmp = sample_tree();
    fs::write(tmp.path().join("games/doom.exe"), b"x").expect("write");
    let mut engine = engine_over(tmp.path());
    let mut first_req = vec![0x10u8];
    first_req.extend_from_slice(b"\\GAMES\\????????.???");
    let reply = engine
        .handle_frame(&request(0x43, 2, 0x1B, &first_req, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    // snapshot leads with '.' and '..'
    assert_eq!(&payload(&reply)[1..12], b".          ");
    assert_eq!(payload(&reply)[0], 0x10);
}

#[test]
fn create_is_replayed_from_cache_without_side_effects() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let mut create_payload = vec![0u8; 6];
    create_payload.extend_from_slice(b"\\NEW.TXT");
    let frame = request(0x42, 2, 0x17, &create_payload, true);

    let first = engine.handle_frame(&frame).expect("create reply");
    assert_eq!(ax(&first), 0);
    let created = tmp.path().join("new.txt");
    assert!(created.exists());

    // mutate the file behind the server's back; a re-executed CREATE
    // would truncate it again
    fs::write(&created, b"precious").expect("write");

    let second = engine.handle_frame(&frame).expect("replayed reply");
    assert_eq!(first, second);
    assert_eq!(fs::read(&created).expect("read"), b"precious");
}

#[test]
fn checksummed_request_gets_checksummed_reply() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let reply = engine
        .handle_frame(&request(0x50, 2, 0x0F, b"\\README.TXT", true))
        .expect("reply");
    assert_ne!(reply[56] & 0x80, 0);
    let stored = u16::from_le_bytes([reply[54], reply[55]]);
    assert_eq!(stored, bsd_checksum(&reply[56..]));
}

#[test]
fn corrupted_checksum_is_dropped() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let mut frame = request(0x51, 2, 0x0F, b"\\README.TXT", true);
    frame[60] ^= 0xff;
    assert!(engine.handle_frame(&frame).is_none());
}

#[test]
fn unmapped_and_invalid_drives_are_ignored() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    assert!(engine
        .handle_frame(&request(0x52, 3, 0x0C, &[], false))
        .is_none());
    assert!(engine
        .handle_frame(&request(0x53, 0, 0x0C, &[], false))
        .is_none());
    assert!(engine
        .handle_frame(&request(0x54, 26, 0x0C, &[], false))
        .is_none());
}

#[test]
fn ignored_request_invalidates_the_cached_answer() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let first = engine
        .handle_frame(&request(0x60, 2, 0x0C, &[], false))
        .expect("reply");
    assert_eq!(ax(&first), 1);
    // unknown subfunction: no reply, and the cached answer dies with it
    assert!(engine
        .handle_frame(&request(0x61, 2, 0x2D, &[], false))
        .is_none());
    // the old sequence byte no longer replays; the query re-executes
    let again = engine
        .handle_frame(&request(0x60, 2, 0x0C, &[], false))
        .expect("reply");
    assert_eq!(ax(&again), 1);
}

#[test]
fn mkdir_chdir_rmdir_roundtrip() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let reply = engine
        .handle_frame(&request(0x70, 2, 0x03, b"\\STUFF", false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert!(tmp.path().join("stuff").is_dir());

    let reply = engine
        .handle_frame(&request(0x71, 2, 0x05, b"\\STUFF", false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);

    let reply = engine
        .handle_frame(&request(0x72, 2, 0x05, b"\\MISSING", false))
        .expect("reply");
    assert_eq!(ax(&reply), 3);

    let reply = engine
        .handle_frame(&request(0x73, 2, 0x01, b"\\STUFF", false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert!(!tmp.path().join("stuff").exists());

    let reply = engine
        .handle_frame(&request(0x74, 2, 0x01, b"\\STUFF", false))
        .expect("reply");
    assert_eq!(ax(&reply), 29);
}

#[test]
fn rename_refuses_existing_destination() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let mut req_payload = vec![11u8];
    req_payload.extend_from_slice(b"\\README.TXT");
    req_payload.extend_from_slice(b"\\GAMES");
    let reply = engine
        .handle_frame(&request(0x80, 2, 0x11, &req_payload, false))
        .expect("reply");
    assert_eq!(ax(&reply), 5);
    assert!(tmp.path().join("readme.txt").exists());
}

#[test]
fn rename_moves_file_to_literal_target() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let mut req_payload = vec![11u8];
    req_payload.extend_from_slice(b"\\README.TXT");
    req_payload.extend_from_slice(b"\\MANUAL.TXT");
    let reply = engine
        .handle_frame(&request(0x81, 2, 0x11, &req_payload, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert!(!tmp.path().join("readme.txt").exists());
    assert!(tmp.path().join("manual.txt").exists());
}

#[test]
fn delete_by_pattern_spares_directories() {
    let tmp = sample_tree();
    fs::write(tmp.path().join("save1.dat"), b"a").expect("write");
    fs::write(tmp.path().join("save2.dat"), b"b").expect("write");
    let mut engine = engine_over(tmp.path());
    let reply = engine
        .handle_frame(&request(0x90, 2, 0x13, b"\\SAVE?.DAT", false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert!(!tmp.path().join("save1.dat").exists());
    assert!(!tmp.path().join("save2.dat").exists());
    assert!(tmp.path().join("readme.txt").exists());
    assert!(tmp.path().join("games").is_dir());
}

#[test]
fn delete_of_missing_literal_path_is_not_found() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let reply = engine
        .handle_frame(&request(0x91, 2, 0x13, b"\\GHOST.TXT", false))
        .expect("reply");
    // a path that never resolves reports "file not found"
    assert_eq!(ax(&reply), 2);
}

#[test]
fn special_open_follows_the_decision_table() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());

    // missing file + create action -> created
    let mut req_payload = Vec::new();
    req_payload.extend_from_slice(&0u16.to_le_bytes());
    req_payload.extend_from_slice(&0x10u16.to_le_bytes());
    req_payload.extend_from_slice(&2u16.to_le_bytes());
    req_payload.extend_from_slice(b"\\FRESH.TXT");
    let reply = engine
        .handle_frame(&request(0xA0, 2, 0x2E, &req_payload, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert_eq!(&payload(&reply)[22..24], &2u16.to_le_bytes());
    assert!(tmp.path().join("fresh.txt").exists());

    // missing file without create action -> fail
    let mut req_payload = Vec::new();
    req_payload.extend_from_slice(&0u16.to_le_bytes());
    req_payload.extend_from_slice(&0x01u16.to_le_bytes());
    req_payload.extend_from_slice(&2u16.to_le_bytes());
    req_payload.extend_from_slice(b"\\ABSENT.TXT");
    let reply = engine
        .handle_frame(&request(0xA1, 2, 0x2E, &req_payload, false))
        .expect("reply");
    assert_eq!(ax(&reply), 2);

    // existing file + open action -> opened
    let mut req_payload = Vec::new();
    req_payload.extend_from_slice(&0u16.to_le_bytes());
    req_payload.extend_from_slice(&0x01u16.to_le_bytes());
    req_payload.extend_from_slice(&2u16.to_le_bytes());
    req_payload.extend_from_slice(b"\\README.TXT");
    let reply = engine
        .handle_frame(&request(0xA2, 2, 0x2E, &req_payload, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert_eq!(&payload(&reply)[22..24], &1u16.to_le_bytes());

    // existing file + truncate action -> truncated
    let mut req_payload = Vec::new();
    req_payload.extend_from_slice(&0u16.to_le_bytes());
    req_payload.extend_from_slice(&0x02u16.to_le_bytes());
    req_payload.extend_from_slice(&2u16.to_le_bytes());
    req_payload.extend_from_slice(b"\\README.TXT");
    let reply = engine
        .handle_frame(&request(0xA3, 2, 0x2E, &req_payload, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert_eq!(&payload(&reply)[22..24], &3u16.to_le_bytes());
    assert_eq!(fs::metadata(tmp.path().join("readme.txt")).expect("meta").len(), 0);

    // directories never open
    let mut req_payload = Vec::new();
    req_payload.extend_from_slice(&0u16.to_le_bytes());
    req_payload.extend_from_slice(&0x01u16.to_le_bytes());
    req_payload.extend_from_slice(&2u16.to_le_bytes());
    req_payload.extend_from_slice(b"\\GAMES");
    let reply = engine
        .handle_frame(&request(0xA4, 2, 0x2E, &req_payload, false))
        .expect("reply");
    assert_eq!(ax(&reply), 2);
}

#[test]
fn seek_from_end_clamps_and_adds_file_size() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    let handle = open_handle(&mut engine, 0xB0, b"\\README.TXT");

    let mut req_payload = Vec::new();
    req_payload.extend_from_slice(&(-4i32).to_le_bytes());
    req_payload.extend_from_slice(&handle.to_le_bytes());
    let reply = engine
        .handle_frame(&request(0xB1, 2, 0x21, &req_payload, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert_eq!(payload(&reply), &7u32.to_le_bytes());

    // positive offsets clamp to zero, results clamp at zero
    let mut req_payload = Vec::new();
    req_payload.extend_from_slice(&(-100i32).to_le_bytes());
    req_payload.extend_from_slice(&handle.to_le_bytes());
    let reply = engine
        .handle_frame(&request(0xB2, 2, 0x21, &req_payload, false))
        .expect("reply");
    assert_eq!(ax(&reply), 0);
    assert_eq!(payload(&reply), &0u32.to_le_bytes());
}

#[test]
fn close_and_commit_always_succeed() {
    let tmp = sample_tree();
    let mut engine = engine_over(tmp.path());
    for (seq, al) in [(0xC0u8, 0x06u8), (0xC1, 0x07), (0xC2, 0x0A), (0xC3, 0x0B)] {
        let reply = engine
            .handle_frame(&request(seq, 2, al, &[], false))
            .expect("reply");
        assert_eq!(ax(&reply), 0);
        assert_eq!(reply.len(), 60);
    }
}
