// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Protocol state machine driven frame by frame, without a transport.

use std::sync::Arc;

use oi_upgrade_common::machine::{State, StatusUpdate, Step};
use oi_upgrade_common::{FailureReason, Page, StateKind, UpgradeMachine, PAGE_SIZE};

const SERIAL: [u8; 4] = [0x87, 0x19, 0x30, 0x29];
const SERIAL_WIRE: [u8; 4] = [0x29, 0x30, 0x19, 0x87];
const OTHER_WIRE: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

fn hello(wire: [u8; 4]) -> [u8; 8] {
    [0x33, 0, 0, 0, wire[0], wire[1], wire[2], wire[3]]
}

fn pages(count: usize) -> Arc<[Page]> {
    (0..count)
        .map(|i| {
            let data: Vec<u8> = (0..PAGE_SIZE).map(|b| (b + i) as u8).collect();
            Page::new(&data)
        })
        .collect()
}

fn machine(count: usize, target: Option<[u8; 4]>) -> UpgradeMachine {
    UpgradeMachine::new(pages(count), target).unwrap()
}

/// Machine that has completed the HELLO and START handshake.
fn uploading(count: usize) -> UpgradeMachine {
    let mut m = machine(count, None);
    m.step(&hello(SERIAL_WIRE));
    m.step(b"S");
    m
}

fn failure_of(m: &UpgradeMachine) -> Option<FailureReason> {
    match m.state() {
        State::Failure(reason) => Some(reason),
        _ => None,
    }
}

/// Feed a full page worth of PAGE requests, returning the last step.
fn send_page(m: &mut UpgradeMachine) -> Step {
    let mut last = Step::default();
    for _ in 0..PAGE_SIZE / 8 {
        last = m.step(b"P");
    }
    last
}

#[test]
fn test_unknown_device_is_ignored() {
    let mut m = machine(1, Some([1, 2, 3, 4]));
    let step = m.step(&hello(SERIAL_WIRE));

    assert_eq!(step, Step::default());
    assert_eq!(m.state(), State::Start);
    assert_eq!(m.serial(), None);
}

#[test]
fn test_specific_device_starts_upgrade() {
    let mut m = machine(1, Some(SERIAL));
    let step = m.step(&hello(SERIAL_WIRE));

    assert_eq!(step.reply.as_deref(), Some(&SERIAL_WIRE[..]));
    assert_eq!(m.state(), State::Header);
    assert_eq!(m.serial(), Some(SERIAL));

    let update = step.update.unwrap();
    assert_eq!(update.state, StateKind::Header);
    assert_eq!(update.serial, Some(SERIAL));
    assert_eq!(update.progress, 0.0);
}

#[test]
fn test_reserved_hello_bytes_are_ignored() {
    let mut m = machine(1, Some(SERIAL));
    let mut frame = hello(SERIAL_WIRE);
    frame[1..4].copy_from_slice(&[0xDE, 0xAD, 0xBE]);

    let step = m.step(&frame);
    assert_eq!(step.reply.as_deref(), Some(&SERIAL_WIRE[..]));
    assert_eq!(m.state(), State::Header);
}

#[test]
fn test_first_device_to_boot_is_recovered() {
    let mut m = machine(1, None);
    let step = m.step(&hello(OTHER_WIRE));

    assert_eq!(step.reply.as_deref(), Some(&OTHER_WIRE[..]));
    assert_eq!(m.serial(), Some([0x44, 0x33, 0x22, 0x11]));
}

#[test]
fn test_device_in_herd_is_recognised() {
    let mut m = machine(1, Some(SERIAL));

    for wire in [OTHER_WIRE, [0, 0, 0, 0], [0x87, 0x19, 0x30, 0x29]] {
        assert_eq!(m.step(&hello(wire)), Step::default());
        assert_eq!(m.state(), State::Start);
    }

    assert!(m.step(&hello(SERIAL_WIRE)).reply.is_some());
    assert_eq!(m.serial(), Some(SERIAL));
}

#[test]
fn test_malformed_frames_at_start_are_protocol_errors() {
    let frames: [&[u8]; 5] = [
        b"",
        &[0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0],
        &[0x33, 0x29, 0x30, 0x19],
        b"E",
        b"SS",
    ];

    for frame in frames {
        let mut m = machine(1, None);
        let step = m.step(frame);

        assert_eq!(failure_of(&m), Some(FailureReason::ProtocolError), "{frame:02x?}");
        assert_eq!(step.reply, None);
        assert_eq!(step.update.unwrap().failure, Some(FailureReason::ProtocolError));
    }
}

#[test]
fn test_transfer_frames_at_start_mean_upgrade_in_progress() {
    for frame in [b"S", b"P", b"C", b"D"] {
        let mut m = machine(1, None);
        let step = m.step(frame);

        assert_eq!(failure_of(&m), Some(FailureReason::UpgradeInProgress));
        assert_eq!(step.reply, None);
        let update = step.update.unwrap();
        assert_eq!(update.state, StateKind::Failure);
        assert_eq!(update.failure, Some(FailureReason::UpgradeInProgress));
    }
}

#[test]
fn test_start_request_is_answered_with_page_count() {
    let mut m = machine(3, None);
    m.step(&hello(SERIAL_WIRE));
    let step = m.step(b"S");

    assert_eq!(step.reply.as_deref(), Some(&[3u8][..]));
    assert_eq!(m.state(), State::Upload { page: 0, pos: 0 });
    assert_eq!(step.update.unwrap().state, StateKind::Upload);
}

#[test]
fn test_header_ignores_other_hello() {
    let mut m = machine(1, None);
    m.step(&hello(SERIAL_WIRE));

    assert_eq!(m.step(&hello(OTHER_WIRE)), Step::default());
    assert_eq!(m.state(), State::Header);
    assert_eq!(m.serial(), Some(SERIAL));
}

#[test]
fn test_header_rejects_unexpected_frames() {
    let frames: [&[u8]; 3] = [b"", b"P", b"S\x00"];
    for frame in frames {
        let mut m = machine(1, None);
        m.step(&hello(SERIAL_WIRE));
        m.step(frame);

        assert_eq!(failure_of(&m), Some(FailureReason::ProtocolError));
    }
}

#[test]
fn test_first_page_request_receives_first_bytes() {
    let mut m = uploading(1);
    let step = m.step(b"P");

    assert_eq!(step.reply.as_deref(), Some(&[0u8, 1, 2, 3, 4, 5, 6, 7][..]));
    assert_eq!(step.update, None);
    assert_eq!(m.state(), State::Upload { page: 0, pos: 8 });
    assert_eq!(m.confirmed_page(), Some(0));
}

#[test]
fn test_upload_ignores_other_hello() {
    let mut m = uploading(1);
    m.step(b"P");

    assert_eq!(m.step(&hello(OTHER_WIRE)), Step::default());
    assert_eq!(m.state(), State::Upload { page: 0, pos: 8 });

    let step = m.step(b"P");
    assert_eq!(step.reply.as_deref(), Some(&[8u8, 9, 10, 11, 12, 13, 14, 15][..]));
}

#[test]
fn test_upload_rejects_unexpected_frames() {
    let frames: [&[u8]; 4] = [b"", b"P\x00", b"C", b"D"];
    for frame in frames {
        let mut m = uploading(1);
        m.step(b"P");
        m.step(frame);

        assert_eq!(failure_of(&m), Some(FailureReason::ProtocolError), "{frame:02x?}");
    }
}

#[test]
fn test_complete_page_moves_to_crc_check() {
    let mut m = uploading(2);
    let step = send_page(&mut m);

    assert_eq!(step.reply.as_deref(), Some(&[248u8, 249, 250, 251, 252, 253, 254, 255][..]));
    let crc = pages(2)[0].crc();
    assert_eq!(m.state(), State::CheckCrc { crc });
    assert_eq!(step.update.unwrap().state, StateKind::CheckCrc);
}

#[test]
fn test_extra_page_request_fails() {
    let mut m = uploading(1);
    send_page(&mut m);
    m.step(b"P");

    assert_eq!(failure_of(&m), Some(FailureReason::ProtocolError));
}

#[test]
fn test_device_error_during_upload_is_crc_error() {
    let mut m = uploading(1);
    send_page(&mut m);

    let mut m2 = uploading(1);
    m2.step(b"P");
    m2.step(b"E");
    assert_eq!(failure_of(&m2), Some(FailureReason::PageCrcError));

    // An ERROR in place of the CRC request is not part of the protocol.
    m.step(b"E");
    assert_eq!(failure_of(&m), Some(FailureReason::ProtocolError));
}

#[test]
fn test_crc_request_is_answered_little_endian() {
    let mut m = uploading(2);
    send_page(&mut m);
    let crc = pages(2)[0].crc();

    let step = m.step(b"C");
    assert_eq!(step.reply.as_deref(), Some(&crc.to_le_bytes()[..]));
    assert_eq!(m.state(), State::Upload { page: 1, pos: 0 });
    assert_eq!(m.current_page(), 1);
}

#[test]
fn test_check_crc_ignores_other_hello() {
    let mut m = uploading(1);
    send_page(&mut m);
    let before = m.state();

    assert_eq!(m.step(&hello(OTHER_WIRE)), Step::default());
    assert_eq!(m.state(), before);
}

#[test]
fn test_last_crc_moves_to_wait_for_done() {
    let mut m = uploading(1);
    send_page(&mut m);
    m.step(b"C");

    assert_eq!(m.state(), State::WaitForDone);
}

#[test]
fn test_wait_for_done_outcomes() {
    let mut done = uploading(1);
    send_page(&mut done);
    done.step(b"C");
    assert_eq!(done.step(&hello(OTHER_WIRE)), Step::default());
    assert_eq!(done.state(), State::WaitForDone);

    let step = done.step(b"D");
    assert_eq!(step.reply, None);
    assert_eq!(done.state(), State::Complete);
    assert_eq!(step.update.unwrap().progress, 100.0);

    let mut error = uploading(1);
    send_page(&mut error);
    error.step(b"C");
    error.step(b"E");
    assert_eq!(failure_of(&error), Some(FailureReason::PageCrcError));

    let mut invalid = uploading(1);
    send_page(&mut invalid);
    invalid.step(b"C");
    invalid.step(b"X");
    assert_eq!(failure_of(&invalid), Some(FailureReason::ProtocolError));
}

#[test]
fn test_terminal_states_ignore_input() {
    let mut complete = uploading(0);
    complete.step(b"D");
    let mut failed = machine(1, None);
    failed.step(b"C");

    let hello = hello(SERIAL_WIRE);
    let frames: [&[u8]; 5] = [&hello, b"S", b"P", b"E", b""];

    for m in [&mut complete, &mut failed] {
        let before = m.state();
        for frame in frames {
            assert_eq!(m.step(frame), Step::default());
        }
        assert_eq!(m.state(), before);
    }
}

#[test]
fn test_full_transfer_visits_states_in_order() {
    for count in [1usize, 2, 3] {
        let mut m = machine(count, None);
        let mut updates: Vec<StatusUpdate> = vec![m.snapshot()];

        updates.extend(m.step(&hello(SERIAL_WIRE)).update);
        updates.extend(m.step(b"S").update);
        for _ in 0..count {
            for _ in 0..PAGE_SIZE / 8 {
                updates.extend(m.step(b"P").update);
            }
            updates.extend(m.step(b"C").update);
        }
        updates.extend(m.step(b"D").update);

        let mut expected = vec![StateKind::Start, StateKind::Header];
        for _ in 0..count {
            expected.extend([StateKind::Upload, StateKind::CheckCrc]);
        }
        expected.extend([StateKind::WaitForDone, StateKind::Complete]);

        let states: Vec<StateKind> = updates.iter().map(|u| u.state).collect();
        assert_eq!(states, expected);
        assert!(updates.windows(2).all(|w| w[0].progress <= w[1].progress));
        assert_eq!(updates.last().unwrap().progress, 100.0);
    }
}

#[test]
fn test_two_page_progress() {
    let mut m = machine(2, None);
    let mut progress = vec![m.snapshot().progress];

    progress.extend(m.step(&hello(SERIAL_WIRE)).update.map(|u| u.progress));
    progress.extend(m.step(b"S").update.map(|u| u.progress));
    for _ in 0..2 {
        progress.extend(send_page(&mut m).update.map(|u| u.progress));
        progress.extend(m.step(b"C").update.map(|u| u.progress));
    }
    progress.extend(m.step(b"D").update.map(|u| u.progress));

    assert_eq!(progress, vec![0.0, 0.0, 0.0, 0.0, 0.0, 50.0, 50.0, 100.0]);
}

#[test]
fn test_zero_page_upgrade_skips_upload() {
    let mut m = machine(0, None);
    m.step(&hello(SERIAL_WIRE));

    let step = m.step(b"S");
    assert_eq!(step.reply.as_deref(), Some(&[0u8][..]));
    assert_eq!(m.state(), State::WaitForDone);
    assert_eq!(m.progress(), 0.0);

    let step = m.step(b"D");
    assert_eq!(m.state(), State::Complete);
    assert_eq!(step.update.unwrap().progress, 100.0);
}

#[test]
fn test_too_many_pages_are_rejected() {
    assert!(UpgradeMachine::new(pages(256), None).is_err());
    assert!(UpgradeMachine::new(pages(255), None).is_ok());
}
