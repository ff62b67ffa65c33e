// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Upgrade protocol state machine.
//!
//! Each inbound device frame is fed to [`UpgradeMachine::step`], which returns
//! the reply to send (if any) and a status snapshot when the state changed.
//! The machine never touches the transport itself.

use std::sync::Arc;

use core::fmt;
use log::{debug, trace, warn};

use crate::firmware::{LoadError, Page};
use crate::protocol::{
    hello_serial, is_hello, request, DevicePacket, FailureReason, SerialNumber, MAX_PAGES,
    PAGE_CHUNK_SIZE, PAGE_SIZE,
};

/// Discriminant of the upgrade phase, as reported to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Start,
    Header,
    Upload,
    CheckCrc,
    WaitForDone,
    Failure,
    Complete,
}

impl StateKind {
    /// `Failure` and `Complete` end the upgrade; nothing leaves them.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failure | Self::Complete)
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::Header => "header",
            Self::Upload => "upload",
            Self::CheckCrc => "check CRC",
            Self::WaitForDone => "wait for done",
            Self::Failure => "failure",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Snapshot of the machine taken at each state transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusUpdate {
    pub state: StateKind,
    pub serial: Option<SerialNumber>,
    pub failure: Option<FailureReason>,
    /// Percentage of pages the device has confirmed receiving.
    pub progress: f64,
}

/// Upgrade machine states with their per-state data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Waiting for a device to boot and say HELLO.
    Start,
    /// Waiting for the device to ask for the image size.
    Header,
    /// Serving page `page` 8 bytes at a time; `pos` is the next byte offset.
    Upload { page: usize, pos: usize },
    /// Page complete, waiting for the device to ask for its CRC.
    CheckCrc { crc: u32 },
    /// Every page sent, waiting for the device to finish.
    WaitForDone,
    Failure(FailureReason),
    Complete,
}

impl State {
    pub fn kind(&self) -> StateKind {
        match self {
            Self::Start => StateKind::Start,
            Self::Header => StateKind::Header,
            Self::Upload { .. } => StateKind::Upload,
            Self::CheckCrc { .. } => StateKind::CheckCrc,
            Self::WaitForDone => StateKind::WaitForDone,
            Self::Failure(_) => StateKind::Failure,
            Self::Complete => StateKind::Complete,
        }
    }

    fn failure(&self) -> Option<FailureReason> {
        match self {
            Self::Failure(reason) => Some(*reason),
            _ => None,
        }
    }
}

/// Reply frame payload sent on the tool identifier.
pub type Reply = heapless::Vec<u8, 8>;

/// Outcome of feeding one frame to the machine.
#[derive(Debug, Default, PartialEq)]
pub struct Step {
    pub reply: Option<Reply>,
    /// Present only when the frame caused a state transition.
    pub update: Option<StatusUpdate>,
}

/// What a state handler decided to do with a frame.
enum Transition {
    /// Frame ignored, nothing changes.
    Stay,
    /// Same state, new per-state data. Not reported.
    Update(State),
    /// New state. Reported to observers.
    Enter(State),
}

type Handled = (Transition, Option<Reply>);

fn reply(data: &[u8]) -> Option<Reply> {
    Reply::from_slice(data).ok()
}

fn fail(reason: FailureReason) -> Handled {
    (Transition::Enter(State::Failure(reason)), None)
}

/// The upgrade protocol engine for a single device.
pub struct UpgradeMachine {
    pages: Arc<[Page]>,
    target_serial: Option<SerialNumber>,
    serial: Option<SerialNumber>,
    state: State,
    current_page: usize,
    confirmed_page: Option<usize>,
}

impl UpgradeMachine {
    /// Create a machine in `Start` that will serve `pages`.
    ///
    /// Only a device announcing `target_serial` is engaged; with `None` the
    /// first device to boot is.
    pub fn new(
        pages: Arc<[Page]>,
        target_serial: Option<SerialNumber>,
    ) -> Result<Self, LoadError> {
        if pages.len() > MAX_PAGES {
            return Err(LoadError::TooLarge {
                max_pages: MAX_PAGES,
            });
        }

        Ok(Self {
            pages,
            target_serial,
            serial: None,
            state: State::Start,
            current_page: 0,
            confirmed_page: None,
        })
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn serial(&self) -> Option<SerialNumber> {
        self.serial
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn confirmed_page(&self) -> Option<usize> {
        self.confirmed_page
    }

    /// Percentage of pages confirmed by the device.
    pub fn progress(&self) -> f64 {
        match self.confirmed_page {
            None => 0.0,
            Some(_) if self.pages.is_empty() => 100.0,
            Some(page) => page as f64 * 100.0 / self.pages.len() as f64,
        }
    }

    pub fn snapshot(&self) -> StatusUpdate {
        StatusUpdate {
            state: self.state.kind(),
            serial: self.serial,
            failure: self.state.failure(),
            progress: self.progress(),
        }
    }

    /// Process one frame received from a device.
    pub fn step(&mut self, frame: &[u8]) -> Step {
        let (transition, reply) = match self.state {
            State::Start => self.on_start(frame),
            State::Header => self.on_header(frame),
            State::Upload { page, pos } => self.on_upload(frame, page, pos),
            State::CheckCrc { crc } => self.on_check_crc(frame, crc),
            State::WaitForDone => self.on_wait_for_done(frame),
            State::Failure(_) | State::Complete => (Transition::Stay, None),
        };

        let update = match transition {
            Transition::Stay => None,
            Transition::Update(state) => {
                self.state = state;
                None
            }
            Transition::Enter(state) => {
                if let State::Failure(reason) = state {
                    warn!("Upgrade failed in {:?}: {} ({:02x?})", self.state, reason, frame);
                } else {
                    debug!("Upgrade: {:?} -> {:?}", self.state, state);
                }
                self.state = state;
                Some(self.snapshot())
            }
        };

        Step { reply, update }
    }

    fn on_start(&mut self, frame: &[u8]) -> Handled {
        if is_hello(frame) {
            let Some(serial) = hello_serial(frame) else {
                return fail(FailureReason::ProtocolError);
            };

            if self.target_serial.is_some_and(|target| target != serial) {
                trace!("Ignoring HELLO from {:02x?}", serial);
                return (Transition::Stay, None);
            }

            self.serial = Some(serial);
            // Acknowledge by echoing the serial in wire order.
            return (Transition::Enter(State::Header), reply(&frame[4..8]));
        }

        match request(frame) {
            // Frames from a device in the middle of another upgrade
            Some(
                DevicePacket::Start | DevicePacket::Page | DevicePacket::Crc | DevicePacket::Done,
            ) => fail(FailureReason::UpgradeInProgress),
            _ => fail(FailureReason::ProtocolError),
        }
    }

    fn on_header(&mut self, frame: &[u8]) -> Handled {
        match request(frame) {
            Some(DevicePacket::Start) => {
                let next = if self.pages.is_empty() {
                    State::WaitForDone
                } else {
                    State::Upload { page: 0, pos: 0 }
                };
                // `new` guarantees the count fits in a byte.
                let count = self.pages.len() as u8;
                (Transition::Enter(next), reply(&[count]))
            }
            _ if is_hello(frame) => (Transition::Stay, None),
            _ => fail(FailureReason::ProtocolError),
        }
    }

    fn on_upload(&mut self, frame: &[u8], page: usize, pos: usize) -> Handled {
        match request(frame) {
            Some(DevicePacket::Page) => {
                if pos == 0 {
                    // The device discards any partial page once it asks for
                    // the first bytes of a new one.
                    self.confirmed_page = Some(page);
                }

                if pos >= PAGE_SIZE {
                    return fail(FailureReason::ProtocolError);
                }

                let current = &self.pages[page];
                let data = reply(&current.data()[pos..pos + PAGE_CHUNK_SIZE]);
                let pos = pos + PAGE_CHUNK_SIZE;

                let next = if pos == PAGE_SIZE {
                    Transition::Enter(State::CheckCrc { crc: current.crc() })
                } else {
                    Transition::Update(State::Upload { page, pos })
                };
                (next, data)
            }
            Some(DevicePacket::Error) => fail(FailureReason::PageCrcError),
            _ if is_hello(frame) => (Transition::Stay, None),
            _ => fail(FailureReason::ProtocolError),
        }
    }

    fn on_check_crc(&mut self, frame: &[u8], crc: u32) -> Handled {
        match request(frame) {
            Some(DevicePacket::Crc) => {
                self.current_page += 1;
                let next = if self.current_page < self.pages.len() {
                    State::Upload {
                        page: self.current_page,
                        pos: 0,
                    }
                } else {
                    State::WaitForDone
                };
                (Transition::Enter(next), reply(&crc.to_le_bytes()))
            }
            _ if is_hello(frame) => (Transition::Stay, None),
            _ => fail(FailureReason::ProtocolError),
        }
    }

    fn on_wait_for_done(&mut self, frame: &[u8]) -> Handled {
        match request(frame) {
            Some(DevicePacket::Done) => {
                self.confirmed_page = Some(self.pages.len());
                (Transition::Enter(State::Complete), None)
            }
            Some(DevicePacket::Error) => fail(FailureReason::PageCrcError),
            _ if is_hello(frame) => (Transition::Stay, None),
            _ => fail(FailureReason::ProtocolError),
        }
    }
}
