// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Public entry point for upgrading a device.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};

use crate::firmware::{self, LoadError, Page};
use crate::machine::{StateKind, StatusUpdate, UpgradeMachine};
use crate::protocol::{FailureReason, SerialNumber, DEVICE_ID, TOOL_ID};
use crate::status::{self, StatusReceiver};
use crate::transport::CanTransport;

type Observer = Box<dyn FnMut(&StatusUpdate)>;

/// Drives a firmware upgrade of one device over a CAN transport.
///
/// Construction subscribes the protocol engine to [`DEVICE_ID`], so from then
/// on the upgrade proceeds on the transport's receive thread. [`Upgrader::run`]
/// only observes it.
pub struct Upgrader {
    pages: Arc<[Page]>,
    target_serial: Option<SerialNumber>,
    status: StatusReceiver,
    observer: Option<Observer>,
    state: StateKind,
    serial: Option<SerialNumber>,
    failure: Option<FailureReason>,
    progress: f64,
}

impl Upgrader {
    /// Load `firmware` and start listening for the device.
    ///
    /// The transport must already be connected. Fails only if the image
    /// cannot be loaded, in which case nothing is sent on the bus.
    pub fn new<T>(
        transport: Arc<T>,
        target_serial: Option<SerialNumber>,
        firmware: impl AsRef<Path>,
    ) -> Result<Self, LoadError>
    where
        T: CanTransport + 'static,
    {
        let pages: Arc<[Page]> = firmware::load(firmware)?.into();
        let mut machine = UpgradeMachine::new(Arc::clone(&pages), target_serial)?;

        let (tx, status) = status::channel();
        let initial = machine.snapshot();
        tx.push(initial);

        let replies = Arc::clone(&transport);
        transport.subscribe(
            DEVICE_ID,
            Box::new(move |can_id, data, _timestamp| {
                if can_id != DEVICE_ID {
                    return;
                }

                let step = machine.step(data);
                if let Some(reply) = step.reply {
                    replies.send(TOOL_ID, &reply);
                }
                if let Some(update) = step.update {
                    tx.push(update);
                }
            }),
        );

        info!(
            "Waiting for {} to boot ({} pages)",
            target_serial
                .map(|serial| format_serial(&serial))
                .unwrap_or_else(|| "any device".into()),
            pages.len()
        );

        Ok(Self {
            pages,
            target_serial,
            status,
            observer: None,
            state: initial.state,
            serial: initial.serial,
            failure: initial.failure,
            progress: initial.progress,
        })
    }

    /// Call `observer` for every update consumed by [`Upgrader::run`].
    pub fn with_observer(mut self, observer: impl FnMut(&StatusUpdate) + 'static) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Consume status updates until the upgrade ends.
    ///
    /// `timeout` bounds the wait for each update, not the whole upgrade.
    /// Returns `true` once `Complete` or `Failure` is reached and `false` if
    /// no update arrived within `timeout`. The upgrade carries on in the
    /// background after a timeout.
    pub fn run(&mut self, timeout: Duration) -> bool {
        while let Some(update) = self.status.pop(timeout) {
            self.state = update.state;
            self.serial = update.serial;
            self.failure = update.failure;
            self.progress = update.progress;

            if let Some(observer) = self.observer.as_mut() {
                observer(&update);
            }

            if update.state.is_terminal() {
                debug!("Upgrade finished: {:?}", update);
                return true;
            }
        }

        false
    }

    pub fn state(&self) -> StateKind {
        self.state
    }

    /// Serial number of the device being upgraded, once it said HELLO.
    pub fn serial(&self) -> Option<SerialNumber> {
        self.serial
    }

    pub fn target_serial(&self) -> Option<SerialNumber> {
        self.target_serial
    }

    pub fn failure(&self) -> Option<FailureReason> {
        self.failure
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }
}

/// Format a serial number as 8 lowercase hex digits.
pub fn format_serial(serial: &SerialNumber) -> String {
    serial.iter().map(|b| format!("{b:02x}")).collect()
}
