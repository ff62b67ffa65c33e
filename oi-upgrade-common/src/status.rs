// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Ordered hand-off of status snapshots from the CAN receive thread.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::time::Duration;

use log::{trace, warn};

use crate::machine::StatusUpdate;

/// Create a connected sender/receiver pair.
pub fn channel() -> (StatusSender, StatusReceiver) {
    let (tx, rx) = mpsc::channel();
    (StatusSender(tx), StatusReceiver(rx))
}

/// Producer side, owned by the frame listener.
#[derive(Clone)]
pub struct StatusSender(Sender<StatusUpdate>);

impl StatusSender {
    /// Queue an update. Never blocks; an update nobody can receive is dropped.
    pub fn push(&self, update: StatusUpdate) {
        trace!("Status: {:?}", update);
        if self.0.send(update).is_err() {
            warn!("Status receiver gone, dropping update: {:?}", update);
        }
    }
}

/// Consumer side, owned by the upgrader.
pub struct StatusReceiver(Receiver<StatusUpdate>);

impl StatusReceiver {
    /// Wait up to `timeout` for the next update.
    ///
    /// Returns `None` on timeout, or once every sender is gone and the queue
    /// is drained.
    pub fn pop(&self, timeout: Duration) -> Option<StatusUpdate> {
        match self.0.recv_timeout(timeout) {
            Ok(update) => Some(update),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Status sender gone, no further updates");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::StateKind;
    use std::thread;

    fn update(state: StateKind, progress: f64) -> StatusUpdate {
        StatusUpdate {
            state,
            serial: None,
            failure: None,
            progress,
        }
    }

    #[test]
    fn test_pop_preserves_push_order() {
        let (tx, rx) = channel();
        tx.push(update(StateKind::Start, 0.0));
        tx.push(update(StateKind::Header, 0.0));
        tx.push(update(StateKind::Upload, 50.0));

        let timeout = Duration::from_millis(10);
        assert_eq!(rx.pop(timeout).map(|u| u.state), Some(StateKind::Start));
        assert_eq!(rx.pop(timeout).map(|u| u.state), Some(StateKind::Header));
        assert_eq!(rx.pop(timeout).map(|u| u.progress), Some(50.0));
        assert_eq!(rx.pop(timeout), None);
    }

    #[test]
    fn test_pop_receives_from_other_thread() {
        let (tx, rx) = channel();
        let producer = thread::spawn(move || {
            for _ in 0..100 {
                tx.push(update(StateKind::Upload, 0.0));
            }
            tx.push(update(StateKind::Complete, 100.0));
        });

        let mut last = None;
        while let Some(update) = rx.pop(Duration::from_secs(5)) {
            last = Some(update.state);
            if update.state.is_terminal() {
                break;
            }
        }
        producer.join().unwrap();
        assert_eq!(last, Some(StateKind::Complete));
    }

    #[test]
    fn test_push_after_receiver_dropped_does_not_panic() {
        let (tx, rx) = channel();
        drop(rx);
        tx.push(update(StateKind::Start, 0.0));
    }

    #[test]
    fn test_pop_times_out_when_empty() {
        let (_tx, rx) = channel();
        assert_eq!(rx.pop(Duration::from_millis(1)), None);
    }
}
