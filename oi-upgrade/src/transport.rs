// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Linux SocketCAN transport with a background receive thread.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, error, trace};
use oi_upgrade_common::{CanTransport, FrameListener};
use socketcan::{CanFrame, CanSocket, EmbeddedFrame, Id, Socket, StandardId};

/// How often the receive thread checks for shutdown.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

type Listeners = Arc<Mutex<HashMap<u16, FrameListener>>>;

pub struct SocketCanTransport {
    interface: String,
    socket: Arc<CanSocket>,
    listeners: Listeners,
    running: Arc<AtomicBool>,
    receiver: Mutex<Option<JoinHandle<()>>>,
}

impl SocketCanTransport {
    /// Open `interface` and start dispatching received frames.
    pub fn open(interface: &str) -> Result<Self> {
        let socket = CanSocket::open(interface)
            .with_context(|| format!("Failed to open CAN interface {interface}"))?;
        socket
            .set_read_timeout(READ_TIMEOUT)
            .context("Failed to set CAN read timeout")?;

        let socket = Arc::new(socket);
        let listeners: Listeners = Arc::default();
        let running = Arc::new(AtomicBool::new(true));

        let receiver = thread::Builder::new()
            .name(format!("{interface}-rx"))
            .spawn({
                let socket = Arc::clone(&socket);
                let listeners = Arc::clone(&listeners);
                let running = Arc::clone(&running);
                move || receive_loop(&socket, &listeners, &running)
            })
            .context("Failed to spawn CAN receive thread")?;

        debug!("Opened CAN interface {}", interface);
        Ok(Self {
            interface: interface.to_string(),
            socket,
            listeners,
            running,
            receiver: Mutex::new(Some(receiver)),
        })
    }

    /// Stop the receive thread and drop every listener.
    pub fn close(&self) {
        self.running.store(false, Ordering::Relaxed);

        let receiver = self
            .receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(receiver) = receiver {
            if receiver.join().is_err() {
                error!("CAN receive thread panicked");
            }
        }

        // Listeners may hold a reference back to this transport.
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Closed CAN interface {}", self.interface);
    }
}

impl Drop for SocketCanTransport {
    fn drop(&mut self) {
        self.close();
    }
}

impl CanTransport for SocketCanTransport {
    fn send(&self, can_id: u16, data: &[u8]) {
        let Some(id) = StandardId::new(can_id) else {
            error!("Invalid standard CAN id 0x{:x}", can_id);
            return;
        };
        let Some(frame) = CanFrame::new(id, data) else {
            error!("Invalid CAN payload of {} bytes", data.len());
            return;
        };

        trace!("TX 0x{:03x} {:02x?}", can_id, data);
        if let Err(e) = self.socket.write_frame(&frame) {
            error!("Failed to send CAN frame on {}: {}", self.interface, e);
        }
    }

    fn subscribe(&self, can_id: u16, listener: FrameListener) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(can_id, listener);
    }
}

fn receive_loop(
    socket: &CanSocket,
    listeners: &Mutex<HashMap<u16, FrameListener>>,
    running: &AtomicBool,
) {
    let started = Instant::now();

    while running.load(Ordering::Relaxed) {
        let frame = match socket.read_frame() {
            Ok(CanFrame::Data(frame)) => frame,
            Ok(_) => continue,
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                continue
            }
            Err(e) => {
                error!("CAN receive failed: {}", e);
                break;
            }
        };

        // The upgrade protocol only uses standard identifiers.
        let Id::Standard(id) = frame.id() else {
            continue;
        };
        let can_id = id.as_raw();
        trace!("RX 0x{:03x} {:02x?}", can_id, frame.data());

        let mut listeners = listeners.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(listener) = listeners.get_mut(&can_id) {
            listener(can_id, frame.data(), started.elapsed().as_secs_f64());
        }
    }
}
