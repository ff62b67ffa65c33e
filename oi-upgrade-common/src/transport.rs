// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CAN transport abstraction used by the upgrader.

/// Callback invoked for every frame received on a subscribed identifier.
///
/// Arguments are the CAN identifier, the payload and a receive timestamp in
/// seconds. Runs on the transport's receive thread.
pub type FrameListener = Box<dyn FnMut(u16, &[u8], f64) + Send + 'static>;

/// A connected CAN bus able to send standard frames and deliver received ones.
pub trait CanTransport: Send + Sync {
    /// Send a standard (11-bit) frame with up to 8 payload bytes.
    ///
    /// Fire and forget: transmission errors are handled by the transport.
    fn send(&self, can_id: u16, data: &[u8]);

    /// Deliver every frame received on `can_id` to `listener`.
    fn subscribe(&self, can_id: u16, listener: FrameListener);
}
