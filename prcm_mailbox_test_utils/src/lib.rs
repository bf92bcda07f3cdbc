//
// Copyright 2024 The Project Oak Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Test utilities for exercising the PRCM mailbox channel manager without
//! real hardware.
//!
//! [`FakePrcmHardware`] models the TCDM window, the pending-bit registers
//! and the directly managed PRCM registers. Tests play the firmware role
//! through the helper methods: wait for a raised request, inspect the
//! request region, stage an acknowledge and post the acknowledge interrupt.
//! The fake also records every pending-bit transition and flags protocol
//! violations (raising a mailbox that is already pending, or mutating a
//! request region while its pending bit is set).

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    thread,
    time::{Duration, Instant},
};

use log::debug;
use prcm_mailbox::{layout, PrcmHardware, PrcmRegister};

struct FakeState {
    tcdm: [u8; layout::TCDM_SIZE],
    request_pending: u8,
    ack_pending: u8,
    registers: HashMap<PrcmRegister, u32>,
    raises: Vec<u8>,
    ack_clears: Vec<u8>,
    violations: Vec<String>,
}

/// A scriptable in-memory stand-in for the PRCM unit hardware.
///
/// Cloning shares the underlying state, so a test can hand one clone to
/// [`prcm_mailbox::Prcmu`] and keep another to play the firmware.
#[derive(Clone)]
pub struct FakePrcmHardware {
    state: Arc<Mutex<FakeState>>,
}

impl FakePrcmHardware {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                tcdm: [0; layout::TCDM_SIZE],
                request_pending: 0,
                ack_pending: 0,
                registers: HashMap::new(),
                raises: Vec::new(),
                ack_clears: Vec::new(),
                violations: Vec::new(),
            })),
        }
    }

    /// Checks whether `offset` belongs to `mailbox`'s request region or
    /// header byte.
    fn in_request_area(mailbox: u8, offset: usize) -> bool {
        layout::request_region(mailbox).contains(&offset)
            || offset == layout::request_header(mailbox)
    }

    fn record_request_write(state: &mut FakeState, offset: usize) {
        for mailbox in 0..layout::NUM_MAILBOXES {
            if Self::in_request_area(mailbox, offset)
                && state.request_pending & layout::mailbox_bit(mailbox) != 0
            {
                state.violations.push(format!(
                    "request region of mailbox {mailbox} written at {offset:#x} while pending"
                ));
            }
        }
    }

    /// Blocks until `mailbox`'s request-pending bit is raised. Returns false
    /// on timeout.
    pub fn wait_for_raise(&self, mailbox: u8, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.state.lock().unwrap().request_pending & layout::mailbox_bit(mailbox) != 0 {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::yield_now();
        }
    }

    /// Clears `mailbox`'s request-pending bit, playing the firmware
    /// consuming the request.
    pub fn consume_request(&self, mailbox: u8) {
        let mut state = self.state.lock().unwrap();
        state.request_pending &= !layout::mailbox_bit(mailbox);
    }

    /// Raises `mailbox`'s acknowledge-interrupt bit. The test still has to
    /// invoke the channel manager's interrupt entry point.
    pub fn post_ack(&self, mailbox: u8) {
        let mut state = self.state.lock().unwrap();
        state.ack_pending |= layout::mailbox_bit(mailbox);
    }

    /// Writes the acknowledge header byte of `mailbox`.
    pub fn stage_ack_header(&self, mailbox: u8, header: u8) {
        let mut state = self.state.lock().unwrap();
        state.tcdm[layout::ack_header(mailbox)] = header;
    }

    /// Writes one byte of an acknowledge region (or any TCDM location),
    /// bypassing violation tracking.
    pub fn stage_tcdm_u8(&self, offset: usize, value: u8) {
        let mut state = self.state.lock().unwrap();
        state.tcdm[offset] = value;
    }

    /// Little-endian variant of [`Self::stage_tcdm_u8`].
    pub fn stage_tcdm_u32(&self, offset: usize, value: u32) {
        let mut state = self.state.lock().unwrap();
        state.tcdm[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Reads one byte of the TCDM window, e.g. to inspect a staged request.
    pub fn peek_tcdm_u8(&self, offset: usize) -> u8 {
        self.state.lock().unwrap().tcdm[offset]
    }

    /// Little-endian variant of [`Self::peek_tcdm_u8`].
    pub fn peek_tcdm_u32(&self, offset: usize) -> u32 {
        let state = self.state.lock().unwrap();
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&state.tcdm[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    /// Returns every raise recorded so far, in order.
    pub fn raises(&self) -> Vec<u8> {
        self.state.lock().unwrap().raises.clone()
    }

    /// Returns how many times `mailbox` was raised.
    pub fn raise_count(&self, mailbox: u8) -> usize {
        self.state.lock().unwrap().raises.iter().filter(|&&m| m == mailbox).count()
    }

    /// Returns the order in which acknowledge-interrupt bits were cleared.
    pub fn ack_clears(&self) -> Vec<u8> {
        self.state.lock().unwrap().ack_clears.clone()
    }

    /// Returns the recorded protocol violations. An empty list means the
    /// channel manager honored the pending-bit discipline.
    pub fn violations(&self) -> Vec<String> {
        self.state.lock().unwrap().violations.clone()
    }

    /// Presets a directly managed PRCM register.
    pub fn set_register(&self, register: PrcmRegister, value: u32) {
        let mut state = self.state.lock().unwrap();
        state.registers.insert(register, value);
    }

    /// Reads back a directly managed PRCM register.
    pub fn register(&self, register: PrcmRegister) -> u32 {
        *self.state.lock().unwrap().registers.get(&register).unwrap_or(&0)
    }
}

impl Default for FakePrcmHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl PrcmHardware for FakePrcmHardware {
    fn tcdm_read_u8(&self, offset: usize) -> u8 {
        self.state.lock().unwrap().tcdm[offset]
    }

    fn tcdm_write_u8(&self, offset: usize, value: u8) {
        let mut state = self.state.lock().unwrap();
        Self::record_request_write(&mut state, offset);
        state.tcdm[offset] = value;
    }

    fn tcdm_read_u32(&self, offset: usize) -> u32 {
        let state = self.state.lock().unwrap();
        let mut bytes = [0; 4];
        bytes.copy_from_slice(&state.tcdm[offset..offset + 4]);
        u32::from_le_bytes(bytes)
    }

    fn tcdm_write_u32(&self, offset: usize, value: u32) {
        let mut state = self.state.lock().unwrap();
        Self::record_request_write(&mut state, offset);
        state.tcdm[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn request_pending(&self) -> u8 {
        self.state.lock().unwrap().request_pending
    }

    fn raise_request(&self, mailbox: u8) {
        let mut state = self.state.lock().unwrap();
        if state.request_pending & layout::mailbox_bit(mailbox) != 0 {
            state
                .violations
                .push(format!("mailbox {mailbox} raised while its request was still pending"));
        }
        debug!("mailbox {mailbox} raised");
        state.request_pending |= layout::mailbox_bit(mailbox);
        state.raises.push(mailbox);
    }

    fn ack_pending(&self) -> u8 {
        self.state.lock().unwrap().ack_pending
    }

    fn clear_ack(&self, mailbox: u8) {
        let mut state = self.state.lock().unwrap();
        state.ack_pending &= !layout::mailbox_bit(mailbox);
        state.ack_clears.push(mailbox);
    }

    fn register_read(&self, register: PrcmRegister) -> u32 {
        *self.state.lock().unwrap().registers.get(&register).unwrap_or(&0)
    }

    fn register_write(&self, register: PrcmRegister, value: u32) {
        let mut state = self.state.lock().unwrap();
        state.registers.insert(register, value);
    }
}
