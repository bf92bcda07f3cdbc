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

//! Request/acknowledge mailbox channel to the PRCM unit firmware.
//!
//! The PRCM unit is a power, reset and clock management co-processor. The
//! host communicates with its firmware through eight independent mailboxes
//! in a shared TCDM memory window (see [`layout`]), paired with two
//! single-bit-per-mailbox hardware registers: a request-pending register the
//! host raises to hand a filled request region to the firmware, and an
//! acknowledge-interrupt register the firmware raises when a reply is ready
//! in the acknowledge region.
//!
//! A request is made by taking the mailbox's transaction lock, waiting for
//! the request-pending bit to clear, staging the payload fields, writing the
//! header byte last (the header is what the firmware reacts to), raising the
//! pending bit and blocking on the mailbox's completion until the
//! acknowledge interrupt hands back a parsed reply. Transactions on one
//! mailbox are strictly serialized; distinct mailboxes are independent.
//!
//! Mailbox 0 is special: it carries fire-and-forget power-state and
//! wakeup-configuration requests (the firmware does not acknowledge
//! configuration writes) as well as incoming wakeup events, which are
//! demultiplexed into the virtual wakeup interrupt lines of
//! [`message::WakeupSource`].

pub mod error;
pub mod layout;
pub mod message;
pub mod sync;

mod irq;
mod manager;
mod wakeup;

pub use error::Error;
pub use manager::{Prcmu, CLOCK_TIMEOUT, SYSCLK_TIMEOUT};
pub use sync::WorkMode;

use message::Clock;

/// Access to the PRCM unit hardware: the shared TCDM window, the
/// per-mailbox pending-bit registers and the handful of directly managed
/// PRCM registers.
///
/// Implementations must give every access the ordering of a device register
/// access (no merging or reordering between calls); the request protocol
/// relies on payload writes reaching the window before the header write and
/// on the header write preceding the pending-bit raise.
pub trait PrcmHardware: Send + Sync + 'static {
    /// Reads one byte of the TCDM window.
    fn tcdm_read_u8(&self, offset: usize) -> u8;
    /// Writes one byte of the TCDM window.
    fn tcdm_write_u8(&self, offset: usize, value: u8);
    /// Reads a little-endian 32-bit word of the TCDM window.
    fn tcdm_read_u32(&self, offset: usize) -> u32;
    /// Writes a little-endian 32-bit word of the TCDM window.
    fn tcdm_write_u32(&self, offset: usize, value: u32);

    /// Returns the request-pending bitmask, one bit per mailbox. A set bit
    /// means the firmware has not yet consumed that mailbox's request.
    fn request_pending(&self) -> u8;
    /// Raises the request-pending bit for `mailbox`, signalling the
    /// firmware.
    fn raise_request(&self, mailbox: u8);

    /// Returns the acknowledge-interrupt bitmask, one bit per mailbox.
    fn ack_pending(&self) -> u8;
    /// Clears the acknowledge-interrupt bit for `mailbox`.
    fn clear_ack(&self, mailbox: u8);

    /// Reads a directly managed PRCM register.
    fn register_read(&self, register: PrcmRegister) -> u32;
    /// Writes a directly managed PRCM register.
    fn register_write(&self, register: PrcmRegister, value: u32);
}

/// The PRCM registers the channel manager accesses outside the TCDM window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrcmRegister {
    /// The hardware semaphore guarding the clock management registers
    /// against the firmware's own accesses. Reading it acquires it when the
    /// returned value has [`PRCM_SEM_BIT`] clear; writing zero releases it.
    Sem,
    /// The timer clock control register.
    Tcr,
    /// The management register of a register-managed clock (a clock for
    /// which [`Clock::mgt_index`] is `Some`).
    ClkMgt(Clock),
}

/// Semaphore-taken bit of [`PrcmRegister::Sem`].
pub const PRCM_SEM_BIT: u32 = 1;

/// Clock-enable bit of a clock management register.
pub const CLK_MGT_CLKEN: u32 = 1 << 8;

/// PLL multiplexer selection bits of a clock management register.
pub const CLK_MGT_CLKPLLSW_MASK: u32 = 0xE0;

/// Timer enable-select bits of [`PrcmRegister::Tcr`].
pub const TCR_TENSEL_MASK: u32 = 0x1F;

/// Stop-timers bit of [`PrcmRegister::Tcr`].
pub const TCR_STOP_TIMERS: u32 = 1 << 16;

/// Doze-mode bit of [`PrcmRegister::Tcr`].
pub const TCR_DOZE_MODE: u32 = 1 << 17;

/// Construction-time configuration for [`Prcmu`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// How the deferred wakeup-mask push runs. Tests that need to observe
    /// coalescing deterministically use [`WorkMode::Manual`] together with
    /// [`Prcmu::flush_wakeup_work`].
    pub wakeup_work: WorkMode,
}

/// Outcome of the interrupt top half, mirroring a threaded interrupt
/// handler's return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqReturn {
    /// No mailbox had an acknowledge pending; the interrupt was not ours.
    None,
    /// All pending acknowledges were handled in the top half.
    Handled,
    /// [`Prcmu::handle_mailbox_interrupt_thread`] must run from a context
    /// that may block.
    WakeThread,
}
