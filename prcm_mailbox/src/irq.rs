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

//! The acknowledge processor: demultiplexes the shared mailbox interrupt,
//! parses per-mailbox acknowledge regions and releases blocked requesters.
//!
//! The interrupt path is the sole writer of the acknowledge staging structs;
//! a dispatcher only reads them after its completion fired, so a transaction
//! never observes another transaction's reply as long as it re-armed its
//! completion before raising the request.

use log::warn;

use crate::{
    layout,
    message::{Mb0Header, Mb1Header, Mb2Header, Mb3Header, Mb5Header, WakeupBits},
    IrqReturn, PrcmHardware, Prcmu,
};

impl<H: PrcmHardware> Prcmu<H> {
    /// The interrupt top half.
    ///
    /// Must be called when the shared mailbox interrupt line fires. Never
    /// blocks: it walks the pending acknowledge bits in increasing mailbox
    /// order, copies the relevant acknowledge fields into the per-mailbox
    /// staging structs, clears each mailbox's interrupt bit and signals the
    /// blocked requesters. Returns [`IrqReturn::WakeThread`] when
    /// [`Self::handle_mailbox_interrupt_thread`] must run afterwards from a
    /// context that may block.
    pub fn handle_mailbox_interrupt(&self) -> IrqReturn {
        let bits = self.hw.ack_pending() & layout::ALL_MAILBOX_BITS;
        if bits == 0 {
            return IrqReturn::None;
        }

        let mut wake_thread = false;
        for mailbox in 0..layout::NUM_MAILBOXES {
            if bits & layout::mailbox_bit(mailbox) == 0 {
                continue;
            }
            wake_thread |= match mailbox {
                0 => self.read_mailbox_0(),
                1 => self.read_mailbox_1(),
                2 => self.read_mailbox_2(),
                3 => self.read_mailbox_3(),
                5 => self.read_mailbox_5(),
                // Mailboxes 4, 6 and 7 carry no operations.
                _ => {
                    self.hw.clear_ack(mailbox);
                    false
                }
            };
        }

        if wake_thread {
            IrqReturn::WakeThread
        } else {
            IrqReturn::Handled
        }
    }

    /// The threaded interrupt half.
    ///
    /// Acknowledges consumption of the current wakeup event snapshot back to
    /// the firmware so it may prepare the next one. This is a mailbox 0
    /// write/poll sequence of its own, which is why it cannot run in the top
    /// half.
    pub fn handle_mailbox_interrupt_thread(&self) {
        self.ack_dbb_wakeup();
    }

    fn read_mailbox_0(&self) -> bool {
        let header = self.hw.tcdm_read_u8(layout::ack_header(0));
        let wake_thread = match Mb0Header::from_repr(header) {
            Some(Mb0Header::WakeUp) => {
                let offset = if self.hw.tcdm_read_u8(layout::ACK_MB0_READ_POINTER) & 1 != 0 {
                    layout::ACK_MB0_WAKEUP_1_DBB
                } else {
                    layout::ACK_MB0_WAKEUP_0_DBB
                };
                let events = WakeupBits::from_bits_truncate(self.hw.tcdm_read_u32(offset));
                // Suppress events for lines that are currently masked.
                let events = events & *self.mb0.dbb_irqs.lock();
                self.dispatch_wakeup_events(events);
                true
            }
            _ => {
                warn!("unknown message header ({header}) in mailbox 0");
                false
            }
        };
        self.hw.clear_ack(0);
        wake_thread
    }

    fn read_mailbox_1(&self) -> bool {
        let header = self.hw.tcdm_read_u8(layout::ack_header(1));
        let mut do_complete = true;
        {
            let mut ack = self.mb1.ack.lock();
            ack.header = header;
            match Mb1Header::from_repr(header) {
                Some(Mb1Header::ArmOpp) => {
                    ack.current_arm_opp = self.hw.tcdm_read_u8(layout::ACK_MB1_CURRENT_ARM_OPP);
                    ack.arm_voltage_status =
                        self.hw.tcdm_read_u8(layout::ACK_MB1_ARM_VOLT_STATUS);
                }
                Some(Mb1Header::ArmApeOpp) => {
                    ack.current_ape_opp = self.hw.tcdm_read_u8(layout::ACK_MB1_CURRENT_APE_OPP);
                    ack.ape_voltage_status =
                        self.hw.tcdm_read_u8(layout::ACK_MB1_APE_VOLT_STATUS);
                }
                _ => {
                    warn!("unknown message header ({header}) in mailbox 1");
                    do_complete = false;
                }
            }
        }

        self.hw.clear_ack(1);

        if do_complete {
            self.mb1.work.complete();
        }
        false
    }

    fn read_mailbox_2(&self) -> bool {
        let header = self.hw.tcdm_read_u8(layout::ack_header(2));
        let status = match Mb2Header::from_repr(header) {
            Some(Mb2Header::EpodRequest) => self.hw.tcdm_read_u8(layout::ACK_MB2_EPOD_STATUS),
            Some(Mb2Header::ClkRequest) => self.hw.tcdm_read_u8(layout::ACK_MB2_CLK_STATUS),
            Some(Mb2Header::PllRequest) => self.hw.tcdm_read_u8(layout::ACK_MB2_PLL_STATUS),
            None => {
                self.hw.clear_ack(2);
                warn!("unknown message header ({header}) in mailbox 2");
                return false;
            }
        };
        {
            let mut ack = self.mb2.ack.lock();
            ack.header = header;
            ack.status = status;
        }
        self.hw.clear_ack(2);
        self.mb2.work.complete();
        false
    }

    fn read_mailbox_3(&self) -> bool {
        let header = self.hw.tcdm_read_u8(layout::ack_header(3));
        match Mb3Header::from_repr(header) {
            Some(Mb3Header::RefClkRequest) => {
                {
                    let mut ack = self.mb3.ack.lock();
                    ack.header = header;
                    ack.status = self.hw.tcdm_read_u8(layout::ACK_MB3_REFCLK_REQ);
                }
                self.hw.clear_ack(3);
                self.mb3.sysclk_work.complete();
            }
            None => {
                self.hw.clear_ack(3);
                warn!("unknown message header ({header}) in mailbox 3");
            }
        }
        false
    }

    fn read_mailbox_5(&self) -> bool {
        let header = self.hw.tcdm_read_u8(layout::ack_header(5));
        match Mb5Header::from_repr(header) {
            Some(kind) => {
                {
                    let mut ack = self.mb5.ack.lock();
                    if kind == Mb5Header::I2cRead {
                        for (i, byte) in ack.value.iter_mut().enumerate() {
                            *byte = self.hw.tcdm_read_u8(layout::ACK_MB5_I2C_DATA + i);
                        }
                    }
                    ack.header = header;
                    ack.status = self.hw.tcdm_read_u8(layout::ACK_MB5_RETURN_CODE);
                }
                self.mb5.work.complete();
            }
            None => {
                warn!("unknown message header ({header}) in mailbox 5");
            }
        }
        self.hw.clear_ack(5);
        false
    }

    /// Tells the firmware the host has consumed the current wakeup event
    /// snapshot. Runs in the threaded interrupt half.
    fn ack_dbb_wakeup(&self) {
        let _req = self.mb0.lock.lock();

        self.wait_for_request_slot(0);

        self.hw.tcdm_write_u8(layout::request_header(0), Mb0Header::ReadWakeUpAck as u8);
        self.hw.raise_request(0);
    }
}
