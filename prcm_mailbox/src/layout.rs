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

//! Layout of the shared TCDM window used for mailbox communication with the
//! PRCM unit.
//!
//! The window holds eight request regions, eight acknowledge regions and a
//! block of sixteen single-byte headers near the top of the window. Request
//! regions are owned by the host and must only be written while the mailbox's
//! request-pending bit is clear; acknowledge regions are owned by the
//! firmware and handed to the host when the mailbox's acknowledge-interrupt
//! bit is raised. All multi-byte fields are little-endian.

use core::ops::Range;

/// The number of independent mailboxes in the window.
pub const NUM_MAILBOXES: u8 = 8;

/// Bitmask covering the pending bits of all mailboxes.
pub const ALL_MAILBOX_BITS: u8 = ((1u16 << NUM_MAILBOXES) - 1) as u8;

/// The size of the shared TCDM window, in bytes.
pub const TCDM_SIZE: usize = 0x1000;

/// Base offset of the block of mailbox header bytes.
///
/// The eight request headers come first, immediately followed by the eight
/// acknowledge headers.
const MAILBOX_HEADER_BASE: usize = 0xFE8;

/// Returns the bit representing `mailbox` in the pending-bit registers.
pub const fn mailbox_bit(mailbox: u8) -> u8 {
    1 << mailbox
}

/// Offset of the request header byte for `mailbox`.
pub const fn request_header(mailbox: u8) -> usize {
    MAILBOX_HEADER_BASE + mailbox as usize
}

/// Offset of the acknowledge header byte for `mailbox`.
pub const fn ack_header(mailbox: u8) -> usize {
    MAILBOX_HEADER_BASE + NUM_MAILBOXES as usize + mailbox as usize
}

/// Base offsets of the request regions, indexed by mailbox.
pub const REQUEST_BASE: [usize; NUM_MAILBOXES as usize] =
    [0xFD8, 0xFCC, 0xFC4, 0xFC0, 0xF98, 0xF90, 0xF8C, 0xF84];

/// Base offsets of the acknowledge regions, indexed by mailbox.
pub const ACK_BASE: [usize; NUM_MAILBOXES as usize] =
    [0xF38, 0xF30, 0xF24, 0xF20, 0xF1C, 0xF14, 0xF0C, 0xF08];

/// Sizes of the request regions, indexed by mailbox.
const REQUEST_SIZE: [usize; NUM_MAILBOXES as usize] = [0x10, 0xC, 0x8, 0x4, 0x28, 0x8, 0x4, 0x8];

/// Sizes of the acknowledge regions, indexed by mailbox.
const ACK_SIZE: [usize; NUM_MAILBOXES as usize] = [0x40, 0x8, 0xC, 0x4, 0x3, 0x8, 0x8, 0x4];

/// Returns the range of the request region for `mailbox`, excluding the
/// header byte.
pub fn request_region(mailbox: u8) -> Range<usize> {
    let base = REQUEST_BASE[mailbox as usize];
    base..base + REQUEST_SIZE[mailbox as usize]
}

/// Returns the range of the acknowledge region for `mailbox`, excluding the
/// header byte.
pub fn ack_region(mailbox: u8) -> Range<usize> {
    let base = ACK_BASE[mailbox as usize];
    base..base + ACK_SIZE[mailbox as usize]
}

// Mailbox 0 request fields.
pub const REQ_MB0_AP_POWER_STATE: usize = REQUEST_BASE[0];
pub const REQ_MB0_ULP_CLOCK_STATE: usize = REQUEST_BASE[0] + 0x1;
pub const REQ_MB0_AP_PLL_STATE: usize = REQUEST_BASE[0] + 0x2;
pub const REQ_MB0_DDR_STATE: usize = REQUEST_BASE[0] + 0x3;
pub const REQ_MB0_ESRAM0_STATE: usize = REQUEST_BASE[0] + 0x4;
pub const REQ_MB0_WAKEUP_DBB: usize = REQUEST_BASE[0] + 0x8;
pub const REQ_MB0_WAKEUP_ABB: usize = REQUEST_BASE[0] + 0xC;

// Mailbox 0 acknowledge fields. The firmware double-buffers the wakeup event
// snapshot; the read pointer byte selects the active copy.
pub const ACK_MB0_AP_PWR_STATE_STATUS: usize = ACK_BASE[0];
pub const ACK_MB0_READ_POINTER: usize = ACK_BASE[0] + 0x1;
pub const ACK_MB0_WAKEUP_0_DBB: usize = ACK_BASE[0] + 0x4;
pub const ACK_MB0_WAKEUP_0_ABB: usize = ACK_BASE[0] + 0x8;
pub const ACK_MB0_WAKEUP_1_DBB: usize = ACK_BASE[0] + 0x28;
pub const ACK_MB0_WAKEUP_1_ABB: usize = ACK_BASE[0] + 0x2C;

/// The number of ABB event bytes in each wakeup snapshot.
pub const ABB_EVENT_BYTES: usize = 20;

// Mailbox 1 request fields.
pub const REQ_MB1_ARM_OPP: usize = REQUEST_BASE[1];
pub const REQ_MB1_APE_OPP: usize = REQUEST_BASE[1] + 0x1;

// Mailbox 1 acknowledge fields.
pub const ACK_MB1_CURRENT_ARM_OPP: usize = ACK_BASE[1];
pub const ACK_MB1_CURRENT_APE_OPP: usize = ACK_BASE[1] + 0x1;
pub const ACK_MB1_ARM_VOLT_STATUS: usize = ACK_BASE[1] + 0x2;
pub const ACK_MB1_APE_VOLT_STATUS: usize = ACK_BASE[1] + 0x3;

// Mailbox 2 request fields.
pub const REQ_MB2_EPOD_CLIENT: usize = REQUEST_BASE[2];
pub const REQ_MB2_EPOD_STATE: usize = REQUEST_BASE[2] + 0x1;
pub const REQ_MB2_CLK_CLIENT: usize = REQUEST_BASE[2] + 0x2;
pub const REQ_MB2_CLK_STATE: usize = REQUEST_BASE[2] + 0x3;
pub const REQ_MB2_PLL_CLIENT: usize = REQUEST_BASE[2] + 0x4;
pub const REQ_MB2_PLL_STATE: usize = REQUEST_BASE[2] + 0x5;

// Mailbox 2 acknowledge fields.
pub const ACK_MB2_EPOD_STATUS: usize = ACK_BASE[2] + 0x2;
pub const ACK_MB2_CLK_STATUS: usize = ACK_BASE[2] + 0x6;
pub const ACK_MB2_PLL_STATUS: usize = ACK_BASE[2] + 0xA;

// Mailbox 3 fields.
pub const REQ_MB3_REFCLK_MGT: usize = REQUEST_BASE[3];
pub const ACK_MB3_REFCLK_REQ: usize = ACK_BASE[3];

// Mailbox 5 request fields.
pub const REQ_MB5_I2C_SLAVE: usize = REQUEST_BASE[5];
pub const REQ_MB5_I2C_REG: usize = REQUEST_BASE[5] + 0x1;
pub const REQ_MB5_I2C_SIZE: usize = REQUEST_BASE[5] + 0x2;
pub const REQ_MB5_I2C_DATA: usize = REQUEST_BASE[5] + 0x4;

// Mailbox 5 acknowledge fields.
pub const ACK_MB5_RETURN_CODE: usize = ACK_BASE[5];
pub const ACK_MB5_I2C_DATA: usize = ACK_BASE[5] + 0x4;

/// The maximum transfer size of a single ABB I2C request.
pub const ABB_I2C_MAX_SIZE: usize = 4;

// The request regions run up against the header block, and the header block
// must fit inside the window.
static_assertions::const_assert!(REQUEST_BASE[0] + 0x10 <= MAILBOX_HEADER_BASE);
static_assertions::const_assert!(MAILBOX_HEADER_BASE + 2 * NUM_MAILBOXES as usize <= TCDM_SIZE);
// The acknowledge block ends below the request block.
static_assertions::const_assert!(ACK_BASE[0] + 0x40 <= REQUEST_BASE[7]);

#[cfg(test)]
mod tests {
    use super::*;

    fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
        a.start < b.end && b.start < a.end
    }

    #[test]
    fn regions_are_disjoint() {
        let mut regions = Vec::new();
        for mailbox in 0..NUM_MAILBOXES {
            regions.push(request_region(mailbox));
            regions.push(ack_region(mailbox));
            regions.push(request_header(mailbox)..request_header(mailbox) + 1);
            regions.push(ack_header(mailbox)..ack_header(mailbox) + 1);
        }
        for (i, a) in regions.iter().enumerate() {
            assert!(a.end <= TCDM_SIZE);
            for b in &regions[i + 1..] {
                assert!(!overlaps(a, b), "{:#x?} overlaps {:#x?}", a, b);
            }
        }
    }

    #[test]
    fn request_and_ack_headers_differ() {
        for mailbox in 0..NUM_MAILBOXES {
            assert_ne!(request_header(mailbox), ack_header(mailbox));
        }
    }

    #[test]
    fn fields_stay_within_their_region() {
        assert!(request_region(0).contains(&REQ_MB0_WAKEUP_ABB));
        assert!(ack_region(0).contains(&(ACK_MB0_WAKEUP_1_ABB + ABB_EVENT_BYTES - 1)));
        assert!(request_region(5).contains(&(REQ_MB5_I2C_DATA + ABB_I2C_MAX_SIZE - 1)));
        assert!(ack_region(5).contains(&(ACK_MB5_I2C_DATA + ABB_I2C_MAX_SIZE - 1)));
        assert!(ack_region(2).contains(&ACK_MB2_PLL_STATUS));
    }
}
