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

//! Header codes, status codes and resource identifiers of the PRCM mailbox
//! protocol.
//!
//! Each mailbox carries its own set of single-byte header codes. The header
//! byte is written last when building a request (it is what the firmware
//! reacts to) and read first when parsing an acknowledge.

use bitflags::bitflags;
use strum::{EnumIter, FromRepr};

/// Status byte returned by the firmware in acknowledge regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum ReturnCode {
    Success = 0,
    Fail = 1,
}

/// Mailbox 0 header codes. `WakeUp` only ever appears on the acknowledge
/// side; the others are request sub-commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Mb0Header {
    WakeUp = 0,
    PowerStateTrans = 1,
    WakeUpConfig = 2,
    ReadWakeUpAck = 3,
}

/// Mailbox 1 header codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Mb1Header {
    ArmOpp = 1,
    ApeOpp = 2,
    ArmApeOpp = 3,
}

/// Mailbox 2 header codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Mb2Header {
    EpodRequest = 1,
    ClkRequest = 2,
    PllRequest = 3,
}

/// Mailbox 3 header codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Mb3Header {
    RefClkRequest = 1,
}

/// Mailbox 5 header codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub enum Mb5Header {
    I2cWrite = 1,
    I2cRead = 2,
}

/// Clocks that can be requested through [`Prcmu::request_clock`].
///
/// The first block is managed directly through per-clock management
/// registers; the remaining entries are routed to the firmware through the
/// mailboxes.
///
/// [`Prcmu::request_clock`]: crate::Prcmu::request_clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
#[repr(u8)]
pub enum Clock {
    Sga = 0,
    Uart,
    Msp02,
    I2c,
    Sdmmc,
    Per1,
    Per2,
    Per3,
    Per5,
    Per6,
    Pwm,
    Irda,
    Irrc,
    Hdmi,
    Apeat,
    Apetrace,
    Mcde,
    Dsialt,
    Dma,
    B2r2,
    Tv,
    Rng,
    Sia,
    Sva,
    Tim,
    PllSoc0,
    PllSoc1,
    PllDdr,
    Sys,
}

/// The number of clocks managed through clock management registers.
pub const NUM_REG_CLOCKS: usize = 24;

impl Clock {
    /// Returns the index into the clock management register table, or `None`
    /// for clocks that are not register-managed.
    pub fn mgt_index(self) -> Option<usize> {
        let index = self as usize;
        (index < NUM_REG_CLOCKS).then_some(index)
    }
}

/// PLLs controllable through mailbox 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Pll {
    Soc0 = 0,
    Soc1 = 1,
    Ddr = 2,
}

/// The number of PLL identifiers.
pub const NUM_PLLS: usize = 3;

/// On-chip power domains controllable through mailbox 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
#[repr(u8)]
pub enum Epod {
    Sga = 0,
    Hva = 1,
    Sia = 2,
    Disp = 3,
    Esram12 = 4,
}

/// The number of power domain identifiers.
pub const NUM_EPODS: usize = 5;

/// Requested state of a power domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EpodState {
    Off = 0,
    On = 1,
}

/// AP power states requestable through mailbox 0. Deep idle is not supported
/// on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PowerState {
    Sleep = 2,
    DeepSleep = 3,
    Idle = 4,
}

/// Off/retention/on encoding shared by several request fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OnOffRet {
    Off = 0,
    Ret = 1,
    On = 2,
}

/// Requested deep-sleep state of the ESRAM0 bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Esram0State {
    Off,
    Ret,
}

/// Requested state of the system reference clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SysClkState {
    Off = 0,
    On = 1,
}

/// ARM operating points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ArmOpp {
    Opp100 = 1,
    Opp50 = 2,
    OppExt = 3,
}

/// APE operating points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApeOpp {
    Opp100 = 1,
    Opp50 = 2,
}

/// DDR power state field values for power-state transition requests.
pub const DDR_PWR_STATE_UNCHANGED: u8 = 0;

bitflags! {
    /// Bits of the DBB wakeup event bitmask shared with the firmware.
    ///
    /// The bit positions are not contiguous; [`WakeupSource`] keeps the
    /// virtual interrupt numbering contiguous and maps to these bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WakeupBits: u32 {
        const RTC = 1 << 0;
        const RTT0 = 1 << 1;
        const RTT1 = 1 << 2;
        const CD_IRQ = 1 << 3;
        const SRP_TIM = 1 << 4;
        const APE_REQ = 1 << 5;
        const USB = 1 << 6;
        const ABB = 1 << 7;
        const LOW_POWER_AUDIO = 1 << 8;
        const TEMP_SENSOR = 1 << 9;
        const ARM = 1 << 10;
        const AC_WAKE_ACK = 1 << 11;
        const MODEM_SW_RESET_REQ = 1 << 20;
        const GPIO0 = 1 << 23;
        const GPIO1 = 1 << 24;
        const GPIO2 = 1 << 25;
        const GPIO3 = 1 << 26;
        const GPIO4 = 1 << 27;
        const GPIO5 = 1 << 28;
        const GPIO6 = 1 << 29;
        const GPIO7 = 1 << 30;
    }
}

/// Wakeup sources that can be enabled through [`Prcmu::enable_wakeups`]. The
/// remaining sources are only reachable through the virtual interrupt
/// controller's mask/unmask interface.
///
/// [`Prcmu::enable_wakeups`]: crate::Prcmu::enable_wakeups
pub const SUPPORTED_WAKEUPS: WakeupBits = WakeupBits::RTC
    .union(WakeupBits::RTT0)
    .union(WakeupBits::RTT1)
    .union(WakeupBits::CD_IRQ)
    .union(WakeupBits::USB)
    .union(WakeupBits::ABB)
    .union(WakeupBits::ARM);

/// Virtual interrupt lines backed by firmware wakeup events.
///
/// The discriminants form a contiguous virtual interrupt number space even
/// though the underlying event bits are not contiguous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, FromRepr)]
#[repr(u8)]
pub enum WakeupSource {
    Rtc = 0,
    Rtt0,
    Rtt1,
    CdIrq,
    SrpTim,
    ApeReq,
    Usb,
    Abb,
    LowPowerAudio,
    TempSensor,
    Arm,
    AcWakeAck,
    ModemSwResetReq,
    Gpio0,
    Gpio1,
    Gpio2,
    Gpio3,
    Gpio4,
    Gpio5,
    Gpio6,
    Gpio7,
}

/// The number of virtual wakeup interrupt lines.
pub const NUM_WAKEUP_SOURCES: usize = 21;

impl WakeupSource {
    /// Returns the event bit this source contributes to the bitmask shared
    /// with the firmware.
    pub fn bit(self) -> WakeupBits {
        match self {
            WakeupSource::Rtc => WakeupBits::RTC,
            WakeupSource::Rtt0 => WakeupBits::RTT0,
            WakeupSource::Rtt1 => WakeupBits::RTT1,
            WakeupSource::CdIrq => WakeupBits::CD_IRQ,
            WakeupSource::SrpTim => WakeupBits::SRP_TIM,
            WakeupSource::ApeReq => WakeupBits::APE_REQ,
            WakeupSource::Usb => WakeupBits::USB,
            WakeupSource::Abb => WakeupBits::ABB,
            WakeupSource::LowPowerAudio => WakeupBits::LOW_POWER_AUDIO,
            WakeupSource::TempSensor => WakeupBits::TEMP_SENSOR,
            WakeupSource::Arm => WakeupBits::ARM,
            WakeupSource::AcWakeAck => WakeupBits::AC_WAKE_ACK,
            WakeupSource::ModemSwResetReq => WakeupBits::MODEM_SW_RESET_REQ,
            WakeupSource::Gpio0 => WakeupBits::GPIO0,
            WakeupSource::Gpio1 => WakeupBits::GPIO1,
            WakeupSource::Gpio2 => WakeupBits::GPIO2,
            WakeupSource::Gpio3 => WakeupBits::GPIO3,
            WakeupSource::Gpio4 => WakeupBits::GPIO4,
            WakeupSource::Gpio5 => WakeupBits::GPIO5,
            WakeupSource::Gpio6 => WakeupBits::GPIO6,
            WakeupSource::Gpio7 => WakeupBits::GPIO7,
        }
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn header_codes_round_trip() {
        assert_eq!(Mb2Header::from_repr(3), Some(Mb2Header::PllRequest));
        assert_eq!(Mb2Header::from_repr(0), None);
        assert_eq!(Mb5Header::from_repr(2), Some(Mb5Header::I2cRead));
        assert_eq!(Mb0Header::from_repr(0), Some(Mb0Header::WakeUp));
        assert_eq!(ReturnCode::from_repr(1), Some(ReturnCode::Fail));
    }

    #[test]
    fn wakeup_sources_map_to_distinct_bits() {
        let mut seen = WakeupBits::empty();
        for source in WakeupSource::iter() {
            let bit = source.bit();
            assert!(!seen.intersects(bit), "{source:?} shares a bit");
            seen |= bit;
        }
        assert_eq!(WakeupSource::iter().count(), NUM_WAKEUP_SOURCES);
    }

    #[test]
    fn supported_wakeups_are_a_strict_subset() {
        assert!(WakeupBits::all().contains(SUPPORTED_WAKEUPS));
        assert!(!SUPPORTED_WAKEUPS.contains(WakeupBits::GPIO3));
        assert!(!SUPPORTED_WAKEUPS.contains(WakeupBits::AC_WAKE_ACK));
    }

    #[test]
    fn only_register_managed_clocks_have_an_mgt_index() {
        assert_eq!(Clock::Sga.mgt_index(), Some(0));
        assert_eq!(Clock::Sva.mgt_index(), Some(NUM_REG_CLOCKS - 1));
        assert_eq!(Clock::Tim.mgt_index(), None);
        assert_eq!(Clock::PllSoc0.mgt_index(), None);
        assert_eq!(Clock::Sys.mgt_index(), None);
    }
}
