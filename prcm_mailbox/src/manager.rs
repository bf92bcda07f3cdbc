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

//! The mailbox channel manager and its synchronous request dispatchers.

use std::{
    sync::{Arc, Mutex, Weak},
    time::Duration,
};

use log::error;
use spinning_top::Spinlock;

use crate::{
    error::Error,
    layout,
    message::{
        ApeOpp, ArmOpp, Clock, Epod, EpodState, Esram0State, Mb0Header, Mb1Header, Mb2Header,
        Mb3Header, Mb5Header, OnOffRet, Pll, PowerState, ReturnCode, SysClkState, WakeupBits,
        WakeupSource, DDR_PWR_STATE_UNCHANGED, NUM_EPODS, NUM_PLLS, NUM_REG_CLOCKS,
        NUM_WAKEUP_SOURCES, SUPPORTED_WAKEUPS,
    },
    sync::{poll_until, Completion, WorkQueue},
    Config, PrcmHardware, PrcmRegister, CLK_MGT_CLKEN, CLK_MGT_CLKPLLSW_MASK, PRCM_SEM_BIT,
    TCR_DOZE_MODE, TCR_STOP_TIMERS, TCR_TENSEL_MASK,
};

/// Deadline for clock, PLL, power-domain and operating-point requests. These
/// are expected to be fast register pokes on the firmware side.
pub const CLOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Deadline for system reference clock requests. Enabling the clock can
/// involve waiting for an external oscillator to stabilize.
pub const SYSCLK_TIMEOUT: Duration = Duration::from_secs(20);

/// State needed for mailbox 0 communication.
///
/// Mailbox 0 is also touched from interrupt context, so its transaction lock
/// is a spinlock and none of its requests wait on a completion.
pub(crate) struct Mb0Transfer {
    /// The transaction lock, guarding the staged request data with it.
    pub(crate) lock: Spinlock<Mb0Request>,
    /// The wakeup bits controlled by the virtual interrupt controller's
    /// mask/unmask operations. Separate from the transaction lock so that
    /// masking never has to wait out a mailbox transaction.
    pub(crate) dbb_irqs: Spinlock<WakeupBits>,
}

/// Request data for mailbox 0 that persists between requests.
pub(crate) struct Mb0Request {
    pub(crate) dbb_wakeups: WakeupBits,
    pub(crate) abb_events: u32,
    /// Last pushed event bitmasks, used to suppress no-op configuration
    /// requests.
    pub(crate) last_dbb_events: WakeupBits,
    pub(crate) last_abb_events: u32,
}

/// State needed for mailbox 1 (operating point) communication.
pub(crate) struct Mb1Transfer {
    pub(crate) lock: Mutex<Mb1Request>,
    pub(crate) work: Completion,
    pub(crate) ack: Spinlock<Mb1Ack>,
}

pub(crate) struct Mb1Request {
    pub(crate) arm_opp: u8,
    pub(crate) ape_opp: u8,
}

#[derive(Default)]
pub(crate) struct Mb1Ack {
    pub(crate) header: u8,
    pub(crate) current_arm_opp: u8,
    pub(crate) current_ape_opp: u8,
    pub(crate) arm_voltage_status: u8,
    pub(crate) ape_voltage_status: u8,
}

/// State needed for mailbox 2 (power domain, clock and PLL) communication.
pub(crate) struct Mb2Transfer {
    pub(crate) lock: Mutex<Mb2Request>,
    pub(crate) work: Completion,
    pub(crate) ack: Spinlock<Mb2Ack>,
}

/// Request data that needs to persist between mailbox 2 requests, so the
/// acknowledge handler knows which resource the echoed status refers to.
pub(crate) struct Mb2Request {
    pub(crate) epod_state: [u8; NUM_EPODS],
    pub(crate) pll_state: [u8; NUM_PLLS],
}

#[derive(Default)]
pub(crate) struct Mb2Ack {
    pub(crate) header: u8,
    pub(crate) status: u8,
}

/// State needed for mailbox 3 (system reference clock) communication.
pub(crate) struct Mb3Transfer {
    pub(crate) sysclk_lock: Mutex<Mb3Request>,
    pub(crate) sysclk_work: Completion,
    pub(crate) ack: Spinlock<Mb3Ack>,
}

pub(crate) struct Mb3Request {
    pub(crate) state: u8,
}

#[derive(Default)]
pub(crate) struct Mb3Ack {
    pub(crate) header: u8,
    pub(crate) status: u8,
}

/// State needed for mailbox 5 (ABB I2C) communication.
pub(crate) struct Mb5Transfer {
    pub(crate) lock: Mutex<()>,
    pub(crate) work: Completion,
    pub(crate) ack: Spinlock<Mb5Ack>,
}

#[derive(Default)]
pub(crate) struct Mb5Ack {
    pub(crate) header: u8,
    pub(crate) status: u8,
    pub(crate) value: [u8; layout::ABB_I2C_MAX_SIZE],
}

/// Cached state of one register-managed clock.
#[derive(Default, Clone, Copy)]
pub(crate) struct ClkMgt {
    /// PLL multiplexer selection saved when the clock is disabled, restored
    /// on the next enable.
    pub(crate) pllsw: u32,
}

pub(crate) type WakeupHandler = Arc<dyn Fn(WakeupSource) + Send + Sync + 'static>;

/// The mailbox channel manager.
///
/// One instance exists per system; it owns the transaction state of all
/// eight mailboxes and is shared behind an [`Arc`] between caller threads,
/// the interrupt entry points and the deferred wakeup-mask worker.
pub struct Prcmu<H: PrcmHardware> {
    pub(crate) hw: H,
    pub(crate) mb0: Mb0Transfer,
    pub(crate) mb1: Mb1Transfer,
    pub(crate) mb2: Mb2Transfer,
    pub(crate) mb3: Mb3Transfer,
    pub(crate) mb5: Mb5Transfer,
    pub(crate) clk_mgt: Spinlock<[ClkMgt; NUM_REG_CLOCKS]>,
    pub(crate) wakeup_handlers: Mutex<[Option<WakeupHandler>; NUM_WAKEUP_SOURCES]>,
    pub(crate) mask_work: WorkQueue,
}

impl<H: PrcmHardware> Prcmu<H> {
    pub fn new(hw: H) -> Arc<Self> {
        Self::with_config(hw, Config::default())
    }

    pub fn with_config(hw: H, config: Config) -> Arc<Self> {
        Arc::new_cyclic(|prcmu: &Weak<Self>| {
            let worker = prcmu.clone();
            Self {
                hw,
                mb0: Mb0Transfer {
                    lock: Spinlock::new(Mb0Request {
                        dbb_wakeups: WakeupBits::empty(),
                        abb_events: 0,
                        last_dbb_events: WakeupBits::empty(),
                        last_abb_events: 0,
                    }),
                    dbb_irqs: Spinlock::new(WakeupBits::empty()),
                },
                mb1: Mb1Transfer {
                    lock: Mutex::new(Mb1Request { arm_opp: 0, ape_opp: 0 }),
                    work: Completion::new(),
                    ack: Spinlock::new(Mb1Ack::default()),
                },
                mb2: Mb2Transfer {
                    lock: Mutex::new(Mb2Request {
                        epod_state: [0; NUM_EPODS],
                        pll_state: [0; NUM_PLLS],
                    }),
                    work: Completion::new(),
                    ack: Spinlock::new(Mb2Ack::default()),
                },
                mb3: Mb3Transfer {
                    sysclk_lock: Mutex::new(Mb3Request { state: SysClkState::Off as u8 }),
                    sysclk_work: Completion::new(),
                    ack: Spinlock::new(Mb3Ack::default()),
                },
                mb5: Mb5Transfer {
                    lock: Mutex::new(()),
                    work: Completion::new(),
                    ack: Spinlock::new(Mb5Ack::default()),
                },
                clk_mgt: Spinlock::new([ClkMgt::default(); NUM_REG_CLOCKS]),
                wakeup_handlers: Mutex::new(std::array::from_fn(|_| None)),
                mask_work: WorkQueue::new(config.wakeup_work, move || {
                    if let Some(prcmu) = worker.upgrade() {
                        prcmu.wakeup_mask_work();
                    }
                }),
            }
        })
    }

    /// Busy-waits until the firmware has consumed any previous request on
    /// `mailbox`, so the request region can be rewritten.
    pub(crate) fn wait_for_request_slot(&self, mailbox: u8) {
        poll_until(|| self.hw.request_pending() & layout::mailbox_bit(mailbox) == 0);
    }

    /// Requests `clock` to be enabled or disabled.
    ///
    /// This entry point should only be used by the clock implementation.
    pub fn request_clock(&self, clock: Clock, enable: bool) -> Result<(), Error> {
        match clock {
            Clock::Tim => {
                self.request_timclk(enable);
                Ok(())
            }
            Clock::PllSoc0 => self.request_pll(Pll::Soc0, enable),
            Clock::PllSoc1 => self.request_pll(Pll::Soc1, enable),
            Clock::PllDdr => self.request_pll(Pll::Ddr, enable),
            Clock::Sys => self.request_sysclk(enable),
            _ => self.request_reg_clock(clock, enable),
        }
    }

    fn request_timclk(&self, enable: bool) {
        let mut val = TCR_DOZE_MODE | TCR_TENSEL_MASK;
        if !enable {
            val |= TCR_STOP_TIMERS;
        }
        self.hw.register_write(PrcmRegister::Tcr, val);
    }

    fn request_reg_clock(&self, clock: Clock, enable: bool) -> Result<(), Error> {
        let Some(index) = clock.mgt_index() else {
            return Err(Error::InvalidArgument("clock is not register-managed"));
        };

        let mut clk_mgt = self.clk_mgt.lock();

        // Grab the hardware semaphore.
        poll_until(|| self.hw.register_read(PrcmRegister::Sem) & PRCM_SEM_BIT == 0);

        let register = PrcmRegister::ClkMgt(clock);
        let mut val = self.hw.register_read(register);
        if enable {
            val |= CLK_MGT_CLKEN | clk_mgt[index].pllsw;
        } else {
            clk_mgt[index].pllsw = val & CLK_MGT_CLKPLLSW_MASK;
            val &= !(CLK_MGT_CLKEN | CLK_MGT_CLKPLLSW_MASK);
        }
        self.hw.register_write(register, val);

        // Release the hardware semaphore.
        self.hw.register_write(PrcmRegister::Sem, 0);

        Ok(())
    }

    /// Requests `pll` to be enabled or disabled via mailbox 2.
    ///
    /// This entry point should only be used by the clock implementation.
    pub fn request_pll(&self, pll: Pll, enable: bool) -> Result<(), Error> {
        let mut req = self.mb2.lock.lock().unwrap();

        self.wait_for_request_slot(2);
        self.mb2.work.reset();

        req.pll_state[pll as usize] = enable as u8;
        self.hw.tcdm_write_u8(layout::REQ_MB2_PLL_CLIENT, pll as u8);
        self.hw.tcdm_write_u8(layout::REQ_MB2_PLL_STATE, req.pll_state[pll as usize]);
        self.hw.tcdm_write_u8(layout::request_header(2), Mb2Header::PllRequest as u8);
        self.hw.raise_request(2);

        if !self.mb2.work.wait_timeout(CLOCK_TIMEOUT) {
            error!("pll request timed out waiting for a reply, check the firmware version");
            return Err(Error::Timeout { mailbox: 2 });
        }

        let ack = self.mb2.ack.lock();
        if ack.header != Mb2Header::PllRequest as u8 {
            return Err(Error::Protocol { mailbox: 2, header: ack.header });
        }
        if ack.status != ReturnCode::Success as u8 {
            return Err(Error::RequestFailed { status: ack.status });
        }
        Ok(())
    }

    /// Requests power domain `epod` to change state via mailbox 2.
    pub fn set_epod(&self, epod: Epod, state: EpodState) -> Result<(), Error> {
        let mut req = self.mb2.lock.lock().unwrap();

        self.wait_for_request_slot(2);
        self.mb2.work.reset();

        req.epod_state[epod as usize] = state as u8;
        self.hw.tcdm_write_u8(layout::REQ_MB2_EPOD_CLIENT, epod as u8);
        self.hw.tcdm_write_u8(layout::REQ_MB2_EPOD_STATE, req.epod_state[epod as usize]);
        self.hw.tcdm_write_u8(layout::request_header(2), Mb2Header::EpodRequest as u8);
        self.hw.raise_request(2);

        if !self.mb2.work.wait_timeout(CLOCK_TIMEOUT) {
            error!("epod request timed out waiting for a reply, check the firmware version");
            return Err(Error::Timeout { mailbox: 2 });
        }

        let ack = self.mb2.ack.lock();
        if ack.header != Mb2Header::EpodRequest as u8 {
            return Err(Error::Protocol { mailbox: 2, header: ack.header });
        }
        if ack.status != ReturnCode::Success as u8 {
            return Err(Error::RequestFailed { status: ack.status });
        }
        Ok(())
    }

    fn request_sysclk(&self, enable: bool) -> Result<(), Error> {
        let mut req = self.mb3.sysclk_lock.lock().unwrap();

        self.wait_for_request_slot(3);
        self.mb3.sysclk_work.reset();

        req.state = (if enable { SysClkState::On } else { SysClkState::Off }) as u8;
        self.hw.tcdm_write_u8(layout::REQ_MB3_REFCLK_MGT, req.state);
        self.hw.tcdm_write_u8(layout::request_header(3), Mb3Header::RefClkRequest as u8);
        self.hw.raise_request(3);

        // The firmware only sends an acknowledge if the clock is being
        // enabled and the request succeeds.
        if !self.mb3.sysclk_work.wait_timeout(SYSCLK_TIMEOUT) {
            error!("sysclk request timed out (20 s) waiting for a reply");
            return Err(Error::Timeout { mailbox: 3 });
        }

        let ack = self.mb3.ack.lock();
        if ack.header != Mb3Header::RefClkRequest as u8 {
            return Err(Error::Protocol { mailbox: 3, header: ack.header });
        }
        if ack.status != req.state {
            return Err(Error::RequestFailed { status: ack.status });
        }
        Ok(())
    }

    /// Requests the ARM operating point via mailbox 1.
    pub fn set_arm_opp(&self, opp: ArmOpp) -> Result<(), Error> {
        let mut req = self.mb1.lock.lock().unwrap();

        self.wait_for_request_slot(1);
        self.mb1.work.reset();

        req.arm_opp = opp as u8;
        self.hw.tcdm_write_u8(layout::REQ_MB1_ARM_OPP, req.arm_opp);
        self.hw.tcdm_write_u8(layout::request_header(1), Mb1Header::ArmOpp as u8);
        self.hw.raise_request(1);

        if !self.mb1.work.wait_timeout(CLOCK_TIMEOUT) {
            error!("arm opp request timed out waiting for a reply");
            return Err(Error::Timeout { mailbox: 1 });
        }

        let ack = self.mb1.ack.lock();
        if ack.header != Mb1Header::ArmOpp as u8 {
            return Err(Error::Protocol { mailbox: 1, header: ack.header });
        }
        if ack.current_arm_opp != opp as u8 {
            return Err(Error::RequestFailed { status: ack.arm_voltage_status });
        }
        Ok(())
    }

    /// Requests ARM and APE operating points in one mailbox 1 transaction.
    pub fn set_arm_ape_opp(&self, arm: ArmOpp, ape: ApeOpp) -> Result<(), Error> {
        let mut req = self.mb1.lock.lock().unwrap();

        self.wait_for_request_slot(1);
        self.mb1.work.reset();

        req.arm_opp = arm as u8;
        req.ape_opp = ape as u8;
        self.hw.tcdm_write_u8(layout::REQ_MB1_ARM_OPP, req.arm_opp);
        self.hw.tcdm_write_u8(layout::REQ_MB1_APE_OPP, req.ape_opp);
        self.hw.tcdm_write_u8(layout::request_header(1), Mb1Header::ArmApeOpp as u8);
        self.hw.raise_request(1);

        if !self.mb1.work.wait_timeout(CLOCK_TIMEOUT) {
            error!("arm/ape opp request timed out waiting for a reply");
            return Err(Error::Timeout { mailbox: 1 });
        }

        let ack = self.mb1.ack.lock();
        if ack.header != Mb1Header::ArmApeOpp as u8 {
            return Err(Error::Protocol { mailbox: 1, header: ack.header });
        }
        if ack.current_ape_opp != ape as u8 {
            return Err(Error::RequestFailed { status: ack.ape_voltage_status });
        }
        Ok(())
    }

    /// Requests a transition to the given AP power state.
    ///
    /// The firmware does not acknowledge power-state transition requests;
    /// the request is staged and raised under the mailbox 0 spinlock and the
    /// call returns immediately.
    pub fn set_power_state(
        &self,
        state: PowerState,
        keep_ulp_clk: bool,
        keep_ap_pll: bool,
    ) -> Result<(), Error> {
        let _req = self.mb0.lock.lock();

        self.wait_for_request_slot(0);

        self.hw.tcdm_write_u8(layout::REQ_MB0_AP_POWER_STATE, state as u8);
        if state == PowerState::Idle {
            // Leaving the DDR state unchanged can be high latency.
            self.hw.tcdm_write_u8(layout::REQ_MB0_DDR_STATE, DDR_PWR_STATE_UNCHANGED);
        }
        self.hw.tcdm_write_u8(layout::REQ_MB0_AP_PLL_STATE, keep_ap_pll as u8);
        self.hw.tcdm_write_u8(layout::REQ_MB0_ULP_CLOCK_STATE, keep_ulp_clk as u8);
        self.hw.tcdm_write_u8(layout::request_header(0), Mb0Header::PowerStateTrans as u8);
        self.hw.raise_request(0);

        Ok(())
    }

    /// Configures the deep-sleep state of the ESRAM0 bank.
    ///
    /// Only stages the request field; the value is consumed by the firmware
    /// together with the next power-state transition request.
    pub fn config_esram0_deep_sleep(&self, state: Esram0State) {
        let _req = self.mb0.lock.lock();

        self.wait_for_request_slot(0);

        let val = match state {
            Esram0State::Ret => OnOffRet::Ret,
            Esram0State::Off => OnOffRet::Off,
        };
        self.hw.tcdm_write_u8(layout::REQ_MB0_ESRAM0_STATE, val as u8);
    }

    /// Enables the given wakeup sources.
    ///
    /// Fire-and-forget: the combined wakeup bitmask is pushed to the
    /// firmware only if it changed since the last push, and the firmware
    /// does not acknowledge configuration writes.
    pub fn enable_wakeups(&self, wakeups: WakeupBits) -> Result<(), Error> {
        if !SUPPORTED_WAKEUPS.contains(wakeups) {
            return Err(Error::InvalidArgument("unsupported wakeup source"));
        }

        let mut req = self.mb0.lock.lock();
        req.dbb_wakeups = wakeups;
        self.config_wakeups(&mut req);
        Ok(())
    }

    /// Configures which ABB events the firmware includes in wakeup
    /// snapshots. Fire-and-forget, de-duplicated like [`Self::enable_wakeups`].
    pub fn config_abb_event_readout(&self, abb_events: u32) {
        let mut req = self.mb0.lock.lock();
        req.abb_events = abb_events;
        self.config_wakeups(&mut req);
    }

    /// Copies the active ABB event snapshot out of the acknowledge region.
    /// The firmware double-buffers the snapshot and publishes the active
    /// copy through the read pointer byte.
    pub fn read_abb_events(&self, buf: &mut [u8; layout::ABB_EVENT_BYTES]) {
        let base = if self.hw.tcdm_read_u8(layout::ACK_MB0_READ_POINTER) & 1 != 0 {
            layout::ACK_MB0_WAKEUP_1_ABB
        } else {
            layout::ACK_MB0_WAKEUP_0_ABB
        };
        for (i, byte) in buf.iter_mut().enumerate() {
            *byte = self.hw.tcdm_read_u8(base + i);
        }
    }

    /// Reads `value.len()` ABB registers starting at `reg` on I2C slave
    /// `slave`. The transfer size must be 1 to 4 registers.
    pub fn abb_read(&self, slave: u8, reg: u8, value: &mut [u8]) -> Result<(), Error> {
        if value.is_empty() || value.len() > layout::ABB_I2C_MAX_SIZE {
            return Err(Error::InvalidArgument("ABB transfer size must be 1 to 4"));
        }

        let _guard = self.mb5.lock.lock().unwrap();

        self.wait_for_request_slot(5);
        self.mb5.work.reset();

        self.hw.tcdm_write_u8(layout::REQ_MB5_I2C_SLAVE, slave);
        self.hw.tcdm_write_u8(layout::REQ_MB5_I2C_REG, reg);
        self.hw.tcdm_write_u8(layout::REQ_MB5_I2C_SIZE, value.len() as u8);
        self.hw.tcdm_write_u8(layout::request_header(5), Mb5Header::I2cRead as u8);
        self.hw.raise_request(5);

        // ABB transfers are rare configuration-time operations and a stuck
        // transfer is fatal regardless of any deadline, so wait without one.
        self.mb5.work.wait();

        let ack = self.mb5.ack.lock();
        if ack.header != Mb5Header::I2cRead as u8 {
            return Err(Error::Protocol { mailbox: 5, header: ack.header });
        }
        if ack.status != ReturnCode::Success as u8 {
            return Err(Error::RequestFailed { status: ack.status });
        }
        value.copy_from_slice(&ack.value[..value.len()]);
        Ok(())
    }

    /// Writes `value` to ABB registers starting at `reg` on I2C slave
    /// `slave`. The transfer size must be 1 to 4 registers.
    pub fn abb_write(&self, slave: u8, reg: u8, value: &[u8]) -> Result<(), Error> {
        if value.is_empty() || value.len() > layout::ABB_I2C_MAX_SIZE {
            return Err(Error::InvalidArgument("ABB transfer size must be 1 to 4"));
        }

        let _guard = self.mb5.lock.lock().unwrap();

        self.wait_for_request_slot(5);
        self.mb5.work.reset();

        self.hw.tcdm_write_u8(layout::REQ_MB5_I2C_SLAVE, slave);
        self.hw.tcdm_write_u8(layout::REQ_MB5_I2C_REG, reg);
        self.hw.tcdm_write_u8(layout::REQ_MB5_I2C_SIZE, value.len() as u8);
        for (i, byte) in value.iter().enumerate() {
            self.hw.tcdm_write_u8(layout::REQ_MB5_I2C_DATA + i, *byte);
        }
        self.hw.tcdm_write_u8(layout::request_header(5), Mb5Header::I2cWrite as u8);
        self.hw.raise_request(5);

        self.mb5.work.wait();

        let ack = self.mb5.ack.lock();
        if ack.header != Mb5Header::I2cWrite as u8 {
            return Err(Error::Protocol { mailbox: 5, header: ack.header });
        }
        if ack.status != ReturnCode::Success as u8 {
            return Err(Error::RequestFailed { status: ack.status });
        }
        Ok(())
    }
}
