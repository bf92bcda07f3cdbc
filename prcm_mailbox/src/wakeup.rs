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

//! The virtual wakeup interrupt controller.
//!
//! Each firmware wakeup event bit backs one virtual interrupt line. Lines
//! start masked; mask and unmask mutate a bitmask under its own spinlock and
//! schedule a coalescing work item that recomputes the combined event
//! bitmask and pushes it to the firmware only if it actually changed since
//! the last push. Masking call sites therefore never wait out a mailbox
//! transaction, and back-to-back mask changes that cancel out generate no
//! mailbox traffic at all.

use log::debug;
use std::sync::Arc;
use strum::IntoEnumIterator;

use crate::{
    layout,
    manager::Mb0Request,
    message::{Mb0Header, WakeupBits, WakeupSource},
    PrcmHardware, Prcmu,
};

impl<H: PrcmHardware> Prcmu<H> {
    /// Registers `handler` to be invoked, from the interrupt top half, when
    /// the wakeup event for `source` fires while the line is unmasked.
    /// Replaces any previous handler for the line.
    pub fn register_wakeup_handler(
        &self,
        source: WakeupSource,
        handler: impl Fn(WakeupSource) + Send + Sync + 'static,
    ) {
        self.wakeup_handlers.lock().unwrap()[source as usize] = Some(Arc::new(handler));
    }

    /// Removes the handler for `source`, if any.
    pub fn unregister_wakeup_handler(&self, source: WakeupSource) {
        self.wakeup_handlers.lock().unwrap()[source as usize] = None;
    }

    /// Unmasks the virtual interrupt line for `source`.
    pub fn unmask_wakeup(&self, source: WakeupSource) {
        {
            let mut dbb_irqs = self.mb0.dbb_irqs.lock();
            dbb_irqs.insert(source.bit());
        }
        self.mask_work.schedule();
    }

    /// Masks the virtual interrupt line for `source`.
    pub fn mask_wakeup(&self, source: WakeupSource) {
        {
            let mut dbb_irqs = self.mb0.dbb_irqs.lock();
            dbb_irqs.remove(source.bit());
        }
        self.mask_work.schedule();
    }

    /// Disables the virtual interrupt line for `source`. Identical to
    /// masking it.
    pub fn disable_wakeup(&self, source: WakeupSource) {
        self.mask_wakeup(source);
    }

    /// Drains any scheduled wakeup-mask push: waits for the worker in
    /// threaded mode, runs it inline in manual mode.
    pub fn flush_wakeup_work(&self) {
        self.mask_work.flush();
    }

    /// The deferred wakeup-mask job.
    pub(crate) fn wakeup_mask_work(&self) {
        let mut req = self.mb0.lock.lock();
        self.config_wakeups(&mut req);
    }

    /// Pushes the combined wakeup configuration to the firmware if it
    /// changed since the last push. The firmware does not acknowledge
    /// configuration writes, so this does not wait on a completion; the
    /// pending-bit poll alone keeps the request region safe to rewrite.
    ///
    /// Must only be called with the mailbox 0 transaction lock held, which
    /// the `&mut Mb0Request` borrow enforces.
    pub(crate) fn config_wakeups(&self, req: &mut Mb0Request) {
        let dbb_events = *self.mb0.dbb_irqs.lock() | req.dbb_wakeups;
        let abb_events = req.abb_events;

        if dbb_events == req.last_dbb_events && abb_events == req.last_abb_events {
            return;
        }

        self.wait_for_request_slot(0);

        self.hw.tcdm_write_u32(layout::REQ_MB0_WAKEUP_DBB, dbb_events.bits());
        self.hw.tcdm_write_u32(layout::REQ_MB0_WAKEUP_ABB, abb_events);
        self.hw.tcdm_write_u8(layout::request_header(0), Mb0Header::WakeUpConfig as u8);
        self.hw.raise_request(0);

        req.last_dbb_events = dbb_events;
        req.last_abb_events = abb_events;
    }

    /// Dispatches one virtual interrupt per configured source present in
    /// `events`. Runs in the interrupt top half; handlers must not block.
    pub(crate) fn dispatch_wakeup_events(&self, events: WakeupBits) {
        for source in WakeupSource::iter() {
            if !events.intersects(source.bit()) {
                continue;
            }
            // Clone the handler out of the table so a handler can
            // re-register without deadlocking against the dispatch.
            let handler = self.wakeup_handlers.lock().unwrap()[source as usize].clone();
            match handler {
                Some(handler) => handler(source),
                None => debug!("wakeup event {source:?} has no handler"),
            }
        }
    }
}
