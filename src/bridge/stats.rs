// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bridge counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of the bridge counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct BridgeStats {
    /// Messages pulled from the transport.
    pub received: u64,
    /// Uplinks that changed device state.
    pub applied: u64,
    /// Uplinks that decoded but changed nothing (unknown type, repeated LED
    /// status).
    pub ignored: u64,
    /// Uplinks skipped because they could not be decoded.
    pub decode_errors: u64,
    /// Messages on topics other than the device uplink.
    pub raw: u64,
    /// Times the link to the broker was lost.
    pub link_losses: u64,
}

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    received: AtomicU64,
    applied: AtomicU64,
    ignored: AtomicU64,
    decode_errors: AtomicU64,
    raw: AtomicU64,
    link_losses: AtomicU64,
}

impl StatsCounters {
    pub(crate) fn received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn raw(&self) {
        self.raw.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn link_lost(&self) {
        self.link_losses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            received: self.received.load(Ordering::Relaxed),
            applied: self.applied.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            raw: self.raw.load(Ordering::Relaxed),
            link_losses: self.link_losses.load(Ordering::Relaxed),
        }
    }
}
