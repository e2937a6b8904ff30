// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{
    mutex::MutexCell,
    ports::{PB_LED_ERR, PORTB},
    usi_uart::RX,
};
use avr_usi_rx::{MainCtx, RxStats};

#[cfg(feature = "debug")]
use crate::ports::PB_DEBUG;

static LAST_STATS: MutexCell<RxStats> = MutexCell::new(RxStats::new());

/// Mark the start of an interrupt handler on the debug pin.
#[inline(always)]
pub fn trace_begin() {
    #[cfg(feature = "debug")]
    PORTB.set(PB_DEBUG, true);
}

#[inline(always)]
pub fn trace_end() {
    #[cfg(feature = "debug")]
    PORTB.set(PB_DEBUG, false);
}

/// Switch the error LED on, if the receiver dropped or rejected
/// anything since the last call.
pub fn check_errors(m: &MainCtx) {
    let stats = RX.stats(m);
    let last = LAST_STATS.get(m);
    LAST_STATS.set(m, stats);

    let overflow = RX.overflow(m);
    if overflow
        || stats.framing_errors != last.framing_errors
        || stats.breaks != last.breaks
        || stats.unexpected_irqs != last.unexpected_irqs
    {
        PORTB.set(PB_LED_ERR, true);
    }
}

/// A good byte arrived. Release the error LED.
pub fn clear_error(_m: &MainCtx) {
    PORTB.set(PB_LED_ERR, false);
}

// vim: ts=4 sw=4 expandtab
