// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{
    debug,
    ports::{PB_LED_ACT, PORTB},
};
use avr_usi_rx::MainCtx;

/// Consume one received byte.
pub fn display(m: &MainCtx, _byte: u8) {
    PORTB.set(PB_LED_ACT, !PORTB.get_out(PB_LED_ACT));
    debug::clear_error(m);
}

// vim: ts=4 sw=4 expandtab
