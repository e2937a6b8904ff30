// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::timing::BitTiming;

/// The peripherals used by the receiver.
///
/// - The data input pin (USI DI) with its pin change interrupt.
/// - Timer/Counter0 in CTC mode with the compare match A interrupt.
/// - The USI, clocked by Timer/Counter0 compare match.
///
/// All methods are called from interrupt context or from within
/// a critical section. Implementations must not block.
pub trait RxPeripherals {
    /// Current level of the data input pin.
    fn line_is_high(&self) -> bool;

    /// Clear a pending pin change interrupt flag and enable the
    /// pin change interrupt.
    fn pin_change_irq_enable(&self);

    /// Disable the pin change interrupt.
    fn pin_change_irq_disable(&self);

    /// Start the timer in CTC mode.
    ///
    /// The compare value, the prescaler and the initial counter value
    /// are taken from `timing`.
    /// The prescaler is reset, so that the first timer tick comes
    /// one full prescaler period after this call.
    /// The compare match interrupt stays disabled.
    fn timer_start(&self, timing: &BitTiming);

    /// Clear a pending compare match flag and enable the compare match interrupt.
    fn timer_compare_irq_enable(&self);

    /// Stop the timer and disable the compare match interrupt.
    fn timer_stop(&self);

    /// Enable the USI with the timer compare match as clock source
    /// and with the counter overflow interrupt enabled.
    ///
    /// The 4 bit counter is preset, so that it overflows after `nr_bits` clocks.
    fn usi_start(&self, nr_bits: u8);

    /// Disable the USI and its overflow interrupt.
    /// Clear a pending overflow flag.
    fn usi_stop(&self);

    /// Read the USI buffer register.
    /// It holds the shift register content latched at the last overflow.
    fn usi_buffer(&self) -> u8;
}

// vim: ts=4 sw=4 expandtab
