// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

#[cfg(all(feature = "attiny84", feature = "attiny85"))]
compile_error!("The features attiny84 and attiny85 are mutually exclusive.");
#[cfg(not(any(feature = "attiny84", feature = "attiny85")))]
compile_error!("Select the target chip with the feature attiny84 or attiny85.");

pub use attiny::{self as mcu, Peripherals};
#[cfg(feature = "attiny84")]
pub use avr_device::attiny84 as attiny;
#[cfg(feature = "attiny85")]
pub use avr_device::attiny85 as attiny;
pub use avr_device::interrupt;

use avr_usi_rx::IrqCtx;

macro_rules! define_isr {
    ($chip:ident, $name:ident, $handler:path) => {
        #[avr_device::interrupt($chip)]
        fn $name() {
            // SAFETY: We are inside of an interrupt handler.
            // Therefore, it is safe to construct an `IrqCtx`.
            let c = unsafe { IrqCtx::new() };
            $handler(&c);
        }
    };
}

#[cfg(feature = "attiny85")]
define_isr!(attiny85, PCINT0, crate::usi_uart::irq_handler_pcint);
#[cfg(feature = "attiny85")]
define_isr!(attiny85, USI_OVF, crate::usi_uart::irq_handler_usi_ovf);
#[cfg(feature = "attiny85")]
define_isr!(attiny85, TIMER0_COMPA, crate::usi_uart::irq_handler_timer0_compa);

// PCINT0 covers the port A pins, including the USI DI on PA6.
#[cfg(feature = "attiny84")]
define_isr!(attiny84, PCINT0, crate::usi_uart::irq_handler_pcint);
#[cfg(feature = "attiny84")]
define_isr!(attiny84, USI_OVF, crate::usi_uart::irq_handler_usi_ovf);
#[cfg(feature = "attiny84")]
define_isr!(attiny84, TIM0_COMPA, crate::usi_uart::irq_handler_timer0_compa);

// vim: ts=4 sw=4 expandtab
