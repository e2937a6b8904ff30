// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![no_std]
#![no_main]
#![feature(abi_avr_interrupt)]
#![feature(asm_experimental_arch)]

mod debug;
mod display;
mod hw;
mod mutex;
mod ports;
mod usi_uart;

use crate::{
    display::display,
    hw::{Peripherals, interrupt, mcu},
    mutex::{main_ctx_with_init, unwrap_option},
    ports::{PORTB, PortB},
    usi_uart::{DP, Dp, RX, uart_begin},
};

fn wdt_init() {
    // SAFETY: The asm code only accesses the WDT registers
    //         which are not accessed from anywhere else in the program.
    unsafe {
        // Enable WDT with timeout 32.5 ms
        // WDTCR on ATtiny85, WDTCSR on ATtiny84. Same address and layout.
        core::arch::asm!(
            "ldi {tmp}, 0x10", // WDCE=1
            "out {WDTCR}, {tmp}",
            "ldi {tmp}, 0x19", // WDCE=1, WDE=1, WDP2=0, WDP1=0, WDP0=1
            "out {WDTCR}, {tmp}",
            tmp = out(reg_upper) _,
            WDTCR = const 0x21,
            options(nostack, preserves_flags)
        );
    }
}

fn wdt_poke(_wp: &mcu::WDT) {
    avr_device::asm::wdr();
}

#[avr_device::entry]
fn main() -> ! {
    wdt_init();

    let dp = unwrap_option(Peripherals::take());

    #[cfg(feature = "attiny84")]
    let pa = ports::PortA { PORTA: dp.PORTA };
    let pb = PortB { PORTB: dp.PORTB };
    let up = Dp {
        USI: dp.USI,
        TC0: dp.TC0,
        EXINT: dp.EXINT,
    };

    // SAFETY:
    // This is the context handle for the main() function.
    // Holding a reference to this object proves that the holder
    // is running in main() context.
    // Interrupts are still disabled at this point.
    let m = unsafe {
        main_ctx_with_init(|ctx| {
            #[cfg(feature = "attiny84")]
            ports::PORTA.init(ctx, pa);
            PORTB.init(ctx, pb);
            DP.init(ctx, up);
            #[cfg(feature = "attiny84")]
            ports::PORTA.setup(ctx);
            PORTB.setup(ctx);
            DP.setup(ctx);
        })
    };

    uart_begin(&m);

    // SAFETY: This must be after construction of MainCtx
    //         and after initialization of static MainInit variables.
    unsafe { interrupt::enable() };

    loop {
        while let Some(byte) = RX.read(&m) {
            display(&m, byte);
        }
        debug::check_errors(&m);
        wdt_poke(&dp.WDT);
    }
}

// vim: ts=4 sw=4 expandtab
