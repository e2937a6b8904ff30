// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::{
    debug,
    hw::mcu,
    mutex::{LazyMainInit, MainInitCtx},
    ports::{UART_DI_BIT, uart_di_is_high},
};
use avr_usi_rx::{BitTiming, IrqCtx, MainCtx, Prescaler, Receiver, RxPeripherals};

pub const F_CPU: u32 = 8_000_000;
pub const BAUD: u32 = 9_600;
pub const RX_QUEUE_SIZE: usize = 32;
pub const DI_BIT: usize = UART_DI_BIT;

const TIMING: BitTiming = match BitTiming::new(F_CPU, BAUD) {
    Ok(timing) => timing,
    Err(_) => panic!("F_CPU/BAUD combination can not be received"),
};

pub static RX: Receiver<RX_QUEUE_SIZE> = Receiver::new(TIMING);

/// GIMSK.PCIE and GIFR.PCIF of the pin change interrupt that covers DI.
#[cfg(feature = "attiny85")]
const PCIE: u8 = 1 << 5;
#[cfg(feature = "attiny84")]
const PCIE: u8 = 1 << 4;

/// TCCR0A.WGM01: CTC mode.
const WGM01: u8 = 1 << 1;

/// GTCCR I/O address. PSR0 (PSR10 on ATtiny84) is bit 0 on both chips.
#[cfg(feature = "attiny85")]
const GTCCR: u8 = 0x2C;
#[cfg(feature = "attiny84")]
const GTCCR: u8 = 0x23;

#[cfg(feature = "attiny85")]
macro_rules! timsk {
    ($tc:expr) => {
        $tc.timsk()
    };
}
#[cfg(feature = "attiny84")]
macro_rules! timsk {
    ($tc:expr) => {
        $tc.timsk0()
    };
}

#[cfg(feature = "attiny85")]
macro_rules! tifr {
    ($tc:expr) => {
        $tc.tifr()
    };
}
#[cfg(feature = "attiny84")]
macro_rules! tifr {
    ($tc:expr) => {
        $tc.tifr0()
    };
}

#[cfg(feature = "attiny85")]
macro_rules! pcmsk {
    ($exint:expr) => {
        $exint.pcmsk()
    };
}
#[cfg(feature = "attiny84")]
macro_rules! pcmsk {
    ($exint:expr) => {
        $exint.pcmsk0()
    };
}

/// Reset the Timer/Counter0 prescaler.
#[inline(always)]
fn prescaler_reset() {
    // SAFETY: The asm code only writes GTCCR.
    //         Timer/Counter1 is not used, so its bits in GTCCR may be cleared.
    unsafe {
        core::arch::asm!(
            "ldi {tmp}, 0x01", // PSR0=1, TSM=0
            "out {GTCCR}, {tmp}",
            tmp = out(reg_upper) _,
            GTCCR = const GTCCR,
            options(nostack, preserves_flags)
        );
    }
}

#[allow(non_snake_case)]
pub struct Dp {
    pub USI: mcu::USI,
    pub TC0: mcu::TC0,
    pub EXINT: mcu::EXINT,
}

// SAFETY: Is initialized when constructing the MainCtx.
pub static DP: LazyMainInit<Dp> = unsafe { LazyMainInit::uninit() };

impl Dp {
    pub fn setup(&self, _: &MainInitCtx) {
        self.USI.usicr().write(|w| w);
        self.TC0.tccr0b().write(|w| w.cs0().no_clock());
        timsk!(self.TC0).write(|w| w);
        // SAFETY: Only the DI pin may trigger the pin change interrupt.
        pcmsk!(self.EXINT).write(|w| unsafe { w.bits(1 << DI_BIT) });
    }
}

#[rustfmt::skip]
impl RxPeripherals for Dp {
    #[inline(always)]
    fn line_is_high(&self) -> bool {
        uart_di_is_high()
    }

    #[inline(always)]
    fn pin_change_irq_enable(&self) {
        // SAFETY: Writing a one clears the flag. The other flags are not used.
        self.EXINT.gifr().write(|w| unsafe { w.bits(PCIE) });
        // SAFETY: Only the DI pin change interrupt enable is touched.
        self.EXINT.gimsk().modify(|r, w| unsafe { w.bits(r.bits() | PCIE) });
    }

    #[inline(always)]
    fn pin_change_irq_disable(&self) {
        // SAFETY: Only the DI pin change interrupt enable is touched.
        self.EXINT.gimsk().modify(|r, w| unsafe { w.bits(r.bits() & !PCIE) });
    }

    #[inline(always)]
    fn timer_start(&self, timing: &BitTiming) {
        // SAFETY: CTC mode. The OC0A/OC0B pins stay disconnected.
        self.TC0.tccr0a().write(|w| unsafe { w.bits(WGM01) });
        self.TC0.ocr0a().write(|w| w.set(timing.ocr));
        self.TC0.tcnt0().write(|w| w.set(timing.tcnt_start));
        self.TC0.tccr0b().write(|w| match timing.prescaler {
            Prescaler::Div1 => w.cs0().direct(),
            Prescaler::Div8 => w.cs0().prescale_8(),
            Prescaler::Div64 => w.cs0().prescale_64(),
            Prescaler::Div256 => w.cs0().prescale_256(),
            Prescaler::Div1024 => w.cs0().prescale_1024(),
        });
        // The first tick shall be one full prescaler period from now.
        prescaler_reset();
    }

    #[inline(always)]
    fn timer_compare_irq_enable(&self) {
        tifr!(self.TC0).write(|w| w.ocf0a().set_bit());
        timsk!(self.TC0).modify(|_, w| w.ocie0a().set_bit());
    }

    #[inline(always)]
    fn timer_stop(&self) {
        self.TC0.tccr0a().write(|w| w);
        self.TC0.tccr0b().write(|w| w.cs0().no_clock());
        timsk!(self.TC0).modify(|_, w| w.ocie0a().clear_bit());
    }

    #[inline(always)]
    fn usi_start(&self, nr_bits: u8) {
        self.USI.usisr().write(|w| {
            w.usicnt().set(16 - nr_bits)
             .usioif().set_bit()
        });
        self.USI.usicr().write(|w| {
            w.usioie().set_bit()
             .usiwm().disabled()
             .usics().tc0()
        });
    }

    #[inline(always)]
    fn usi_stop(&self) {
        self.USI.usicr().write(|w| w);
        self.USI.usisr().write(|w| w.usioif().set_bit());
    }

    #[inline(always)]
    fn usi_buffer(&self) -> u8 {
        self.USI.usibr().read().bits()
    }
}

// Errors returned by the receiver are counted in its statistics.
// The main loop reports them.

pub fn irq_handler_pcint(c: &IrqCtx) {
    debug::trace_begin();
    let _ = RX.irq_pin_change(c, &*DP);
    debug::trace_end();
}

pub fn irq_handler_usi_ovf(c: &IrqCtx) {
    debug::trace_begin();
    let _ = RX.irq_usi_overflow(c, &*DP);
    debug::trace_end();
}

pub fn irq_handler_timer0_compa(c: &IrqCtx) {
    debug::trace_begin();
    let _ = RX.irq_timer_compare(c, &*DP);
    debug::trace_end();
}

pub fn uart_begin(m: &MainCtx) {
    RX.begin(m, &*DP);
}

// vim: ts=4 sw=4 expandtab
