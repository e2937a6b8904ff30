// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

#![allow(unused_unsafe)]

use crate::{
    hw::mcu,
    mutex::{LazyMainInit, MainInitCtx},
};

// ATtiny85: USI DI is PB0. The LEDs and the debug pin are on PB1..PB3.
// ATtiny84: USI DI is PA6. The LEDs and the debug pin are on PB0..PB2.

/// USI DI. UART receive data input.
#[cfg(feature = "attiny85")]
pub const UART_DI_BIT: usize = 0;
#[cfg(feature = "attiny84")]
pub const UART_DI_BIT: usize = 6;

/// Activity LED. Toggles on every received byte.
#[cfg(feature = "attiny85")]
pub const PB_LED_ACT: usize = 1;
#[cfg(feature = "attiny84")]
pub const PB_LED_ACT: usize = 0;

/// Debug pin. High while an UART interrupt handler runs.
#[cfg(feature = "attiny85")]
pub const PB_DEBUG: usize = 2;
#[cfg(feature = "attiny84")]
pub const PB_DEBUG: usize = 1;

/// Error LED. On after a receive error.
#[cfg(feature = "attiny85")]
pub const PB_LED_ERR: usize = 3;
#[cfg(feature = "attiny84")]
pub const PB_LED_ERR: usize = 2;

#[rustfmt::skip]
macro_rules! impl_port {
    (
        $struct:ident,
        $name:ident,
        $port:ident,
        $pin:ident,
        [ $( $idx:literal => $bit:ident ),* ]
    ) => {
        #[allow(non_snake_case)]
        pub struct $struct {
            pub $name: mcu::$name,
        }

        // SAFETY: Is initialized when constructing the MainCtx.
        pub static $name: LazyMainInit<$struct> = unsafe { LazyMainInit::uninit() };

        #[allow(dead_code)]
        impl LazyMainInit<$struct> {
            #[inline(always)]
            pub fn get(&self, bit: usize) -> bool {
                match bit {
                    $( $idx => self.$name.$pin().read().$bit().bit(), )*
                    _ => unreachable!(),
                }
            }

            /// Read the output latch.
            #[inline(always)]
            pub fn get_out(&self, bit: usize) -> bool {
                match bit {
                    $( $idx => self.$name.$port().read().$bit().bit(), )*
                    _ => unreachable!(),
                }
            }

            #[inline(always)]
            pub fn set(&self, bit: usize, value: bool) {
                match bit {
                    $( $idx => self.$name.$port().modify(|_, w| w.$bit().bit(value)), )*
                    _ => unreachable!(),
                };
            }
        }
    };
}

#[cfg(feature = "attiny85")]
impl_port!(PortB, PORTB, portb, pinb, [
    0 => pb0, 1 => pb1, 2 => pb2, 3 => pb3, 4 => pb4, 5 => pb5
]);

#[cfg(feature = "attiny84")]
impl_port!(PortA, PORTA, porta, pina, [
    0 => pa0, 1 => pa1, 2 => pa2, 3 => pa3, 4 => pa4, 5 => pa5, 6 => pa6, 7 => pa7
]);
#[cfg(feature = "attiny84")]
impl_port!(PortB, PORTB, portb, pinb, [
    0 => pb0, 1 => pb1, 2 => pb2, 3 => pb3
]);

/// Current level of the UART data input.
#[inline(always)]
pub fn uart_di_is_high() -> bool {
    #[cfg(feature = "attiny85")]
    let port = &PORTB;
    #[cfg(feature = "attiny84")]
    let port = &PORTA;
    port.get(UART_DI_BIT)
}

fn pin_input(_bit: usize) -> u8 {
    0
}
fn pin_output(bit: usize) -> u8 {
    1 << bit
}
fn pin_low(_bit: usize) -> u8 {
    0
}
fn pin_floating(_bit: usize) -> u8 {
    0
}
fn pin_pullup(bit: usize) -> u8 {
    1 << bit
}

#[cfg(feature = "attiny85")]
impl PortB {
    pub fn setup(&self, _: &MainInitCtx) {
        // SAFETY: Called with interrupts disabled. Ensured by &MainInitCtx.
        unsafe {
            self.PORTB.portb().write(|w| {
                w.bits(
                    pin_pullup(UART_DI_BIT) | // UART DI, idle high
                    pin_low(PB_LED_ACT) |
                    pin_low(PB_DEBUG) | // USCK, not used by the USI in this mode
                    pin_low(PB_LED_ERR) |
                    pin_low(4) | // n/c
                    pin_floating(5), // RESET
                )
            });
            self.PORTB.ddrb().write(|w| {
                w.bits(
                    pin_input(UART_DI_BIT) |
                    pin_output(PB_LED_ACT) |
                    pin_output(PB_DEBUG) |
                    pin_output(PB_LED_ERR) |
                    pin_output(4) | // n/c
                    pin_input(5), // RESET
                )
            });
        }
    }
}

#[cfg(feature = "attiny84")]
impl PortA {
    pub fn setup(&self, _: &MainInitCtx) {
        // SAFETY: Called with interrupts disabled. Ensured by &MainInitCtx.
        unsafe {
            self.PORTA.porta().write(|w| {
                w.bits(
                    pin_low(0) | // n/c
                    pin_low(1) | // n/c
                    pin_low(2) | // n/c
                    pin_low(3) | // n/c
                    pin_low(4) | // USCK, not used by the USI in this mode
                    pin_low(5) | // DO, not used
                    pin_pullup(UART_DI_BIT) | // UART DI, idle high
                    pin_low(7), // n/c
                )
            });
            self.PORTA.ddra().write(|w| {
                w.bits(
                    pin_output(0) |
                    pin_output(1) |
                    pin_output(2) |
                    pin_output(3) |
                    pin_output(4) |
                    pin_output(5) |
                    pin_input(UART_DI_BIT) |
                    pin_output(7),
                )
            });
        }
    }
}

#[cfg(feature = "attiny84")]
impl PortB {
    pub fn setup(&self, _: &MainInitCtx) {
        // SAFETY: Called with interrupts disabled. Ensured by &MainInitCtx.
        unsafe {
            self.PORTB.portb().write(|w| {
                w.bits(
                    pin_low(PB_LED_ACT) |
                    pin_low(PB_DEBUG) |
                    pin_low(PB_LED_ERR) |
                    pin_floating(3), // RESET
                )
            });
            self.PORTB.ddrb().write(|w| {
                w.bits(
                    pin_output(PB_LED_ACT) |
                    pin_output(PB_DEBUG) |
                    pin_output(PB_LED_ERR) |
                    pin_input(3), // RESET
                )
            });
        }
    }
}

// vim: ts=4 sw=4 expandtab
