// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Receive-only UART for AVR devices without a UART.
//!
//! The start bit is detected by the pin change interrupt.
//! Timer/Counter0 then clocks the data bits into the USI (in the middle
//! of each bit) and the USI counter overflow interrupt fires after 8 bits.
//! One bit later the timer compare interrupt checks the stop bit and
//! puts the byte into the receive queue.

#![no_std]

pub mod context;
pub mod periph;
pub mod queue;
pub mod rx;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
pub mod timing;

pub use crate::{
    context::{AnyCtx, IrqCtx, MainCtx},
    periph::RxPeripherals,
    queue::{ByteQueue, QueueFull},
    rx::{Edge, Frame, Receiver, RxState, RxStats, StateError, bit_rev},
    timing::{BitTiming, Prescaler, TimingError},
};

// vim: ts=4 sw=4 expandtab
