// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Software model of the receiver peripherals.
//!
//! [SimPeriph] models the DI pin with its pin change interrupt flag,
//! Timer/Counter0 in CTC mode and the USI data, buffer and 4 bit counter
//! registers. [Sim] steps the model cycle by cycle, drives the line like a
//! UART transmitter would and calls the [Receiver] interrupt handlers
//! when the model raises an interrupt.
//!
//! Interrupt handlers are modelled as taking zero time.
//! They are entered a configurable number of cycles after the interrupt
//! flag is raised.

use crate::{
    context::{IrqCtx, MainCtx},
    periph::RxPeripherals,
    rx::{Edge, Frame, Receiver, RxState, RxStats},
    timing::BitTiming,
};
use core::cell::Cell;

/// Default interrupt entry latency, in CPU cycles.
pub const DEFAULT_IRQ_LATENCY: u32 = 12;

/// Interrupt sources, highest priority first.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Irq {
    PinChange,
    TimerCompare,
    UsiOverflow,
}

pub struct SimPeriph {
    line: Cell<bool>,

    pcie: Cell<bool>,
    pcif: Cell<bool>,

    /// Free running 10 bit prescaler counter.
    psc: Cell<u16>,
    tc_div: Cell<u32>,
    tcnt: Cell<u8>,
    ocr: Cell<u8>,
    ocie: Cell<bool>,
    ocf: Cell<bool>,

    usi_on: Cell<bool>,
    usioie: Cell<bool>,
    usioif: Cell<bool>,
    usicnt: Cell<u8>,
    usidr: Cell<u8>,
    usibr: Cell<u8>,
}

impl SimPeriph {
    /// New peripherals with the line idle (high) and everything stopped.
    pub const fn new() -> Self {
        Self {
            line: Cell::new(true),
            pcie: Cell::new(false),
            pcif: Cell::new(false),
            psc: Cell::new(0),
            tc_div: Cell::new(0),
            tcnt: Cell::new(0),
            ocr: Cell::new(0),
            ocie: Cell::new(false),
            ocf: Cell::new(false),
            usi_on: Cell::new(false),
            usioie: Cell::new(false),
            usioif: Cell::new(false),
            usicnt: Cell::new(0),
            usidr: Cell::new(0),
            usibr: Cell::new(0),
        }
    }

    /// Drive the DI line. Any level change raises the pin change flag.
    pub fn set_line(&self, high: bool) {
        if self.line.replace(high) != high {
            self.pcif.set(true);
        }
    }

    pub fn line(&self) -> bool {
        self.line.get()
    }

    pub fn pin_change_irq_enabled(&self) -> bool {
        self.pcie.get()
    }

    pub fn timer_running(&self) -> bool {
        self.tc_div.get() != 0
    }

    pub fn usi_running(&self) -> bool {
        self.usi_on.get()
    }

    /// Advance the model by one CPU cycle.
    pub fn clock(&self) {
        let psc = (self.psc.get() + 1) & 0x3FF;
        self.psc.set(psc);
        let div = self.tc_div.get();
        if div != 0 && psc as u32 % div == 0 {
            self.timer_tick();
        }
    }

    fn timer_tick(&self) {
        let tcnt = self.tcnt.get();
        if tcnt == self.ocr.get() {
            // CTC: clear on compare match.
            self.tcnt.set(0);
            self.ocf.set(true);
            self.usi_clock();
        } else {
            self.tcnt.set(tcnt.wrapping_add(1));
        }
    }

    fn usi_clock(&self) {
        if self.usi_on.get() {
            let dr = (self.usidr.get() << 1) | self.line.get() as u8;
            self.usidr.set(dr);
            let cnt = (self.usicnt.get() + 1) & 0xF;
            self.usicnt.set(cnt);
            if cnt == 0 {
                self.usibr.set(dr);
                self.usioif.set(true);
            }
        }
    }

    /// The highest priority pending and enabled interrupt.
    pub fn pending_irq(&self) -> Option<Irq> {
        if self.pcie.get() && self.pcif.get() {
            Some(Irq::PinChange)
        } else if self.ocie.get() && self.ocf.get() {
            Some(Irq::TimerCompare)
        } else if self.usioie.get() && self.usioif.get() {
            Some(Irq::UsiOverflow)
        } else {
            None
        }
    }

    /// Interrupt entry.
    fn enter_irq(&self, irq: Irq) {
        match irq {
            Irq::PinChange => self.pcif.set(false),
            Irq::TimerCompare => self.ocf.set(false),
            // The USI overflow flag is not cleared by hardware.
            Irq::UsiOverflow => (),
        }
    }
}

impl Default for SimPeriph {
    fn default() -> Self {
        Self::new()
    }
}

impl RxPeripherals for SimPeriph {
    fn line_is_high(&self) -> bool {
        self.line.get()
    }

    fn pin_change_irq_enable(&self) {
        self.pcif.set(false);
        self.pcie.set(true);
    }

    fn pin_change_irq_disable(&self) {
        self.pcie.set(false);
    }

    fn timer_start(&self, timing: &BitTiming) {
        self.ocie.set(false);
        self.ocr.set(timing.ocr);
        self.tcnt.set(timing.tcnt_start);
        // PSR0
        self.psc.set(0);
        self.tc_div.set(timing.prescaler.divisor());
    }

    fn timer_compare_irq_enable(&self) {
        self.ocf.set(false);
        self.ocie.set(true);
    }

    fn timer_stop(&self) {
        self.tc_div.set(0);
        self.ocie.set(false);
    }

    fn usi_start(&self, nr_bits: u8) {
        self.usicnt.set(16 - (nr_bits & 0xF));
        self.usioif.set(false);
        self.usioie.set(true);
        self.usi_on.set(true);
    }

    fn usi_stop(&self) {
        self.usi_on.set(false);
        self.usioie.set(false);
        self.usioif.set(false);
    }

    fn usi_buffer(&self) -> u8 {
        self.usibr.get()
    }
}

/// Simulation statistics.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct SimStats {
    /// Pin change interrupts that did not detect a start bit.
    pub edges_ignored: u32,
    /// Interrupt handlers that returned a [crate::rx::StateError].
    pub state_errors: u32,
    /// Completed stop bit checks.
    pub frames: u32,
}

/// Cycle stepped simulation of one [Receiver] and a UART transmitter.
pub struct Sim<'a, const SIZE: usize> {
    rx: &'a Receiver<SIZE>,
    periph: SimPeriph,
    cycle: u64,
    irq_latency: u32,
    irq_wait: u32,
    /// Nominal transmitter bit length, in 1/1000 CPU cycles.
    tx_bit_mcycles: u64,
    /// Transmitter time, in 1/1000 CPU cycles.
    tx_time_m: u64,
    last_frame: Option<Frame>,
    stats: SimStats,
}

impl<'a, const SIZE: usize> Sim<'a, SIZE> {
    pub fn new(rx: &'a Receiver<SIZE>) -> Self {
        let timing = rx.timing();
        Self {
            rx,
            periph: SimPeriph::new(),
            cycle: 0,
            irq_latency: DEFAULT_IRQ_LATENCY,
            irq_wait: 0,
            tx_bit_mcycles: timing.f_cpu as u64 * 1000 / timing.baud as u64,
            tx_time_m: 0,
            last_frame: None,
            stats: SimStats::default(),
        }
    }

    /// Transmitter clock deviation, in 1/1000.
    /// A positive value makes the transmitter slower.
    pub fn with_skew(mut self, permille: i32) -> Self {
        let timing = self.rx.timing();
        let nominal = timing.f_cpu as i64 * 1000 / timing.baud as i64;
        let skewed = nominal * (1000 + permille as i64) / 1000;
        self.tx_bit_mcycles = skewed.max(1) as u64;
        self
    }

    pub fn with_irq_latency(mut self, cycles: u32) -> Self {
        self.irq_latency = cycles;
        self
    }

    pub fn periph(&self) -> &SimPeriph {
        &self.periph
    }

    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    /// Result of the most recent stop bit check.
    pub fn last_frame(&self) -> Option<Frame> {
        self.last_frame
    }

    fn main_ctx(&self) -> MainCtx<'static> {
        // SAFETY: The simulation runs the main context code and the
        // interrupt handlers strictly sequentially on one thread.
        unsafe { MainCtx::new() }
    }

    pub fn begin(&mut self) {
        let m = self.main_ctx();
        self.rx.begin(&m, &self.periph);
    }

    pub fn available(&self) -> u8 {
        self.rx.available(&self.main_ctx().to_any())
    }

    pub fn read(&self) -> Option<u8> {
        self.rx.read(&self.main_ctx())
    }

    pub fn read_or_zero(&self) -> u8 {
        self.rx.read_or_zero(&self.main_ctx())
    }

    pub fn overflow(&self) -> bool {
        self.rx.overflow(&self.main_ctx())
    }

    pub fn rx_stats(&self) -> RxStats {
        self.rx.stats(&self.main_ctx())
    }

    pub fn state(&self) -> RxState {
        self.rx.state(&self.main_ctx().to_any())
    }

    fn dispatch(&mut self, irq: Irq) {
        self.periph.enter_irq(irq);
        // SAFETY: We are emulating the interrupt entry.
        //         Nothing else runs until the handler returns.
        let c = unsafe { IrqCtx::new() };
        let p = &self.periph;
        let ok = match irq {
            Irq::PinChange => match self.rx.irq_pin_change(&c, p) {
                Ok(Edge::Ignored) => {
                    self.stats.edges_ignored += 1;
                    true
                }
                Ok(Edge::StartBit) => true,
                Err(_) => false,
            },
            Irq::TimerCompare => match self.rx.irq_timer_compare(&c, p) {
                Ok(frame) => {
                    self.stats.frames += 1;
                    self.last_frame = Some(frame);
                    true
                }
                Err(_) => false,
            },
            Irq::UsiOverflow => self.rx.irq_usi_overflow(&c, p).is_ok(),
        };
        if !ok {
            self.stats.state_errors += 1;
        }
    }

    /// Advance the simulation by one CPU cycle.
    pub fn step(&mut self) {
        self.periph.clock();
        self.cycle += 1;

        match self.periph.pending_irq() {
            Some(irq) if self.irq_wait >= self.irq_latency => {
                self.irq_wait = 0;
                self.dispatch(irq);
            }
            Some(_) => self.irq_wait += 1,
            None => self.irq_wait = 0,
        }
    }

    /// Advance the simulation by a number of CPU cycles.
    pub fn run_cycles(&mut self, cycles: u32) {
        for _ in 0..cycles {
            self.step();
        }
        self.tx_time_m = self.cycle * 1000;
    }

    /// Drive the line to `high` for `bits` transmitter bit periods.
    pub fn drive(&mut self, high: bool, bits: u32) {
        self.periph.set_line(high);
        self.tx_time_m += self.tx_bit_mcycles * bits as u64;
        while self.cycle * 1000 < self.tx_time_m {
            self.step();
        }
    }

    /// Idle line (high) for `bits` bit periods.
    pub fn idle(&mut self, bits: u32) {
        self.drive(true, bits);
    }

    /// Transmit one frame. Start bit, 8 data bits LSB first, stop bit.
    ///
    /// A low stop bit produces a framing error (or a break, if `byte` is zero).
    pub fn send_frame(&mut self, byte: u8, stop_high: bool) {
        self.drive(false, 1);
        for i in 0..8 {
            self.drive((byte >> i) & 1 != 0, 1);
        }
        self.drive(stop_high, 1);
    }

    /// Transmit one valid frame.
    pub fn send_byte(&mut self, byte: u8) {
        self.send_frame(byte, true);
    }

    /// Transmit valid frames back to back.
    pub fn send(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.send_byte(byte);
        }
    }

    /// Hold the line low for `bits` bit periods.
    pub fn send_break(&mut self, bits: u32) {
        self.drive(false, bits);
    }

    /// Pull the line low for `cycles` CPU cycles, then release it.
    pub fn glitch(&mut self, cycles: u32) {
        self.periph.set_line(false);
        self.run_cycles(cycles);
        self.periph.set_line(true);
    }
}


// vim: ts=4 sw=4 expandtab
