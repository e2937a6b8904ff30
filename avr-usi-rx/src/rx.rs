// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Interrupt driven UART receiver state machine.
//!
//! ```text
//!            falling edge              8 bits shifted
//!   Idle ----------------> Sampling ----------------> ValidatingFrame
//!    ^     (pin change)               (USI overflow)        |
//!    |                                                      |
//!    +------------------------------------------------------+
//!                   stop bit sampled (timer compare)
//! ```

use crate::{
    context::{AnyCtx, CriticalSection, IrqCtx, MainCtx, Mutex},
    periph::RxPeripherals,
    queue::ByteQueue,
    timing::BitTiming,
};
use core::cell::Cell;

/// Number of data bits per frame.
pub const DATA_BITS: u8 = 8;

/// Default receive queue size.
pub const DEFAULT_QUEUE_SIZE: usize = 32;

/// Reverse the bit order.
///
/// The USI shifts in MSB first, but UART transmits LSB first.
#[inline(always)]
pub const fn bit_rev(mut data: u8) -> u8 {
    data = (data & 0xAA) >> 1 | (data & 0x55) << 1;
    data = (data & 0xCC) >> 2 | (data & 0x33) << 2;
    data = (data & 0xF0) >> 4 | (data & 0x0F) << 4;
    data
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum RxState {
    /// Waiting for the start bit edge.
    Idle,
    /// The timer clocks the data bits into the USI.
    Sampling,
    /// Waiting for the middle of the stop bit.
    ValidatingFrame,
}

/// An interrupt handler was called in the wrong receiver state.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct StateError {
    pub expected: RxState,
    pub actual: RxState,
}

/// Result of the pin change interrupt.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Edge {
    /// The line was high. Rising edge or glitch.
    Ignored,
    /// Start bit detected. Sampling started.
    StartBit,
}

/// Result of the stop bit check.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Frame {
    /// Valid frame. The byte has been queued.
    Byte(u8),
    /// Valid frame, but the queue was full. The byte has been dropped.
    Overflow(u8),
    /// Stop bit low with non-zero data. The byte has been dropped.
    FramingError(u8),
    /// The line was low for the whole frame.
    Break,
}

/// Receiver statistics. All counters saturate.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct RxStats {
    /// Frames with a valid stop bit.
    pub bytes: u16,
    pub framing_errors: u16,
    pub breaks: u16,
    /// Interrupts that fired in the wrong receiver state.
    pub unexpected_irqs: u16,
}

impl RxStats {
    pub const fn new() -> Self {
        Self {
            bytes: 0,
            framing_errors: 0,
            breaks: 0,
            unexpected_irqs: 0,
        }
    }
}

pub struct Receiver<const SIZE: usize = DEFAULT_QUEUE_SIZE> {
    timing: BitTiming,
    state: Mutex<Cell<RxState>>,
    queue: ByteQueue<SIZE>,
    stats: Mutex<Cell<RxStats>>,
}

impl<const SIZE: usize> Receiver<SIZE> {
    pub const fn new(timing: BitTiming) -> Self {
        Self {
            timing,
            state: Mutex::new(Cell::new(RxState::Idle)),
            queue: ByteQueue::new(),
            stats: Mutex::new(Cell::new(RxStats::new())),
        }
    }

    pub const fn timing(&self) -> &BitTiming {
        &self.timing
    }

    /// Start reception.
    ///
    /// Resets the state machine, clears the queue, the overflow flag
    /// and the statistics and arms the start bit detection.
    pub fn begin<P: RxPeripherals>(&self, _m: &MainCtx<'_>, p: &P) {
        critical_section::with(|cs| self.begin_cs(cs, p));
    }

    fn begin_cs<P: RxPeripherals>(&self, cs: CriticalSection<'_>, p: &P) {
        p.usi_stop();
        p.timer_stop();
        self.queue.clear(cs);
        self.stats.borrow(cs).set(RxStats::new());
        self.state.borrow(cs).set(RxState::Idle);
        p.pin_change_irq_enable();
    }

    /// Current state of the state machine.
    #[inline]
    pub fn state(&self, a: &AnyCtx) -> RxState {
        // SAFETY: Single byte read of a `repr(u8)` value.
        let cs = unsafe { a.cs_for_atomic_read() };
        self.state.borrow(cs).get()
    }

    fn update_stats(&self, cs: CriticalSection<'_>, f: impl FnOnce(&mut RxStats)) {
        let cell = self.stats.borrow(cs);
        let mut stats = cell.get();
        f(&mut stats);
        cell.set(stats);
    }

    fn check_state(&self, cs: CriticalSection<'_>, expected: RxState) -> Result<(), StateError> {
        let actual = self.state.borrow(cs).get();
        if actual == expected {
            Ok(())
        } else {
            self.update_stats(cs, |s| {
                s.unexpected_irqs = s.unexpected_irqs.saturating_add(1);
            });
            Err(StateError { expected, actual })
        }
    }

    /// Throw away a frame in progress and wait for the next start bit.
    fn abort_frame<P: RxPeripherals>(&self, cs: CriticalSection<'_>, p: &P) {
        p.usi_stop();
        p.timer_stop();
        self.state.borrow(cs).set(RxState::Idle);
        p.pin_change_irq_enable();
    }

    /// Pin change interrupt handler: start bit detection.
    pub fn irq_pin_change<P: RxPeripherals>(
        &self,
        c: &IrqCtx<'_>,
        p: &P,
    ) -> Result<Edge, StateError> {
        let cs = c.cs();
        if let Err(e) = self.check_state(cs, RxState::Idle) {
            // Edge detection must not interfere with a frame in progress.
            p.pin_change_irq_disable();
            return Err(e);
        }

        if p.line_is_high() {
            return Ok(Edge::Ignored);
        }

        p.pin_change_irq_disable();
        p.timer_start(&self.timing);
        p.usi_start(DATA_BITS);
        self.state.borrow(cs).set(RxState::Sampling);
        Ok(Edge::StartBit)
    }

    /// USI counter overflow interrupt handler: all data bits are shifted in.
    pub fn irq_usi_overflow<P: RxPeripherals>(
        &self,
        c: &IrqCtx<'_>,
        p: &P,
    ) -> Result<(), StateError> {
        let cs = c.cs();
        // Don't shift in a 9th bit.
        p.usi_stop();
        self.check_state(cs, RxState::Sampling)?;

        // The timer keeps running.
        // Its next compare match is in the middle of the stop bit.
        p.timer_compare_irq_enable();
        self.state.borrow(cs).set(RxState::ValidatingFrame);
        Ok(())
    }

    /// Timer compare interrupt handler: stop bit check.
    pub fn irq_timer_compare<P: RxPeripherals>(
        &self,
        c: &IrqCtx<'_>,
        p: &P,
    ) -> Result<Frame, StateError> {
        let cs = c.cs();
        if let Err(e) = self.check_state(cs, RxState::ValidatingFrame) {
            // Stray compare match. Drop a frame in progress, if any.
            self.abort_frame(cs, p);
            return Err(e);
        }

        p.timer_stop();
        let raw = p.usi_buffer();

        let frame = if p.line_is_high() {
            let byte = bit_rev(raw);
            self.update_stats(cs, |s| s.bytes = s.bytes.saturating_add(1));
            match self.queue.push(c, byte) {
                Ok(()) => Frame::Byte(byte),
                Err(_) => Frame::Overflow(byte),
            }
        } else if raw == 0 {
            self.update_stats(cs, |s| s.breaks = s.breaks.saturating_add(1));
            Frame::Break
        } else {
            self.update_stats(cs, |s| {
                s.framing_errors = s.framing_errors.saturating_add(1);
            });
            Frame::FramingError(bit_rev(raw))
        };

        self.state.borrow(cs).set(RxState::Idle);
        p.pin_change_irq_enable();
        Ok(frame)
    }

    /// Number of received bytes ready to be read.
    #[inline]
    pub fn available(&self, a: &AnyCtx) -> u8 {
        self.queue.available(a)
    }

    /// Get the oldest received byte.
    pub fn read(&self, m: &MainCtx<'_>) -> Option<u8> {
        self.queue.pop(m)
    }

    /// Get the oldest received byte, or 0 if there is none.
    pub fn read_or_zero(&self, m: &MainCtx<'_>) -> u8 {
        self.queue.pop_or_zero(m)
    }

    /// Returns whether a received byte has been dropped since the last call,
    /// because the queue was full.
    pub fn overflow(&self, m: &MainCtx<'_>) -> bool {
        self.queue.take_overflow(m)
    }

    pub fn stats(&self, _m: &MainCtx<'_>) -> RxStats {
        critical_section::with(|cs| self.stats.borrow(cs).get())
    }

    pub const fn capacity(&self) -> usize {
        SIZE
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::sim::{Sim, SimPeriph};

    const TIMING: BitTiming = match BitTiming::new(8_000_000, 9600) {
        Ok(t) => t,
        Err(_) => panic!("Invalid bit timing"),
    };

    #[test]
    fn test_bit_rev() {
        assert_eq!(bit_rev(0x01), 0x80);
        assert_eq!(bit_rev(0x82), 0x41);
        assert_eq!(bit_rev(0xF0), 0x0F);
        for x in 0..=255_u8 {
            assert_eq!(bit_rev(x), x.reverse_bits());
            assert_eq!(bit_rev(bit_rev(x)), x);
        }
    }

    #[test]
    fn test_ascii_a() {
        let rx: Receiver = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx);
        sim.begin();
        sim.idle(2);
        sim.send_byte(b'A');
        sim.idle(1);
        assert_eq!(sim.last_frame(), Some(Frame::Byte(0x41)));
        assert_eq!(sim.available(), 1);
        assert_eq!(sim.read(), Some(0x41));
        assert_eq!(sim.available(), 0);
        assert_eq!(sim.read(), None);
        assert_eq!(sim.read_or_zero(), 0);
        assert!(!sim.overflow());
        assert_eq!(sim.state(), RxState::Idle);
    }

    #[test]
    fn test_fifo_order() {
        let rx: Receiver = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx);
        sim.begin();
        sim.idle(1);
        let msg = b"Hello, world!\x00\xFF\x55\xAA";
        // Back to back frames, no idle time in between.
        sim.send(msg);
        sim.idle(1);
        assert_eq!(sim.available() as usize, msg.len());
        for &b in msg {
            assert_eq!(sim.read(), Some(b));
        }
        assert_eq!(sim.read(), None);
        let stats = sim.rx_stats();
        assert_eq!(stats.bytes as usize, msg.len());
        assert_eq!(stats.framing_errors, 0);
        assert_eq!(stats.breaks, 0);
        assert_eq!(stats.unexpected_irqs, 0);
    }

    #[test]
    fn test_overflow() {
        let rx: Receiver = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx);
        sim.begin();
        sim.idle(1);
        for i in 0..=rx.capacity() as u8 {
            sim.send_byte(i);
        }
        sim.idle(1);
        assert_eq!(sim.last_frame(), Some(Frame::Overflow(32)));
        assert_eq!(sim.available() as usize, rx.capacity());
        assert!(sim.overflow());
        assert!(!sim.overflow());
        for i in 0..rx.capacity() as u8 {
            assert_eq!(sim.read(), Some(i));
        }
        assert_eq!(sim.read(), None);

        // Reception continues after draining.
        sim.send_byte(0x42);
        sim.idle(1);
        assert_eq!(sim.read(), Some(0x42));
        assert!(!sim.overflow());
    }

    #[test]
    fn test_wrap_around() {
        let rx: Receiver = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx);
        sim.begin();
        sim.idle(1);
        let mut expected_rd = 0_u8;
        for i in 0..40_u8 {
            if i >= 32 {
                assert_eq!(sim.read(), Some(expected_rd));
                expected_rd += 1;
            }
            sim.send_byte(i);
        }
        sim.idle(1);
        assert!(!sim.overflow());
        assert_eq!(sim.available(), 32);
        for i in 8..40 {
            assert_eq!(sim.read(), Some(i));
        }
    }

    #[test]
    fn test_framing_error() {
        let rx: Receiver = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx);
        sim.begin();
        sim.idle(1);
        sim.send_byte(0x11);
        sim.send_frame(0x5A, false);
        sim.idle(2);
        assert_eq!(sim.last_frame(), Some(Frame::FramingError(0x5A)));
        assert_eq!(sim.available(), 1);
        assert_eq!(sim.rx_stats().framing_errors, 1);
        assert_eq!(sim.rx_stats().breaks, 0);
        assert_eq!(sim.state(), RxState::Idle);

        // The receiver is re-armed.
        sim.send_byte(0x22);
        sim.idle(1);
        assert_eq!(sim.last_frame(), Some(Frame::Byte(0x22)));
        assert_eq!(sim.read(), Some(0x11));
        assert_eq!(sim.read(), Some(0x22));
        assert_eq!(sim.read(), None);
    }

    #[test]
    fn test_break() {
        let rx: Receiver = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx);
        sim.begin();
        sim.idle(1);
        sim.send_break(20);
        sim.idle(2);
        assert_eq!(sim.last_frame(), Some(Frame::Break));
        let stats = sim.rx_stats();
        assert_eq!(stats.breaks, 1);
        assert_eq!(stats.framing_errors, 0);
        assert_eq!(sim.available(), 0);
        // The rising edge at the end of the break is not a start bit.
        assert_eq!(sim.stats().edges_ignored, 1);

        sim.send_byte(b'Z');
        sim.idle(1);
        assert_eq!(sim.read(), Some(b'Z'));
    }

    #[test]
    fn test_zero_byte_with_low_stop_bit_is_break() {
        let rx: Receiver = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx);
        sim.begin();
        sim.idle(1);
        sim.send_frame(0x00, false);
        sim.idle(2);
        assert_eq!(sim.last_frame(), Some(Frame::Break));
        assert_eq!(sim.rx_stats().framing_errors, 0);
    }

    #[test]
    fn test_spurious_edge() {
        let rx: Receiver = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx).with_irq_latency(12);
        sim.begin();
        sim.idle(1);
        // Shorter than the interrupt latency.
        // The handler sees the line high again.
        sim.glitch(4);
        sim.idle(1);
        assert_eq!(sim.stats().edges_ignored, 1);
        assert_eq!(sim.state(), RxState::Idle);
        assert_eq!(sim.available(), 0);
        assert_eq!(sim.last_frame(), None);

        sim.send_byte(b'A');
        sim.idle(1);
        assert_eq!(sim.read(), Some(b'A'));
    }

    #[test]
    fn test_baud_skew() {
        for skew in [-20, -10, 10, 20] {
            let rx: Receiver = Receiver::new(TIMING);
            let mut sim = Sim::new(&rx).with_skew(skew);
            sim.begin();
            sim.idle(1);
            sim.send(b"\x00\xFF\x0F\xF0\xA5");
            sim.idle(1);
            for b in [0x00, 0xFF, 0x0F, 0xF0, 0xA5] {
                assert_eq!(sim.read(), Some(b), "skew {skew}");
            }
            assert_eq!(sim.rx_stats().framing_errors, 0, "skew {skew}");
        }
    }

    #[test]
    fn test_small_queue() {
        let rx: Receiver<4> = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx);
        sim.begin();
        sim.idle(1);
        sim.send(b"abcdef");
        sim.idle(1);
        assert_eq!(sim.available(), 4);
        assert!(sim.overflow());
        assert_eq!(sim.read(), Some(b'a'));
        assert_eq!(sim.read(), Some(b'b'));
        assert_eq!(sim.read(), Some(b'c'));
        assert_eq!(sim.read(), Some(b'd'));
        assert_eq!(sim.read(), None);
    }

    #[test]
    fn test_begin_resets() {
        let rx: Receiver = Receiver::new(TIMING);
        let mut sim = Sim::new(&rx);
        sim.begin();
        sim.idle(1);
        sim.send(b"xy");
        sim.send_frame(0x12, false);
        sim.idle(2);
        assert_eq!(sim.available(), 2);
        assert_eq!(sim.rx_stats().framing_errors, 1);

        sim.begin();
        assert_eq!(sim.available(), 0);
        assert_eq!(sim.rx_stats(), RxStats::default());
        assert_eq!(sim.state(), RxState::Idle);
    }

    #[test]
    fn test_wrong_state() {
        let rx: Receiver = Receiver::new(TIMING);
        let p = SimPeriph::new();
        // SAFETY: Single threaded test. Nothing runs concurrently.
        let (c, m) = unsafe { (IrqCtx::new(), MainCtx::new()) };
        rx.begin(&m, &p);

        assert_eq!(
            rx.irq_usi_overflow(&c, &p),
            Err(StateError {
                expected: RxState::Sampling,
                actual: RxState::Idle,
            })
        );
        assert_eq!(
            rx.irq_timer_compare(&c, &p),
            Err(StateError {
                expected: RxState::ValidatingFrame,
                actual: RxState::Idle,
            })
        );
        assert_eq!(rx.state(&m.to_any()), RxState::Idle);
        assert!(p.pin_change_irq_enabled());

        // Start bit.
        p.set_line(false);
        assert_eq!(rx.irq_pin_change(&c, &p), Ok(Edge::StartBit));
        assert_eq!(rx.state(&m.to_any()), RxState::Sampling);
        assert!(!p.pin_change_irq_enabled());
        assert!(p.timer_running());
        assert!(p.usi_running());

        assert_eq!(
            rx.irq_pin_change(&c, &p),
            Err(StateError {
                expected: RxState::Idle,
                actual: RxState::Sampling,
            })
        );
        assert_eq!(rx.state(&m.to_any()), RxState::Sampling);

        // A stray compare match while sampling aborts the frame.
        assert_eq!(
            rx.irq_timer_compare(&c, &p),
            Err(StateError {
                expected: RxState::ValidatingFrame,
                actual: RxState::Sampling,
            })
        );
        assert_eq!(rx.state(&m.to_any()), RxState::Idle);
        assert!(!p.timer_running());
        assert!(!p.usi_running());
        assert!(p.pin_change_irq_enabled());

        assert_eq!(rx.stats(&m).unexpected_irqs, 4);
        assert_eq!(rx.available(&m.to_any()), 0);
    }

    #[test]
    fn test_wrong_state_while_validating() {
        let rx: Receiver = Receiver::new(TIMING);
        let p = SimPeriph::new();
        // SAFETY: Single threaded test. Nothing runs concurrently.
        let (c, m) = unsafe { (IrqCtx::new(), MainCtx::new()) };
        rx.begin(&m, &p);

        p.set_line(false);
        assert_eq!(rx.irq_pin_change(&c, &p), Ok(Edge::StartBit));
        assert_eq!(rx.irq_usi_overflow(&c, &p), Ok(()));
        assert_eq!(rx.state(&m.to_any()), RxState::ValidatingFrame);

        // An edge during the stop bit must not start a new frame.
        // The detector is switched off. Nothing else changes.
        rx.irq_pin_change(&c, &p).unwrap_err();
        assert_eq!(rx.state(&m.to_any()), RxState::ValidatingFrame);
        assert!(!p.pin_change_irq_enabled());
        assert!(p.timer_running());

        // The stop bit check still completes and re-arms the detector.
        p.set_line(true);
        assert_eq!(rx.irq_timer_compare(&c, &p), Ok(Frame::Byte(0x00)));
        assert_eq!(rx.state(&m.to_any()), RxState::Idle);
        assert!(p.pin_change_irq_enabled());
        assert!(!p.timer_running());

        // A stray compare match in Idle keeps the detector armed.
        rx.irq_timer_compare(&c, &p).unwrap_err();
        assert_eq!(rx.state(&m.to_any()), RxState::Idle);
        assert!(p.pin_change_irq_enabled());
        assert!(!p.timer_running());
        assert!(!p.usi_running());

        assert_eq!(rx.stats(&m).unexpected_irqs, 2);
        assert_eq!(rx.stats(&m).bytes, 1);
    }
}

// vim: ts=4 sw=4 expandtab
