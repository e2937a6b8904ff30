// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Receive byte queue.
//!
//! Single producer (interrupt context), single consumer (main context).

use crate::context::{AnyCtx, CriticalSection, IrqCtx, MainCtx, Mutex};
use core::cell::Cell;

/// The queue was full. The byte has been dropped.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct QueueFull;

pub struct ByteQueue<const SIZE: usize> {
    buf: Mutex<[Cell<u8>; SIZE]>,
    head: Mutex<Cell<u8>>,
    count: Mutex<Cell<u8>>,
    overflowed: Mutex<Cell<bool>>,
}

impl<const SIZE: usize> ByteQueue<SIZE> {
    const MASK: u8 = (SIZE - 1) as u8;

    pub const fn new() -> Self {
        const {
            assert!(SIZE.is_power_of_two());
            assert!(SIZE <= 128);
        }
        Self {
            buf: Mutex::new([const { Cell::new(0) }; SIZE]),
            head: Mutex::new(Cell::new(0)),
            count: Mutex::new(Cell::new(0)),
            overflowed: Mutex::new(Cell::new(false)),
        }
    }

    pub const fn capacity(&self) -> usize {
        SIZE
    }

    /// Drop all contents and reset the overflow flag.
    pub fn clear(&self, cs: CriticalSection<'_>) {
        self.head.borrow(cs).set(0);
        self.count.borrow(cs).set(0);
        self.overflowed.borrow(cs).set(false);
    }

    /// Append a byte.
    ///
    /// If the queue is full, the byte is dropped and the sticky overflow flag is set.
    /// The queue contents are not touched in that case.
    pub fn push(&self, c: &IrqCtx<'_>, byte: u8) -> Result<(), QueueFull> {
        self.push_cs(c.cs(), byte)
    }

    fn push_cs(&self, cs: CriticalSection<'_>, byte: u8) -> Result<(), QueueFull> {
        let count = self.count.borrow(cs).get();
        if count as usize >= SIZE {
            self.overflowed.borrow(cs).set(true);
            Err(QueueFull)
        } else {
            let head = self.head.borrow(cs).get();
            let wr = head.wrapping_add(count) & Self::MASK;
            self.buf.borrow(cs)[wr as usize].set(byte);
            self.count.borrow(cs).set(count + 1);
            Ok(())
        }
    }

    /// Number of bytes ready to be read.
    ///
    /// This is a single byte read without critical section.
    /// A concurrently running push can make this value stale by one.
    #[inline]
    pub fn available(&self, a: &AnyCtx) -> u8 {
        // SAFETY: Single byte read. That is atomic w.r.t. the interrupt handlers.
        let cs = unsafe { a.cs_for_atomic_read() };
        self.count.borrow(cs).get()
    }

    /// Remove and return the oldest byte.
    pub fn pop(&self, _m: &MainCtx<'_>) -> Option<u8> {
        critical_section::with(|cs| self.pop_cs(cs))
    }

    fn pop_cs(&self, cs: CriticalSection<'_>) -> Option<u8> {
        let count = self.count.borrow(cs).get();
        if count == 0 {
            None
        } else {
            let head = self.head.borrow(cs).get();
            let byte = self.buf.borrow(cs)[head as usize].get();
            self.head.borrow(cs).set(head.wrapping_add(1) & Self::MASK);
            self.count.borrow(cs).set(count - 1);
            Some(byte)
        }
    }

    /// Remove and return the oldest byte.
    ///
    /// Returns 0, if the queue is empty.
    /// That is indistinguishable from a received 0x00.
    pub fn pop_or_zero(&self, m: &MainCtx<'_>) -> u8 {
        self.pop(m).unwrap_or(0)
    }

    /// Returns whether a byte has been dropped since the last call.
    pub fn take_overflow(&self, _m: &MainCtx<'_>) -> bool {
        critical_section::with(|cs| self.overflowed.borrow(cs).replace(false))
    }
}

impl<const SIZE: usize> Default for ByteQueue<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn ctx() -> (IrqCtx<'static>, MainCtx<'static>) {
        // SAFETY: The tests are single threaded w.r.t. one queue.
        unsafe { (IrqCtx::new(), MainCtx::new()) }
    }

    #[test]
    fn test_fifo() {
        let (c, m) = ctx();
        let q: ByteQueue<8> = ByteQueue::new();
        assert_eq!(q.available(&m.to_any()), 0);
        assert_eq!(q.pop(&m), None);

        for b in [0x41, 0x00, 0xFF] {
            q.push(&c, b).unwrap();
        }
        assert_eq!(q.available(&c.to_any()), 3);
        assert_eq!(q.pop(&m), Some(0x41));
        assert_eq!(q.pop(&m), Some(0x00));
        assert_eq!(q.pop(&m), Some(0xFF));
        assert_eq!(q.pop(&m), None);
        assert_eq!(q.available(&m.to_any()), 0);
        assert!(!q.take_overflow(&m));
    }

    #[test]
    fn test_pop_or_zero() {
        let (c, m) = ctx();
        let q: ByteQueue<4> = ByteQueue::new();
        assert_eq!(q.pop_or_zero(&m), 0);
        q.push(&c, 0x5A).unwrap();
        assert_eq!(q.pop_or_zero(&m), 0x5A);
        assert_eq!(q.pop_or_zero(&m), 0);
    }

    #[test]
    fn test_overflow() {
        let (c, m) = ctx();
        let q: ByteQueue<32> = ByteQueue::new();
        for i in 0..32 {
            assert_eq!(q.push(&c, i), Ok(()));
        }
        assert_eq!(q.push(&c, 32), Err(QueueFull));
        assert_eq!(q.available(&m.to_any()), 32);

        // Sticky until read, then cleared.
        assert!(q.take_overflow(&m));
        assert!(!q.take_overflow(&m));

        // The oldest bytes are retained.
        for i in 0..32 {
            assert_eq!(q.pop(&m), Some(i));
        }
        assert_eq!(q.pop(&m), None);
    }

    #[test]
    fn test_wrap_around() {
        let (c, m) = ctx();
        let q: ByteQueue<32> = ByteQueue::new();

        let mut next_rd = 0_u8;
        for i in 0..40_u8 {
            if i >= 32 {
                // Make room, so that count never exceeds the capacity.
                assert_eq!(q.pop(&m), Some(next_rd));
                next_rd += 1;
            }
            q.push(&c, i).unwrap();
        }
        assert!(!q.take_overflow(&m));
        assert_eq!(q.available(&m.to_any()), 32);
        for i in 8..40 {
            assert_eq!(q.pop(&m), Some(i));
        }
        assert_eq!(q.pop(&m), None);
    }

    #[test]
    fn test_clear() {
        let (c, m) = ctx();
        let q: ByteQueue<2> = ByteQueue::new();
        q.push(&c, 1).unwrap();
        q.push(&c, 2).unwrap();
        assert!(q.push(&c, 3).is_err());
        critical_section::with(|cs| q.clear(cs));
        assert_eq!(q.available(&m.to_any()), 0);
        assert!(!q.take_overflow(&m));
        q.push(&c, 4).unwrap();
        assert_eq!(q.pop(&m), Some(4));
    }
}

// vim: ts=4 sw=4 expandtab
