// -*- coding: utf-8 -*-
// Copyright (C) 2025 Michael Büsch <m@bues.ch>
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Bit timing for the 8 bit Timer/Counter0 in CTC mode.
//!
//! The timer runs in CTC mode with a period of one UART bit.
//! Each compare match clocks one bit into the USI.
//!
//! The counter is not started at zero.
//! It is started above the compare value, so that it first counts up
//! to 0xFF, wraps to zero and then counts up to the compare value.
//! That places the first compare match 1.5 bit periods after the
//! start bit edge, which is the middle of data bit 0.

/// Approximate number of CPU cycles between the start bit edge and
/// the timer being started in the pin change ISR.
pub const IRQ_LATENCY_CYCLES: u32 = 16;

/// Minimum number of CPU cycles per UART bit.
/// The USI overflow and timer compare ISRs must complete within one bit.
pub const MIN_BIT_CYCLES: u32 = 100;

/// Maximum allowed deviation of the actual baud rate, in 1/1000.
pub const MAX_BAUD_ERROR_PERMILLE: u32 = 20;

/// Timer/Counter0 clock prescaler.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Prescaler {
    Div1,
    Div8,
    Div64,
    Div256,
    Div1024,
}

impl Prescaler {
    /// All prescalers, smallest (best resolution) first.
    pub const ALL: [Prescaler; 5] = [
        Prescaler::Div1,
        Prescaler::Div8,
        Prescaler::Div64,
        Prescaler::Div256,
        Prescaler::Div1024,
    ];

    pub const fn divisor(self) -> u32 {
        match self {
            Prescaler::Div1 => 1,
            Prescaler::Div8 => 8,
            Prescaler::Div64 => 64,
            Prescaler::Div256 => 256,
            Prescaler::Div1024 => 1024,
        }
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum TimingError {
    /// Baud rate is zero.
    ZeroBaud,
    /// Not enough CPU cycles per bit for the interrupt handlers.
    BaudTooHigh,
    /// The bit period does not fit into the 8 bit timer,
    /// not even with the largest prescaler.
    BaudTooLow,
    /// The timer resolution is too coarse to hit the baud rate.
    BaudMismatch,
}

/// Timer configuration for one fixed baud rate.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct BitTiming {
    /// CPU clock frequency, in Hz.
    pub f_cpu: u32,
    /// Requested baud rate.
    pub baud: u32,
    /// Timer clock prescaler.
    pub prescaler: Prescaler,
    /// Length of one bit, in timer ticks.
    pub bit_ticks: u16,
    /// Compare register value (OCR0A).
    pub ocr: u8,
    /// Initial counter value (TCNT0) when the start bit edge is detected.
    pub tcnt_start: u8,
}

impl BitTiming {
    /// Calculate the timer configuration.
    ///
    /// The smallest prescaler that fits the bit period and the
    /// start offset into the 8 bit counter is selected.
    pub const fn new(f_cpu: u32, baud: u32) -> Result<Self, TimingError> {
        if baud == 0 {
            return Err(TimingError::ZeroBaud);
        }
        let f = f_cpu as u64;
        let b = baud as u64;

        let bit_cycles = (f + b / 2) / b;
        if bit_cycles < MIN_BIT_CYCLES as u64 {
            return Err(TimingError::BaudTooHigh);
        }

        let mut i = 0;
        while i < Prescaler::ALL.len() {
            let prescaler = Prescaler::ALL[i];
            let div = prescaler.divisor() as u64;

            let ticks = (f + (b * div) / 2) / (b * div);
            let half = ticks / 2;
            let comp = (IRQ_LATENCY_CYCLES as u64 + div / 2) / div;

            if ticks >= 2 && ticks <= 256 && half > comp {
                let ocr = ticks - 1;
                let tcnt_start = 256 - half + comp;
                // The counter must wrap through 0xFF before the first match.
                if tcnt_start > ocr {
                    let actual = f / (ticks * div);
                    let deviation = if actual > b { actual - b } else { b - actual };
                    if deviation * 1000 > b * MAX_BAUD_ERROR_PERMILLE as u64 {
                        return Err(TimingError::BaudMismatch);
                    }
                    return Ok(Self {
                        f_cpu,
                        baud,
                        prescaler,
                        bit_ticks: ticks as u16,
                        ocr: ocr as u8,
                        tcnt_start: tcnt_start as u8,
                    });
                }
            }
            i += 1;
        }
        Err(TimingError::BaudTooLow)
    }

    /// Length of one bit, in CPU cycles.
    pub const fn bit_cycles(&self) -> u32 {
        self.bit_ticks as u32 * self.prescaler.divisor()
    }

    /// Number of timer ticks from timer start to the first compare match.
    pub const fn first_sample_ticks(&self) -> u32 {
        (256 - self.tcnt_start as u32) + self.bit_ticks as u32
    }

    /// Number of CPU cycles from timer start to the first compare match.
    pub const fn first_sample_cycles(&self) -> u32 {
        self.first_sample_ticks() * self.prescaler.divisor()
    }

    /// The baud rate that the timer actually produces.
    pub const fn actual_baud(&self) -> u32 {
        self.f_cpu / self.bit_cycles()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_8mhz_9600() {
        let t = BitTiming::new(8_000_000, 9600).unwrap();
        assert_eq!(t.prescaler, Prescaler::Div8);
        assert_eq!(t.bit_ticks, 104);
        assert_eq!(t.ocr, 103);
        assert_eq!(t.tcnt_start, 206);
        assert_eq!(t.bit_cycles(), 832);
        assert_eq!(t.actual_baud(), 9615);
        // 1.5 bits minus the latency compensation.
        assert_eq!(t.first_sample_ticks(), 104 + 52 - 2);
        assert_eq!(t.first_sample_cycles(), 1232);
    }

    #[test]
    fn test_16mhz_19200() {
        let t = BitTiming::new(16_000_000, 19_200).unwrap();
        assert_eq!(t.prescaler, Prescaler::Div8);
        assert_eq!(t.ocr, 103);
        assert_eq!(t.tcnt_start, 206);
    }

    #[test]
    fn test_prescaler_selection() {
        // 167 cycles per bit fit without prescaler.
        let t = BitTiming::new(8_000_000, 48_000).unwrap();
        assert_eq!(t.prescaler, Prescaler::Div1);
        assert_eq!(t.bit_ticks, 167);
        assert!(t.tcnt_start > t.ocr);

        // 1.5 bits would not fit the counter at Div1.
        let t = BitTiming::new(8_000_000, 38_400).unwrap();
        assert_eq!(t.prescaler, Prescaler::Div8);
        assert_eq!(t.bit_ticks, 26);

        // 208 ticks at Div256 leave no room for the start offset.
        let t = BitTiming::new(16_000_000, 300).unwrap();
        assert_eq!(t.prescaler, Prescaler::Div1024);
        assert_eq!(t.bit_ticks, 52);
        assert_eq!(t.tcnt_start, 230);
        assert_eq!(t.actual_baud(), 300);
    }

    #[test]
    fn test_errors() {
        assert_eq!(BitTiming::new(8_000_000, 0), Err(TimingError::ZeroBaud));
        assert_eq!(
            BitTiming::new(8_000_000, 115_200),
            Err(TimingError::BaudTooHigh)
        );
        assert_eq!(BitTiming::new(16_000_000, 10), Err(TimingError::BaudTooLow));
        // 1 MHz / 4800 baud = 208 cycles. Div1 doesn't leave room for the
        // start offset and Div8 rounds 26.04 ticks to 26, which is fine.
        assert!(BitTiming::new(1_000_000, 4800).is_ok());
        // 188 cycles per bit need Div8, which rounds 23.5 ticks to 24 (+2.1%).
        assert_eq!(
            BitTiming::new(1_880_000, 10_000),
            Err(TimingError::BaudMismatch)
        );
    }
}

// vim: ts=4 sw=4 expandtab
