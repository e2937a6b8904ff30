// -*- coding: utf-8 -*-

use anyhow as ah;
use avr_usi_rx::{
    BitTiming, Frame, Receiver, RxStats,
    sim::{Sim, SimStats},
};
use clap::Args;

const QUEUE_SIZE: usize = 32;
const BREAK_BITS: u32 = 12;
const GARBLE_EVERY: usize = 4;

#[derive(Args, Debug)]
pub struct SimOpts {
    /// CPU clock frequency in Hz.
    #[arg(long, default_value_t = 8_000_000)]
    pub f_cpu: u32,

    /// Baud rate.
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,

    /// Transmitter clock deviation in 1/1000.
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    pub skew: i32,

    /// Drain the receive queue after every N frames. 0 drains only at the end.
    #[arg(long, default_value_t = 1)]
    pub drain_every: usize,

    /// Send a break after the text.
    #[arg(long)]
    pub break_after: bool,

    /// Send every 4th frame with a low stop bit.
    #[arg(long)]
    pub garble: bool,
}

fn print_frame(frame: Option<Frame>) {
    match frame {
        Some(Frame::Byte(_)) | None => (),
        Some(Frame::Overflow(b)) => eprintln!("queue overflow, dropped 0x{b:02X}"),
        Some(Frame::FramingError(b)) => eprintln!("framing error, rejected 0x{b:02X}"),
        Some(Frame::Break) => eprintln!("break"),
    }
}

fn drain(sim: &Sim<'_, QUEUE_SIZE>, received: &mut Vec<u8>) {
    while let Some(b) = sim.read() {
        received.push(b);
    }
}

pub struct SimResult {
    pub received: Vec<u8>,
    pub overflow: bool,
    pub rx_stats: RxStats,
    pub sim_stats: SimStats,
}

pub fn simulate(opts: &SimOpts, timing: BitTiming, text: &[u8]) -> SimResult {
    let rx: Receiver<QUEUE_SIZE> = Receiver::new(timing);
    let mut sim = Sim::new(&rx).with_skew(opts.skew);
    sim.begin();
    sim.idle(2);

    let mut received = Vec::with_capacity(text.len());
    for (i, &byte) in text.iter().enumerate() {
        let stop_high = !(opts.garble && i % GARBLE_EVERY == GARBLE_EVERY - 1);
        sim.send_frame(byte, stop_high);
        print_frame(sim.last_frame());
        if !stop_high {
            // Give the receiver an edge to resynchronize on.
            sim.idle(1);
        }
        if opts.drain_every > 0 && (i + 1) % opts.drain_every == 0 {
            drain(&sim, &mut received);
        }
    }
    sim.idle(2);
    if opts.break_after {
        sim.send_break(BREAK_BITS);
        sim.idle(2);
        print_frame(sim.last_frame());
    }
    drain(&sim, &mut received);

    SimResult {
        received,
        overflow: sim.overflow(),
        rx_stats: sim.rx_stats(),
        sim_stats: sim.stats(),
    }
}

pub fn run_sim(opts: &SimOpts, text: &[u8]) -> ah::Result<()> {
    let timing = BitTiming::new(opts.f_cpu, opts.baud).map_err(|e| {
        ah::format_err!("Bit timing for {} Hz / {} baud: {e:?}", opts.f_cpu, opts.baud)
    })?;
    println!(
        "Timing: prescaler {:?}, {} ticks per bit, OCR {}, TCNT start {}, actual baud {}",
        timing.prescaler,
        timing.bit_ticks,
        timing.ocr,
        timing.tcnt_start,
        timing.actual_baud(),
    );

    let res = simulate(opts, timing, text);

    println!("Received: {:?}", String::from_utf8_lossy(&res.received));
    println!("Raw: {:02X?}", res.received);
    println!("Overflow: {}", res.overflow);
    println!("{:?}", res.rx_stats);
    println!("{:?}", res.sim_stats);
    Ok(())
}


// vim: ts=4 sw=4 expandtab
