// -*- coding: utf-8 -*-

#![forbid(unsafe_code)]

mod serial;
mod simulate;

use crate::{
    serial::{PortOpts, list_ports, send_break, send_bytes, send_random},
    simulate::{SimOpts, run_sim},
};
use anyhow as ah;
use clap::{Parser, Subcommand};

// Provide the std critical-section implementation for the simulated receiver.
use critical_section as _;

#[derive(Parser, Debug)]
struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run TEXT through the simulated receiver.
    Sim {
        #[command(flatten)]
        sim: SimOpts,

        text: String,
    },

    /// Send TEXT to the serial port.
    Send {
        #[command(flatten)]
        port: PortOpts,

        text: String,
    },

    /// Send COUNT random bytes back to back.
    Flood {
        #[command(flatten)]
        port: PortOpts,

        count: usize,
    },

    /// Hold the line low.
    Brk {
        #[command(flatten)]
        port: PortOpts,

        /// Break duration in milliseconds.
        #[arg(long, default_value_t = 10)]
        ms: u64,
    },

    /// List the available serial ports.
    Ports,
}

fn main() -> ah::Result<()> {
    let opts = Opts::parse();

    match opts.command {
        Command::Sim { sim, text } => run_sim(&sim, text.as_bytes()),
        Command::Send { port, text } => send_bytes(&port, text.as_bytes()),
        Command::Flood { port, count } => send_random(&port, count),
        Command::Brk { port, ms } => send_break(&port, ms),
        Command::Ports => list_ports(),
    }
}

// vim: ts=4 sw=4 expandtab
