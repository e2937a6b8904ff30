// -*- coding: utf-8 -*-

use anyhow::{self as ah, Context as _};
use clap::Args;
use serialport::SerialPort;
use std::{thread, time::Duration};

#[derive(Args, Debug)]
pub struct PortOpts {
    /// Serial port device.
    #[arg(long, default_value = "/dev/ttyUSB0")]
    pub port: String,

    /// Baud rate. Must match the firmware.
    #[arg(long, default_value_t = 9600)]
    pub baud: u32,
}

fn open(opts: &PortOpts) -> ah::Result<Box<dyn SerialPort>> {
    serialport::new(&opts.port, opts.baud)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .flow_control(serialport::FlowControl::None)
        .stop_bits(serialport::StopBits::One)
        .timeout(Duration::from_millis(500))
        .open()
        .context("Open serial port")
}

pub fn send_bytes(opts: &PortOpts, data: &[u8]) -> ah::Result<()> {
    let mut serial = open(opts)?;
    serial.write_all(data).context("Serial port write")?;
    serial.flush().context("Serial port flush")?;
    println!("Sent {} bytes to {}.", data.len(), opts.port);
    Ok(())
}

pub fn send_random(opts: &PortOpts, count: usize) -> ah::Result<()> {
    let data: Vec<u8> = (0..count).map(|_| rand::random()).collect();
    send_bytes(opts, &data)
}

pub fn send_break(opts: &PortOpts, ms: u64) -> ah::Result<()> {
    let serial = open(opts)?;
    serial.set_break().context("Serial port set break")?;
    thread::sleep(Duration::from_millis(ms));
    serial.clear_break().context("Serial port clear break")?;
    println!("Sent {ms} ms break to {}.", opts.port);
    Ok(())
}

pub fn list_ports() -> ah::Result<()> {
    let ports = serialport::available_ports().context("Enumerate serial ports")?;
    if ports.is_empty() {
        eprintln!("No serial ports found.");
    }
    for p in ports {
        println!("{}: {:?}", p.port_name, p.port_type);
    }
    Ok(())
}

// vim: ts=4 sw=4 expandtab
