use anyhow::{Context, Result};
use clap::Parser;
use multilaser::{DeviceConfig, Interpreter};
use std::io::{self, BufRead, Read, Write};
use std::path::PathBuf;
use std::time::Duration;

/// Multi-laser SCPI controller simulator
#[derive(Parser, Debug)]
#[command(name = "multilaser_sim")]
#[command(about = "Interactive simulator for the multi-laser SCPI controller")]
#[command(version)]
struct Args {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port to listen on; skips the menu
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Number of output channels
    #[arg(long)]
    channels: Option<usize>,
}

// The main entry point for the command-line simulator application.
fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DeviceConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => DeviceConfig::default(),
    };
    if let Some(port) = args.port {
        config.serial.port = Some(port);
    }
    if let Some(baud) = args.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(count) = args.channels {
        config.channels.count = count;
    }
    config.validate()?;

    println!("=====================================");
    println!("  Multi-Laser SCPI Controller Sim    ");
    println!("=====================================");

    let mut interpreter = Interpreter::simulated(&config);
    log::info!(
        "simulator started: {} channels, {:?}",
        config.channels.count,
        config.channels.polarity
    );

    if let Some(port_name) = config.serial.port.clone() {
        return run_serial_mode(&mut interpreter, &port_name, config.serial.baud_rate);
    }

    // Main menu loop.
    loop {
        println!("\nSelect mode:");
        println!("  1. Manual Command Input");
        println!("  2. Listen on Serial Port");
        println!("  3. Exit");
        let choice = prompt("> ")?;

        match choice.trim() {
            "1" => run_manual_mode(&mut interpreter)?,
            "2" => {
                if let Some(port_name) = select_port()? {
                    if let Err(e) =
                        run_serial_mode(&mut interpreter, &port_name, config.serial.baud_rate)
                    {
                        log::error!("{:#}", e);
                    }
                }
            }
            "3" => break,
            _ => log::error!("invalid choice, please enter 1, 2, or 3"),
        }
    }
    Ok(())
}

fn prompt(text: &str) -> Result<String> {
    print!("{}", text);
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input)
}

// Handles the manual command input mode. Each line is fed with its newline,
// so `;`-separated commands work as they would over the wire.
fn run_manual_mode(interpreter: &mut Interpreter) -> Result<()> {
    println!("\n--- Manual Mode ---");
    println!("Enter commands, or type 'back' to return to the main menu.");
    print!("> ");
    io::stdout().flush()?;

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let input = line?;
        if input.trim() == "back" {
            break;
        }

        for reply in interpreter.feed_collect(format!("{}\n", input).as_bytes()) {
            println!("< {}", reply);
        }
        let states = interpreter.controller().channels().states();
        log::debug!("channel states: {:?}", states);
        print!("> ");
        io::stdout().flush()?;
    }
    Ok(())
}

// Lists available serial ports and asks the user to pick one.
fn select_port() -> Result<Option<String>> {
    let ports = serialport::available_ports().context("could not enumerate serial ports")?;
    if ports.is_empty() {
        log::error!("no serial ports found");
        return Ok(None);
    }

    println!("Available serial ports:");
    for (i, port) in ports.iter().enumerate() {
        println!("  {}: {}", i, port.port_name);
    }

    let choice = prompt("Select a port (number): ")?;
    match choice.trim().parse::<usize>() {
        Ok(i) if i < ports.len() => Ok(Some(ports[i].port_name.clone())),
        _ => {
            log::error!("invalid port selection");
            Ok(None)
        }
    }
}

// Feeds every received byte to the interpreter and writes replies back.
fn run_serial_mode(
    interpreter: &mut Interpreter,
    port_name: &str,
    baud_rate: u32,
) -> Result<()> {
    println!("\n--- Serial Mode ---");
    let mut port = serialport::new(port_name, baud_rate)
        .data_bits(serialport::DataBits::Eight)
        .parity(serialport::Parity::None)
        .stop_bits(serialport::StopBits::One)
        .timeout(Duration::from_millis(10))
        .open()
        .with_context(|| format!("failed to open port '{}'", port_name))?;

    println!(
        "Listening on {} at {} baud. Press Ctrl+C to exit.",
        port_name, baud_rate
    );

    let mut serial_buf: Vec<u8> = vec![0; 128];
    loop {
        match port.read(serial_buf.as_mut_slice()) {
            Ok(bytes_read) => {
                for &byte in &serial_buf[..bytes_read] {
                    if let Some(reply) = interpreter.push_byte(byte) {
                        log::info!("< {}", reply);
                        let line = format!("{}\n", reply);
                        if let Err(e) = port.write_all(line.as_bytes()) {
                            log::error!("failed to write to serial port: {}", e);
                        }
                    }
                }
            }
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => (),
            Err(e) => {
                return Err(e).with_context(|| format!("lost serial port '{}'", port_name));
            }
        }
    }
}
