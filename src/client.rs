//! # Host Client
//!
//! Typed wrapper for driving a controller from the host side over any
//! `Read + Write` transport, usually a serial port. Commands go out
//! LF-terminated and queries read back one line.
//!
//! [`LoopbackTransport`] runs an [`Interpreter`] in process, so the client can
//! be exercised without hardware.

use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

use thiserror::Error;

use crate::interpreter::Interpreter;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("transport error: {0}")]
    Io(#[from] io::Error),
    #[error("channel {0} is not between 1 and {1}")]
    InvalidChannel(usize, usize),
    #[error("unexpected response {0:?}")]
    UnexpectedResponse(String),
}

/// Longest pause between turning everything off and the next channel on.
const SWITCH_SETTLE: Duration = Duration::from_millis(100);

pub struct LaserClient<T: Read + Write> {
    transport: T,
    channel_count: usize,
}

impl<T: Read + Write> LaserClient<T> {
    pub fn new(transport: T, channel_count: usize) -> Self {
        Self {
            transport,
            channel_count,
        }
    }

    /// Sends a command without waiting for a reply.
    pub fn write(&mut self, command: &str) -> Result<(), ClientError> {
        self.transport.write_all(command.as_bytes())?;
        self.transport.write_all(b"\n")?;
        self.transport.flush()?;
        log::debug!("sent: {}", command);
        Ok(())
    }

    /// Reads one reply line, without its terminator.
    pub fn read_line(&mut self) -> Result<String, ClientError> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.transport.read(&mut byte) {
                Ok(0) => {
                    return Err(ClientError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "transport closed before end of line",
                    )))
                }
                Ok(_) if byte[0] == b'\n' => break,
                Ok(_) => line.push(byte[0]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let text = String::from_utf8_lossy(&line).trim().to_string();
        log::debug!("received: {}", text);
        Ok(text)
    }

    pub fn query(&mut self, command: &str) -> Result<String, ClientError> {
        self.write(command)?;
        self.read_line()
    }

    pub fn identify(&mut self) -> Result<String, ClientError> {
        self.query("*IDN?")
    }

    /// Resets the device: every channel OFF and the error queue emptied.
    pub fn reset(&mut self) -> Result<(), ClientError> {
        self.write("*RST")
    }

    pub fn clear_status(&mut self) -> Result<(), ClientError> {
        self.write("*CLS")
    }

    pub fn scpi_version(&mut self) -> Result<String, ClientError> {
        self.query("SYST:VERS?")
    }

    pub fn operation_complete(&mut self) -> Result<bool, ClientError> {
        let reply = self.query("*OPC?")?;
        parse_flag(&reply)
    }

    pub fn set_channel(&mut self, channel: usize, on: bool) -> Result<(), ClientError> {
        self.check_channel(channel)?;
        let state = if on { "ON" } else { "OFF" };
        self.write(&format!("SOUR{}:STAT {}", channel, state))?;
        log::info!("channel {} set to {}", channel, state);
        Ok(())
    }

    pub fn channel_state(&mut self, channel: usize) -> Result<bool, ClientError> {
        self.check_channel(channel)?;
        let reply = self.query(&format!("SOUR{}:STAT?", channel))?;
        parse_flag(&reply)
    }

    /// Flips a channel with the legacy single-digit command.
    pub fn toggle(&mut self, channel: usize) -> Result<(), ClientError> {
        self.check_channel(channel)?;
        if channel > 9 {
            return Err(ClientError::InvalidChannel(channel, 9));
        }
        self.write(&channel.to_string())
    }

    pub fn all_off(&mut self) -> Result<(), ClientError> {
        self.write("ALL_OFF")?;
        log::info!("all channels turned off");
        Ok(())
    }

    pub fn all_states(&mut self) -> Result<Vec<bool>, ClientError> {
        let reply = self.query("STAT?")?;
        reply.split(',').map(|field| parse_flag(field.trim())).collect()
    }

    /// Pulses one channel `count` times, `duration` on then `duration` off,
    /// and leaves it in the state it started in.
    pub fn flash_channel(
        &mut self,
        channel: usize,
        count: usize,
        duration: Duration,
    ) -> Result<(), ClientError> {
        let was_on = self.channel_state(channel)?;
        for _ in 0..count {
            self.set_channel(channel, true)?;
            thread::sleep(duration);
            self.set_channel(channel, false)?;
            thread::sleep(duration);
        }
        if was_on {
            self.set_channel(channel, true)?;
        }
        log::info!("flashed channel {} {} times", channel, count);
        Ok(())
    }

    /// Steps through every channel in order, each one alone for `dwell`.
    /// Everything is OFF when the pattern finishes.
    pub fn sequential_pattern(
        &mut self,
        dwell: Duration,
        cycles: usize,
    ) -> Result<(), ClientError> {
        for cycle in 0..cycles {
            log::info!("sequential pattern cycle {}/{}", cycle + 1, cycles);
            for channel in 1..=self.channel_count {
                self.all_off()?;
                thread::sleep(dwell.min(SWITCH_SETTLE));
                self.set_channel(channel, true)?;
                thread::sleep(dwell);
            }
            self.all_off()?;
            if cycle + 1 < cycles {
                thread::sleep(dwell);
            }
        }
        Ok(())
    }

    /// Turns every channel OFF with `*RST`, which also empties the error queue.
    pub fn emergency_stop(&mut self) -> Result<(), ClientError> {
        self.reset()?;
        log::warn!("emergency stop: all channels off");
        Ok(())
    }

    /// Drains the device error queue, oldest first.
    pub fn check_errors(&mut self) -> Result<Vec<(i16, String)>, ClientError> {
        let mut errors = Vec::new();
        loop {
            let reply = self.query("SYST:ERR?")?;
            let (code, message) = parse_error_reply(&reply)?;
            if code == 0 {
                break;
            }
            log::warn!("device error {}: {}", code, message);
            errors.push((code, message));
        }
        Ok(errors)
    }

    /// Resets the device so every channel is left OFF, then hands back the transport.
    pub fn close(mut self) -> Result<T, ClientError> {
        self.reset()?;
        Ok(self.transport)
    }

    fn check_channel(&self, channel: usize) -> Result<(), ClientError> {
        if channel == 0 || channel > self.channel_count {
            return Err(ClientError::InvalidChannel(channel, self.channel_count));
        }
        Ok(())
    }
}

fn parse_flag(reply: &str) -> Result<bool, ClientError> {
    match reply {
        "1" => Ok(true),
        "0" => Ok(false),
        other => Err(ClientError::UnexpectedResponse(other.to_string())),
    }
}

// Splits `code,"message"`.
fn parse_error_reply(reply: &str) -> Result<(i16, String), ClientError> {
    let unexpected = || ClientError::UnexpectedResponse(reply.to_string());
    let (code, message) = reply.split_once(',').ok_or_else(unexpected)?;
    let code = code.trim().parse::<i16>().map_err(|_| unexpected())?;
    Ok((code, message.trim().trim_matches('"').to_string()))
}

/// In-process transport: written bytes go into an [`Interpreter`] and its
/// replies become readable.
pub struct LoopbackTransport {
    interpreter: Interpreter,
    pending: VecDeque<u8>,
}

impl LoopbackTransport {
    pub fn new(interpreter: Interpreter) -> Self {
        Self {
            interpreter,
            pending: VecDeque::new(),
        }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }
}

impl Write for LoopbackTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut replies = Vec::new();
        self.interpreter.feed(buf, &mut replies)?;
        self.pending.extend(replies);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Read for LoopbackTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut count = 0;
        while count < buf.len() {
            match self.pending.pop_front() {
                Some(byte) => {
                    buf[count] = byte;
                    count += 1;
                }
                None => break,
            }
        }
        Ok(count)
    }
}
