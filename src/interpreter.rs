//! # Interpreter
//!
//! Byte-stream entry point. Each byte is framed, and a completed frame is run
//! through the [`Controller`] before the next byte is looked at. Replies are
//! written as single LF-terminated lines.

use std::io::{self, Write};

use crate::channels::ChannelBank;
use crate::config::DeviceConfig;
use crate::controller::Controller;
use crate::error_queue::ErrorCode;
use crate::frame::{FrameAssembler, FrameEvent};

pub struct Interpreter {
    framer: FrameAssembler,
    controller: Controller,
}

impl Interpreter {
    pub fn new(controller: Controller) -> Self {
        Self {
            framer: FrameAssembler::new(),
            controller,
        }
    }

    /// An interpreter over simulated output lines.
    pub fn simulated(config: &DeviceConfig) -> Self {
        let channels = ChannelBank::simulated(config.channels.count, config.channels.polarity);
        Self::new(Controller::new(config.identity.clone(), channels))
    }

    pub fn with_framer(framer: FrameAssembler, controller: Controller) -> Self {
        Self { framer, controller }
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    /// Consumes one byte, returning the reply it produced, if any.
    pub fn push_byte(&mut self, byte: u8) -> Option<String> {
        match self.framer.push(byte)? {
            FrameEvent::Frame(frame) => self.controller.execute(&frame),
            FrameEvent::Overflow => {
                self.controller.push_error(ErrorCode::ExecutionError);
                None
            }
        }
    }

    /// Feeds a chunk of bytes, writing each reply to `out` as it is produced.
    pub fn feed<W: Write>(&mut self, bytes: &[u8], out: &mut W) -> io::Result<()> {
        for &byte in bytes {
            if let Some(reply) = self.push_byte(byte) {
                out.write_all(reply.as_bytes())?;
                out.write_all(b"\n")?;
            }
        }
        out.flush()
    }

    /// Feeds a chunk of bytes and collects the replies.
    pub fn feed_collect(&mut self, bytes: &[u8]) -> Vec<String> {
        bytes.iter().filter_map(|&b| self.push_byte(b)).collect()
    }
}
