//! # Multi-Laser SCPI Controller Library
//!
//! This library contains the protocol interpreter for a multi-channel laser
//! TTL controller. It frames an incoming byte stream into commands, interprets
//! the SCPI / IEEE-488.2 command set, and drives a bank of boolean output
//! channels while guaranteeing that no two channels are ever ON together.
//!
//! Errors are reported asynchronously through a bounded error queue, read back
//! with `SYSTem:ERRor?`.
//!
//! ```
//! use multilaser::{DeviceConfig, Interpreter};
//!
//! let mut interpreter = Interpreter::simulated(&DeviceConfig::default());
//! let replies = interpreter.feed_collect(b"SOUR1:STAT ON;SOUR2:STAT ON;STAT?\n");
//! assert_eq!(replies, vec!["0,1,0"]);
//! ```

pub mod channels;
pub mod client;
pub mod command;
pub mod config;
pub mod controller;
pub mod error_queue;
pub mod frame;
pub mod interpreter;

pub use channels::{ChannelBank, Level, OutputLine, Polarity, SimulatedLine};
pub use client::{ClientError, LaserClient, LoopbackTransport};
pub use command::Command;
pub use config::{ConfigError, DeviceConfig, DeviceIdentity};
pub use controller::Controller;
pub use error_queue::{ErrorCode, ErrorQueue, ErrorRecord};
pub use frame::FrameAssembler;
pub use interpreter::Interpreter;
