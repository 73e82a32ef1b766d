//! # Command Classifier
//!
//! Turns one completed frame into a [`Command`], then tokenizes its header into
//! a structured [`Header`] that the controller routes on.
//!
//! Keywords follow the SCPI convention: each node matches either its short form
//! (`SOUR`) or its long form (`SOURCE`), case-insensitively. A numeric suffix
//! on the first node selects a channel (`SOUR2`, `OUTPut3`).

use crate::error_queue::ErrorCode;

/// A classified command frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Text as received, trailing whitespace removed.
    pub raw: String,
    /// Upper-cased copy of `raw` used for keyword matching.
    pub normalized: String,
    pub is_query: bool,
    /// Original-case text after the first space, if any.
    pub parameter: Option<String>,
}

impl Command {
    /// Classifies a frame. Returns `None` when nothing but whitespace remains.
    pub fn classify(frame: &str) -> Option<Command> {
        let raw = frame.trim_end();
        if raw.is_empty() {
            return None;
        }

        let parameter = raw
            .split_once(' ')
            .map(|(_, rest)| rest.trim())
            .filter(|rest| !rest.is_empty())
            .map(String::from);

        Some(Command {
            raw: String::from(raw),
            normalized: raw.to_ascii_uppercase(),
            is_query: raw.ends_with('?'),
            parameter,
        })
    }

    /// `*`-prefixed IEEE-488.2 common command.
    pub fn is_common(&self) -> bool {
        self.normalized.starts_with('*')
    }

    /// The normalized header: text before the first whitespace, with a
    /// trailing `?` removed.
    pub fn header(&self) -> &str {
        let head = self
            .normalized
            .split(|c: char| c.is_ascii_whitespace())
            .next()
            .unwrap_or("");
        head.strip_suffix('?').unwrap_or(head)
    }

    /// First whitespace-delimited token of the parameter text.
    pub fn parameter_token(&self) -> Option<&str> {
        self.parameter
            .as_deref()
            .and_then(|rest| rest.split_whitespace().next())
    }
}

/// Top-level command families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    Source,
    Output,
    System,
    Status,
}

/// Second-level node under a subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leaf {
    /// The subsystem node was used on its own.
    Root,
    State,
    Error,
    Version,
}

const SUBSYSTEM_KEYWORDS: &[(&str, &str, Subsystem)] = &[
    ("SOUR", "SOURCE", Subsystem::Source),
    ("OUTP", "OUTPUT", Subsystem::Output),
    ("SYST", "SYSTEM", Subsystem::System),
    ("STAT", "STATUS", Subsystem::Status),
];

const LEAF_KEYWORDS: &[(&str, &str, Leaf)] = &[
    ("STAT", "STATE", Leaf::State),
    ("ERR", "ERROR", Leaf::Error),
    ("VERS", "VERSION", Leaf::Version),
];

fn lookup<T: Copy>(table: &[(&str, &str, T)], node: &str) -> Option<T> {
    table
        .iter()
        .find(|(short, long, _)| node == *short || node == *long)
        .map(|&(_, _, value)| value)
}

/// Channel suffix written after a subsystem keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Suffix {
    Absent,
    Number(usize),
    /// Digits present but too large to represent.
    Oversized,
}

/// A tokenized command header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    /// `*IDN`, `*RST`, ... (normalized, without `?`).
    Common(String),
    Program {
        subsystem: Subsystem,
        suffix: Suffix,
        leaf: Leaf,
    },
    /// Bare channel digit from the legacy protocol.
    LegacyToggle(usize),
    /// `ALL_OFF` / `ALLOFF`.
    AllOff,
}

impl Header {
    pub fn parse(command: &Command) -> Result<Header, ErrorCode> {
        let header = command.header();

        if command.is_common() {
            return Ok(Header::Common(String::from(header)));
        }
        if !command.is_query && (header == "ALL_OFF" || header == "ALLOFF") {
            return Ok(Header::AllOff);
        }
        if !command.is_query && header.len() == 1 {
            if let Some(digit) = header.chars().next().and_then(|c| c.to_digit(10)) {
                return Ok(Header::LegacyToggle(digit as usize));
            }
        }

        let mut nodes = header.split(':');
        let first = nodes.next().unwrap_or("");
        let keyword_end = first
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(first.len());
        let (keyword, digits) = first.split_at(keyword_end);

        let subsystem = match lookup(SUBSYSTEM_KEYWORDS, keyword) {
            Some(subsystem) => subsystem,
            // `SOURX`, `SOURC1`: a source header whose channel suffix is not a number.
            None if keyword.starts_with("SOUR") => return Err(ErrorCode::ParameterOutOfRange),
            None => return Err(ErrorCode::InvalidCommand),
        };
        let suffix = parse_suffix(digits)?;

        let leaf = match nodes.next() {
            None => Leaf::Root,
            Some(node) => lookup(LEAF_KEYWORDS, node).ok_or(ErrorCode::InvalidCommand)?,
        };
        if nodes.next().is_some() {
            return Err(ErrorCode::InvalidCommand);
        }

        Ok(Header::Program {
            subsystem,
            suffix,
            leaf,
        })
    }
}

fn parse_suffix(digits: &str) -> Result<Suffix, ErrorCode> {
    if digits.is_empty() {
        return Ok(Suffix::Absent);
    }
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ErrorCode::InvalidCommand);
    }
    Ok(digits
        .parse::<usize>()
        .map(Suffix::Number)
        .unwrap_or(Suffix::Oversized))
}

/// Parses a boolean parameter: `ON`/`1` or `OFF`/`0`, any case.
pub fn parse_bool(token: &str) -> Result<bool, ErrorCode> {
    if token.eq_ignore_ascii_case("ON") || token == "1" {
        Ok(true)
    } else if token.eq_ignore_ascii_case("OFF") || token == "0" {
        Ok(false)
    } else {
        Err(ErrorCode::InvalidParameter)
    }
}
