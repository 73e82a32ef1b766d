//! # Controller
//!
//! The single owner of all interpreter state: the channel bank, the error
//! queue, the device identity and the operation-complete flag. Commands are
//! routed through two declarative tables, one for IEEE-488.2 common commands
//! and one keyed by `(subsystem, leaf)` for everything else.
//!
//! Errors never produce a reply. Any handler error is pushed onto the error
//! queue and the command yields no output.

use crate::channels::ChannelBank;
use crate::command::{parse_bool, Command, Header, Leaf, Subsystem, Suffix};
use crate::config::DeviceIdentity;
use crate::error_queue::{ErrorCode, ErrorQueue};

/// Reported by `SYSTem:VERSion?`.
pub const SCPI_VERSION: &str = "1999.0";

type Reply = Result<Option<String>, ErrorCode>;
type Handler = fn(&mut Controller, &Request) -> Reply;

/// What a handler gets to work with.
pub(crate) struct Request<'a> {
    command: &'a Command,
    /// Resolved 1-based channel, for routes that address one.
    channel: Option<usize>,
}

// A header with its optional query form and optional set form.
struct Route<K> {
    key: K,
    query: Option<Handler>,
    set: Option<Handler>,
}

#[rustfmt::skip]
const COMMON_ROUTES: &[Route<&str>] = &[
    Route { key: "*IDN", query: Some(Controller::identify), set: None },
    Route { key: "*RST", query: None, set: Some(Controller::reset_command) },
    Route { key: "*CLS", query: None, set: Some(Controller::clear_status) },
    Route { key: "*ESR", query: Some(Controller::event_status), set: None },
    Route { key: "*OPC", query: Some(Controller::operation_complete), set: Some(Controller::set_operation_complete) },
];

#[rustfmt::skip]
const SUBSYSTEM_ROUTES: &[Route<(Subsystem, Leaf)>] = &[
    Route { key: (Subsystem::Source, Leaf::State), query: Some(Controller::channel_state), set: Some(Controller::set_channel_state) },
    Route { key: (Subsystem::Output, Leaf::Root), query: Some(Controller::channel_state), set: Some(Controller::set_channel_state) },
    Route { key: (Subsystem::Output, Leaf::State), query: Some(Controller::channel_state), set: Some(Controller::set_channel_state) },
    Route { key: (Subsystem::System, Leaf::Error), query: Some(Controller::next_error), set: None },
    Route { key: (Subsystem::System, Leaf::Version), query: Some(Controller::version), set: None },
    Route { key: (Subsystem::Status, Leaf::Root), query: Some(Controller::status), set: None },
];

// How a subsystem treats the numeric suffix on its keyword.
enum ChannelRule {
    Required,
    DefaultsToFirst,
    Forbidden,
}

fn channel_rule(subsystem: Subsystem) -> ChannelRule {
    match subsystem {
        Subsystem::Source => ChannelRule::Required,
        Subsystem::Output => ChannelRule::DefaultsToFirst,
        Subsystem::System | Subsystem::Status => ChannelRule::Forbidden,
    }
}

fn invoke<K>(controller: &mut Controller, route: &Route<K>, request: &Request) -> Reply {
    let handler = if request.command.is_query {
        route.query.ok_or(ErrorCode::CommandOnly)?
    } else {
        route.set.ok_or(ErrorCode::QueryOnly)?
    };
    handler(controller, request)
}

fn flag(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

pub struct Controller {
    identity: DeviceIdentity,
    channels: ChannelBank,
    errors: ErrorQueue,
    operation_complete: bool,
}

impl Controller {
    pub fn new(identity: DeviceIdentity, channels: ChannelBank) -> Self {
        Self {
            identity,
            channels,
            errors: ErrorQueue::new(),
            operation_complete: true,
        }
    }

    pub fn channels(&self) -> &ChannelBank {
        &self.channels
    }

    pub fn errors(&self) -> &ErrorQueue {
        &self.errors
    }

    /// Queues an error raised outside command dispatch (e.g. frame overflow).
    pub fn push_error(&mut self, error: ErrorCode) {
        log::warn!("queued error {} ({})", error.code(), error);
        self.errors.push(error);
    }

    /// Interprets one completed frame and returns the reply line, if any.
    pub fn execute(&mut self, frame: &str) -> Option<String> {
        let command = Command::classify(frame)?;
        log::debug!("dispatch {:?}", command.raw);
        match self.dispatch(&command) {
            Ok(reply) => {
                if let Some(text) = &reply {
                    log::debug!("reply {:?}", text);
                }
                reply
            }
            Err(error) => {
                self.push_error(error);
                None
            }
        }
    }

    /// Returns channels to OFF, empties the error queue and sets the
    /// operation-complete flag.
    pub fn reset(&mut self) {
        self.channels.all_off();
        self.errors.clear();
        self.operation_complete = true;
        log::info!("device reset");
    }

    fn dispatch(&mut self, command: &Command) -> Reply {
        match Header::parse(command)? {
            Header::Common(header) => {
                let route = COMMON_ROUTES
                    .iter()
                    .find(|route| route.key == header)
                    .ok_or(ErrorCode::InvalidCommand)?;
                invoke(self, route, &Request { command, channel: None })
            }
            Header::Program {
                subsystem,
                suffix,
                leaf,
            } => {
                let channel = self.channel_for(subsystem, suffix)?;
                let route = SUBSYSTEM_ROUTES
                    .iter()
                    .find(|route| route.key == (subsystem, leaf))
                    .ok_or(ErrorCode::InvalidCommand)?;
                invoke(self, route, &Request { command, channel })
            }
            Header::LegacyToggle(index) => {
                if index == 0 || index > self.channels.len() {
                    return Err(ErrorCode::InvalidCommand);
                }
                self.channels.toggle_exclusive(index)?;
                Ok(None)
            }
            Header::AllOff => {
                self.channels.all_off();
                Ok(None)
            }
        }
    }

    fn channel_for(
        &self,
        subsystem: Subsystem,
        suffix: Suffix,
    ) -> Result<Option<usize>, ErrorCode> {
        let index = match (channel_rule(subsystem), suffix) {
            (ChannelRule::Forbidden, Suffix::Absent) => return Ok(None),
            (ChannelRule::Forbidden, _) => return Err(ErrorCode::InvalidCommand),
            (ChannelRule::DefaultsToFirst, Suffix::Absent) => 1,
            (ChannelRule::Required, Suffix::Absent) | (_, Suffix::Oversized) => {
                return Err(ErrorCode::ParameterOutOfRange)
            }
            (_, Suffix::Number(index)) => index,
        };
        self.channels.resolve(index)?;
        Ok(Some(index))
    }

    // --- Common commands ---

    fn identify(&mut self, _: &Request) -> Reply {
        let id = &self.identity;
        Ok(Some(format!(
            "{},{},{},{}",
            id.manufacturer, id.model, id.serial, id.firmware
        )))
    }

    fn reset_command(&mut self, _: &Request) -> Reply {
        self.reset();
        Ok(None)
    }

    fn clear_status(&mut self, _: &Request) -> Reply {
        self.errors.clear();
        Ok(None)
    }

    fn event_status(&mut self, _: &Request) -> Reply {
        Ok(Some(String::from("0")))
    }

    fn operation_complete(&mut self, _: &Request) -> Reply {
        Ok(Some(String::from(flag(self.operation_complete))))
    }

    fn set_operation_complete(&mut self, _: &Request) -> Reply {
        self.operation_complete = true;
        Ok(None)
    }

    // --- Subsystem commands ---

    fn channel_state(&mut self, request: &Request) -> Reply {
        let index = request.channel.ok_or(ErrorCode::ParameterOutOfRange)?;
        Ok(Some(String::from(flag(self.channels.get(index)?))))
    }

    fn set_channel_state(&mut self, request: &Request) -> Reply {
        let index = request.channel.ok_or(ErrorCode::ParameterOutOfRange)?;
        let token = request
            .command
            .parameter_token()
            .ok_or(ErrorCode::MissingParameter)?;
        let on = parse_bool(token)?;
        self.channels.set(index, on)?;
        Ok(None)
    }

    fn next_error(&mut self, _: &Request) -> Reply {
        Ok(Some(self.errors.pop().to_string()))
    }

    fn version(&mut self, _: &Request) -> Reply {
        Ok(Some(String::from(SCPI_VERSION)))
    }

    fn status(&mut self, _: &Request) -> Reply {
        let states: Vec<&str> = self.channels.states().into_iter().map(flag).collect();
        Ok(Some(states.join(",")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::Polarity;

    fn controller(count: usize) -> Controller {
        Controller::new(
            DeviceIdentity::default(),
            ChannelBank::simulated(count, Polarity::ActiveHigh),
        )
    }

    fn run(ctl: &mut Controller, frame: &str) -> Option<String> {
        ctl.execute(frame)
    }

    fn next_error(ctl: &mut Controller) -> String {
        run(ctl, "SYST:ERR?").unwrap()
    }

    // --- Tests for common commands ---

    #[test]
    fn identify_reports_identity() {
        let mut ctl = controller(3);
        assert_eq!(
            run(&mut ctl, "*IDN?"),
            Some(String::from("SAIL-Nexus,SAIL MultiLaser-TTL,00001,1.0.0-SCPI"))
        );
    }

    #[test]
    fn reset_turns_everything_off_and_clears_errors() {
        let mut ctl = controller(3);
        run(&mut ctl, "SOUR2:STAT ON");
        run(&mut ctl, "BOGUS");
        assert_eq!(run(&mut ctl, "*RST"), None);
        assert_eq!(ctl.channels().states(), vec![false, false, false]);
        assert!(ctl.errors().is_empty());
        assert_eq!(run(&mut ctl, "*RST"), None);
        assert_eq!(ctl.channels().states(), vec![false, false, false]);
        assert!(ctl.errors().is_empty());
    }

    #[test]
    fn clear_status_only_clears_errors() {
        let mut ctl = controller(3);
        run(&mut ctl, "SOUR1:STAT ON");
        run(&mut ctl, "BOGUS");
        run(&mut ctl, "*CLS");
        assert!(ctl.errors().is_empty());
        assert_eq!(ctl.channels().states(), vec![true, false, false]);
    }

    #[test]
    fn fixed_common_queries() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "*ESR?"), Some(String::from("0")));
        assert_eq!(run(&mut ctl, "*OPC?"), Some(String::from("1")));
        assert_eq!(run(&mut ctl, "*OPC"), None);
        assert_eq!(run(&mut ctl, "*opc?"), Some(String::from("1")));
    }

    #[test]
    fn command_only_headers_reject_queries() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "*RST?"), None);
        assert_eq!(run(&mut ctl, "*CLS?"), None);
        assert_eq!(next_error(&mut ctl), "-106,\"Command only\"");
        assert_eq!(next_error(&mut ctl), "-106,\"Command only\"");
    }

    #[test]
    fn query_only_headers_reject_set_form() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "*IDN"), None);
        assert_eq!(run(&mut ctl, "SYST:VERS"), None);
        assert_eq!(run(&mut ctl, "STAT"), None);
        for _ in 0..3 {
            assert_eq!(next_error(&mut ctl), "-105,\"Query only\"");
        }
    }

    #[test]
    fn unknown_common_command_is_invalid() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "*TRG"), None);
        assert_eq!(next_error(&mut ctl), "-100,\"Invalid command\"");
    }

    // --- Tests for SOURce and OUTPut ---

    #[test]
    fn source_state_round_trip() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "SOUR1:STAT ON"), None);
        assert_eq!(run(&mut ctl, "SOUR1:STAT?"), Some(String::from("1")));
        assert_eq!(run(&mut ctl, "SOURce1:STATe off"), None);
        assert_eq!(run(&mut ctl, "source1:state?"), Some(String::from("0")));
        assert_eq!(next_error(&mut ctl), "0,\"No error\"");
    }

    #[test]
    fn source_out_of_range_changes_nothing() {
        let mut ctl = controller(3);
        run(&mut ctl, "SOUR2:STAT ON");
        assert_eq!(run(&mut ctl, "SOUR5:STAT ON"), None);
        assert_eq!(ctl.channels().states(), vec![false, true, false]);
        assert_eq!(next_error(&mut ctl), "-104,\"Parameter out of range\"");
    }

    #[test]
    fn source_without_channel_is_out_of_range() {
        let mut ctl = controller(3);
        run(&mut ctl, "SOUR:STAT ON");
        run(&mut ctl, "SOUR0:STAT ON");
        assert_eq!(next_error(&mut ctl), "-104,\"Parameter out of range\"");
        assert_eq!(next_error(&mut ctl), "-104,\"Parameter out of range\"");
        assert_eq!(ctl.channels().states(), vec![false, false, false]);
    }

    #[test]
    fn source_with_letter_suffix_is_out_of_range() {
        let mut ctl = controller(3);
        run(&mut ctl, "SOUR1:STAT ON");
        assert_eq!(run(&mut ctl, "SOURX:STAT ON"), None);
        assert_eq!(run(&mut ctl, "SOURX:STAT?"), None);
        assert_eq!(next_error(&mut ctl), "-104,\"Parameter out of range\"");
        assert_eq!(next_error(&mut ctl), "-104,\"Parameter out of range\"");
        assert_eq!(ctl.channels().states(), vec![true, false, false]);
    }

    #[test]
    fn source_requires_state_leaf() {
        let mut ctl = controller(3);
        run(&mut ctl, "SOUR1 ON");
        assert_eq!(next_error(&mut ctl), "-100,\"Invalid command\"");
        // Channel is checked before the leaf.
        run(&mut ctl, "SOUR7 ON");
        assert_eq!(next_error(&mut ctl), "-104,\"Parameter out of range\"");
    }

    #[test]
    fn set_parameter_errors() {
        let mut ctl = controller(3);
        run(&mut ctl, "SOUR1:STAT");
        run(&mut ctl, "SOUR1:STAT MAYBE");
        assert_eq!(next_error(&mut ctl), "-103,\"Missing parameter\"");
        assert_eq!(next_error(&mut ctl), "-102,\"Invalid parameter\"");
        assert_eq!(ctl.channels().states(), vec![false, false, false]);
    }

    #[test]
    fn output_defaults_to_first_channel() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "OUTP ON"), None);
        assert_eq!(ctl.channels().states(), vec![true, false, false]);
        assert_eq!(run(&mut ctl, "OUTP?"), Some(String::from("1")));
        assert_eq!(run(&mut ctl, "OUTPut3:STATe 1"), None);
        assert_eq!(run(&mut ctl, "OUTP3:STAT?"), Some(String::from("1")));
        assert_eq!(run(&mut ctl, "outp1?"), Some(String::from("0")));
        assert_eq!(run(&mut ctl, "OUTP4 ON"), None);
        assert_eq!(next_error(&mut ctl), "-104,\"Parameter out of range\"");
    }

    #[test]
    fn set_on_keeps_channels_exclusive() {
        let mut ctl = controller(4);
        for index in 1..=4 {
            run(&mut ctl, &format!("SOUR{}:STAT ON", index));
            let states = ctl.channels().states();
            assert_eq!(states.iter().filter(|on| **on).count(), 1);
            assert!(states[index - 1]);
        }
    }

    // --- Tests for SYSTem and STATus ---

    #[test]
    fn status_lists_every_channel() {
        let mut ctl = controller(3);
        run(&mut ctl, "SOUR1:STAT ON");
        run(&mut ctl, "SOUR2:STAT ON");
        assert_eq!(run(&mut ctl, "STAT?"), Some(String::from("0,1,0")));
        assert_eq!(run(&mut ctl, "STATUS?"), Some(String::from("0,1,0")));
    }

    #[test]
    fn version_is_fixed() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "SYST:VERS?"), Some(String::from("1999.0")));
        assert_eq!(run(&mut ctl, "SYSTem:VERSion?"), Some(String::from("1999.0")));
    }

    #[test]
    fn system_rejects_channel_suffix() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "SYST2:ERR?"), None);
        assert_eq!(next_error(&mut ctl), "-100,\"Invalid command\"");
    }

    #[test]
    fn error_queue_drains_oldest_first() {
        let mut ctl = controller(3);
        run(&mut ctl, "NOPE");
        run(&mut ctl, "SOUR9:STAT ON");
        run(&mut ctl, "SOUR1:STAT");
        assert_eq!(
            run(&mut ctl, "SYSTem:ERRor?"),
            Some(String::from("-100,\"Invalid command\""))
        );
        assert_eq!(next_error(&mut ctl), "-104,\"Parameter out of range\"");
        assert_eq!(next_error(&mut ctl), "-103,\"Missing parameter\"");
        assert_eq!(next_error(&mut ctl), "0,\"No error\"");
    }

    // --- Tests for legacy commands ---

    #[test]
    fn legacy_digits_toggle_exclusively() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "1"), None);
        assert_eq!(ctl.channels().states(), vec![true, false, false]);
        run(&mut ctl, "3");
        assert_eq!(ctl.channels().states(), vec![false, false, true]);
        run(&mut ctl, "3");
        assert_eq!(ctl.channels().states(), vec![false, false, false]);
        assert!(ctl.errors().is_empty());
    }

    #[test]
    fn legacy_digit_beyond_channel_count_is_invalid() {
        let mut ctl = controller(2);
        run(&mut ctl, "3");
        run(&mut ctl, "0");
        assert_eq!(next_error(&mut ctl), "-100,\"Invalid command\"");
        assert_eq!(next_error(&mut ctl), "-100,\"Invalid command\"");
        assert_eq!(ctl.channels().states(), vec![false, false]);
    }

    #[test]
    fn all_off_forces_every_channel_off() {
        let mut ctl = controller(3);
        run(&mut ctl, "SOUR3:STAT ON");
        run(&mut ctl, "ALL_OFF");
        assert_eq!(ctl.channels().states(), vec![false, false, false]);
        run(&mut ctl, "2");
        run(&mut ctl, "alloff");
        assert_eq!(ctl.channels().states(), vec![false, false, false]);
    }

    #[test]
    fn all_on_is_not_supported() {
        let mut ctl = controller(3);
        run(&mut ctl, "ALL_ON");
        assert_eq!(ctl.channels().states(), vec![false, false, false]);
        assert_eq!(next_error(&mut ctl), "-100,\"Invalid command\"");
    }

    #[test]
    fn blank_frame_is_a_no_op() {
        let mut ctl = controller(3);
        assert_eq!(run(&mut ctl, "   "), None);
        assert!(ctl.errors().is_empty());
    }
}
