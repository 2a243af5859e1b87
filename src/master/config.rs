/*!
    bus roster and driver settings, read from a TOML file

    ```toml
    port = "/dev/ttyUSB0"
    rate = 50
    firmware_version = 17
    fault_policy = "RE_ENABLE"

    [[boards]]
    id = 5

    [[boards.channels]]
    channel = "A"
    pos_p_gain = 60
    feedback = "ENCODER"

    [[boards.channels]]
    channel = "B"
    polarity = "FLIPPED"
    extra_pin = "ANALOG"
    ```
*/

use std::{
    collections::HashSet,
    format,
    path::Path,
    string::String,
    vec::Vec,
    };
use serde::{Deserialize, Serialize};

use crate::{
    command::{Channel, INVALID},
    parameters::*,
    };
use super::{
    Error, DriverConfig, DEFAULT_BAUD_RATE, DEFAULT_RATE, MINIMUM_FIRMWARE,
    board::Board,
    fault::{FaultPolicy, ResetPolicy},
    scheduler::Driver,
    transport::SerialTransport,
    };


/// error in a configuration file
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("cannot read configuration file")]
    Io(#[from] std::io::Error),
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// content of a configuration file
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BusConfig {
    /// serial port file
    pub port: Option<String>,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// cycle frequency in Hz
    #[serde(default = "default_rate")]
    pub rate: f32,
    /// minimum firmware version boards must report
    pub firmware_version: Option<u32>,
    /// firmware version from which shorter packets can be used
    pub compact_packets_from: Option<i32>,
    #[serde(default)]
    pub fault_policy: FaultPolicy,
    #[serde(default)]
    pub reset_policy: ResetPolicy,
    pub boards: Vec<BoardConfig>,
}
fn default_baud_rate() -> u32 {DEFAULT_BAUD_RATE}
fn default_rate() -> f32 {DEFAULT_RATE}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    pub id: u8,
    /// both channels must be given
    pub channels: Vec<ChannelConfig>,
}

/// initial parameters of a channel, board defaults apply to missing ones
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelConfig {
    pub channel: Channel,
    pub pos_p_gain: Option<i32>,
    pub pos_i_gain: Option<i32>,
    pub pos_d_gain: Option<i32>,
    pub pos_downscale: Option<i32>,
    pub vel_p_gain: Option<i32>,
    pub vel_i_gain: Option<i32>,
    pub vel_d_gain: Option<i32>,
    pub vel_downscale: Option<i32>,
    pub vel_time_delta: Option<i32>,
    pub max_velocity: Option<i32>,
    pub max_acceleration: Option<i32>,
    pub slow_enable_const: Option<i32>,
    pub polarity: Option<Polarity>,
    pub feedback: Option<FeedbackMode>,
    pub control: Option<ControlMode>,
    pub stream: Option<StreamMode>,
    pub extra_pin: Option<ExtraPinMode>,
}

impl BusConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::parse(&std::fs::read_to_string(path)?)
    }
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// the roster of boards with their initial parameters
    pub fn boards(&self) -> Result<Vec<Board>, ConfigError> {
        let mut ids = HashSet::new();
        let mut boards = Vec::with_capacity(self.boards.len());
        for config in &self.boards {
            if config.id > INVALID
                {return Err(ConfigError::Invalid(format!("board id {} is not in 0 ..= {}", config.id, INVALID)))}
            if !ids.insert(config.id)
                {return Err(ConfigError::Invalid(format!("board id {} is given twice", config.id)))}
            let board = Board::new(config.id)
                .map_err(|_| ConfigError::Invalid(format!("board id {} is not valid", config.id)))?;
            for channel in Channel::ALL {
                let mut found = config.channels.iter().filter(|c| c.channel == channel);
                match (found.next(), found.next()) {
                    (Some(parameters), None) => parameters.apply(&board)
                        .map_err(|_| ConfigError::Invalid(format!("board {} channel {:?} has a value out of range", config.id, channel)))?,
                    _ => return Err(ConfigError::Invalid(format!("board {} must have exactly one channel {:?}", config.id, channel))),
                }
            }
            boards.push(board);
        }
        if boards.is_empty()
            {return Err(ConfigError::Invalid(String::from("no board given")))}
        Ok(boards)
    }

    /// settings of the driver
    pub fn driver(&self) -> DriverConfig {
        DriverConfig {
            rate: self.rate,
            minimum_firmware: self.firmware_version.unwrap_or(MINIMUM_FIRMWARE),
            compact_packets_from: self.compact_packets_from,
            fault_policy: self.fault_policy,
            reset_policy: self.reset_policy,
            .. DriverConfig::default()
        }
    }

    /// open the serial port and create the driver of all the boards
    pub fn open(&self) -> Result<Driver<SerialTransport>, Error> {
        let port = self.port.as_ref()
            .ok_or_else(|| ConfigError::Invalid(String::from("no serial port given")))?;
        Driver::new(SerialTransport::open(port, self.baud_rate)?, self.boards()?, self.driver())
    }
}

impl ChannelConfig {
    fn apply(&self, board: &Board) -> Result<(), Error> {
        let channel = self.channel;
        let values = [
            (Parameter::PosPGain, self.pos_p_gain),
            (Parameter::PosIGain, self.pos_i_gain),
            (Parameter::PosDGain, self.pos_d_gain),
            (Parameter::PosDownscale, self.pos_downscale),
            (Parameter::VelPGain, self.vel_p_gain),
            (Parameter::VelIGain, self.vel_i_gain),
            (Parameter::VelDGain, self.vel_d_gain),
            (Parameter::VelDownscale, self.vel_downscale),
            (Parameter::VelTimeDelta, self.vel_time_delta),
            (Parameter::MaxVelocity, self.max_velocity),
            (Parameter::MaxAcceleration, self.max_acceleration),
            (Parameter::SlowEnableConst, self.slow_enable_const),
            (Parameter::Polarity, self.polarity.map(Polarity::value)),
            (Parameter::FeedbackMode, self.feedback.map(FeedbackMode::value)),
            (Parameter::ControlMode, self.control.map(ControlMode::value)),
            (Parameter::StreamMode, self.stream.map(StreamMode::value)),
            (Parameter::ExtraPinMode, self.extra_pin.map(ExtraPinMode::value)),
            ];
        for (parameter, value) in values {
            if let Some(value) = value
                {board.set(channel, parameter, value)?}
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
        port = "/dev/ttyUSB0"
        firmware_version = 17
        fault_policy = "RE_ENABLE"

        [[boards]]
        id = 5
        [[boards.channels]]
        channel = "A"
        pos_p_gain = 60
        feedback = "POT"
        [[boards.channels]]
        channel = "B"
        polarity = "FLIPPED"
        extra_pin = "ANALOG"

        [[boards]]
        id = 7
        [[boards.channels]]
        channel = "B"
        [[boards.channels]]
        channel = "A"
    "#;

    #[test]
    fn example() {
        let config = BusConfig::parse(EXAMPLE).unwrap();
        assert_eq!(config.baud_rate, 115_200);
        assert_eq!(config.rate, 50.);

        let boards = config.boards().unwrap();
        assert_eq!(boards.len(), 2);
        assert_eq!(boards[0].get(Channel::A, Parameter::PosPGain), 60);
        assert_eq!(boards[0].feedback_mode(Channel::A), FeedbackMode::Pot);
        assert_eq!(boards[0].polarity(Channel::B), Polarity::Flipped);
        assert_eq!(boards[0].extra_pin_mode(Channel::B), ExtraPinMode::Analog);
        assert_eq!(boards[1].get(Channel::B, Parameter::PosPGain), 50);

        let driver = config.driver();
        assert_eq!(driver.minimum_firmware, 17);
        assert_eq!(driver.fault_policy, FaultPolicy::ReEnable);
        assert_eq!(driver.reset_policy, ResetPolicy::ResendEnabled);
    }

    #[test]
    fn refuses_bad_rosters() {
        let duplicate = r#"
            [[boards]]
            id = 1
            channels = [{channel = "A"}, {channel = "B"}]
            [[boards]]
            id = 1
            channels = [{channel = "A"}, {channel = "B"}]
        "#;
        assert!(matches!(BusConfig::parse(duplicate).unwrap().boards(), Err(ConfigError::Invalid(_))));

        let missing = r#"
            [[boards]]
            id = 1
            channels = [{channel = "A"}]
        "#;
        assert!(matches!(BusConfig::parse(missing).unwrap().boards(), Err(ConfigError::Invalid(_))));

        let range = r#"
            [[boards]]
            id = 127
            channels = [{channel = "A"}, {channel = "B"}]
        "#;
        assert!(matches!(BusConfig::parse(range).unwrap().boards(), Err(ConfigError::Invalid(_))));

        let gain = r#"
            [[boards]]
            id = 1
            channels = [{channel = "A", vel_time_delta = 1}, {channel = "B"}]
        "#;
        assert!(matches!(BusConfig::parse(gain).unwrap().boards(), Err(ConfigError::Invalid(_))));

        assert!(matches!(BusConfig::parse("boards = 3"), Err(ConfigError::Parse(_))));
        assert!(matches!(BusConfig::parse("[[boards]]\nid = 1\nchannels = []\nspeed = 2"), Err(ConfigError::Parse(_))));
    }
}
