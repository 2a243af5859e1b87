use packbytes::ToBytes;
use std::vec::Vec;
use log::*;

use crate::{
    command::{Channel, Command, DataSize, Trailer, BROADCAST},
    codec::Frame,
    parameters::Parameter,
    };
use super::{Error, DUAL_FEEDBACK_FIRMWARE};


/// target value telling a board to keep its current target
pub const UNCHANGED: i32 = i32::MAX;

/// a request waiting to be sent to one board or to all of them
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Request {
    /// `None` for broadcast
    pub board: Option<u8>,
    pub channel: Channel,
    pub command: Command,
    /// ask the board for its value instead of writing `value`
    pub expects_response: bool,
    pub value: i32,
}

/// feedback quantity requested along with the targets of every tick
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Feedback {
    ActualTick,
    Velocity,
    MotorCurrent,
    Pot,
    Encoder,
    ActualTickTwo,
    VelocityTwo,
    MotorCurrentTwo,
    PotTwo,
    EncoderTwo,
}

impl Feedback {
    pub const fn command(self) -> Command {
        match self {
            Feedback::ActualTick => Command::TwoTargetTickActual,
            Feedback::Velocity => Command::TwoTargetTickVelocity,
            Feedback::MotorCurrent => Command::TwoTargetTickMotorCurrent,
            Feedback::Pot => Command::TwoTargetTickPot,
            Feedback::Encoder => Command::TwoTargetTickEncoder,
            Feedback::ActualTickTwo => Command::TwoTargetTickTwoActual,
            Feedback::VelocityTwo => Command::TwoTargetTickTwoVelocity,
            Feedback::MotorCurrentTwo => Command::TwoTargetTickTwoMotorCurrent,
            Feedback::PotTwo => Command::TwoTargetTickTwoPot,
            Feedback::EncoderTwo => Command::TwoTargetTickTwoEncoder,
        }
    }
    pub const fn from_command(command: Command) -> Option<Self> {
        Some(match command {
            Command::TwoTargetTickActual => Feedback::ActualTick,
            Command::TwoTargetTickVelocity => Feedback::Velocity,
            Command::TwoTargetTickMotorCurrent => Feedback::MotorCurrent,
            Command::TwoTargetTickPot => Feedback::Pot,
            Command::TwoTargetTickEncoder => Feedback::Encoder,
            Command::TwoTargetTickTwoActual => Feedback::ActualTickTwo,
            Command::TwoTargetTickTwoVelocity => Feedback::VelocityTwo,
            Command::TwoTargetTickTwoMotorCurrent => Feedback::MotorCurrentTwo,
            Command::TwoTargetTickTwoPot => Feedback::PotTwo,
            Command::TwoTargetTickTwoEncoder => Feedback::EncoderTwo,
            _ => return None,
        })
    }
    /// channel parameter receiving the feedback value
    pub const fn parameter(self) -> Parameter {
        match self {
            Feedback::ActualTick | Feedback::ActualTickTwo => Parameter::ActualTick,
            Feedback::Velocity | Feedback::VelocityTwo => Parameter::ActualVelocity,
            Feedback::MotorCurrent | Feedback::MotorCurrentTwo => Parameter::MotorCurrent,
            Feedback::Pot | Feedback::PotTwo => Parameter::ActualPot,
            Feedback::Encoder | Feedback::EncoderTwo => Parameter::ActualEncoder,
        }
    }
    /// whether the response carries the values of both channels
    pub const fn both(self) -> bool {
        matches!(self.command().size(), DataSize::DoubleS32)
    }

    /**
        feedback requested on successive ticks, depending on the lowest firmware version on the bus

        positions are requested much more often than currents
    */
    pub fn rotation(firmware: i32) -> Vec<Feedback> {
        let (position, current, repeat) =
            if firmware <= DUAL_FEEDBACK_FIRMWARE
                {(Feedback::ActualTick, Feedback::MotorCurrent, 10)}
            else
                {(Feedback::ActualTickTwo, Feedback::MotorCurrentTwo, 5)};
        let mut table = Vec::with_capacity(repeat + 2);
        table.extend(core::iter::repeat_n(position, repeat));
        table.push(current);
        if firmware <= DUAL_FEEDBACK_FIRMWARE
            {table.push(current)}
        table
    }
}

/// targets of both channels, sent every tick
#[derive(ToBytes)]
struct DualTarget {
    target_b: i32,
    target_a: i32,
}


/**
    transmit buffer of a tick

    packets are framed and padded as they are added, the whole is sent in one write
*/
pub struct Outbound {
    buffer: Vec<u8>,
    packet_size: usize,
}

impl Outbound {
    /// `packet_size` is the minimum size of every packet
    pub fn new(packet_size: usize) -> Self {
        Self {buffer: Vec::new(), packet_size}
    }
    pub fn packet_size(&self) -> usize {self.packet_size}
    pub fn set_packet_size(&mut self, packet_size: usize) {
        self.packet_size = packet_size;
    }
    pub fn as_bytes(&self) -> &[u8] {&self.buffer}
    pub fn is_empty(&self) -> bool {self.buffer.is_empty()}
    pub fn clear(&mut self) {self.buffer.clear()}

    fn frame(&mut self, payload: &[u8], trailer: Trailer) -> Result<(), Error> {
        let frame = Frame::encode(payload, trailer)
            .map_err(|_| Error::Master("packet payload too large"))?;
        self.buffer.resize(self.buffer.len() + frame.padding(self.packet_size), 0);
        self.buffer.extend_from_slice(frame.as_bytes());
        Ok(())
    }

    /// one command with one value, or a request for the board's value
    pub fn generic(&mut self, board: Option<u8>, channel: Channel, command: Command, expects_response: bool, value: i32) -> Result<(), Error> {
        let board = board.unwrap_or(BROADCAST);
        let trailer = Trailer::new(command.id(), expects_response, board, channel);
        if expects_response
            {return self.frame(&[], trailer)}
        match command.size() {
            // a new id is repeated in a pattern that cannot be mistaken with noise
            _ if command == Command::Id => {
                let id = value as u8;
                self.frame(&[id.wrapping_add(10), id, 3, 2, 1], trailer)
            },
            DataSize::Zero => self.frame(&[], trailer),
            DataSize::U08 => self.frame(&[value as u8], trailer),
            DataSize::S32 => self.frame(&value.to_le_bytes(), trailer),
            DataSize::DoubleS32 => Err(Error::Master("command cannot carry a single value")),
        }
    }
    pub fn request(&mut self, request: &Request) -> Result<(), Error> {
        self.generic(request.board, request.channel, request.command, request.expects_response, request.value)
    }

    /// targets of both channels, requesting `feedback` of `channel` back
    pub fn dual_target(&mut self, board: u8, channel: Channel, feedback: Feedback, target_a: i32, target_b: i32) -> Result<(), Error> {
        let payload = DualTarget {target_b, target_a}.to_le_bytes();
        self.frame(&payload, Trailer::new(feedback.command().id(), false, board, channel))
    }

    /**
        parameter synchronization burst of a channel

        every change but the enable state, then the enable state in any case, so the board is fully configured when enabled and leaves its initialization mode
    */
    pub fn parameters(&mut self, board: u8, channel: Channel, changes: &[(Command, i32)], enabled: i32) -> Result<(), Error> {
        debug!("synchronizing {} parameters of board {} channel {:?}", changes.len(), board, channel);
        for &(command, value) in changes.iter().filter(|(command, _)| *command != Command::Enable) {
            self.generic(Some(board), channel, command, false, value)?;
        }
        self.generic(Some(board), channel, Command::Enable, false, enabled)
    }
}
