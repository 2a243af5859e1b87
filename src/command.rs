/*!
    wire level vocabulary of the bus: command codes, their payload sizes and the two trailer bytes closing every packet
*/

use bilge::prelude::*;
use packbytes::{FromBytes, ToBytes};

use crate::pack_bits;


/// board id addressing every board at once
pub const BROADCAST: u8 = 127;
/// board id never assigned to a real board
pub const INVALID: u8 = 126;

/// one of the two independent motor channels of a board
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "master", derive(serde::Deserialize, serde::Serialize))]
pub enum Channel {
    A = 0,
    B = 1,
}
impl Channel {
    pub const ALL: [Channel; 2] = [Channel::A, Channel::B];

    pub const fn index(self) -> usize {self as usize}
    /// channel designated by the selector bit of an id byte
    pub const fn from_selector(selector: bool) -> Self {
        if selector {Channel::B} else {Channel::A}
    }
    pub const fn selector(self) -> bool {
        matches!(self, Channel::B)
    }
    /// channel alternating on each tick
    pub const fn alternate(tick: u64) -> Self {
        Self::from_selector(tick % 2 == 1)
    }
}

/// number of payload bytes following a command on the wire
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataSize {
    Zero,
    U08,
    S32,
    DoubleS32,
}
impl DataSize {
    pub const fn bytes(self) -> usize {
        match self {
            DataSize::Zero => 0,
            DataSize::U08 => 1,
            DataSize::S32 => 4,
            DataSize::DoubleS32 => 8,
        }
    }
}

/// command identifiers understood by the boards
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Id = 0,

    PosPGain = 1,
    PosIGain = 2,
    PosDGain = 3,
    MaxVelocity = 4,

    Enable = 6,
    Polarity = 7,
    FeedbackMode = 8,
    ControlMode = 9,

    TargetTick = 10,
    ActualTick = 11,
    MotorCurrent = 12,

    /// targets for both channels, motor current of one channel back
    TwoTargetTickMotorCurrent = 13,
    /// targets for both channels, actual tick of one channel back
    TwoTargetTickActual = 15,

    EmptyResponse = 17,
    Error = 18,
    PidOutput = 19,

    PosDownscale = 21,

    // firmware >= 1
    EncoderValue = 22,
    PotValue = 23,
    FirmwareVersion = 24,
    // firmware >= 2
    MaxPwmDutyCycle = 25,
    // firmware >= 6
    SlowEnableConst = 26,
    Debug = 27,
    // firmware >= 9
    ActualEncoderOffset = 28,
    // firmware >= 11
    Saturation = 29,
    IComponent = 30,
    // firmware >= 14
    /// pull a message the board announced with the has-message flag
    RequestMessage = 31,
    ExtraPinMode = 32,
    ExtraPinValue = 33,
    TwoTargetTickVelocity = 34,
    // firmware >= 16
    ActualVelocity = 35,
    VelPGain = 36,
    VelIGain = 37,
    VelDGain = 38,
    VelDownscale = 39,
    MaxAcceleration = 40,
    VelTimeDelta = 41,
    StreamMode = 42,
    // firmware >= 17
    TwoTargetTickPot = 43,
    TwoTargetTickEncoder = 44,
    TwoTargetTickTwoActual = 45,
    TwoTargetTickTwoVelocity = 46,
    TwoTargetTickTwoMotorCurrent = 47,
    TwoTargetTickTwoPot = 48,
    TwoTargetTickTwoEncoder = 49,
    PidUpdatePeriod = 50,
}

impl Command {
    /// numeric id sent in the low 7 bits of the command byte
    pub const fn id(self) -> u8 {self as u8}

    /// declared payload size of this command
    pub const fn size(self) -> DataSize {
        use Command::*;
        match self {
            EmptyResponse | RequestMessage => DataSize::Zero,
            Id | Enable | Polarity | FeedbackMode | ControlMode | Error
            | PosDownscale | SlowEnableConst | Saturation | ExtraPinMode
            | VelDownscale | VelTimeDelta | StreamMode | PidUpdatePeriod
                => DataSize::U08,
            TwoTargetTickTwoActual | TwoTargetTickTwoVelocity | TwoTargetTickTwoMotorCurrent
            | TwoTargetTickTwoPot | TwoTargetTickTwoEncoder
                => DataSize::DoubleS32,
            _ => DataSize::S32,
        }
    }

    pub const fn from_id(id: u8) -> Option<Self> {
        use Command::*;
        Some(match id {
            0 => Id,
            1 => PosPGain,
            2 => PosIGain,
            3 => PosDGain,
            4 => MaxVelocity,
            6 => Enable,
            7 => Polarity,
            8 => FeedbackMode,
            9 => ControlMode,
            10 => TargetTick,
            11 => ActualTick,
            12 => MotorCurrent,
            13 => TwoTargetTickMotorCurrent,
            15 => TwoTargetTickActual,
            17 => EmptyResponse,
            18 => Error,
            19 => PidOutput,
            21 => PosDownscale,
            22 => EncoderValue,
            23 => PotValue,
            24 => FirmwareVersion,
            25 => MaxPwmDutyCycle,
            26 => SlowEnableConst,
            27 => Debug,
            28 => ActualEncoderOffset,
            29 => Saturation,
            30 => IComponent,
            31 => RequestMessage,
            32 => ExtraPinMode,
            33 => ExtraPinValue,
            34 => TwoTargetTickVelocity,
            35 => ActualVelocity,
            36 => VelPGain,
            37 => VelIGain,
            38 => VelDGain,
            39 => VelDownscale,
            40 => MaxAcceleration,
            41 => VelTimeDelta,
            42 => StreamMode,
            43 => TwoTargetTickPot,
            44 => TwoTargetTickEncoder,
            45 => TwoTargetTickTwoActual,
            46 => TwoTargetTickTwoVelocity,
            47 => TwoTargetTickTwoMotorCurrent,
            48 => TwoTargetTickTwoPot,
            49 => TwoTargetTickTwoEncoder,
            50 => PidUpdatePeriod,
            _ => return None,
        })
    }
}

/// command byte, second to last byte of a packet before the checksum
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq, Default)]
pub struct CommandByte {
    /// raw command id, see [Command]
    pub command: u7,
    /**
        - from host: the host requests a response and sends no payload
        - from board: the board has a queued message to be pulled with [Command::RequestMessage]
    */
    pub flag: bool,
}
pack_bits!(CommandByte);

/// id byte, last byte of a packet before the checksum
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, DebugBits, PartialEq, Default)]
pub struct IdByte {
    /// board id, 127 for broadcast
    pub board: u7,
    /// set to address channel B
    pub channel_b: bool,
}
pack_bits!(IdByte);

impl IdByte {
    pub fn address(board: u8, channel: Channel) -> Self {
        Self::new(u7::new(board & 0x7f), channel.selector())
    }
    pub fn channel(&self) -> Channel {
        Channel::from_selector(self.channel_b())
    }
}

/// the two bytes closing every packet, whatever its payload
#[derive(Copy, Clone, FromBytes, ToBytes, Debug, Default, PartialEq)]
pub struct Trailer {
    pub command: CommandByte,
    pub id: IdByte,
}

impl Trailer {
    pub fn new(command: u8, flag: bool, board: u8, channel: Channel) -> Self {
        Self {
            command: CommandByte::new(u7::new(command & 0x7f), flag),
            id: IdByte::address(board, channel),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_table_roundtrips_ids() {
        for id in 0 ..= 127 {
            if let Some(command) = Command::from_id(id) {
                assert_eq!(command.id(), id);
            }
        }
        assert_eq!(Command::from_id(5), None);
        assert_eq!(Command::from_id(14), None);
        assert_eq!(Command::from_id(51), None);
    }

    #[test]
    fn trailer_bits() {
        let trailer = Trailer::new(Command::FirmwareVersion.id(), true, 5, Channel::B);
        assert_eq!(trailer.to_le_bytes(), [24 | 0x80, 5 | 0x80]);

        let back = Trailer::from_le_bytes([Command::Error.id(), 0x85]);
        assert_eq!(back.command.command().value(), Command::Error.id());
        assert!(!back.command.flag());
        assert_eq!(back.id.board().value(), 5);
        assert_eq!(back.id.channel(), Channel::B);
    }

    #[test]
    fn sizes() {
        assert_eq!(Command::TwoTargetTickTwoActual.size().bytes(), 8);
        assert_eq!(Command::TwoTargetTickActual.size().bytes(), 4);
        assert_eq!(Command::Enable.size().bytes(), 1);
        assert_eq!(Command::EmptyResponse.size().bytes(), 0);
    }
}
