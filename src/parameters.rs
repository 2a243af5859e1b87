/*!
    channel parameters and the values they can take

    each parameter is a dense index into a channel's value table, with static metadata telling which command carries it on the wire and whether changing it must be forwarded to the board.
*/

use bilge::prelude::*;
use crate::command::Command;


/// a channel parameter
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Parameter {
    PosPGain,
    PosIGain,
    PosDGain,
    PosDownscale,
    VelPGain,
    VelIGain,
    VelDGain,
    VelDownscale,
    VelTimeDelta,
    MaxVelocity,
    MaxAcceleration,
    Polarity,
    FeedbackMode,
    ControlMode,
    StreamMode,
    SlowEnableConst,
    ExtraPinMode,
    PidUpdatePeriod,
    Enabled,

    TargetTick,
    ActualTick,
    ActualVelocity,
    MotorCurrent,
    ActualPot,
    ActualEncoder,
    ExtraPinValue,
}

impl Parameter {
    pub const COUNT: usize = 26;
    pub const ALL: [Parameter; Self::COUNT] = {
        use Parameter::*;
        [
            PosPGain, PosIGain, PosDGain, PosDownscale,
            VelPGain, VelIGain, VelDGain, VelDownscale, VelTimeDelta,
            MaxVelocity, MaxAcceleration,
            Polarity, FeedbackMode, ControlMode, StreamMode,
            SlowEnableConst, ExtraPinMode, PidUpdatePeriod, Enabled,
            TargetTick, ActualTick, ActualVelocity, MotorCurrent, ActualPot, ActualEncoder, ExtraPinValue,
        ]
    };

    pub const fn index(self) -> usize {self as usize}

    /// command carrying this parameter on the wire
    pub const fn command(self) -> Command {
        match self {
            Parameter::PosPGain => Command::PosPGain,
            Parameter::PosIGain => Command::PosIGain,
            Parameter::PosDGain => Command::PosDGain,
            Parameter::PosDownscale => Command::PosDownscale,
            Parameter::VelPGain => Command::VelPGain,
            Parameter::VelIGain => Command::VelIGain,
            Parameter::VelDGain => Command::VelDGain,
            Parameter::VelDownscale => Command::VelDownscale,
            Parameter::VelTimeDelta => Command::VelTimeDelta,
            Parameter::MaxVelocity => Command::MaxVelocity,
            Parameter::MaxAcceleration => Command::MaxAcceleration,
            Parameter::Polarity => Command::Polarity,
            Parameter::FeedbackMode => Command::FeedbackMode,
            Parameter::ControlMode => Command::ControlMode,
            Parameter::StreamMode => Command::StreamMode,
            Parameter::SlowEnableConst => Command::SlowEnableConst,
            Parameter::ExtraPinMode => Command::ExtraPinMode,
            Parameter::PidUpdatePeriod => Command::PidUpdatePeriod,
            Parameter::Enabled => Command::Enable,
            Parameter::TargetTick => Command::TargetTick,
            Parameter::ActualTick => Command::ActualTick,
            Parameter::ActualVelocity => Command::ActualVelocity,
            Parameter::MotorCurrent => Command::MotorCurrent,
            Parameter::ActualPot => Command::PotValue,
            Parameter::ActualEncoder => Command::EncoderValue,
            Parameter::ExtraPinValue => Command::ExtraPinValue,
        }
    }

    /**
        whether a change of this parameter must be sent to the board

        targets and telemetry are exchanged every tick by other means and never become dirty
    */
    pub const fn forwarded(self) -> bool {
        (self as usize) <= (Parameter::Enabled as usize)
    }
}


/// error reported by a board in an [Command::Error] packet
#[bitsize(8)]
#[derive(Copy, Clone, FromBits, Debug, PartialEq)]
pub enum BoardError {
    BadChecksum = 0,
    BadCommand = 1,
    /// the board was reset and lost its configuration
    Uninitialized = 2,
    BufferOverflow = 3,
    /// the board stopped hearing from the host and disabled both channels
    TimeoutDisable = 4,
    /// overcurrent or overheat, the bridge shut down
    Fault = 5,
    BadId = 6,
    PacketOverflow = 7,
    /// parameters changed while the bridge was enabled, the bridge was disabled
    ParamChangeWhileEnabled = 9,
    /// the board message queue overflowed, a message was lost
    MessageBufferOverflow = 10,
    /// not sent by boards, raised by the host when a board stays silent
    NoResponse = 255,
    #[fallback]
    Unrecognized = 254,
}

impl BoardError {
    /// number of error kinds that are counted
    pub const COUNT: usize = 11;
    pub const ALL: [BoardError; Self::COUNT] = [
        BoardError::BadChecksum,
        BoardError::BadCommand,
        BoardError::Uninitialized,
        BoardError::BufferOverflow,
        BoardError::TimeoutDisable,
        BoardError::Fault,
        BoardError::BadId,
        BoardError::PacketOverflow,
        BoardError::ParamChangeWhileEnabled,
        BoardError::MessageBufferOverflow,
        BoardError::NoResponse,
    ];

    /// channel specific errors are counted per channel, others once per board
    pub const fn channel_specific(self) -> bool {
        matches!(self,
            BoardError::Uninitialized
            | BoardError::Fault
            | BoardError::ParamChangeWhileEnabled)
    }
    /// slot in an error counter table, `None` for unrecognized codes
    pub const fn index(self) -> Option<usize> {
        Some(match self {
            BoardError::BadChecksum => 0,
            BoardError::BadCommand => 1,
            BoardError::Uninitialized => 2,
            BoardError::BufferOverflow => 3,
            BoardError::TimeoutDisable => 4,
            BoardError::Fault => 5,
            BoardError::BadId => 6,
            BoardError::PacketOverflow => 7,
            BoardError::ParamChangeWhileEnabled => 8,
            BoardError::MessageBufferOverflow => 9,
            BoardError::NoResponse => 10,
            BoardError::Unrecognized => return None,
        })
    }
}


/// declare an enumeration stored as an integer channel parameter
macro_rules! value_enum {
    (
        $(#[$attr:meta])*
        $name:ident {
            $( $(#[$vattr:meta])* $variant:ident = $value:literal ),* $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
        #[cfg_attr(feature = "master", derive(serde::Deserialize, serde::Serialize))]
        #[cfg_attr(feature = "master", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
        pub enum $name {
            $( $(#[$vattr])* $variant = $value ),*
        }
        impl $name {
            pub const fn value(self) -> i32 {self as i32}
            pub const fn from_value(value: i32) -> Option<Self> {
                match value {
                    $( $value => Some(Self::$variant), )*
                    _ => None,
                }
            }
        }
    };
}

value_enum!(
    /// direction of the motor relative to its feedback
    Polarity {
        #[default]
        Regular = 0,
        Flipped = 1,
    }
);
value_enum!(
    /// sensor closing the control loop
    FeedbackMode {
        #[default]
        Encoder = 0,
        Pot = 1,
    }
);
value_enum!(
    ControlMode {
        #[default]
        Position = 0,
        Velocity = 1,
        Mixed = 2,
    }
);
value_enum!(
    /// whether targets are streamed positions, in which case the board interpolates between them
    StreamMode {
        #[default]
        Off = 0,
        On = 1,
    }
);
value_enum!(
    /// function of the extra pin of a channel
    ExtraPinMode {
        #[default]
        Off = 0,
        /// digital input, read on request
        Switch = 1,
        /// analog input, read every tick the channel is polled
        Analog = 2,
        /// servo output, written every tick the channel is polled
        Servo = 3,
    }
);
