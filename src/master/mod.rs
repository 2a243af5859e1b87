/*!
    host side driver of the bus, in `std` environment

    The central resource is the [Driver] which owns the [Transport] and the roster of [Board]s. It has two execution contexts:

    - [Driver::run] is the timing critical loop, it must be running for anything to be exchanged with the boards. Each iteration receives and dispatches what boards sent, then sends either a parameter synchronization burst or the targets of every board, then the queued requests.
    - [Driver::update] is called from any other thread at the application's pace, it runs the user callbacks (responses, timeouts, board disabled notifications) so that user code never delays the bus.

    Boards state is read and written at any time through [Board], changes are forwarded to the boards by the running loop.
*/

/// per board, per channel state mirrored from the boards
mod board;
/// target generators advancing a channel's target every tick
mod trajectory;
/// packets sent to the boards
mod encoder;
/// packets received from the boards
mod dispatch;
/// matching responses to requests
mod correlator;
/// reactions to errors reported by boards
mod fault;
/// the cycle loop, this is the tricky part of the code
mod scheduler;
/// period correction of the cycle loop
mod pacing;
/// convenient methods to send requests and get notified
mod accessing;
/// serial link abstraction
pub mod transport;
/// loading of the bus roster from a file
pub mod config;


pub use board::Board;
pub use trajectory::{Trajectory, Motion, Step};
pub use encoder::{Request, Feedback, Outbound, UNCHANGED};
pub use correlator::{Key, Correlator, Response, Handler, IdHandler};
pub use fault::{FaultPolicy, ResetPolicy};
pub use scheduler::Driver;
pub use pacing::Pacer;
pub use accessing::{HandlerId, DisabledHandler};
pub use transport::{Transport, SerialTransport, NullTransport};
pub use config::{BusConfig, ConfigError};

use core::time::Duration;
use thiserror::Error;


/// error regarding the bus
#[derive(Error, Debug)]
pub enum Error {
    #[error("problem with serial bus")]
    Bus(std::io::Error),
    #[error("problem detected on host side: {0}")]
    Master(&'static str),
    #[error("board {board} reports firmware version {version}, at least {minimum} is required")]
    Firmware {board: u8, version: i32, minimum: u32},
    #[error("no response arrived in expected time")]
    Timeout,
    #[error("invalid configuration")]
    Config(#[from] config::ConfigError),
}
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Bus(error)
    }
}


/// no master packet is shorter than this when talking to older firmware, so the previously addressed board has time to answer before the next packet
pub const OLD_FIRMWARE_PACKET_SIZE: usize = 25;
/// minimum master packet size newer firmware can cope with
pub const NEW_FIRMWARE_PACKET_SIZE: usize = 17;
/// lowest firmware version the driver can talk to
pub const MINIMUM_FIRMWARE: u32 = 16;
/// firmware versions above this one support feedback of both channels in one packet
pub const DUAL_FEEDBACK_FIRMWARE: i32 = 16;
/// lowest firmware version understanding [UNCHANGED] targets, older boards are sent their absolute target every tick
pub const UNCHANGED_TARGET_FIRMWARE: i32 = 16;
pub const DEFAULT_RATE: f32 = 50.;
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// settings of a [Driver], fixed at construction
#[derive(Clone, Debug)]
pub struct DriverConfig {
    /// cycle frequency in Hz
    pub rate: f32,
    /// boards reporting a lower firmware version are refused
    pub minimum_firmware: u32,
    /// minimum size of any packet sent before firmware is confirmed
    pub packet_size: usize,
    /// once all boards report at least this firmware, [NEW_FIRMWARE_PACKET_SIZE] is used instead of `packet_size`
    pub compact_packets_from: Option<i32>,
    /// response handlers older than this are expired
    pub response_timeout: Duration,
    /// number of [Driver::update] calls between two sweeps of expired response handlers
    pub sweep_every: u64,
    /// period of the check for silent boards
    pub liveness_period: Duration,
    /// a board not heard from for this long is counted as not responding
    pub silence_threshold: Duration,
    pub fault_policy: FaultPolicy,
    pub reset_policy: ResetPolicy,
    /// on board reset, send the last known encoder position back as an offset
    pub resend_ticks_on_reset: bool,
}
impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            rate: DEFAULT_RATE,
            minimum_firmware: MINIMUM_FIRMWARE,
            packet_size: OLD_FIRMWARE_PACKET_SIZE,
            compact_packets_from: None,
            response_timeout: Duration::from_secs(1),
            sweep_every: 50,
            liveness_period: Duration::from_secs(1),
            silence_threshold: Duration::from_millis(500),
            fault_policy: FaultPolicy::DoNothing,
            reset_policy: ResetPolicy::ResendEnabled,
            resend_ticks_on_reset: true,
        }
    }
}
