use std::time::Instant;
use log::*;

use crate::{
    command::{Channel, Command, DataSize},
    codec::Packet,
    parameters::{BoardError, Parameter},
    };
use super::{
    Error,
    correlator::{Key, Response},
    encoder::{Feedback, Request},
    scheduler::{Driver, Cycle},
    };


impl<T> Driver<T> {
    /**
        process a packet received from a board

        return whether the packet came from a board of the roster. Only a firmware version below the minimum is an error, anything unexpected is logged and dropped
    */
    pub(super) fn dispatch(&self, cycle: &mut Cycle, packet: Packet, now: Instant) -> Result<bool, Error> {
        let id = packet.board();
        let channel = packet.channel();
        let Some(command) = packet.command() else {
            warn!("unknown command {} received from board {}", packet.command_id(), id);
            return Ok(false)
        };
        let Some(board) = self.board(id) else {
            // a board of unknown id answering an id request is expected
            if command == Command::Id {
                let value = packet.byte_from_back().map_or(i32::from(id), i32::from);
                self.respond(Key {command, board: id, channel}, value);
            }
            else
                {warn!("{:?} received from board {} which is not in the roster", command, id)}
            return Ok(false)
        };
        board.mark_received(now);
        trace!("received {:?} from board {} channel {:?}", command, id, channel);

        if packet.flag() {
            debug!("board {} channel {:?} has a message", id, channel);
            self.queue(Request {
                board: Some(id),
                channel,
                command: Command::RequestMessage,
                expects_response: true,
                value: 0,
            });
        }

        // telemetry of every tick
        if let Some(feedback) = Feedback::from_command(command) {
            if feedback.both() {
                if let (Some(a), Some(b)) = (packet.int_from_back(0), packet.int_from_back(1)) {
                    board.write(Channel::A, feedback.parameter(), a);
                    board.write(Channel::B, feedback.parameter(), b);
                }
            }
            else if let Some(value) = packet.int_from_back(0) {
                board.write(channel, feedback.parameter(), value);
            }
            return Ok(true)
        }

        let value = match command {
            Command::ActualTick => packet.int_from_back(0)
                .inspect(|&value| board.write(channel, Parameter::ActualTick, value)),
            Command::ExtraPinValue => packet.int_from_back(0)
                .inspect(|&value| board.write(channel, Parameter::ExtraPinValue, value)),
            Command::Debug => {
                info!("debug from board {} channel {:?}: {:?}", id, channel, packet.payload.as_slice());
                None
            },
            Command::EmptyResponse => None,
            Command::Error => {
                let error = packet.byte_from_back().map_or_else(|| {
                    warn!("error without code from board {}, assuming a fault", id);
                    BoardError::Fault
                    }, BoardError::from);
                self.board_error(board, channel, error);
                None
            },
            _ => match command.size() {
                DataSize::U08 => packet.byte_from_back().map(i32::from),
                DataSize::S32 => packet.int_from_back(0),
                _ => {
                    debug!("{:?} received from board {} without value", command, id);
                    None
                },
            },
        };
        if let Some(value) = value {
            if command == Command::FirmwareVersion
                {self.report_firmware(cycle, id, value)?}
            self.respond(Key {command, board: id, channel}, value);
        }
        Ok(true)
    }

    /// hand a value over to the handlers waiting for it, if any
    fn respond(&self, key: Key, value: i32) {
        if self.correlator.blocking_lock().waiting(&key)
            {self.responses.blocking_lock().push(Response {key, value})}
    }
}
