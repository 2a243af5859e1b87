use log::*;

use crate::{
    command::{Channel, Command},
    parameters::{BoardError, FeedbackMode, Parameter},
    };
use super::{
    board::Board,
    encoder::Request,
    scheduler::Driver,
    };


/// reaction to a board disabling a channel on its own because of a fault
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FaultPolicy {
    /// only notify the disabled handlers
    #[default]
    DoNothing,
    /// enable the channel again if it is meant to be enabled
    ReEnable,
}

/// reaction to a board reporting it was reset
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResetPolicy {
    /// send the enable state along with the rest of the configuration, so a channel meant to be enabled is enabled again
    #[default]
    ResendEnabled,
    /// consider the channel disabled and notify the disabled handlers
    Disable,
}


impl<T> Driver<T> {
    /// react to an error reported by a board, and count it
    pub(super) fn board_error(&self, board: &Board, channel: Channel, error: BoardError) {
        error!("board {} channel {:?} reports {:?}", board.id(), channel, error);
        match error {
            BoardError::Fault => match self.fault_policy() {
                FaultPolicy::DoNothing => self.notify_disabled(board, channel),
                FaultPolicy::ReEnable => self.re_enable(board, channel),
            },
            // a fault message may have been lost, the channel cannot be told
            BoardError::MessageBufferOverflow => if self.fault_policy() == FaultPolicy::ReEnable {
                for channel in Channel::ALL {
                    self.re_enable(board, channel);
                }
            },
            BoardError::ParamChangeWhileEnabled => {
                board.set_enabled(channel, false);
                self.notify_disabled(board, channel);
            },
            BoardError::TimeoutDisable => {
                for channel in Channel::ALL {
                    board.set_enabled(channel, false);
                    self.notify_disabled(board, channel);
                }
            },
            BoardError::Uninitialized => self.reset(board, channel),
            _ => {},
        }
        board.increase_error_count(error, channel);
    }

    /// the board lost its configuration, send it again
    fn reset(&self, board: &Board, channel: Channel) {
        match self.config.reset_policy {
            ResetPolicy::ResendEnabled => {
                info!("board {} channel {:?} was reset, sending configuration again with enabled {}",
                    board.id(), channel, board.enabled(channel));
            },
            ResetPolicy::Disable => {
                if board.enabled(channel)
                    {self.notify_disabled(board, channel)}
                board.set_enabled(channel, false);
            },
        }
        if self.config.resend_ticks_on_reset && board.feedback_mode(channel) == FeedbackMode::Encoder {
            let tick = board.get(channel, Parameter::ActualTick);
            info!("board {} channel {:?} was reset, restoring encoder position {}", board.id(), channel, tick);
            self.queue(Request {
                board: Some(board.id()),
                channel,
                command: Command::ActualEncoderOffset,
                expects_response: false,
                value: tick,
            });
        }
        board.clear_in_use(channel);
    }

    /// enable a channel again if it is meant to be enabled
    fn re_enable(&self, board: &Board, channel: Channel) {
        if !board.enabled(channel)
            {return}
        info!("enabling board {} channel {:?} again", board.id(), channel);
        self.queue(Request {
            board: Some(board.id()),
            channel,
            command: Command::Enable,
            expects_response: false,
            value: 1,
        });
    }

    fn notify_disabled(&self, board: &Board, channel: Channel) {
        self.disabled.blocking_lock().push((board.id(), channel));
    }
}
