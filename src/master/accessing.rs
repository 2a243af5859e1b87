use core::{
    sync::atomic::Ordering::*,
    time::Duration,
    };
use std::{
    boxed::Box,
    time::Instant,
    vec::Vec,
    };
use log::*;

use crate::command::{Channel, Command, INVALID};
use super::{
    Error,
    board::Board,
    correlator::Key,
    encoder::Request,
    fault::FaultPolicy,
    scheduler::Driver,
    };


/// identifies a board disabled handler, to remove it
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

/// called when a board disabled one of its channels on its own
pub type DisabledHandler = Box<dyn FnMut(&Board, Channel) + Send>;

/// board disabled handlers, some of which may be running in [Driver::update]
#[derive(Default)]
pub(super) struct DisabledRegistry {
    handlers: Vec<(HandlerId, DisabledHandler)>,
    /// handlers taken out of `handlers` while they run
    running: Vec<HandlerId>,
    /// running handlers removed meanwhile, not to be restored
    removed: Vec<HandlerId>,
}


impl<T> Driver<T> {
    pub fn boards(&self) -> &[Board] {&self.boards}
    pub fn board(&self, id: u8) -> Option<&Board> {
        self.index.get(&id).map(|&index| &self.boards[index])
    }

    pub(super) fn queue(&self, request: Request) {
        self.requests.blocking_lock().push(request);
    }
    fn known(&self, board: u8) -> Result<(), Error> {
        if self.index.contains_key(&board)
            {Ok(())}
        else
            {Err(Error::Master("no such board on the bus"))}
    }

    /// send a value to a board at the next tick, regardless of what the board does with it
    pub fn send_request(&self, board: u8, channel: Channel, command: Command, value: i32) -> Result<(), Error> {
        self.known(board)?;
        self.queue(Request {board: Some(board), channel, command, expects_response: false, value});
        Ok(())
    }
    /**
        ask a board for a value

        `handler` is called once by [Self::update], with the value when the board answers, or with [Error::Timeout] if it does not answer in time
    */
    pub fn request_value(&self, board: u8, channel: Channel, command: Command,
        handler: impl FnOnce(Key, Result<i32, Error>) + Send + 'static,
        ) -> Result<(), Error>
    {
        self.known(board)?;
        let key = Key {command, board, channel};
        self.correlator.blocking_lock().register(key, Box::new(handler), Instant::now());
        self.queue(Request {board: Some(board), channel, command, expects_response: true, value: 0});
        Ok(())
    }
    /// send a value to all boards at once
    pub fn broadcast_request(&self, channel: Channel, command: Command, value: i32) {
        self.queue(Request {board: None, channel, command, expects_response: false, value});
    }
    /**
        ask the board on the bus for its id

        only one board must be connected, otherwise answers collide. `handler` is called by [Self::update] with the first id answered
    */
    pub fn query_id(&self, handler: impl FnOnce(Result<u8, Error>) + Send + 'static) {
        self.correlator.blocking_lock().register_id(Box::new(handler), Instant::now());
        self.queue(Request {
            board: None,
            channel: Channel::A,
            command: Command::Id,
            expects_response: true,
            value: 0,
        });
    }
    /// give a new id to the board on the bus, only one board must be connected
    pub fn assign_id(&self, id: u8) -> Result<(), Error> {
        if id >= INVALID
            {return Err(Error::Master("board id must be in 0 .. 126"))}
        warn!("assigning id {} to every board on the bus", id);
        self.broadcast_request(Channel::A, Command::Id, i32::from(id));
        Ok(())
    }

    pub fn fault_policy(&self) -> FaultPolicy {
        *self.fault_policy.blocking_lock()
    }
    pub fn set_fault_policy(&self, policy: FaultPolicy) {
        *self.fault_policy.blocking_lock() = policy;
    }
    pub fn minimum_firmware(&self) -> u32 {
        self.minimum_firmware.load(Relaxed)
    }
    /// raise the minimum firmware version boards must report, it cannot be lowered
    pub fn set_minimum_firmware(&self, version: u32) -> Result<(), Error> {
        self.minimum_firmware
            .fetch_update(Relaxed, Relaxed, |current| (version >= current).then_some(version))
            .map(|_| ())
            .map_err(|_| Error::Master("minimum firmware version cannot be lowered"))
    }

    /// register a handler called by [Self::update] when a board disabled one of its channels
    pub fn on_board_disabled(&self, handler: impl FnMut(&Board, Channel) + Send + 'static) -> HandlerId {
        let id = HandlerId(self.next_handler.fetch_add(1, Relaxed));
        self.disabled_handlers.blocking_lock().handlers.push((id, Box::new(handler)));
        id
    }
    /**
        remove a handler registered with [Self::on_board_disabled], return whether it was registered

        it can be called from any thread, including from a disabled handler. A running handler is not called again once removed
    */
    pub fn remove_board_disabled(&self, id: HandlerId) -> bool {
        let mut registry = self.disabled_handlers.blocking_lock();
        let before = registry.handlers.len();
        registry.handlers.retain(|(registered, _)| *registered != id);
        if registry.handlers.len() != before
            {return true}
        if registry.running.contains(&id) && !registry.removed.contains(&id) {
            registry.removed.push(id);
            return true
        }
        false
    }

    /**
        run the user callbacks: responses received, requests expired and channels disabled

        it is meant to be called periodically by the application, from any thread. No lock shared with the cycle loop is held while callbacks run
    */
    pub fn update(&self) {
        let count = self.updates.fetch_add(1, Relaxed) + 1;

        for response in self.responses.drain() {
            if response.key.command == Command::Id {
                let handlers = self.correlator.blocking_lock().take_id();
                for handler in handlers {
                    handler(Ok(response.value as u8));
                }
            }
            else {
                let handlers = self.correlator.blocking_lock().take(&response.key);
                for handler in handlers {
                    handler(response.key, Ok(response.value));
                }
            }
        }

        if count % self.config.sweep_every.max(1) == 0 {
            let (expired, expired_ids) = self.correlator.blocking_lock()
                .expire(Instant::now(), self.config.response_timeout);
            for (key, handler) in expired {
                warn!("no response to {:?} from board {} channel {:?}", key.command, key.board, key.channel);
                handler(key, Err(Error::Timeout));
            }
            for handler in expired_ids {
                warn!("no response to id request");
                handler(Err(Error::Timeout));
            }
        }

        let disabled = self.disabled.drain();
        if !disabled.is_empty() {
            // handlers are taken out, so they can register or remove handlers themselves
            let mut handlers = {
                let mut registry = self.disabled_handlers.blocking_lock();
                let handlers = core::mem::take(&mut registry.handlers);
                registry.running.extend(handlers.iter().map(|(id, _)| *id));
                handlers
            };
            let taken: Vec<HandlerId> = handlers.iter().map(|(id, _)| *id).collect();
            for (id, channel) in disabled {
                let Some(board) = self.board(id)
                    else {continue};
                for (handler_id, handler) in handlers.iter_mut() {
                    if self.disabled_handlers.blocking_lock().removed.contains(handler_id)
                        {continue}
                    handler(board, channel);
                }
            }
            let mut registry = self.disabled_handlers.blocking_lock();
            let DisabledRegistry {handlers: current, running, removed} = &mut *registry;
            handlers.retain(|(id, _)| !removed.contains(id));
            running.retain(|id| !taken.contains(id));
            removed.retain(|id| !taken.contains(id));
            handlers.append(current);
            *current = handlers;
        }
    }

    /// wait until all boards confirmed their firmware, running [Self::update] meanwhile
    pub async fn wait_initialized(&self, timeout: Duration) -> Result<(), Error> {
        let start = Instant::now();
        while !self.is_running() {
            if start.elapsed() > timeout
                {return Err(Error::Timeout)}
            self.update();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Ok(())
    }

    /// requests waiting for the next tick
    pub fn pending_requests(&self) -> Vec<Request> {
        self.requests.blocking_lock().clone()
    }
    /// channels disabled by their board and not yet notified
    pub fn pending_disabled(&self) -> Vec<(u8, Channel)> {
        self.disabled.blocking_lock().clone()
    }
}
