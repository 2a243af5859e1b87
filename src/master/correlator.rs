use core::time::Duration;
use std::{
    boxed::Box,
    collections::HashMap,
    time::Instant,
    vec::Vec,
    };

use crate::command::{Channel, Command};
use super::Error;


/// what a response answers to
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Key {
    pub command: Command,
    pub board: u8,
    pub channel: Channel,
}

/// value received from a board, waiting to be given to its handlers
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub key: Key,
    pub value: i32,
}

/// called once with the value answered, or with [Error::Timeout]
pub type Handler = Box<dyn FnOnce(Key, Result<i32, Error>) + Send>;
/// called once with the id of the board that answered, or with [Error::Timeout]
pub type IdHandler = Box<dyn FnOnce(Result<u8, Error>) + Send>;

struct Pending<H> {
    handler: H,
    since: Instant,
}

/**
    table of handlers waiting for a response

    several handlers can wait for the same [Key], they are all answered by the same response in the order they were registered. Responses to id requests are expected from a board whose id is unknown, so their handlers wait apart and are answered by any id response.

    handlers are returned to the caller rather than called, so no lock is held while they run
*/
#[derive(Default)]
pub struct Correlator {
    handlers: HashMap<Key, Vec<Pending<Handler>>>,
    id_handlers: Vec<Pending<IdHandler>>,
}

impl Correlator {
    pub fn new() -> Self {Self::default()}

    pub fn register(&mut self, key: Key, handler: Handler, now: Instant) {
        self.handlers.entry(key).or_default().push(Pending {handler, since: now});
    }
    pub fn register_id(&mut self, handler: IdHandler, now: Instant) {
        self.id_handlers.push(Pending {handler, since: now});
    }

    /// remove all handlers waiting for `key`, in registration order
    pub fn take(&mut self, key: &Key) -> Vec<Handler> {
        self.handlers.remove(key)
            .map(|pending| pending.into_iter().map(|pending| pending.handler).collect())
            .unwrap_or_default()
    }
    /// remove all handlers waiting for an id response
    pub fn take_id(&mut self) -> Vec<IdHandler> {
        self.id_handlers.drain(..).map(|pending| pending.handler).collect()
    }

    /// remove all handlers registered for longer than `timeout`
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> (Vec<(Key, Handler)>, Vec<IdHandler>) {
        let expired = |since: Instant| now.saturating_duration_since(since) > timeout;

        let mut handlers = Vec::new();
        self.handlers.retain(|&key, pending| {
            let (old, young): (Vec<_>, Vec<_>) = core::mem::take(pending)
                .into_iter()
                .partition(|p| expired(p.since));
            *pending = young;
            handlers.extend(old.into_iter().map(|p| (key, p.handler)));
            !pending.is_empty()
        });
        let (old, young): (Vec<_>, Vec<_>) = core::mem::take(&mut self.id_handlers)
            .into_iter()
            .partition(|p| expired(p.since));
        self.id_handlers = young;
        let id_handlers = old.into_iter().map(|p| p.handler).collect();
        (handlers, id_handlers)
    }

    /// whether a handler waits for a response to `key`
    pub fn waiting(&self, key: &Key) -> bool {
        if key.command == Command::Id
            {!self.id_handlers.is_empty()}
        else
            {self.handlers.contains_key(key)}
    }

    /// number of handlers waiting
    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum::<usize>() + self.id_handlers.len()
    }
    pub fn is_empty(&self) -> bool {self.len() == 0}
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn key(board: u8) -> Key {
        Key {command: Command::ActualTick, board, channel: Channel::A}
    }
    fn recorder(log: &Arc<Mutex<Vec<(usize, Option<i32>)>>>, tag: usize) -> Handler {
        let log = log.clone();
        Box::new(move |_, result| log.lock().unwrap().push((tag, result.ok())))
    }

    #[test]
    fn answers_all_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut correlator = Correlator::new();
        let now = Instant::now();
        for tag in 0 .. 3 {
            correlator.register(key(5), recorder(&log, tag), now);
        }
        correlator.register(key(6), recorder(&log, 9), now);

        for handler in correlator.take(&key(5)) {
            handler(key(5), Ok(42));
        }
        assert_eq!(*log.lock().unwrap(), [(0, Some(42)), (1, Some(42)), (2, Some(42))]);
        assert_eq!(correlator.len(), 1);
        // nothing waits for this one
        assert!(correlator.take(&key(5)).is_empty());
        assert!(correlator.take(&key(7)).is_empty());
        assert_eq!(correlator.len(), 1);
    }

    #[test]
    fn expires_once() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut correlator = Correlator::new();
        let start = Instant::now();
        let timeout = Duration::from_secs(1);
        correlator.register(key(5), recorder(&log, 0), start);
        correlator.register(key(5), recorder(&log, 1), start + Duration::from_millis(800));

        let (expired, ids) = correlator.expire(start + Duration::from_millis(900), timeout);
        assert!(expired.is_empty() && ids.is_empty());

        let (expired, _) = correlator.expire(start + Duration::from_millis(1500), timeout);
        assert_eq!(expired.len(), 1);
        for (key, handler) in expired {
            handler(key, Err(Error::Timeout));
        }
        assert_eq!(*log.lock().unwrap(), [(0, None)]);

        // the younger one is still matched normally
        for handler in correlator.take(&key(5)) {
            handler(key(5), Ok(1));
        }
        assert_eq!(*log.lock().unwrap(), [(0, None), (1, Some(1))]);
        assert!(correlator.is_empty());
    }

    #[test]
    fn id_handlers_apart() {
        let mut correlator = Correlator::new();
        let now = Instant::now();
        correlator.register_id(Box::new(|_| {}), now);
        correlator.register(key(1), Box::new(|_, _| {}), now);
        assert_eq!(correlator.take_id().len(), 1);
        assert_eq!(correlator.len(), 1);
        let (_, ids) = correlator.expire(now + Duration::from_secs(5), Duration::from_secs(1));
        assert!(ids.is_empty());
    }
}
