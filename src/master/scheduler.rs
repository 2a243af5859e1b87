use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering::*};
use std::{
    collections::HashMap,
    time::{Duration, Instant},
    vec::Vec,
    };
use log::*;

use crate::{
    command::{Channel, Command},
    codec::Decoder,
    mutex::BusyMutex,
    parameters::{BoardError, ExtraPinMode, Parameter},
    };
use super::{
    Error, DriverConfig, NEW_FIRMWARE_PACKET_SIZE, UNCHANGED_TARGET_FIRMWARE,
    board::Board,
    encoder::{Outbound, Request, Feedback, UNCHANGED},
    correlator::{Correlator, Response},
    accessing::DisabledRegistry,
    fault::FaultPolicy,
    pacing::Pacer,
    transport::Transport,
    };


/// window over which [Driver::update_rates] are measured
const RATE_WINDOW: Duration = Duration::from_secs(2);


/**
    driver of a bus of boards

    it is meant to be shared between the task calling [Self::run] and the rest of the application, typically in an `Arc`
*/
pub struct Driver<T> {
    pub(super) config: DriverConfig,
    pub(super) boards: Vec<Board>,
    /// position of each board id in `boards`
    pub(super) index: HashMap<u8, usize>,
    transport: BusyMutex<T>,
    /// state only touched by the cycle loop
    cycle: BusyMutex<Cycle>,

    /// requests to send at the next tick
    pub(super) requests: BusyMutex<Vec<Request>>,
    /// responses to give to their handlers at the next update
    pub(super) responses: BusyMutex<Vec<Response>>,
    pub(super) correlator: BusyMutex<Correlator>,
    /// channels disabled by their board, to notify at the next update
    pub(super) disabled: BusyMutex<Vec<(u8, Channel)>>,
    pub(super) disabled_handlers: BusyMutex<DisabledRegistry>,
    pub(super) next_handler: AtomicU64,

    pub(super) fault_policy: BusyMutex<FaultPolicy>,
    pub(super) minimum_firmware: AtomicU32,
    /// number of calls to [Self::update] so far
    pub(super) updates: AtomicU64,
    running: AtomicBool,
    bad_checksums: AtomicU32,
    /// rate of ticks and of ticks answered by any board, as `f32` bits
    rates: [AtomicU32; 2],
}

pub(super) struct Cycle {
    tick: u64,
    phase: Phase,
    decoder: Decoder,
    outbound: Outbound,
    /// feedback requested on successive ticks
    rotation: Vec<Feedback>,
    /// some board does not understand [UNCHANGED], so targets are always sent as they are
    absolute_targets: bool,
    last_liveness: Option<Instant>,
    monitor: RateMonitor,
}

enum Phase {
    /// only heartbeats and requests are sent until every board reported its firmware version
    AwaitingFirmware {
        reported: HashMap<u8, i32>,
        requested: Instant,
    },
    Running,
}

#[derive(Default)]
struct RateMonitor {
    since: Option<Instant>,
    ticks: u32,
    answered: u32,
}
impl RateMonitor {
    /// count a tick, return the rates when a window is complete
    fn record(&mut self, now: Instant, answered: bool) -> Option<[f32; 2]> {
        let since = *self.since.get_or_insert(now);
        self.ticks += 1;
        if answered
            {self.answered += 1}
        let elapsed = now.saturating_duration_since(since);
        if elapsed < RATE_WINDOW
            {return None}
        let seconds = elapsed.as_secs_f32();
        let rates = [self.ticks as f32 / seconds, self.answered as f32 / seconds];
        *self = Self {since: Some(now), ticks: 0, answered: 0};
        Some(rates)
    }
}


impl<T: Transport> Driver<T> {
    /**
        create a driver for the given boards on the given link

        nothing is sent until [Self::run] or [Self::tick] is called. The first ticks flush the boards' reception and ask for their firmware version
    */
    pub fn new(transport: T, boards: Vec<Board>, config: DriverConfig) -> Result<Self, Error> {
        if !transport.is_initialized()
            {return Err(Error::Master("transport is not initialized"))}
        if boards.is_empty()
            {return Err(Error::Master("no board to drive"))}
        if !(config.rate > 0.)
            {return Err(Error::Master("rate must be positive"))}
        let mut index = HashMap::new();
        for (i, board) in boards.iter().enumerate() {
            if index.insert(board.id(), i).is_some()
                {return Err(Error::Master("duplicate board id"))}
        }

        let mut requests = Vec::new();
        for (command, expects_response) in [(Command::EmptyResponse, false), (Command::FirmwareVersion, true)] {
            for board in &boards {
                requests.push(Request {
                    board: Some(board.id()),
                    channel: Channel::A,
                    command,
                    expects_response,
                    value: 0,
                });
            }
        }
        info!("waiting for boards {:?} to report their firmware version",
            boards.iter().map(Board::id).collect::<Vec<_>>());

        Ok(Self {
            transport: BusyMutex::new(transport),
            cycle: BusyMutex::new(Cycle {
                tick: 0,
                phase: Phase::AwaitingFirmware {
                    reported: HashMap::new(),
                    requested: Instant::now(),
                },
                decoder: Decoder::new(),
                outbound: Outbound::new(config.packet_size),
                rotation: Vec::new(),
                absolute_targets: false,
                last_liveness: None,
                monitor: RateMonitor::default(),
            }),
            requests: BusyMutex::new(requests),
            responses: BusyMutex::new(Vec::new()),
            correlator: BusyMutex::new(Correlator::new()),
            disabled: BusyMutex::new(Vec::new()),
            disabled_handlers: BusyMutex::new(DisabledRegistry::default()),
            next_handler: AtomicU64::new(0),
            fault_policy: BusyMutex::new(config.fault_policy),
            minimum_firmware: AtomicU32::new(config.minimum_firmware),
            updates: AtomicU64::new(0),
            running: AtomicBool::new(false),
            bad_checksums: AtomicU32::new(0),
            rates: [AtomicU32::new(0), AtomicU32::new(0)],
            config,
            boards,
            index,
        })
    }

    /**
        exchange with the boards at the configured rate, until an unrecoverable error occurs

        it **must** be running for anything to be sent or received. Errors returned are fatal: the boards cannot be trusted to be in a known state anymore
    */
    pub async fn run(&self) -> Result<(), Error> {
        let mut pacer = Pacer::new(self.config.rate);
        let mut last = Instant::now().checked_sub(pacer.period()).unwrap_or_else(Instant::now);
        loop {
            let start = Instant::now();
            let wait = pacer.next(start.saturating_duration_since(last));
            last = start;
            self.tick().await?;
            pacer.wait(start + wait).await;
        }
    }

    /**
        one iteration of the cycle: receive and dispatch what boards sent, then send

        - parameter changes of the first channel having some, and nothing else
        - or targets and feedback requests of every board, then the queued requests
    */
    pub async fn tick(&self) -> Result<(), Error> {
        let mut cycle = self.cycle.lock().await;
        let cycle = &mut *cycle;
        let now = Instant::now();
        cycle.tick = cycle.tick.wrapping_add(1);
        let channel = Channel::alternate(cycle.tick);

        self.receive(cycle, now).await?;

        if let Phase::Running = cycle.phase {
            self.check_liveness(cycle, now);
            if self.synchronize(cycle)?
                {return self.flush(cycle).await}
            self.exchange(cycle, channel, now)?;
        }
        else {
            self.await_firmware(cycle, channel, now)?;
        }
        for request in self.requests.drain() {
            cycle.outbound.request(&request)?;
        }
        self.flush(cycle).await
    }

    /**
        disable all channels of all boards immediately

        the driver can keep running afterward, the channels stay disabled until enabled again
    */
    pub async fn shutdown(&self) -> Result<(), Error> {
        let packet_size = self.cycle.lock().await.outbound.packet_size();
        let mut outbound = Outbound::new(packet_size);
        for board in &self.boards {
            for channel in Channel::ALL {
                board.detach_trajectory(channel);
                board.set_enabled(channel, false);
                outbound.generic(Some(board.id()), channel, Command::Enable, false, 0)?;
            }
        }
        info!("disabling all channels");
        self.transport.lock().await.write(outbound.as_bytes()).await?;
        Ok(())
    }

    async fn receive(&self, cycle: &mut Cycle, now: Instant) -> Result<(), Error> {
        let mut packets = Vec::new();
        {
            let mut transport = self.transport.lock().await;
            while transport.available() != 0 {
                let Some(byte) = transport.read_byte()
                    else {break};
                if let Some(packet) = cycle.decoder.push(byte)
                    {packets.push(packet)}
            }
        }
        self.bad_checksums.store(cycle.decoder.bad_checksums(), Relaxed);

        let mut answered = false;
        for packet in packets {
            answered |= self.dispatch(cycle, packet, now)?;
        }
        if let Some(rates) = cycle.monitor.record(now, answered) {
            for (slot, rate) in self.rates.iter().zip(rates) {
                slot.store(rate.to_bits(), Relaxed);
            }
        }
        Ok(())
    }

    async fn flush(&self, cycle: &mut Cycle) -> Result<(), Error> {
        if cycle.outbound.is_empty()
            {return Ok(())}
        let result = self.transport.lock().await.write(cycle.outbound.as_bytes()).await;
        cycle.outbound.clear();
        result.map_err(|error| {
            error!("failed writing on the bus: {}", error);
            Error::Bus(error)
        })
    }
}

impl<T> Driver<T> {
    /// heartbeats for every board, and firmware requests again for boards that did not answer in time
    fn await_firmware(&self, cycle: &mut Cycle, channel: Channel, now: Instant) -> Result<(), Error> {
        for board in &self.boards {
            cycle.outbound.generic(Some(board.id()), channel, Command::EmptyResponse, false, 0)?;
        }
        let Phase::AwaitingFirmware {reported, requested} = &mut cycle.phase
            else {return Ok(())};
        if now.saturating_duration_since(*requested) <= self.config.response_timeout
            {return Ok(())}
        *requested = now;
        for board in self.boards.iter().filter(|board| !reported.contains_key(&board.id())) {
            warn!("board {} did not report its firmware version, asking again", board.id());
            self.queue(Request {
                board: Some(board.id()),
                channel: Channel::A,
                command: Command::FirmwareVersion,
                expects_response: true,
                value: 0,
            });
        }
        Ok(())
    }

    /**
        take into account the firmware version reported by a board

        once all boards reported, the lowest version decides what feedback to request and the driver starts running
    */
    pub(super) fn report_firmware(&self, cycle: &mut Cycle, board: u8, version: i32) -> Result<(), Error> {
        let Phase::AwaitingFirmware {reported, ..} = &mut cycle.phase
            else {return Ok(())};
        let minimum = self.minimum_firmware.load(Relaxed);
        if i64::from(version) < i64::from(minimum) {
            error!("board {} runs firmware version {}, at least {} is required", board, version, minimum);
            return Err(Error::Firmware {board, version, minimum})
        }
        info!("board {} runs firmware version {}", board, version);
        reported.insert(board, version);
        if self.boards.iter().any(|board| !reported.contains_key(&board.id()))
            {return Ok(())}

        let lowest = reported.values().copied().min().unwrap_or(version);
        cycle.rotation = Feedback::rotation(lowest);
        cycle.absolute_targets = lowest < UNCHANGED_TARGET_FIRMWARE;
        if cycle.absolute_targets
            {warn!("firmware version {} does not support unchanged targets, sending absolute targets", lowest)}
        if self.config.compact_packets_from.is_some_and(|from| lowest >= from)
            {cycle.outbound.set_packet_size(NEW_FIRMWARE_PACKET_SIZE)}
        cycle.phase = Phase::Running;
        self.running.store(true, Release);
        info!("all boards reported, lowest firmware version {}, running", lowest);
        Ok(())
    }

    /// count an error for every board that stayed silent too long
    fn check_liveness(&self, cycle: &mut Cycle, now: Instant) {
        let last = *cycle.last_liveness.get_or_insert(now);
        if now.saturating_duration_since(last) < self.config.liveness_period
            {return}
        cycle.last_liveness = Some(now);
        for board in &self.boards {
            let silent = board.last_received().is_none_or(|received|
                now.saturating_duration_since(received) > self.config.silence_threshold);
            if silent {
                warn!("board {} is not responding", board.id());
                board.increase_error_count(BoardError::NoResponse, Channel::A);
            }
        }
    }

    /// send the parameter changes of the first channel having some, return whether there was any
    fn synchronize(&self, cycle: &mut Cycle) -> Result<bool, Error> {
        for board in &self.boards {
            for channel in Channel::ALL {
                if let Some(changes) = board.take_dirty(channel) {
                    let enabled = board.get(channel, Parameter::Enabled);
                    cycle.outbound.parameters(board.id(), channel, &changes, enabled)?;
                    return Ok(true)
                }
            }
        }
        Ok(false)
    }

    /// targets of every board, requesting this tick's feedback of `channel`
    fn exchange(&self, cycle: &mut Cycle, channel: Channel, now: Instant) -> Result<(), Error> {
        let feedback = match cycle.rotation.len() {
            0 => Feedback::ActualTick,
            len => cycle.rotation[(cycle.tick % len as u64) as usize],
        };
        for board in &self.boards {
            for channel in Channel::ALL {
                board.advance_trajectory(channel, now);
            }
            let [target_a, target_b] = Channel::ALL.map(|channel| {
                let fresh = board.fresh_target_tick(channel);
                if cycle.absolute_targets
                    {board.target_tick(channel)}
                else
                    {fresh.unwrap_or(UNCHANGED)}
            });
            cycle.outbound.dual_target(board.id(), channel, feedback, target_a, target_b)?;

            match board.extra_pin_mode(channel) {
                ExtraPinMode::Analog => cycle.outbound.generic(
                    Some(board.id()), channel, Command::ExtraPinValue, true, 0)?,
                ExtraPinMode::Servo => cycle.outbound.generic(
                    Some(board.id()), channel, Command::ExtraPinValue, false, board.extra_pin_value(channel))?,
                _ => {},
            }
        }
        Ok(())
    }

    /// whether all boards confirmed their firmware and the driver is exchanging targets
    pub fn is_running(&self) -> bool {
        self.running.load(Acquire)
    }
    /// number of packets dropped for a bad checksum since the driver started
    pub fn bad_checksums(&self) -> u32 {
        self.bad_checksums.load(Relaxed)
    }
    /**
        rates in Hz of ticks, and of ticks where at least one board answered

        measured over the last complete window of 2 seconds, zero before
    */
    pub fn update_rates(&self) -> (f32, f32) {
        let [ticks, answered] = &self.rates;
        (f32::from_bits(ticks.load(Relaxed)), f32::from_bits(answered.load(Relaxed)))
    }
    pub fn config(&self) -> &DriverConfig {&self.config}
}
