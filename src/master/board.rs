use core::fmt;
use std::{
    time::Instant,
    vec::Vec,
    };
use log::*;

use crate::{
    command::{Channel, Command, DataSize, INVALID},
    mutex::BusyMutex,
    parameters::*,
    };
use super::{
    Error,
    trajectory::{Trajectory, Motion, Step},
    };


/// parameter values of a fresh channel, in [Parameter] order
const DEFAULTS: [(Parameter, i32); 19] = [
    (Parameter::PosPGain, 50),
    (Parameter::PosIGain, 5),
    (Parameter::PosDGain, 20),
    (Parameter::PosDownscale, 2),
    (Parameter::VelPGain, 50),
    (Parameter::VelIGain, 5),
    (Parameter::VelDGain, 20),
    (Parameter::VelDownscale, 2),
    (Parameter::VelTimeDelta, 2),
    (Parameter::MaxVelocity, 100),
    (Parameter::MaxAcceleration, 100),
    (Parameter::Polarity, Polarity::Regular.value()),
    (Parameter::FeedbackMode, FeedbackMode::Encoder.value()),
    (Parameter::ControlMode, ControlMode::Position.value()),
    (Parameter::StreamMode, StreamMode::Off.value()),
    (Parameter::SlowEnableConst, 30),
    (Parameter::ExtraPinMode, ExtraPinMode::Off.value()),
    (Parameter::PidUpdatePeriod, 0),
    (Parameter::Enabled, 0),
    ];
pub const MAX_EXTRA_PIN_VALUE: i32 = 400;


/**
    host side mirror of a board on the bus

    All methods can be called from any thread while the driver is running. Parameters written here are forwarded to the board by the driver loop, telemetry read here is what the board last reported.
*/
pub struct Board {
    id: u8,
    channels: [BusyMutex<ChannelState>; 2],
    /// counters of errors that are not channel specific
    errors: BusyMutex<[u32; BoardError::COUNT]>,
    last_received: BusyMutex<Option<Instant>>,
}

struct ChannelState {
    values: [i32; Parameter::COUNT],
    /// last value sent to the board for each forwarded parameter, `None` when unknown
    in_use: [Option<i32>; Parameter::COUNT],
    dirty: bool,
    fresh_target: bool,
    motion: Option<Motion>,
    errors: [u32; BoardError::COUNT],
}

impl ChannelState {
    fn new() -> Self {
        let mut state = Self {
            values: [0; Parameter::COUNT],
            in_use: [None; Parameter::COUNT],
            dirty: false,
            fresh_target: false,
            motion: None,
            errors: [0; BoardError::COUNT],
        };
        for (parameter, value) in DEFAULTS {
            state.write(parameter, value);
        }
        state.seed_in_use();
        state
    }
    fn write(&mut self, parameter: Parameter, value: i32) {
        let index = parameter.index();
        self.values[index] = value;
        if parameter.forwarded() && self.in_use[index] != Some(value)
            {self.dirty = true}
    }
    /// forget what the board knows, except what it is known to default to
    fn seed_in_use(&mut self) {
        self.in_use = [None; Parameter::COUNT];
        self.in_use[Parameter::PidUpdatePeriod.index()] = Some(0);
    }
}

impl Board {
    pub fn new(id: u8) -> Result<Self, Error> {
        if id > INVALID
            {return Err(Error::Master("board id must be in 0 ..= 126"))}
        Ok(Self {
            id,
            channels: [BusyMutex::new(ChannelState::new()), BusyMutex::new(ChannelState::new())],
            errors: BusyMutex::new([0; BoardError::COUNT]),
            last_received: BusyMutex::new(None),
        })
    }
    pub fn id(&self) -> u8 {self.id}

    fn channel(&self, channel: Channel) -> &BusyMutex<ChannelState> {
        &self.channels[channel.index()]
    }

    /// current value of any channel parameter
    pub fn get(&self, channel: Channel, parameter: Parameter) -> i32 {
        self.channel(channel).blocking_lock().values[parameter.index()]
    }
    /**
        set any channel parameter, after checking the value is acceptable for the board

        forwarded parameters that differ from what the board is using are sent at the next opportunity
    */
    pub fn set(&self, channel: Channel, parameter: Parameter, value: i32) -> Result<(), Error> {
        check(parameter, value)?;
        if parameter == Parameter::TargetTick
            {self.set_target_tick(channel, value)}
        else
            {self.write(channel, parameter, value)}
        Ok(())
    }
    /// set a parameter without any check, for values reported by the board
    pub(crate) fn write(&self, channel: Channel, parameter: Parameter, value: i32) {
        self.channel(channel).blocking_lock().write(parameter, value)
    }

    pub fn target_tick(&self, channel: Channel) -> i32 {
        self.get(channel, Parameter::TargetTick)
    }
    /// set a new target, detaching any trajectory running on the channel
    pub fn set_target_tick(&self, channel: Channel, target: i32) {
        let mut state = self.channel(channel).blocking_lock();
        if state.motion.take().is_some()
            {debug!("board {} channel {:?}: trajectory detached by new target", self.id, channel)}
        state.values[Parameter::TargetTick.index()] = target;
        state.fresh_target = true;
    }
    /// the target tick if it was written since the last call, consuming it
    pub fn fresh_target_tick(&self, channel: Channel) -> Option<i32> {
        let mut state = self.channel(channel).blocking_lock();
        if core::mem::take(&mut state.fresh_target)
            {Some(state.values[Parameter::TargetTick.index()])}
        else
            {None}
    }

    pub fn actual_tick(&self, channel: Channel) -> i32 {self.get(channel, Parameter::ActualTick)}
    pub fn actual_velocity(&self, channel: Channel) -> i32 {self.get(channel, Parameter::ActualVelocity)}
    pub fn motor_current(&self, channel: Channel) -> i32 {self.get(channel, Parameter::MotorCurrent)}
    pub fn actual_pot(&self, channel: Channel) -> i32 {self.get(channel, Parameter::ActualPot)}
    pub fn actual_encoder(&self, channel: Channel) -> i32 {self.get(channel, Parameter::ActualEncoder)}

    pub fn enabled(&self, channel: Channel) -> bool {
        self.get(channel, Parameter::Enabled) != 0
    }
    pub fn set_enabled(&self, channel: Channel, enabled: bool) {
        self.write(channel, Parameter::Enabled, i32::from(enabled))
    }

    pub fn polarity(&self, channel: Channel) -> Polarity {
        Polarity::from_value(self.get(channel, Parameter::Polarity)).unwrap_or_default()
    }
    pub fn set_polarity(&self, channel: Channel, polarity: Polarity) {
        self.write(channel, Parameter::Polarity, polarity.value())
    }
    pub fn feedback_mode(&self, channel: Channel) -> FeedbackMode {
        FeedbackMode::from_value(self.get(channel, Parameter::FeedbackMode)).unwrap_or_default()
    }
    pub fn set_feedback_mode(&self, channel: Channel, mode: FeedbackMode) {
        self.write(channel, Parameter::FeedbackMode, mode.value())
    }
    pub fn control_mode(&self, channel: Channel) -> ControlMode {
        ControlMode::from_value(self.get(channel, Parameter::ControlMode)).unwrap_or_default()
    }
    pub fn set_control_mode(&self, channel: Channel, mode: ControlMode) {
        self.write(channel, Parameter::ControlMode, mode.value())
    }
    pub fn stream_mode(&self, channel: Channel) -> StreamMode {
        StreamMode::from_value(self.get(channel, Parameter::StreamMode)).unwrap_or_default()
    }
    pub fn set_stream_mode(&self, channel: Channel, mode: StreamMode) {
        self.write(channel, Parameter::StreamMode, mode.value())
    }
    pub fn extra_pin_mode(&self, channel: Channel) -> ExtraPinMode {
        ExtraPinMode::from_value(self.get(channel, Parameter::ExtraPinMode)).unwrap_or_default()
    }
    pub fn set_extra_pin_mode(&self, channel: Channel, mode: ExtraPinMode) {
        self.write(channel, Parameter::ExtraPinMode, mode.value())
    }
    /// last analog reading in [ExtraPinMode::Analog], or servo output in [ExtraPinMode::Servo]
    pub fn extra_pin_value(&self, channel: Channel) -> i32 {
        self.get(channel, Parameter::ExtraPinValue)
    }
    pub fn set_extra_pin_value(&self, channel: Channel, value: i32) -> Result<(), Error> {
        self.set(channel, Parameter::ExtraPinValue, value)
    }
    /// PID update period of the whole board, it is held by channel A
    pub fn pid_update_period(&self) -> i32 {
        self.get(Channel::A, Parameter::PidUpdatePeriod)
    }
    pub fn set_pid_update_period(&self, period: i32) -> Result<(), Error> {
        self.set(Channel::A, Parameter::PidUpdatePeriod, period)
    }

    /**
        changes to send to the board, consuming them

        return the changed forwarded parameters in [Parameter] order with their command, and consider them known by the board from now on. `None` when nothing changed since the last call
    */
    pub fn take_dirty(&self, channel: Channel) -> Option<Vec<(Command, i32)>> {
        let mut state = self.channel(channel).blocking_lock();
        if !core::mem::take(&mut state.dirty)
            {return None}
        let mut changes = Vec::new();
        for parameter in Parameter::ALL.into_iter().filter(|p| p.forwarded()) {
            let index = parameter.index();
            let value = state.values[index];
            if state.in_use[index] != Some(value) {
                state.in_use[index] = Some(value);
                changes.push((parameter.command(), value));
            }
        }
        if changes.is_empty()
            {None}
        else
            {Some(changes)}
    }
    /// the board lost its configuration, everything must be sent again
    pub(crate) fn clear_in_use(&self, channel: Channel) {
        let mut state = self.channel(channel).blocking_lock();
        state.seed_in_use();
        state.dirty = true;
    }

    /**
        attach a trajectory to a channel, replacing any previous one

        the motion starts from the last reported actual tick
    */
    pub fn set_trajectory(&self, channel: Channel, trajectory: Trajectory) -> Result<(), Error> {
        let mut state = self.channel(channel).blocking_lock();
        let origin = state.values[Parameter::ActualTick.index()];
        state.motion = Some(Motion::start(trajectory, origin, Instant::now())?);
        Ok(())
    }
    pub fn detach_trajectory(&self, channel: Channel) -> Option<Trajectory> {
        self.channel(channel).blocking_lock().motion.take().map(|motion| motion.trajectory())
    }
    pub fn trajectory(&self, channel: Channel) -> Option<Trajectory> {
        self.channel(channel).blocking_lock().motion.map(|motion| motion.trajectory())
    }
    /// advance the trajectory of a channel if any, detaching it once reached
    pub(crate) fn advance_trajectory(&self, channel: Channel, now: Instant) {
        let mut state = self.channel(channel).blocking_lock();
        let Some(motion) = state.motion
            else {return};
        let step = motion.step(now);
        if let Step::Reached(_) = step {
            debug!("board {} channel {:?}: trajectory reached {}", self.id, channel, step.target());
            state.motion = None;
        }
        state.values[Parameter::TargetTick.index()] = step.target();
        state.fresh_target = true;
    }

    /// number of times an error was reported, `channel` is ignored for errors that are not channel specific
    pub fn error_count(&self, error: BoardError, channel: Channel) -> u32 {
        let Some(index) = error.index()
            else {return 0};
        if error.channel_specific()
            {self.channel(channel).blocking_lock().errors[index]}
        else
            {self.errors.blocking_lock()[index]}
    }
    pub(crate) fn increase_error_count(&self, error: BoardError, channel: Channel) {
        let Some(index) = error.index()
            else {return};
        if error.channel_specific()
            {self.channel(channel).blocking_lock().errors[index] += 1}
        else
            {self.errors.blocking_lock()[index] += 1}
    }

    /// time the last packet from this board was received, `None` if it never answered
    pub fn last_received(&self) -> Option<Instant> {
        *self.last_received.blocking_lock()
    }
    pub(crate) fn mark_received(&self, now: Instant) {
        *self.last_received.blocking_lock() = Some(now);
    }
}

/// check a value is acceptable for a parameter
fn check(parameter: Parameter, value: i32) -> Result<(), Error> {
    let valid = match parameter {
        Parameter::PosPGain | Parameter::PosIGain | Parameter::PosDGain | Parameter::PosDownscale
        | Parameter::VelPGain | Parameter::VelIGain | Parameter::VelDGain | Parameter::VelDownscale
        | Parameter::MaxVelocity | Parameter::MaxAcceleration | Parameter::SlowEnableConst
            => value >= 0,
        Parameter::VelTimeDelta => value >= 2,
        Parameter::Polarity => Polarity::from_value(value).is_some(),
        Parameter::FeedbackMode => FeedbackMode::from_value(value).is_some(),
        Parameter::ControlMode => ControlMode::from_value(value).is_some(),
        Parameter::StreamMode => StreamMode::from_value(value).is_some(),
        Parameter::ExtraPinMode => ExtraPinMode::from_value(value).is_some(),
        Parameter::Enabled => matches!(value, 0 | 1),
        Parameter::ExtraPinValue => (0 ..= MAX_EXTRA_PIN_VALUE).contains(&value),
        _ => true,
    };
    if !valid
        {return Err(Error::Master("parameter value out of range"))}
    // single byte parameters cannot carry more on the wire
    if parameter.forwarded() && parameter.command().size() == DataSize::U08 && !(0 ..= 255).contains(&value)
        {return Err(Error::Master("parameter value does not fit in a byte"))}
    Ok(())
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "board {}", self.id)?;
        for channel in Channel::ALL {
            let state = self.channel(channel).blocking_lock();
            writeln!(f, "  channel {:?}", channel)?;
            for parameter in Parameter::ALL {
                writeln!(f, "    {:?}: {}", parameter, state.values[parameter.index()])?;
            }
            for error in BoardError::ALL.into_iter().filter(|e| e.channel_specific()) {
                if let Some(index) = error.index() {
                    if state.errors[index] != 0
                        {writeln!(f, "    {:?} errors: {}", error, state.errors[index])?}
                }
            }
        }
        let errors = self.errors.blocking_lock();
        for error in BoardError::ALL.into_iter().filter(|e| !e.channel_specific()) {
            if let Some(index) = error.index() {
                if errors[index] != 0
                    {writeln!(f, "  {:?} errors: {}", error, errors[index])?}
            }
        }
        Ok(())
    }
}
