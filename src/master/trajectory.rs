use std::time::{Duration, Instant};
use super::Error;


/// shape of a motion toward a target, attached to a channel with [Board::set_trajectory](super::Board::set_trajectory)
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Trajectory {
    /// linear motion from the actual position, reaching `target` after `duration`
    Ramp {target: i32, duration: Duration},
    /// motion from the actual position toward `target` at constant speed
    VelocityLimit {target: i32, ticks_per_ms: f64},
}

/// progress of a motion at a given instant
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Step {
    /// target to send this tick, the motion continues
    Moving(i32),
    /// final target, the motion is over and can be detached
    Reached(i32),
}
impl Step {
    pub fn target(self) -> i32 {
        match self {
            Step::Moving(target) | Step::Reached(target) => target,
        }
    }
}

/// a [Trajectory] started from a known position at a known time
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Motion {
    trajectory: Trajectory,
    origin: i32,
    start: Instant,
}

impl Motion {
    pub fn start(trajectory: Trajectory, origin: i32, start: Instant) -> Result<Self, Error> {
        match trajectory {
            Trajectory::Ramp {duration, ..} if duration.is_zero()
                => return Err(Error::Master("ramp duration must be positive")),
            Trajectory::VelocityLimit {ticks_per_ms, ..} if !(ticks_per_ms > 0.)
                => return Err(Error::Master("velocity limit must be positive")),
            _ => {},
        }
        Ok(Self {trajectory, origin, start})
    }
    pub fn trajectory(&self) -> Trajectory {self.trajectory}
    /// position the motion started from
    pub fn origin(&self) -> i32 {self.origin}

    /// target at instant `now`
    pub fn step(&self, now: Instant) -> Step {
        let elapsed = now.saturating_duration_since(self.start).as_nanos();
        match self.trajectory {
            Trajectory::Ramp {target, duration} => {
                let duration = duration.as_nanos();
                if elapsed >= duration
                    {return Step::Reached(target)}
                let distance = i128::from(target) - i128::from(self.origin);
                let travel = distance * elapsed as i128 / duration as i128;
                // between origin and target, so it fits
                Step::Moving((i128::from(self.origin) + travel) as i32)
            },
            Trajectory::VelocityLimit {target, ticks_per_ms} => {
                let travel = (elapsed as f64 * ticks_per_ms / 1e6) as i64;
                let distance = i64::from(target) - i64::from(self.origin);
                if travel >= distance.abs()
                    {return Step::Reached(target)}
                let position = i64::from(self.origin) + travel * distance.signum();
                Step::Moving(position as i32)
            },
        }
    }
}
