use core::time::Duration;
use std::time::Instant;


/// proportional gain of the period correction
const PROPORTIONAL: f64 = 0.1;
/// integral gain of the period correction
const INTEGRAL: f64 = 0.5;
/// wait shorter than this is spun instead of slept, sleeping is not that precise
const SPIN: Duration = Duration::from_millis(2);

/**
    keeps a loop at a fixed period despite OS jitter

    every iteration, the time to wait until the next one is corrected by a PI regulator on the difference between the last iteration's actual duration and the target period. The correction is limited to 0.2 .. 1.8 times the period so a long stall cannot make the loop burst or stop.
*/
#[derive(Clone, Debug)]
pub struct Pacer {
    period: Duration,
    /// sum of past errors, in seconds
    integral: f64,
}

impl Pacer {
    /// pacer for a loop running at `rate` Hz
    pub fn new(rate: f32) -> Self {
        Self {
            period: Duration::from_secs_f64(1. / f64::from(rate)),
            integral: 0.,
        }
    }
    pub fn period(&self) -> Duration {self.period}

    /// corrected wait between the starts of the current and next iterations, knowing the last iteration lasted `last`
    pub fn next(&mut self, last: Duration) -> Duration {
        let target = self.period.as_secs_f64();
        let error = target - last.as_secs_f64();
        let control = PROPORTIONAL * error + INTEGRAL * self.integral;
        self.integral += error;
        Duration::from_secs_f64((target + control).clamp(0.2 * target, 1.8 * target))
    }

    /// wait until `deadline`, sleeping most of the time and yielding to the runtime for the last moment
    pub async fn wait(&self, deadline: Instant) {
        if let Some(sleep) = deadline.checked_sub(SPIN) {
            if sleep > Instant::now()
                {tokio::time::sleep_until(tokio::time::Instant::from_std(sleep)).await}
        }
        while Instant::now() < deadline {
            tokio::task::yield_now().await;
        }
    }
}
