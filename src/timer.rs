// src/timer.rs - Monotonic one-shot timers for exposure and the motor watchdog
use std::future::pending;
use tokio::time::{sleep_until, Duration, Instant};

/// A one-shot deadline on the tokio monotonic clock.
///
/// Arming with a non-positive duration disarms, matching the underlying
/// it_value-of-zero convention. Expiry is edge-triggered: `expired()`
/// completes at most once per arm and clears the deadline as it fires, so
/// one expiry produces exactly one event in the readiness loop.
#[derive(Debug, Default)]
pub struct OneShotTimer {
    deadline: Option<Instant>,
}

impl OneShotTimer {
    pub fn new() -> Self {
        Self { deadline: None }
    }

    /// Arm the timer `seconds` from now; `seconds <= 0` disarms instead.
    pub fn arm(&mut self, seconds: f64) {
        if seconds > 0.0 {
            self.deadline = Some(Instant::now() + Duration::from_secs_f64(seconds));
        } else {
            self.deadline = None;
        }
    }

    /// Idempotent: disarming an already-disarmed timer is a no-op.
    pub fn disarm(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whole seconds until expiry, rounded up once the fractional part
    /// exceeds half a second. Zero when disarmed.
    pub fn remaining_secs(&self) -> u32 {
        match self.deadline {
            None => 0,
            Some(deadline) => {
                let left = deadline.saturating_duration_since(Instant::now());
                let mut secs = left.as_secs();
                if left.subsec_nanos() > 500_000_000 {
                    secs += 1;
                }
                secs as u32
            }
        }
    }

    /// Completes when the armed deadline passes, clearing it. Pends forever
    /// while disarmed, so a `select!` arm over a disarmed timer never fires.
    pub async fn expired(&mut self) {
        match self.deadline {
            Some(deadline) => {
                sleep_until(deadline).await;
                self.deadline = None;
            }
            None => pending::<()>().await,
        }
    }
}
