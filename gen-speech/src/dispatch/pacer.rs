//! Inter-batch pacing.
//!
//! A pacer decides how long the dispatcher waits before it may start the
//! next batch. The wait runs alongside the batch's requests, so a batch that
//! takes longer than the pacing window starts the next one immediately.

use async_trait::async_trait;
use chrono::{DateTime, Local, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

const MINUTE: Duration = Duration::from_secs(60);

/// Source of wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The real local clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Something the dispatcher can await between batches.
#[async_trait]
pub trait Pacer: Send + Sync {
    async fn wait(&self);
}

/// Time left until the wall clock reaches the next whole minute.
pub fn until_next_minute(now: DateTime<Local>) -> Duration {
    // nanosecond() exceeds 1e9 during a leap second
    let nanos = now.nanosecond().min(999_999_999);
    let into_minute =
        Duration::from_secs(u64::from(now.second())) + Duration::from_nanos(u64::from(nanos));
    MINUTE.saturating_sub(into_minute)
}

/// Waits until the clock minute rolls over.
pub struct MinuteBoundaryPacer<C: Clock = SystemClock> {
    clock: C,
}

impl MinuteBoundaryPacer<SystemClock> {
    pub fn new() -> Self {
        Self { clock: SystemClock }
    }
}

impl Default for MinuteBoundaryPacer<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> MinuteBoundaryPacer<C> {
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl<C: Clock> Pacer for MinuteBoundaryPacer<C> {
    async fn wait(&self) {
        let delay = until_next_minute(self.clock.now());
        log::info!(
            "waiting for next minute to start: {:.1} seconds",
            delay.as_secs_f32()
        );
        tokio::time::sleep(delay).await;
    }
}

/// Waits a fixed interval, independent of the wall clock.
pub struct FixedIntervalPacer {
    interval: Duration,
}

impl FixedIntervalPacer {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl Default for FixedIntervalPacer {
    fn default() -> Self {
        Self::new(MINUTE)
    }
}

#[async_trait]
impl Pacer for FixedIntervalPacer {
    async fn wait(&self) {
        log::info!("waiting {:?} before the next batch", self.interval);
        tokio::time::sleep(self.interval).await;
    }
}

/// User-selectable pacing behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PacingStrategy {
    /// Start each batch at a wall-clock minute boundary
    #[default]
    Minute,
    /// Start each batch a full minute after the previous one
    Interval,
}

impl PacingStrategy {
    pub fn pacer(self) -> Box<dyn Pacer> {
        match self {
            PacingStrategy::Minute => Box::new(MinuteBoundaryPacer::new()),
            PacingStrategy::Interval => Box::new(FixedIntervalPacer::default()),
        }
    }
}

impl FromStr for PacingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "minute" => Ok(PacingStrategy::Minute),
            "interval" => Ok(PacingStrategy::Interval),
            other => Err(format!(
                "Unknown pacing strategy '{}'. Use 'minute' or 'interval'",
                other
            )),
        }
    }
}

impl fmt::Display for PacingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacingStrategy::Minute => f.write_str("minute"),
            PacingStrategy::Interval => f.write_str("interval"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    struct FixedClock(DateTime<Local>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Local> {
            self.0
        }
    }

    fn at(hour: u32, min: u32, sec: u32) -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 1, 15, hour, min, sec)
            .single()
            .unwrap()
    }

    #[test]
    fn test_until_next_minute() {
        assert_eq!(until_next_minute(at(12, 0, 45)), Duration::from_secs(15));
        assert_eq!(until_next_minute(at(12, 0, 0)), Duration::from_secs(60));
        assert_eq!(until_next_minute(at(12, 0, 59)), Duration::from_secs(1));
    }

    #[test]
    fn test_until_next_minute_subsecond() {
        let now = at(8, 30, 10) + TimeDelta::milliseconds(250);
        assert_eq!(until_next_minute(now), Duration::from_millis(49_750));
    }

    #[tokio::test(start_paused = true)]
    async fn test_minute_pacer_sleeps_to_boundary() {
        let pacer = MinuteBoundaryPacer::with_clock(FixedClock(at(9, 15, 40)));
        let start = tokio::time::Instant::now();
        pacer.wait().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(20), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(21), "{:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_interval_pacer() {
        let pacer = FixedIntervalPacer::new(Duration::from_secs(20));
        let start = tokio::time::Instant::now();
        pacer.wait().await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(20), "{:?}", elapsed);
        assert!(elapsed < Duration::from_secs(21), "{:?}", elapsed);
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("minute".parse::<PacingStrategy>(), Ok(PacingStrategy::Minute));
        assert_eq!("Interval".parse::<PacingStrategy>(), Ok(PacingStrategy::Interval));
        assert!("hourly".parse::<PacingStrategy>().is_err());
        assert_eq!(PacingStrategy::default().to_string(), "minute");
    }
}
