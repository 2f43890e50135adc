use std::{fmt, ops};

use color_eyre::eyre::{self, WrapErr};
use serde::{Deserialize, Serialize};
use time::{macros::format_description, Date, Duration, Month, OffsetDateTime, PrimitiveDateTime, Time};

/// Seconds in a day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// A simulated instant, stored as the offset from the J2000 epoch
/// (2000-01-01T12:00:00).
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SimTime(Duration);

impl SimTime {
    pub const J2000: SimTime = SimTime(Duration::ZERO);

    pub fn new_seconds(sec: f64) -> SimTime {
        SimTime::from_duration(Duration::seconds_f64(sec))
    }

    pub fn new_days(days: f64) -> SimTime {
        SimTime::new_seconds(days * SECONDS_PER_DAY)
    }

    /// Midnight UTC of the given calendar day.
    pub fn from_calendar(year: i32, month: u8, day: u8) -> eyre::Result<SimTime> {
        let month = Month::try_from(month).wrap_err_with(|| format!("bad month {month}"))?;
        let date = Date::from_calendar_date(year, month, day)
            .wrap_err_with(|| format!("bad calendar date {year}-{month}-{day}"))?;
        Ok(SimTime::from_date(date))
    }

    /// Parse an ISO-8601 calendar date (`YYYY-MM-DD`).
    pub fn parse_date(s: &str) -> eyre::Result<SimTime> {
        let date = Date::parse(s.trim(), format_description!("[year]-[month]-[day]"))
            .wrap_err_with(|| format!("expected YYYY-MM-DD, got {s:?}"))?;
        Ok(SimTime::from_date(date))
    }

    fn from_date(date: Date) -> SimTime {
        SimTime(PrimitiveDateTime::new(date, Time::MIDNIGHT) - j2000())
    }

    pub fn is_negative(self) -> bool {
        self.0.is_negative()
    }

    pub fn as_seconds(self) -> f64 {
        self.0.as_seconds_f64()
    }

    pub fn as_minutes(self) -> f64 {
        self.as_seconds() / 60.0
    }

    pub fn as_days(self) -> f64 {
        self.as_seconds() / SECONDS_PER_DAY
    }

    pub fn into_duration(self) -> Duration {
        self.0
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    /// Calendar representation, if it is representable.
    pub fn to_datetime(self) -> Option<PrimitiveDateTime> {
        j2000().checked_add(self.0)
    }
}

/// Unix timestamp of 2000-01-01T12:00:00Z.
const J2000_UNIX_SECONDS: i64 = 946_728_000;

fn j2000() -> PrimitiveDateTime {
    let at = OffsetDateTime::UNIX_EPOCH + Duration::seconds(J2000_UNIX_SECONDS);
    PrimitiveDateTime::new(at.date(), at.time())
}

impl ops::Sub<SimTime> for SimTime {
    type Output = Duration;

    fn sub(self, rhs: SimTime) -> Self::Output {
        self.0 - rhs.0
    }
}

impl ops::Sub<Duration> for SimTime {
    type Output = SimTime;

    fn sub(self, rhs: Duration) -> Self::Output {
        SimTime(self.0 - rhs)
    }
}

impl ops::Add<Duration> for SimTime {
    type Output = SimTime;

    fn add(self, rhs: Duration) -> Self::Output {
        SimTime(self.0 + rhs)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_datetime() {
            Some(at) if !f.alternate() => write!(
                f,
                "{}-{:02}-{:02} {:02}:{:02}",
                at.year(),
                at.month() as u8,
                at.day(),
                at.hour(),
                at.minute()
            ),
            _ => write!(f, "J2000{:+}s", self.0.as_seconds_f64()),
        }
    }
}

impl fmt::Debug for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SimTime({:#})", self)
    }
}

/// Allowed distance from J2000 in either direction.
const CLOCK_SPAN_DAYS: f64 = 5000.0 * 365.25;

/// Simulation clock. Advances simulated time by real frame time scaled by
/// `time_scale`; a negative scale runs time backwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clock {
    current: SimTime,
    time_scale: f64,
    paused: bool,
}

impl Clock {
    pub fn new(start: SimTime) -> Self {
        let mut clock = Self {
            current: SimTime::J2000,
            time_scale: 1.0,
            paused: false,
        };
        clock.set_time(start);
        clock
    }

    pub fn now(&self) -> SimTime {
        self.current
    }

    pub fn set_time(&mut self, at: SimTime) {
        let max = SimTime::new_days(CLOCK_SPAN_DAYS);
        let min = SimTime::new_days(-CLOCK_SPAN_DAYS);
        self.current = at.clamp(min, max);
    }

    pub fn time_scale(&self) -> f64 {
        self.time_scale
    }

    pub fn set_time_scale(&mut self, scale: f64) {
        if scale.is_finite() {
            self.time_scale = scale.clamp(-1e9, 1e9);
        }
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Advance by `real_dt` seconds of wall time and return the new instant.
    pub fn tick(&mut self, real_dt: f64) -> SimTime {
        if !self.paused && real_dt.is_finite() {
            // no single step needs to cross more than the whole span
            let limit = 2.0 * CLOCK_SPAN_DAYS * SECONDS_PER_DAY;
            let step = (real_dt * self.time_scale).clamp(-limit, limit);
            if !step.is_nan() {
                self.set_time(self.current + Duration::seconds_f64(step));
            }
        }
        self.current
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(SimTime::J2000)
    }
}

#[test]
fn calendar_dates_are_relative_to_j2000() {
    let noon = SimTime::from_calendar(2000, 1, 2).unwrap();
    assert!((noon.as_seconds() - 43_200.0).abs() < 1e-9);

    let before = SimTime::from_calendar(1977, 9, 5).unwrap();
    assert!(before.is_negative());
    assert_eq!(SimTime::parse_date("1977-09-05").unwrap(), before);
    assert!(SimTime::parse_date("1977-13-05").is_err());
    assert!(SimTime::parse_date("yesterday").is_err());
}

#[test]
fn clock_scales_pauses_and_reverses() {
    let mut clock = Clock::default();
    clock.set_time_scale(60.0);
    let t = clock.tick(1.0);
    assert!((t.as_minutes() - 1.0).abs() < 1e-9);

    clock.pause();
    assert_eq!(clock.tick(10.0), t);
    clock.resume();

    clock.set_time_scale(-120.0);
    let t = clock.tick(1.0);
    assert!((t.as_minutes() + 1.0).abs() < 1e-9);
}

#[test]
fn clock_is_clamped() {
    let mut clock = Clock::default();
    clock.set_time_scale(1e9);
    for _ in 0..1000 {
        clock.tick(1e6);
    }
    assert!(clock.now().as_days() <= CLOCK_SPAN_DAYS + 1e-6);
}

#[test]
fn huge_frame_gaps_stop_at_the_clock_range() {
    let mut clock = Clock::default();
    clock.set_time_scale(1e9);
    let end = clock.tick(1e300);
    assert!((end.as_days() - CLOCK_SPAN_DAYS).abs() < 1e-6);

    clock.set_time_scale(-1e9);
    let start = clock.tick(f64::MAX);
    assert!((start.as_days() + CLOCK_SPAN_DAYS).abs() < 1e-6);
}

#[test]
fn dates_must_be_zero_padded_iso() {
    let date = SimTime::parse_date(" 2024-03-01 ").unwrap();
    assert_eq!(date, SimTime::from_calendar(2024, 3, 1).unwrap());
    assert!(SimTime::parse_date("2024-3-1").is_err());
    assert!(SimTime::parse_date("2024-02-30").is_err());
}
