use core::{
    fmt::Display,
    ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign},
};

/// Ticks of the radio baseband clock per second (69.12 MHz).
pub const TICKS_PER_SECOND: u64 = 69_120_000;
pub const TICKS_PER_MILLI: u64 = TICKS_PER_SECOND / 1000;

// 69.12 ticks per microsecond, kept as the exact ratio 1728/25.
const TICKS_PER_MICRO_NUM: u64 = 1728;
const TICKS_PER_MICRO_DEN: u64 = 25;

/// An instant of the radio baseband clock.
///
/// Every tick is 1/69.12 MHz (~14.47 ns). Wraps every ~8400 years, so
/// wrapping is not handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt-03", derive(defmt::Format))]
pub struct Instant {
    ticks: u64,
}

impl Instant {
    pub const fn from_ticks(ticks: u64) -> Self {
        Self { ticks }
    }

    pub const fn from_seconds(seconds: u64) -> Self {
        Self::from_ticks(seconds * TICKS_PER_SECOND)
    }

    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    #[must_use]
    pub const fn checked_duration_since(&self, other: Self) -> Option<Duration> {
        let negative = other.ticks > self.ticks;
        let diff = self.ticks.abs_diff(other.ticks);

        if diff > i64::MAX as u64 {
            return None;
        }

        Some(Duration {
            ticks: diff as i64 * if negative { -1 } else { 1 },
        })
    }

    #[must_use]
    pub fn duration_since(&self, other: Self) -> Duration {
        unwrap!(self.checked_duration_since(other))
    }

    #[must_use]
    pub const fn checked_add_duration(self, duration: Duration) -> Option<Self> {
        match self.ticks.checked_add_signed(duration.ticks) {
            Some(ticks) => Some(Self { ticks }),
            None => None,
        }
    }

    #[must_use]
    pub const fn checked_sub_duration(self, duration: Duration) -> Option<Self> {
        match self.ticks.checked_add_signed(-duration.ticks) {
            Some(ticks) => Some(Self { ticks }),
            None => None,
        }
    }

    /// The start of the most recent period boundary at or before this
    /// instant, for a period expressed in ticks.
    #[must_use]
    pub const fn align_down(self, period: Duration) -> Self {
        let period = period.ticks.unsigned_abs();
        Self {
            ticks: self.ticks - (self.ticks % period),
        }
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        unwrap!(self.checked_add_duration(rhs))
    }
}

impl AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Self::Output {
        unwrap!(self.checked_sub_duration(rhs))
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Self::Output {
        self.duration_since(rhs)
    }
}

impl SubAssign<Duration> for Instant {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

/// A span of radio baseband time.
///
/// Every tick is 1/69.12 MHz (~14.47 ns). Ranges ~4200 years either way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration {
    ticks: i64,
}

impl Display for Duration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let neg = self.ticks < 0;

        let value = self.abs();

        let ms = value.millis();
        let us = (value - Self::from_millis(ms)).micros();

        if neg {
            write!(f, "-{ms}.{us:03} ms")
        } else {
            write!(f, "{ms}.{us:03} ms")
        }
    }
}

#[cfg(feature = "defmt-03")]
impl defmt::Format for Duration {
    fn format(&self, f: defmt::Formatter) {
        let neg = self.ticks < 0;

        let value = self.abs();

        let ms = value.millis();
        let us = (value - Self::from_millis(ms)).micros();

        if neg {
            defmt::write!(f, "-{}.{} ms", ms, us)
        } else {
            defmt::write!(f, "{}.{} ms", ms, us)
        }
    }
}

impl Duration {
    pub const fn from_ticks(ticks: i64) -> Self {
        Self { ticks }
    }

    pub const fn from_seconds(seconds: i64) -> Self {
        Self::from_ticks(seconds * TICKS_PER_SECOND as i64)
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self::from_ticks(millis * TICKS_PER_MILLI as i64)
    }

    /// Exact for any whole number of microseconds (69.12 = 1728/25 ticks/µs,
    /// and every duration this crate schedules is a multiple of 25 µs).
    pub const fn from_micros(micros: i64) -> Self {
        Self::from_ticks(micros * TICKS_PER_MICRO_NUM as i64 / TICKS_PER_MICRO_DEN as i64)
    }

    pub const fn ticks(&self) -> i64 {
        self.ticks
    }

    /// The amount of *full* milliseconds in this duration.
    /// Always rounds towards zero.
    pub const fn millis(&self) -> i64 {
        self.ticks / TICKS_PER_MILLI as i64
    }

    /// The amount of *full* microseconds in this duration.
    /// Always rounds towards zero.
    pub const fn micros(&self) -> i64 {
        self.ticks * TICKS_PER_MICRO_DEN as i64 / TICKS_PER_MICRO_NUM as i64
    }

    #[must_use]
    pub const fn checked_add(self, duration: Duration) -> Option<Self> {
        match self.ticks.checked_add(duration.ticks) {
            Some(ticks) => Some(Self { ticks }),
            None => None,
        }
    }

    #[must_use]
    pub const fn checked_sub(self, duration: Duration) -> Option<Self> {
        match self.ticks.checked_sub(duration.ticks) {
            Some(ticks) => Some(Self { ticks }),
            None => None,
        }
    }

    #[must_use]
    pub const fn abs(self) -> Self {
        Self {
            ticks: self.ticks.abs(),
        }
    }
}

impl Add for Duration {
    type Output = Duration;

    fn add(self, rhs: Duration) -> Self::Output {
        unwrap!(self.checked_add(rhs))
    }
}

impl AddAssign for Duration {
    fn add_assign(&mut self, rhs: Duration) {
        *self = *self + rhs;
    }
}

impl Sub for Duration {
    type Output = Duration;

    fn sub(self, rhs: Duration) -> Self::Output {
        unwrap!(self.checked_sub(rhs))
    }
}

impl SubAssign for Duration {
    fn sub_assign(&mut self, rhs: Duration) {
        *self = *self - rhs;
    }
}

impl Mul<i64> for Duration {
    type Output = Duration;

    fn mul(self, rhs: i64) -> Self::Output {
        Self {
            ticks: unwrap!(self.ticks.checked_mul(rhs)),
        }
    }
}

impl Mul<Duration> for i64 {
    type Output = Duration;

    fn mul(self, rhs: Duration) -> Self::Output {
        rhs * self
    }
}

impl MulAssign<i64> for Duration {
    fn mul_assign(&mut self, rhs: i64) {
        *self = *self * rhs;
    }
}

impl Div<i64> for Duration {
    type Output = Duration;

    fn div(self, rhs: i64) -> Self::Output {
        Self {
            ticks: unwrap!(self.ticks.checked_div(rhs)),
        }
    }
}

impl DivAssign<i64> for Duration {
    fn div_assign(&mut self, rhs: i64) {
        *self = *self / rhs;
    }
}
