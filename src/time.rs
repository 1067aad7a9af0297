//! Time-related types based on the transceiver's 40-bit system time
//!
//! Besides the [`Instant`] and [`Duration`] types, this module converts between
//! UWB microseconds (UUS) and device time ticks, and computes the slots used
//! for delayed transmissions.

use core::ops::{Add, Sub};

#[cfg(feature = "defmt")]
use defmt::Format;

/// The maximum value of 40-bit system time stamps.
pub const TIME_MAX: u64 = 0xffffffffff;

/// Device time ticks per UWB microsecond
///
/// One UUS is 512/499.2 µs, one tick is 1/(128*499.2*10^6) s.
pub const UUS_TO_DWT_TIME: u64 = 63898;

/// Device time ticks per second (128 * 499.2 MHz)
pub const TICKS_PER_SECOND: u64 = 63_897_600_000;

/// Converts a number of UWB microseconds into device time ticks
pub fn to_device_ticks(uus: u32) -> Duration {
    Duration::from_uus(uus)
}

/// Converts device time ticks into UWB microseconds, truncating
pub fn from_device_ticks(duration: Duration) -> u32 {
    duration.as_uus()
}

/// Represents an instant in time
///
/// Internally uses the same 40-bit timestamps that the transceiver uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Instant(u64);

impl Instant {
    /// Creates a new instance of `Instant`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if it
    /// isn't.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dw3000_twr::time::{
    ///     TIME_MAX,
    ///     Instant,
    /// };
    ///
    /// let valid_instant   = Instant::new(TIME_MAX);
    /// let invalid_instant = Instant::new(TIME_MAX + 1);
    ///
    /// assert!(valid_instant.is_some());
    /// assert!(invalid_instant.is_none());
    /// ```
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Instant(value))
        } else {
            None
        }
    }

    /// Creates an `Instant` from any value, discarding bits above the 40th
    pub fn wrapping(value: u64) -> Self {
        Instant(value & TIME_MAX)
    }

    /// Returns the raw 40-bit timestamp
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Returns the lower 32 bits of the timestamp
    ///
    /// This is the part of a timestamp that is carried in a Final frame.
    pub fn low32(&self) -> u32 {
        self.0 as u32
    }

    /// Returns the amount of time passed between the two `Instant`s
    ///
    /// Assumes that `&self` represents a later time than the argument
    /// `earlier`. Timestamps wrap around, so comparing their numerical value
    /// doesn't tell anything about order.
    ///
    /// # Example
    ///
    /// ``` rust
    /// use dw3000_twr::time::{
    ///     TIME_MAX,
    ///     Instant,
    /// };
    ///
    /// let instant_1 = Instant::new(TIME_MAX - 50).unwrap();
    /// let instant_2 = Instant::new(TIME_MAX).unwrap();
    /// let instant_3 = Instant::new(49).unwrap();
    ///
    /// let duration = instant_2.duration_since(instant_1);
    /// assert_eq!(duration.value(), 50);
    ///
    /// // Still works as expected, if the later timestamp is the numerically
    /// // smaller value.
    /// let duration = instant_3.duration_since(instant_2);
    /// assert_eq!(duration.value(), 50);
    /// ```
    pub fn duration_since(&self, earlier: Instant) -> Duration {
        Duration(self.0.wrapping_sub(earlier.0) & TIME_MAX)
    }
}

impl Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Self::Output {
        // Both operands are 40-bit numbers, so the sum can't overflow `u64`.
        Instant((self.0 + rhs.0) & TIME_MAX)
    }
}

impl Sub<Duration> for Instant {
    type Output = Instant;

    fn sub(self, rhs: Duration) -> Self::Output {
        Instant(self.0.wrapping_sub(rhs.0) & TIME_MAX)
    }
}

impl Sub<Instant> for Instant {
    type Output = Duration;

    fn sub(self, rhs: Instant) -> Self::Output {
        self.duration_since(rhs)
    }
}

/// A duration between two instants in device system time
///
/// Internally uses the same 40-bit timestamps that the transceiver uses.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(C)]
pub struct Duration(u64);

impl Duration {
    /// Creates a new instance of `Duration`
    ///
    /// The given value must fit in a 40-bit timestamp, so:
    /// 0 <= `value` <= 2^40 - 1
    ///
    /// Returns `Some(...)`, if `value` is within the valid range, `None` if it
    /// isn't.
    pub fn new(value: u64) -> Option<Self> {
        if value <= TIME_MAX {
            Some(Duration(value))
        } else {
            None
        }
    }

    /// Creates an instance of `Duration` from a number of UWB microseconds
    ///
    /// Exact integer arithmetic: `u32::MAX` UUS is about 2^48 ticks, so the
    /// result is reduced modulo 2^40 like any other device time.
    pub fn from_uus(uus: u32) -> Self {
        Duration((uus as u64 * UUS_TO_DWT_TIME) & TIME_MAX)
    }

    /// Returns this duration in whole UWB microseconds, truncating
    pub fn as_uus(&self) -> u32 {
        (self.0 / UUS_TO_DWT_TIME) as u32
    }

    /// Creates an instance of `Duration` from a number of nanoseconds, rounding to the nearest
    ///
    /// 1 nanosecond is 63.8976 device time units. We do this with fixed point
    /// arithmetic, where (dividend + (divisor / 2)) / divisor
    pub fn from_nanos(nanos: u32) -> Self {
        // `nanos` takes up at most 32 bits before it is cast to `u64`. That
        // means the result of the multiplication fits within 38 bits.
        Duration((nanos as u64 * 638976 + 5000) / 10000)
    }

    /// Returns the raw 40-bit value
    ///
    /// The returned value is guaranteed to be in the following range:
    /// 0 <= `value` <= 2^40 - 1
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// A delayed transmission slot
///
/// The DX_TIME register holds bits 8 to 39 of the target time, and the radio
/// ignores the lowest bit of that word. Transmissions can therefore only be
/// scheduled with a resolution of 512 ticks.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub struct DelayedTx {
    /// The word to program into the delayed TX register
    pub dx_time: u32,

    /// The time the frame's RMARKER will leave the antenna
    ///
    /// This is the programmed slot plus the TX antenna delay, and is the value
    /// the receiving side will see as the TX timestamp.
    pub tx_time: Instant,
}

impl DelayedTx {
    /// Computes the slot `delay` after `reference`
    pub fn after(reference: Instant, delay: Duration, tx_antenna_delay: u16) -> Self {
        let target = reference + delay;
        let dx_time = (target.value() >> 8) as u32;
        let slot = Instant(((dx_time & 0xffff_fffe) as u64) << 8);

        DelayedTx {
            dx_time,
            tx_time: slot + Duration(tx_antenna_delay as u64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instant_add_duration() {
        let instant = Instant::new(0).unwrap();
        let duration = Duration::new(1).unwrap();

        let result = instant + duration;

        assert_eq!(result.value(), 1);
    }

    #[test]
    fn instant_add_duration_wraps() {
        let instant = Instant::new(TIME_MAX).unwrap();
        let duration = Duration::new(2).unwrap();

        assert_eq!((instant + duration).value(), 1);
    }

    #[test]
    fn instant_sub_duration() {
        let instant = Instant::new(1).unwrap();
        let duration = Duration::new(1).unwrap();

        assert_eq!((instant - duration).value(), 0);

        let duration = Duration::new(2).unwrap();
        assert_eq!((instant - duration).value(), TIME_MAX);
    }

    #[test]
    fn instant_sub_instant() {
        let instant_1 = Instant::new(1).unwrap();
        let instant_2 = Instant::new(0).unwrap();

        assert_eq!((instant_1 - instant_2).value(), 1);
        assert_eq!((instant_2 - instant_1).value(), TIME_MAX);
    }

    #[test]
    fn instant_low32() {
        let instant = Instant::new(0xab_1234_5678).unwrap();

        assert_eq!(instant.low32(), 0x1234_5678);
        assert_eq!(Instant::wrapping(TIME_MAX + 6).value(), 5);
    }

    #[test]
    fn duration_from_nanos() {
        assert_eq!(Duration::from_nanos(1).value(), 64);
        assert_eq!(Duration::from_nanos(6).value(), 383);
    }

    #[test]
    fn uus_conversion() {
        assert_eq!(to_device_ticks(1).value(), 63898);
        assert_eq!(to_device_ticks(700).value(), 44_728_600);
        assert_eq!(from_device_ticks(Duration::new(44_728_600).unwrap()), 700);
        assert_eq!(from_device_ticks(Duration::new(63897).unwrap()), 0);
    }

    #[test]
    fn delayed_tx_slot() {
        let reference = Instant::new(0x12_3456_789a).unwrap();
        let slot = DelayedTx::after(reference, to_device_ticks(700), 16385);

        let target = 0x12_3456_789a + 44_728_600;
        assert_eq!(slot.dx_time, (target >> 8) as u32);
        assert_eq!(
            slot.tx_time.value(),
            (((target >> 8) & 0xffff_fffe) << 8) + 16385
        );
        // Never earlier than 512 ticks before the requested time
        assert!(target - (slot.tx_time.value() - 16385) < 512);
    }

    #[test]
    fn delayed_tx_slot_wraps() {
        let reference = Instant::new(TIME_MAX - 100).unwrap();
        let slot = DelayedTx::after(reference, Duration::new(1024).unwrap(), 0);

        assert_eq!(slot.dx_time, (923u64 >> 8) as u32);
        assert_eq!(slot.tx_time.value(), 512);
    }
}
