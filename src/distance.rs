//! Double-sided two-way ranging arithmetic
//!
//! An exchange produces six timestamps, three on each node:
//!
//! ```text
//!  Initiator                    Responder
//!  poll_tx  |------ Poll ----->| poll_rx
//!           |                  |           reply1
//!  resp_rx  |<--- Response ----| resp_tx
//!    reply2 |                  |
//!  final_tx |------ Final ---->| final_rx
//! ```
//!
//! From these, two round trips and two reply times are formed:
//!
//! - `round1 = resp_rx - poll_tx`, `reply1 = resp_tx - poll_rx`
//! - `round2 = final_rx - resp_tx`, `reply2 = final_tx - resp_rx`
//!
//! and the time of flight is
//!
//! ```text
//! tof = (round1 * round2 - reply1 * reply2) / (round1 + round2 + reply1 + reply2)
//! ```
//!
//! Each round trip is measured against one node's crystal only, so a constant
//! frequency offset between the two nodes cancels to first order.
//!
//! Timestamps are expected to be antenna delay compensated by the driver. If
//! they aren't, [`DistanceEstimator::bias_ticks`] can take the combined delay.

#[cfg(feature = "defmt")]
use defmt::Format;
use fixed::types::U32F32;

use crate::time::{Instant, TICKS_PER_SECOND};

/// Speed of radio waves in air, in m/s
pub const SPEED_OF_LIGHT: u64 = 299_702_547;

/// Default maximum range, in meters
pub const DEFAULT_MAX_RANGE_M: u32 = 1000;

/// An error that can occur when computing a distance
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum DistanceError {
    /// A round trip or reply time is negative, all intervals sum up to zero,
    /// or the result is beyond the maximum range
    InvalidTimestamps,
}

impl core::fmt::Display for DistanceError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for DistanceError {}

/// The result of a range measurement
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Distance {
    /// One-way time of flight, in device ticks
    pub time_of_flight: U32F32,
}

impl Distance {
    /// Time of flight in seconds
    pub fn as_seconds(&self) -> f64 {
        self.time_of_flight.to_num::<f64>() / TICKS_PER_SECOND as f64
    }

    /// Distance in meters
    pub fn meters(&self) -> f64 {
        self.as_seconds() * SPEED_OF_LIGHT as f64
    }

    /// Distance in millimeters, truncated
    ///
    /// Computed with integer arithmetic only.
    pub fn millimeters(&self) -> u64 {
        let bits = self.time_of_flight.to_bits() as u128;

        ((bits * SPEED_OF_LIGHT as u128 * 1000) / ((TICKS_PER_SECOND as u128) << 32)) as u64
    }
}

#[cfg(feature = "defmt")]
impl Format for Distance {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(
            f,
            "Distance {{ time_of_flight: {=u64} ticks, {=u64} mm }}",
            self.time_of_flight.to_num::<u64>(),
            self.millimeters()
        )
    }
}

/// Turns the six timestamps of an exchange into a [`Distance`]
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DistanceEstimator {
    /// Results beyond this range are rejected as invalid
    pub max_range_m: u32,
    /// Subtracted from every time of flight, in device ticks
    pub bias_ticks: u32,
}

impl Default for DistanceEstimator {
    fn default() -> Self {
        DistanceEstimator {
            max_range_m: DEFAULT_MAX_RANGE_M,
            bias_ticks: 0,
        }
    }
}

impl DistanceEstimator {
    /// The longest acceptable time of flight, in device ticks
    pub fn max_time_of_flight(&self) -> u64 {
        (self.max_range_m as u128 * TICKS_PER_SECOND as u128 / SPEED_OF_LIGHT as u128) as u64
    }

    /// Computes the distance from the timestamps of one exchange
    ///
    /// Only the lower 32 bits of every timestamp are used, which is all a Final
    /// frame carries. Intervals must therefore be shorter than 2^31 ticks
    /// (about 33 ms); longer ones read as negative and are rejected.
    ///
    /// A time of flight that comes out slightly negative, which measurement
    /// noise can cause at very short range, is reported as zero.
    pub fn estimate(
        &self,
        poll_tx: Instant,
        resp_rx: Instant,
        resp_tx: Instant,
        poll_rx: Instant,
        final_tx: Instant,
        final_rx: Instant,
    ) -> Result<Distance, DistanceError> {
        let round1 = interval(resp_rx, poll_tx)?;
        let reply1 = interval(resp_tx, poll_rx)?;
        let round2 = interval(final_rx, resp_tx)?;
        let reply2 = interval(final_tx, resp_rx)?;

        let sum = round1 + round2 + reply1 + reply2;
        if sum == 0 {
            return Err(DistanceError::InvalidTimestamps);
        }

        // 32.32 fixed point. The products take at most 62 bits, so shifting
        // them by another 32 still fits in an `i128`.
        let tof_bits = ((round1 * round2 - reply1 * reply2) << 32) / sum;
        let tof_bits = (tof_bits - ((self.bias_ticks as i128) << 32)).max(0);

        if tof_bits > (self.max_time_of_flight() as i128) << 32 {
            return Err(DistanceError::InvalidTimestamps);
        }

        Ok(Distance {
            time_of_flight: U32F32::from_bits(tof_bits as u64),
        })
    }
}

/// Computes the distance with the default [`DistanceEstimator`]
pub fn estimate(
    poll_tx: Instant,
    resp_rx: Instant,
    resp_tx: Instant,
    poll_rx: Instant,
    final_tx: Instant,
    final_rx: Instant,
) -> Result<Distance, DistanceError> {
    DistanceEstimator::default().estimate(poll_tx, resp_rx, resp_tx, poll_rx, final_tx, final_rx)
}

/// `later - earlier` as a signed interval
fn interval(later: Instant, earlier: Instant) -> Result<i128, DistanceError> {
    let ticks = later.low32().wrapping_sub(earlier.low32()) as i32;

    if ticks < 0 {
        return Err(DistanceError::InvalidTimestamps);
    }

    Ok(ticks as i128)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TIME_MAX;

    fn ts(value: u64) -> Instant {
        Instant::wrapping(value)
    }

    /// Timestamps of an exchange between a reference clock on the Initiator
    /// and a Responder clock running `ppm` fast. Times are in ticks.
    fn simulate(tof: f64, reply1: f64, reply2: f64, ppm: f64, start_a: u64, start_b: u64) -> [Instant; 6] {
        let clock_a = |t: f64| ts(start_a + t.round() as u64);
        let clock_b = |t: f64| ts(start_b + (t * (1.0 + ppm * 1e-6)).round() as u64);

        let poll_rx = tof;
        let resp_tx = poll_rx + reply1;
        let resp_rx = resp_tx + tof;
        let final_tx = resp_rx + reply2;
        let final_rx = final_tx + tof;

        [
            clock_a(0.0),
            clock_a(resp_rx),
            clock_b(resp_tx),
            clock_b(poll_rx),
            clock_a(final_tx),
            clock_b(final_rx),
        ]
    }

    fn estimate_all(t: [Instant; 6]) -> Result<Distance, DistanceError> {
        estimate(t[0], t[1], t[2], t[3], t[4], t[5])
    }

    #[test]
    fn worked_example() {
        let distance = estimate(ts(1000), ts(2020), ts(2010), ts(1010), ts(3000), ts(3040)).unwrap();

        // round1 = 1020, reply1 = 1000, round2 = 1030, reply2 = 980
        let expected = ((1020u64 * 1030 - 1000 * 980) << 32) / (1020 + 1030 + 1000 + 980);
        assert_eq!(distance.time_of_flight.to_bits(), expected);
        assert_eq!(distance.time_of_flight.to_num::<u64>(), 17);
        assert!((distance.meters() - 0.0822).abs() < 0.001);
        assert_eq!(distance.millimeters(), 82);
    }

    #[test]
    fn clock_offset_cancels() {
        let tof = 2000.0;
        // 900 and 700 UUS
        let reply1 = 57_508_200.0;
        let reply2 = 44_728_600.0;

        for ppm in [50.0, -50.0, 20.0, 0.0] {
            let t = simulate(tof, reply1, reply2, ppm, 5_000_000, 0x80_0000_0000);
            let distance = estimate_all(t).unwrap();

            let error = (distance.time_of_flight.to_num::<f64>() - tof).abs() / tof;
            assert!(error < 0.01, "{} ppm: error {}", ppm, error);

            // A single round trip is off by thousands of ticks
            let single_sided = (t[1].value() - t[0].value()) as f64
                - t[2].duration_since(t[3]).value() as f64;
            if ppm != 0.0 {
                assert!((single_sided / 2.0 - tof).abs() > 500.0);
            }
        }
    }

    #[test]
    fn timestamps_wrap_around() {
        let t = simulate(1500.0, 40_000_000.0, 45_000_000.0, 50.0, TIME_MAX - 20_000_000, TIME_MAX - 1_000);
        assert!(t[1].value() < t[0].value());

        let distance = estimate_all(t).unwrap();

        assert!((distance.time_of_flight.to_num::<f64>() - 1500.0).abs() < 15.0);
    }

    #[test]
    fn plausible_exchanges_give_non_negative_distances() {
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = |bound: u64| {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed % bound
        };

        let max = DistanceEstimator::default().max_time_of_flight();
        for _ in 0..1000 {
            let tof = next(max / 2) as f64;
            let reply1 = (1 + next(100_000_000)) as f64;
            let reply2 = (1 + next(100_000_000)) as f64;
            let ppm = next(100) as f64 - 50.0;
            let t = simulate(tof, reply1, reply2, ppm, next(TIME_MAX), next(TIME_MAX));

            let distance = estimate_all(t).unwrap();
            assert!(distance.meters().is_finite());
            assert!(distance.meters() >= 0.0);
        }
    }

    #[test]
    fn negative_time_of_flight_clamps_to_zero() {
        // Replies longer than round trips
        let distance = estimate(ts(0), ts(100), ts(300), ts(0), ts(400), ts(400)).unwrap();

        assert_eq!(distance.time_of_flight, U32F32::from_bits(0));
        assert_eq!(distance.millimeters(), 0);
    }

    #[test]
    fn rejects_negative_intervals() {
        // Response received before the poll was sent
        assert_eq!(
            estimate(ts(1000), ts(900), ts(2010), ts(1010), ts(3000), ts(3040)),
            Err(DistanceError::InvalidTimestamps)
        );
        // Response sent before the poll was received
        assert_eq!(
            estimate(ts(1000), ts(2020), ts(1000), ts(1010), ts(3000), ts(3040)),
            Err(DistanceError::InvalidTimestamps)
        );
    }

    #[test]
    fn rejects_zero_denominator() {
        assert_eq!(
            estimate(ts(5), ts(5), ts(7), ts(7), ts(5), ts(7)),
            Err(DistanceError::InvalidTimestamps)
        );
    }

    #[test]
    fn rejects_implausible_range() {
        let estimator = DistanceEstimator {
            max_range_m: 10,
            bias_ticks: 0,
        };
        // About 47 m
        let t = simulate(10_000.0, 1_000_000.0, 1_000_000.0, 0.0, 0, 0);

        assert_eq!(
            estimator.estimate(t[0], t[1], t[2], t[3], t[4], t[5]),
            Err(DistanceError::InvalidTimestamps)
        );
        assert!(DistanceEstimator::default()
            .estimate(t[0], t[1], t[2], t[3], t[4], t[5])
            .is_ok());
    }

    #[test]
    fn bias_is_subtracted() {
        let t = simulate(1000.0, 1_000_000.0, 1_000_000.0, 0.0, 0, 0);
        let estimator = DistanceEstimator {
            bias_ticks: 400,
            ..Default::default()
        };

        let distance = estimator.estimate(t[0], t[1], t[2], t[3], t[4], t[5]).unwrap();
        assert_eq!(distance.time_of_flight.to_num::<u64>(), 600);

        let estimator = DistanceEstimator {
            bias_ticks: 4000,
            ..Default::default()
        };
        let distance = estimator.estimate(t[0], t[1], t[2], t[3], t[4], t[5]).unwrap();
        assert_eq!(distance.time_of_flight, U32F32::from_bits(0));
    }
}
