use core::fmt;
use core::fmt::{Display, Formatter};

#[cfg(feature = "defmt")]
use defmt::Format;

use crate::{distance::DistanceError, frame::DecodeError};

/// An error that can occur while running a ranging exchange
#[derive(Clone, Eq, PartialEq)]
pub enum RangingError<E> {
    /// No valid frame arrived in time, or the reception failed
    ///
    /// FCS errors, PHY header errors and the other receive errors are
    /// reported this way, like a timeout.
    Timeout,

    /// A frame was received that isn't part of the current exchange
    ///
    /// These frames are discarded while an exchange is running, so this error
    /// is never the outcome of a session.
    FrameMismatch,

    /// A transmission could not be started, or was scheduled too late
    TxError,

    /// A received frame could not be decoded
    FrameError(DecodeError),

    /// The timestamps of the exchange don't give a plausible distance
    Distance(DistanceError),

    /// The configuration was not valid
    InvalidConfiguration,

    /// The session has already ended
    Finished,

    /// The transceiver driver reported an error
    Driver(E),
}

impl<E> From<DecodeError> for RangingError<E> {
    fn from(error: DecodeError) -> Self {
        RangingError::FrameError(error)
    }
}

impl<E> From<DistanceError> for RangingError<E> {
    fn from(error: DistanceError) -> Self {
        RangingError::Distance(error)
    }
}

impl<E> Display for RangingError<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[cfg(feature = "std")]
impl<E> std::error::Error for RangingError<E> where E: fmt::Debug {}

// Not derived, so that `E` only needs `Debug` where it's actually used.
impl<E> fmt::Debug for RangingError<E>
where
    E: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RangingError::Timeout => write!(f, "Timeout"),
            RangingError::FrameMismatch => write!(f, "FrameMismatch"),
            RangingError::TxError => write!(f, "TxError"),
            RangingError::FrameError(error) => write!(f, "FrameError({:?})", error),
            RangingError::Distance(error) => write!(f, "Distance({:?})", error),
            RangingError::InvalidConfiguration => write!(f, "InvalidConfiguration"),
            RangingError::Finished => write!(f, "Finished"),
            RangingError::Driver(error) => write!(f, "Driver({:?})", error),
        }
    }
}

#[cfg(feature = "defmt")]
impl<E> Format for RangingError<E>
where
    E: Format,
{
    fn format(&self, f: defmt::Formatter) {
        match self {
            RangingError::Timeout => defmt::write!(f, "Timeout"),
            RangingError::FrameMismatch => defmt::write!(f, "FrameMismatch"),
            RangingError::TxError => defmt::write!(f, "TxError"),
            RangingError::FrameError(error) => defmt::write!(f, "FrameError({:?})", error),
            RangingError::Distance(error) => defmt::write!(f, "Distance({:?})", error),
            RangingError::InvalidConfiguration => defmt::write!(f, "InvalidConfiguration"),
            RangingError::Finished => defmt::write!(f, "Finished"),
            RangingError::Driver(error) => defmt::write!(f, "Driver({:?})", error),
        }
    }
}

/// Why a session failed
///
/// The tagged outcome kept in [`State::Failed`](super::State::Failed).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(Format))]
pub enum Failure {
    /// See [`RangingError::Timeout`]
    Timeout,
    /// See [`RangingError::TxError`]
    TxError,
    /// See [`RangingError::FrameError`]
    FrameError(DecodeError),
    /// See [`RangingError::Distance`]
    Distance(DistanceError),
    /// See [`RangingError::Driver`]
    Driver,
}

impl Failure {
    /// The failure a ranging error ends a session with, if any
    pub fn from_error<E>(error: &RangingError<E>) -> Option<Self> {
        match error {
            RangingError::Timeout => Some(Failure::Timeout),
            RangingError::TxError => Some(Failure::TxError),
            RangingError::FrameError(error) => Some(Failure::FrameError(*error)),
            RangingError::Distance(error) => Some(Failure::Distance(*error)),
            RangingError::Driver(_) => Some(Failure::Driver),
            RangingError::FrameMismatch
            | RangingError::InvalidConfiguration
            | RangingError::Finished => None,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn failure_from_error() {
        assert_eq!(
            Failure::from_error(&RangingError::<()>::Timeout),
            Some(Failure::Timeout)
        );
        assert_eq!(
            Failure::from_error(&RangingError::<()>::from(DecodeError::UnknownFunctionCode(7))),
            Some(Failure::FrameError(DecodeError::UnknownFunctionCode(7)))
        );
        assert_eq!(Failure::from_error(&RangingError::Driver(())), Some(Failure::Driver));
        assert_eq!(Failure::from_error(&RangingError::<()>::FrameMismatch), None);
    }

    #[test]
    fn debug_output() {
        let error = RangingError::<u8>::FrameError(DecodeError::Truncated { required_len: 22 });

        assert_eq!(
            format!("{}", error),
            "FrameError(Truncated { required_len: 22 })"
        );
        assert_eq!(format!("{:?}", RangingError::Driver(3u8)), "Driver(3)");
    }

    #[cfg(feature = "defmt")]
    #[test]
    fn test_defmt() {
        let error = RangingError::<u8>::Distance(DistanceError::InvalidTimestamps);

        defmt::info!("error: {:?}", error);
    }
}
