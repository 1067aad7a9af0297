//! Logging shims
//!
//! The macros forward to `defmt` when the `defmt` feature is enabled, to `log`
//! when only the `log` feature is enabled or in tests, and swallow their
//! arguments otherwise. Arguments must implement both `defmt::Format` and `Debug`.
#![allow(unused_macros)]

macro_rules! log_forward {
    ($level:ident, $s:literal $(, $x:expr)* $(,)?) => {
        {
            #[cfg(feature = "defmt")]
            ::defmt::$level!($s $(, $x)*);
            #[cfg(all(any(feature = "log", test), not(feature = "defmt")))]
            ::log::$level!($s $(, $x)*);
            #[cfg(not(any(feature = "log", feature = "defmt", test)))]
            let _ = ($( & $x ),*);
        }
    };
}

macro_rules! trace {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_forward!(trace, $s $(, $x)*)
    };
}

macro_rules! debug {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_forward!(debug, $s $(, $x)*)
    };
}

macro_rules! info {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_forward!(info, $s $(, $x)*)
    };
}

macro_rules! warn {
    ($s:literal $(, $x:expr)* $(,)?) => {
        log_forward!(warn, $s $(, $x)*)
    };
}
