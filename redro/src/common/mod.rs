//! Supporting utility types.
mod fifo;

pub use fifo::Fifo;

/// Log at debug level when the `log` feature is enabled.
macro_rules! debug {
    ($($tt:tt)*) => {
        {
            #[cfg(feature = "log")]
            log::debug!($($tt)*);
        }
    };
}

/// Log at warn level when the `log` feature is enabled.
macro_rules! warning {
    ($($tt:tt)*) => {
        {
            #[cfg(feature = "log")]
            log::warn!($($tt)*);
        }
    };
}

pub(crate) use debug;
pub(crate) use warning;
