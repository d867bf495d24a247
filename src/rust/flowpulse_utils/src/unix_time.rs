use nix::{
    sys::time::TimeSpec,
    time::{clock_gettime, ClockId},
};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Return the time since boot, from the Linux kernel.
/// Can fail if the clock isn't ready yet.
pub fn time_since_boot() -> Result<TimeSpec, TimeError> {
    match clock_gettime(ClockId::CLOCK_BOOTTIME) {
        Ok(t) => Ok(t),
        Err(e) => {
            warn!("Clock not ready: {:?}", e);
            Err(TimeError::ClockNotReady)
        }
    }
}

/// Time since boot in nanoseconds. This is the clock packet capture
/// timestamps are expressed in when the capture layer doesn't supply one.
pub fn nanos_since_boot() -> Result<u64, TimeError> {
    let since_boot = Duration::from(time_since_boot()?);
    Ok(u64::try_from(since_boot.as_nanos()).unwrap_or(u64::MAX))
}

/// Error type for time functions.
#[derive(Error, Debug)]
pub enum TimeError {
    /// The clock isn't ready yet.
    #[error("Clock not ready")]
    ClockNotReady,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boot_clock_advances() {
        let first = nanos_since_boot().unwrap();
        let second = nanos_since_boot().unwrap();
        assert!(first > 0);
        assert!(second >= first);
    }
}
