//! Power-on ready handshake.
//!
//! After power-enable is driven high the DLPC1438 pulses its ready line:
//! high while it boots, low once the control port is usable. The line is
//! 1.8 V logic and sits at the edge of what the host reliably reads as high,
//! so the edge wait is bounded and falls back to a fixed delay.
//!
//! Both strategies are first-class and picked by [`ReadyPolicy`]:
//!
//! - [`ReadyPolicy::EdgeWait`]: poll for assert-then-release inside a window;
//!   on timeout or an unreadable pin, warn and sleep `fallback_ms` (at least
//!   one second).
//! - [`ReadyPolicy::FixedDelay`]: ignore the line and sleep at least one second.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

use crate::error::ControlError;

/// Shortest fixed settle accepted after power-enable.
pub const MIN_SETTLE_MS: u32 = 1_000;

/// How power-on waits for the controller to become ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ReadyPolicy {
    /// Poll the ready line for assert-then-release, falling back to a delay.
    EdgeWait {
        /// Total time spent polling before giving up.
        poll_window_ms: u32,
        /// Interval between samples.
        poll_interval_ms: u32,
        /// Delay taken when no edge was seen; never below [`MIN_SETTLE_MS`].
        fallback_ms: u32,
    },
    /// Wait a fixed time without sampling the line.
    FixedDelay {
        /// Settle time; never below [`MIN_SETTLE_MS`].
        settle_ms: u32,
    },
}

impl ReadyPolicy {
    /// Edge wait with a 2 s window, 1 ms polling and a 1 s fallback.
    pub const EDGE_WAIT: Self =
        Self::EdgeWait { poll_window_ms: 2_000, poll_interval_ms: 1, fallback_ms: MIN_SETTLE_MS };

    /// Edge wait with a custom window, the fallback raised to [`MIN_SETTLE_MS`] when shorter.
    pub fn edge_wait(poll_window_ms: u32, poll_interval_ms: u32, fallback_ms: u32) -> Self {
        Self::EdgeWait { poll_window_ms, poll_interval_ms, fallback_ms: fallback_ms.max(MIN_SETTLE_MS) }
    }

    /// Fixed delay, raised to [`MIN_SETTLE_MS`] when shorter.
    pub fn fixed(settle_ms: u32) -> Self {
        Self::FixedDelay { settle_ms: settle_ms.max(MIN_SETTLE_MS) }
    }
}

impl Default for ReadyPolicy {
    fn default() -> Self {
        Self::EDGE_WAIT
    }
}

/// How the handshake finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HandshakeOutcome {
    /// Ready asserted and released within the poll window.
    EdgeDetected {
        /// Time from power-enable to the release edge.
        elapsed_ms: u32,
    },
    /// No usable edge; the fallback delay was taken.
    FellBack {
        /// Fallback delay that was slept.
        waited_ms: u32,
    },
    /// Fixed-delay policy; the line was never sampled.
    Settled {
        /// Delay that was slept.
        waited_ms: u32,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitAssert,
    AwaitRelease,
}

/// Drive power-enable high and wait for the controller per `policy`.
///
/// Only a failure to drive power-enable is an error. Ready-line trouble is
/// absorbed by the fallback delay.
pub fn power_on<P, R, D>(
    power: &mut P,
    ready: &mut R,
    delay: &mut D,
    policy: ReadyPolicy,
) -> Result<HandshakeOutcome, ControlError>
where
    P: OutputPin,
    R: InputPin,
    D: DelayNs,
{
    power.set_high().map_err(|_| ControlError::Gpio)?;
    info!("power-enable asserted");

    match policy {
        ReadyPolicy::FixedDelay { settle_ms } => {
            let waited_ms = settle_ms.max(MIN_SETTLE_MS);
            delay.delay_ms(waited_ms);
            info!("fixed settle of {} ms elapsed", waited_ms);
            Ok(HandshakeOutcome::Settled { waited_ms })
        }
        ReadyPolicy::EdgeWait { poll_window_ms, poll_interval_ms, fallback_ms } => {
            match wait_for_release(ready, delay, poll_window_ms, poll_interval_ms.max(1)) {
                Some(elapsed_ms) => {
                    info!("ready released after {} ms", elapsed_ms);
                    Ok(HandshakeOutcome::EdgeDetected { elapsed_ms })
                }
                None => {
                    let waited_ms = fallback_ms.max(MIN_SETTLE_MS);
                    warn!("ready edge not seen; falling back to {} ms settle", waited_ms);
                    delay.delay_ms(waited_ms);
                    Ok(HandshakeOutcome::FellBack { waited_ms })
                }
            }
        }
    }
}

/// Poll until the line has gone high then low. `None` on timeout or pin error.
fn wait_for_release<R: InputPin, D: DelayNs>(
    ready: &mut R,
    delay: &mut D,
    window_ms: u32,
    interval_ms: u32,
) -> Option<u32> {
    let mut phase = Phase::AwaitAssert;
    let mut elapsed: u32 = 0;
    while elapsed < window_ms {
        let high = match ready.is_high() {
            Ok(h) => h,
            Err(_) => {
                warn!("ready line unreadable after {} ms", elapsed);
                return None;
            }
        };
        match (phase, high) {
            (Phase::AwaitAssert, true) => {
                debug!("ready asserted after {} ms", elapsed);
                phase = Phase::AwaitRelease;
            }
            (Phase::AwaitRelease, false) => return Some(elapsed),
            _ => {}
        }
        delay.delay_ms(interval_ms);
        elapsed = elapsed.saturating_add(interval_ms);
    }
    None
}
