use crate::engine::clock::Clock;
use crate::player::ControlMsg;
use anyhow::{Result, bail};
use log::{debug, info, warn};
use std::sync::mpsc::Receiver;
use std::time::{Duration, Instant};

/// How long to wait for the target window before giving up.
pub const FOCUS_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocks until the active window's title matches `title`, checking every 50ms.
///
/// Errors out once `timeout` elapses without a match.
pub fn wait_for_window(title: &str, timeout: Duration) -> Result<()> {
    info!("Waiting for the '{}' window to become active..!", title);

    let now = Instant::now();
    loop {
        match active_win_pos_rs::get_active_window() {
            Ok(window) => {
                debug!("Active window: \"{}\"", window.title);
                if window.title == title {
                    info!("Found '{}'..!", title);
                    return Ok(());
                }
            }
            Err(()) => debug!("Could not query the active window..!"),
        }

        if now.elapsed() > timeout {
            bail!(
                "Active window title was never {}..! (waited {} seconds.)",
                title,
                timeout.as_secs()
            );
        }

        spin_sleep::sleep(Duration::from_millis(50));
    }
}

/// Log a countdown one second at a time.
///
/// Returns false if a stop message arrived before it finished.
pub fn countdown<C: Clock>(secs: u64, clock: &C, stop: &Receiver<ControlMsg>) -> bool {
    for remaining in (1..=secs).rev() {
        if stop.try_recv().is_ok() {
            warn!("Countdown cancelled..!");
            return false;
        }

        info!("Starting in {}..!", remaining);
        clock.sleep(Duration::from_secs(1));
    }

    stop.try_recv().is_err()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::clock::ManualClock;
    use std::sync::mpsc;

    #[test]
    fn countdown_sleeps_once_per_second() {
        env_logger::try_init().unwrap_or(());
        let clock = ManualClock::default();
        let (_tx, rx) = mpsc::channel();

        assert!(countdown(3, &clock, &rx));
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }

    #[test]
    fn countdown_honours_stop() {
        let clock = ManualClock::default();
        let (tx, rx) = mpsc::channel();
        tx.send(ControlMsg::Stop).unwrap();

        assert!(!countdown(5, &clock, &rx));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn zero_countdown_returns_immediately() {
        let clock = ManualClock::default();
        let (_tx, rx) = mpsc::channel();

        assert!(countdown(0, &clock, &rx));
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }
}
