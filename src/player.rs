use crate::engine::clock::Clock;
use crate::engine::{HeldKeys, InputEngine, KeyToken};
use crate::error::PlaybackError;
use crate::model::song::{FormatVersion, NoteEvent, Song};
use log::{debug, info, warn};
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// Busy-wait step of the absolute timeline.
pub const POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMsg {
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackOutcome {
    Finished,
    Stopped,
}

/// Where a timeline entry came from. Both are applied as toggles of the key's held state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Press,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimelineAction {
    pub key: KeyToken,
    pub edge: Edge,
}

/// Keys toggled at the same instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub at: Duration,
    pub actions: Vec<TimelineAction>,
}

/// Seconds as a `Duration`, rejecting what no clock can wait for.
fn seconds(value: f64, event: usize) -> Result<Duration, PlaybackError> {
    Duration::try_from_secs_f64(value).map_err(|_| PlaybackError::InvalidTiming { event, value })
}

fn event_keys(event: &NoteEvent) -> impl Iterator<Item = KeyToken> + '_ {
    event.keys.iter().map(|&d| KeyToken::Digit(d))
}

/// Flatten a `2.0` song into timestamp-ordered batches.
///
/// Every event presses its modifier and keys at `press_duration` and, unless both timestamps are
/// equal, releases them at `gap_duration`. Entries at the same timestamp keep song order, so a
/// release from one event lands before a press of the same key from a later one.
pub fn build_timeline(song: &Song) -> Result<Vec<Batch>, PlaybackError> {
    let mut entries: Vec<(Duration, TimelineAction)> = Vec::new();

    for (i, event) in song.events.iter().enumerate() {
        let press_at = seconds(event.press_duration, i)?;
        let release_at = seconds(event.gap_duration, i)?;

        let modifier = KeyToken::for_modifier(event.modifier);
        let modifier = (!modifier.is_noop()).then_some(modifier);

        for key in modifier.into_iter().chain(event_keys(event)) {
            entries.push((press_at, TimelineAction { key, edge: Edge::Press }));
        }

        if release_at != press_at {
            for key in event_keys(event).chain(modifier) {
                entries.push((release_at, TimelineAction { key, edge: Edge::Release }));
            }
        }
    }

    entries.sort_by_key(|(at, _)| *at);

    let mut batches: Vec<Batch> = Vec::new();
    for (at, action) in entries.into_iter() {
        match batches.last_mut() {
            Some(batch) if batch.at == at => batch.actions.push(action),
            _ => batches.push(Batch {
                at,
                actions: vec![action],
            }),
        }
    }

    Ok(batches)
}

#[derive(Debug)]
pub struct Player<E: InputEngine, C: Clock> {
    verbose: bool,
    engine: E,
    clock: C,
}

impl<E: InputEngine, C: Clock> Player<E, C> {
    pub fn new(engine: E, clock: C, verbose: bool) -> Self {
        Self {
            verbose,
            engine,
            clock,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Play a song to completion or until a stop message arrives.
    ///
    /// The song's declared version picks the scheduler; an unknown version fails before any key
    /// is touched. No key is left held on return, whatever the outcome.
    pub fn play(&self, song: &Song, stop: &Receiver<ControlMsg>) -> Result<PlaybackOutcome, PlaybackError> {
        let version = song
            .format_version
            .parse::<FormatVersion>()
            .map_err(|_| PlaybackError::UnsupportedVersion(song.format_version.clone()))?;

        info!(
            "Playing '{}' ({} events, format {}) through the {} engine..!",
            song,
            song.events.len(),
            version,
            self.engine.name()
        );

        let outcome = match version {
            FormatVersion::V1 => self.play_sequential(song, stop)?,
            FormatVersion::V2 => self.play_timeline(song, stop)?,
        };

        match outcome {
            PlaybackOutcome::Finished => info!("Playback finished all events..!"),
            PlaybackOutcome::Stopped => warn!(
                "Playback stopped via control message after {:.3} seconds..!",
                self.clock.elapsed().as_secs_f64()
            ),
        }

        Ok(outcome)
    }

    /// Press, hold for `press_duration`, release, wait `gap_duration`, one event at a time.
    fn play_sequential(&self, song: &Song, stop: &Receiver<ControlMsg>) -> Result<PlaybackOutcome, PlaybackError> {
        let timings = song
            .events
            .iter()
            .enumerate()
            .map(|(i, e)| -> Result<(Duration, Duration), PlaybackError> {
                Ok((seconds(e.press_duration, i)?, seconds(e.gap_duration, i)?))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut held = HeldKeys::new(&self.engine);

        for (i, (event, (hold, gap))) in song.events.iter().zip(timings).enumerate() {
            if stop.try_recv().is_ok() {
                held.release_all()?;
                return Ok(PlaybackOutcome::Stopped);
            }

            self.trace(i, event);

            let modifier = KeyToken::for_modifier(event.modifier);
            held.press(modifier)?;
            for key in event_keys(event) {
                held.press(key)?;
            }

            self.clock.sleep(hold);

            for key in event_keys(event) {
                held.release(key)?;
            }
            held.release(modifier)?;

            self.clock.sleep(gap);
        }

        held.release_all()?;
        Ok(PlaybackOutcome::Finished)
    }

    /// Wait for each batch's timestamp on the clock, then toggle its keys.
    fn play_timeline(&self, song: &Song, stop: &Receiver<ControlMsg>) -> Result<PlaybackOutcome, PlaybackError> {
        let timeline = build_timeline(song)?;
        debug!("Materialized {} timeline batch(es)..!", timeline.len());

        let mut held = HeldKeys::new(&self.engine);
        let start = self.clock.elapsed();

        for batch in timeline.iter() {
            if stop.try_recv().is_ok() {
                held.release_all()?;
                return Ok(PlaybackOutcome::Stopped);
            }

            while self.clock.elapsed().saturating_sub(start) < batch.at {
                if stop.try_recv().is_ok() {
                    held.release_all()?;
                    return Ok(PlaybackOutcome::Stopped);
                }
                self.clock.sleep(POLL_INTERVAL);
            }

            if self.verbose {
                info!(
                    "Batch at {:>10.3}ms | emitted at {:>10.3}ms | {} key(s)",
                    batch.at.as_secs_f64() * 1000.0,
                    self.clock.elapsed().saturating_sub(start).as_secs_f64() * 1000.0,
                    batch.actions.len()
                );
            }

            for action in batch.actions.iter() {
                match (action.edge, held.is_held(action.key)) {
                    (Edge::Press, false) => held.press(action.key)?,
                    (Edge::Press, true) => {
                        warn!(
                            "{} pressed again at {:.3}s while still held, releasing it first..!",
                            action.key,
                            batch.at.as_secs_f64()
                        );
                        held.release(action.key)?;
                        held.press(action.key)?;
                    }
                    (Edge::Release, true) => {
                        held.release(action.key)?;
                    }
                    (Edge::Release, false) => {
                        debug!(
                            "{} released at {:.3}s but it is not held, skipping..!",
                            action.key,
                            batch.at.as_secs_f64()
                        );
                    }
                }
            }
        }

        held.release_all()?;
        Ok(PlaybackOutcome::Finished)
    }

    fn trace(&self, i: usize, event: &NoteEvent) {
        let keys = event
            .keys
            .iter()
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join("|");

        if self.verbose {
            info!(
                "Event {:>4}: keys {:<10} modifier {:<5} | press {:.4}s | gap {:.4}s",
                i,
                keys,
                KeyToken::for_modifier(event.modifier),
                event.press_duration,
                event.gap_duration
            );
        } else {
            debug!("Event {}: keys {} modifier {:?}", i, keys, event.modifier);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::clock::ManualClock;
    use crate::engine::testing::{Action, RecordingEngine};
    use crate::model::song::{Digit, Modifier};
    use crate::notesheet::parse;
    use std::collections::HashMap;
    use std::sync::mpsc;

    fn digit(d: u8) -> KeyToken {
        KeyToken::Digit(Digit::new(d).unwrap())
    }

    fn song(text: &str) -> Song {
        parse(text).unwrap().remove(0)
    }

    fn player(clock: &ManualClock) -> Player<RecordingEngine, ManualClock> {
        Player::new(RecordingEngine::new(clock.clone()), clock.clone(), false)
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    /// Every key pressed was released, and never pressed twice in a row.
    fn assert_balanced(actions: &[Action]) {
        let mut held: HashMap<KeyToken, bool> = HashMap::new();
        for action in actions {
            match action {
                Action::Press(k) => {
                    assert!(!held.get(k).copied().unwrap_or(false), "{} pressed twice", k);
                    held.insert(*k, true);
                }
                Action::Release(k) => {
                    assert!(held.get(k).copied().unwrap_or(false), "{} released while up", k);
                    held.insert(*k, false);
                }
            }
        }
        assert!(held.values().all(|h| !h), "keys left held: {:?}", held);
    }

    #[test]
    fn sequential_playback_order_and_timing() {
        env_logger::try_init().unwrap_or(());
        let clock = ManualClock::default();
        let player = player(&clock);
        let (_tx, rx) = mpsc::channel();

        let song = song("|Test|Me|1.0\n1 SP 0.5 0.2\n2|3  0.3 0.1");
        assert_eq!(player.play(&song, &rx).unwrap(), PlaybackOutcome::Finished);

        assert_eq!(
            player.engine().timed(),
            vec![
                (ms(0), Action::Press(KeyToken::Space)),
                (ms(0), Action::Press(digit(1))),
                (ms(500), Action::Release(digit(1))),
                (ms(500), Action::Release(KeyToken::Space)),
                (ms(700), Action::Press(KeyToken::Up)),
                (ms(700), Action::Press(digit(2))),
                (ms(700), Action::Press(digit(3))),
                (ms(1000), Action::Release(digit(2))),
                (ms(1000), Action::Release(digit(3))),
                (ms(1000), Action::Release(KeyToken::Up)),
            ]
        );

        // total playtime is the sum of all presses and gaps
        assert_eq!(clock.elapsed(), ms(1100));
        assert!((song.length_secs().unwrap() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn sequential_stop_leaves_nothing_held() {
        let clock = ManualClock::default();
        let (tx, rx) = mpsc::channel();
        let player = Player::new(
            RecordingEngine::new(clock.clone()).stopping_after(2, tx),
            clock.clone(),
            false,
        );

        let song = song("|Test|Me|1.0\n1 SH 0.5 0.2\n2  0.3 0.1\n3  0.3 0.1");
        assert_eq!(player.play(&song, &rx).unwrap(), PlaybackOutcome::Stopped);

        // stop arrived during the first event, which still completes and releases
        let actions = player.engine().actions();
        assert_eq!(actions.len(), 4);
        assert_balanced(&actions);
    }

    #[test]
    fn backend_failure_releases_what_was_pressed() {
        let clock = ManualClock::default();
        let player = Player::new(
            RecordingEngine::new(clock.clone()).failing_on(digit(2)),
            clock.clone(),
            false,
        );
        let (_tx, rx) = mpsc::channel();

        let song = song("|Test|Me|1.0\n1|2 SH 0.5 0.2");
        let err = player.play(&song, &rx).unwrap_err();
        assert!(matches!(err, PlaybackError::Backend(_)));

        assert_eq!(
            player.engine().actions(),
            vec![
                Action::Press(KeyToken::Shift),
                Action::Press(digit(1)),
                Action::Release(digit(1)),
                Action::Release(KeyToken::Shift),
            ]
        );
    }

    #[test]
    fn unsupported_version_fails_before_any_key() {
        let clock = ManualClock::default();
        let player = player(&clock);
        let (_tx, rx) = mpsc::channel();

        let song = song("|Test|Me|3.0\n1 SH 0.5 0.2");
        let err = player.play(&song, &rx).unwrap_err();

        assert!(matches!(err, PlaybackError::UnsupportedVersion(ref v) if v == "3.0"));
        assert!(player.engine().actions().is_empty());
    }

    #[test]
    fn timeline_groups_and_orders_batches() {
        let song = song("|T|x|2.0\n3  0.2 0.4\n1 SH 0.0 0.3\n2  0.2 0.2");
        let timeline = build_timeline(&song).unwrap();

        let stamps: Vec<Duration> = timeline.iter().map(|b| b.at).collect();
        assert_eq!(stamps, vec![ms(0), ms(200), ms(300), ms(400)]);

        assert_eq!(
            timeline[0].actions,
            vec![
                TimelineAction { key: KeyToken::Shift, edge: Edge::Press },
                TimelineAction { key: digit(1), edge: Edge::Press },
            ]
        );
        // equal press and release: press only
        assert_eq!(
            timeline[1].actions,
            vec![
                TimelineAction { key: digit(3), edge: Edge::Press },
                TimelineAction { key: digit(2), edge: Edge::Press },
            ]
        );
        assert_eq!(
            timeline[2].actions,
            vec![
                TimelineAction { key: digit(1), edge: Edge::Release },
                TimelineAction { key: KeyToken::Shift, edge: Edge::Release },
            ]
        );
    }

    #[test]
    fn timeline_playback_waits_for_absolute_times() {
        env_logger::try_init().unwrap_or(());
        let clock = ManualClock::default();
        let player = player(&clock);
        let (_tx, rx) = mpsc::channel();

        // overlapping notes: 1 is held while 2 starts and stops
        let song = song("|T|x|2.0\n1  0.1 0.5\n2 SP 0.2 0.3\n1  0.6 0.7");
        assert_eq!(player.play(&song, &rx).unwrap(), PlaybackOutcome::Finished);

        assert_eq!(
            player.engine().timed(),
            vec![
                (ms(100), Action::Press(digit(1))),
                (ms(200), Action::Press(KeyToken::Space)),
                (ms(200), Action::Press(digit(2))),
                (ms(300), Action::Release(digit(2))),
                (ms(300), Action::Release(KeyToken::Space)),
                (ms(500), Action::Release(digit(1))),
                (ms(600), Action::Press(digit(1))),
                (ms(700), Action::Release(digit(1))),
            ]
        );
        assert_balanced(&player.engine().actions());
    }

    #[test]
    fn timeline_forces_release_before_a_repeated_press() {
        let clock = ManualClock::default();
        let player = player(&clock);
        let (_tx, rx) = mpsc::channel();

        // hand-edited sheet: the second 1 starts before the first one ends
        let song = song("|T|x|2.0\n1  0.0 0.5\n1  0.2 0.3");
        player.play(&song, &rx).unwrap();

        assert_eq!(
            player.engine().timed(),
            vec![
                (ms(0), Action::Press(digit(1))),
                (ms(200), Action::Release(digit(1))),
                (ms(200), Action::Press(digit(1))),
                (ms(300), Action::Release(digit(1))),
            ]
        );
        assert_balanced(&player.engine().actions());
    }

    #[test]
    fn timeline_releases_press_only_keys_at_the_end() {
        let clock = ManualClock::default();
        let player = player(&clock);
        let (_tx, rx) = mpsc::channel();

        let song = song("|T|x|2.0\n4 SH 0.1 0.1");
        player.play(&song, &rx).unwrap();

        assert_balanced(&player.engine().actions());
        assert_eq!(player.engine().actions().len(), 4);
    }

    #[test]
    fn timeline_stop_releases_held_keys() {
        let clock = ManualClock::default();
        let (tx, rx) = mpsc::channel();
        let player = Player::new(
            RecordingEngine::new(clock.clone()).stopping_after(1, tx),
            clock.clone(),
            false,
        );

        let song = song("|T|x|2.0\n1  0.0 1.0\n2  0.5 1.0");
        assert_eq!(player.play(&song, &rx).unwrap(), PlaybackOutcome::Stopped);

        let actions = player.engine().actions();
        assert_eq!(actions, vec![Action::Press(digit(1)), Action::Release(digit(1))]);
        assert!(clock.elapsed() < ms(500));
    }

    #[test]
    fn up_placeholder_never_reaches_the_timeline() {
        let song = song("|T|x|2.0\n5  0.0 0.1");
        let timeline = build_timeline(&song).unwrap();
        assert!(
            timeline
                .iter()
                .flat_map(|b| b.actions.iter())
                .all(|a| a.key != KeyToken::for_modifier(Modifier::None))
        );
    }

    fn with_huge_timing(text: &str) -> Song {
        let mut song = song(text);
        song.events[1].press_duration = 1e20;
        song
    }

    #[test]
    fn sequential_rejects_unschedulable_timing_before_any_key() {
        let clock = ManualClock::default();
        let player = player(&clock);
        let (_tx, rx) = mpsc::channel();

        let song = with_huge_timing("|T|x|1.0\n1  0.1 0.1\n2  0.1 0.1");
        let err = player.play(&song, &rx).unwrap_err();

        assert!(matches!(err, PlaybackError::InvalidTiming { event: 1, .. }));
        assert!(player.engine().actions().is_empty());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn timeline_rejects_unschedulable_timing_before_any_key() {
        let clock = ManualClock::default();
        let player = player(&clock);
        let (_tx, rx) = mpsc::channel();

        let song = with_huge_timing("|T|x|2.0\n1  0.1 0.2\n2  0.3 0.4");
        assert!(matches!(
            build_timeline(&song),
            Err(PlaybackError::InvalidTiming { event: 1, .. })
        ));

        let err = player.play(&song, &rx).unwrap_err();
        assert!(matches!(err, PlaybackError::InvalidTiming { event: 1, .. }));
        assert!(player.engine().actions().is_empty());
    }
}
