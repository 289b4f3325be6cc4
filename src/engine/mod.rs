use crate::model::song::{Digit, Modifier};
use log::{debug, info, warn};
use std::fmt;

pub mod clock;
#[cfg(all(feature = "wininput", target_os = "windows"))]
pub mod windows;

/// A key the injection backend can press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyToken {
    Digit(Digit),
    Shift,
    Space,
    /// Stands in for "no modifier"; backends must treat it as a no-op.
    Up,
}

impl KeyToken {
    pub fn for_modifier(modifier: Modifier) -> Self {
        match modifier {
            Modifier::None => KeyToken::Up,
            Modifier::Shift => KeyToken::Shift,
            Modifier::Space => KeyToken::Space,
        }
    }

    pub fn is_noop(self) -> bool {
        self == KeyToken::Up
    }
}

impl fmt::Display for KeyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyToken::Digit(d) => write!(f, "{}", d),
            KeyToken::Shift => f.write_str("shift"),
            KeyToken::Space => f.write_str("space"),
            KeyToken::Up => f.write_str("up"),
        }
    }
}

/// The keystroke-injection capability playback drives.
pub trait InputEngine {
    /// Emit a key-down for this key.
    fn press(&self, key: KeyToken) -> anyhow::Result<()>;

    /// Emit a key-up for this key.
    fn release(&self, key: KeyToken) -> anyhow::Result<()>;

    fn name(&self) -> &'static str;
}

impl<E: InputEngine + ?Sized> InputEngine for Box<E> {
    fn press(&self, key: KeyToken) -> anyhow::Result<()> {
        (**self).press(key)
    }

    fn release(&self, key: KeyToken) -> anyhow::Result<()> {
        (**self).release(key)
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Dry-run backend: logs every key instead of sending it.
#[derive(Debug, Clone, Default)]
pub struct LogEngine;

impl InputEngine for LogEngine {
    fn press(&self, key: KeyToken) -> anyhow::Result<()> {
        if !key.is_noop() {
            info!("press   {}", key);
        }
        Ok(())
    }

    fn release(&self, key: KeyToken) -> anyhow::Result<()> {
        if !key.is_noop() {
            info!("release {}", key);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Keys pressed through one engine that still need their release.
///
/// Whatever is still held when this is dropped gets released, so every exit path out of
/// playback (finish, stop, backend error) leaves the keyboard clean.
pub struct HeldKeys<'a, E: InputEngine + ?Sized> {
    engine: &'a E,
    held: Vec<KeyToken>,
}

impl<'a, E: InputEngine + ?Sized> HeldKeys<'a, E> {
    pub fn new(engine: &'a E) -> Self {
        Self {
            engine,
            held: Vec::new(),
        }
    }

    pub fn is_held(&self, key: KeyToken) -> bool {
        self.held.contains(&key)
    }

    pub fn held(&self) -> &[KeyToken] {
        &self.held
    }

    pub fn press(&mut self, key: KeyToken) -> anyhow::Result<()> {
        if self.is_held(key) {
            return Ok(());
        }

        self.engine.press(key)?;
        self.held.push(key);
        Ok(())
    }

    /// Returns whether the key was held.
    pub fn release(&mut self, key: KeyToken) -> anyhow::Result<bool> {
        let Some(idx) = self.held.iter().position(|&k| k == key) else {
            return Ok(false);
        };

        self.held.remove(idx);
        self.engine.release(key)?;
        Ok(true)
    }

    /// Release everything, most recent first. Keeps going past failures and reports the first.
    pub fn release_all(&mut self) -> anyhow::Result<()> {
        let mut first_err = None;

        while let Some(key) = self.held.pop() {
            if let Err(why) = self.engine.release(key) {
                warn!("Failed to release {}: {:?}", key, why);
                if first_err.is_none() {
                    first_err = Some(why);
                }
            }
        }

        match first_err {
            Some(why) => Err(why),
            None => Ok(()),
        }
    }
}

impl<E: InputEngine + ?Sized> Drop for HeldKeys<'_, E> {
    fn drop(&mut self) {
        if self.held.is_empty() {
            return;
        }

        debug!("Releasing {} key(s) still held..!", self.held.len());
        if let Err(why) = self.release_all() {
            warn!("Error releasing held keys: {:?}", why);
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::engine::clock::{Clock, ManualClock};
    use crate::player::ControlMsg;
    use std::cell::{Cell, RefCell};
    use std::sync::mpsc::Sender;
    use std::time::Duration;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum Action {
        Press(KeyToken),
        Release(KeyToken),
    }

    /// Records every action with the manual clock's time, optionally requesting a stop after a number of presses.
    pub struct RecordingEngine {
        clock: ManualClock,
        pub actions: RefCell<Vec<(Duration, Action)>>,
        stop_after: Option<(usize, Sender<ControlMsg>)>,
        presses: Cell<usize>,
        fail_on: Option<KeyToken>,
    }

    impl RecordingEngine {
        pub fn new(clock: ManualClock) -> Self {
            Self {
                clock,
                actions: RefCell::new(Vec::new()),
                stop_after: None,
                presses: Cell::new(0),
                fail_on: None,
            }
        }

        pub fn stopping_after(mut self, presses: usize, tx: Sender<ControlMsg>) -> Self {
            self.stop_after = Some((presses, tx));
            self
        }

        pub fn failing_on(mut self, key: KeyToken) -> Self {
            self.fail_on = Some(key);
            self
        }

        pub fn actions(&self) -> Vec<Action> {
            self.actions.borrow().iter().map(|(_, a)| *a).collect()
        }

        pub fn timed(&self) -> Vec<(Duration, Action)> {
            self.actions.borrow().clone()
        }
    }

    impl InputEngine for RecordingEngine {
        fn press(&self, key: KeyToken) -> anyhow::Result<()> {
            if self.fail_on == Some(key) {
                anyhow::bail!("refusing to press {}", key);
            }

            self.actions
                .borrow_mut()
                .push((self.clock.elapsed(), Action::Press(key)));
            self.presses.set(self.presses.get() + 1);

            if let Some((limit, tx)) = self.stop_after.as_ref()
                && self.presses.get() == *limit
            {
                let _ = tx.send(ControlMsg::Stop);
            }
            Ok(())
        }

        fn release(&self, key: KeyToken) -> anyhow::Result<()> {
            self.actions
                .borrow_mut()
                .push((self.clock.elapsed(), Action::Release(key)));
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }
}
