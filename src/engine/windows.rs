use crate::engine::{InputEngine, KeyToken};
use anyhow::Result;
use log::debug;
use std::mem::size_of;
use windows::Win32::UI::Input::KeyboardAndMouse::{
    INPUT, INPUT_0, INPUT_KEYBOARD, KEYBD_EVENT_FLAGS, KEYBDINPUT, KEYEVENTF_KEYUP, SendInput,
    VIRTUAL_KEY, VK_SHIFT, VK_SPACE,
};

/// Sends keys to the focused window through `SendInput`.
#[derive(Clone, Debug, Default)]
pub struct WindowsEngine;

impl WindowsEngine {
    pub fn new() -> Self {
        Self
    }

    /// Win32 virtual-key code for a token. `up` has none.
    fn virtual_key(key: KeyToken) -> Option<VIRTUAL_KEY> {
        match key {
            // VK_0..VK_9 are the ASCII digits
            KeyToken::Digit(d) => Some(VIRTUAL_KEY(0x30 + d.value() as u16)),
            KeyToken::Shift => Some(VK_SHIFT),
            KeyToken::Space => Some(VK_SPACE),
            KeyToken::Up => None,
        }
    }

    fn build_input(vk: VIRTUAL_KEY, flags: KEYBD_EVENT_FLAGS) -> INPUT {
        let ki = KEYBDINPUT {
            wVk: vk,
            wScan: 0,
            dwFlags: flags,
            time: 0,
            dwExtraInfo: 0,
        };

        INPUT {
            r#type: INPUT_KEYBOARD,
            Anonymous: INPUT_0 { ki },
        }
    }

    /// Low-level wrapper around SendInput: sends a slice of INPUTs and checks the result.
    fn send_inputs_batch(inputs: &[INPUT]) -> Result<()> {
        let sent = unsafe { SendInput(inputs, size_of::<INPUT>() as i32) };

        if sent == inputs.len() as u32 {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "SendInput failed: requested {}, sent {}",
                inputs.len(),
                sent
            ))
        }
    }

    fn send(&self, key: KeyToken, flags: KEYBD_EVENT_FLAGS) -> Result<()> {
        let Some(vk) = Self::virtual_key(key) else {
            return Ok(());
        };

        debug!("WindowsEngine sending {:?} for {} (flags {:?})", vk, key, flags);
        Self::send_inputs_batch(&[Self::build_input(vk, flags)])
    }
}

impl InputEngine for WindowsEngine {
    fn press(&self, key: KeyToken) -> Result<()> {
        self.send(key, KEYBD_EVENT_FLAGS(0))
    }

    fn release(&self, key: KeyToken) -> Result<()> {
        self.send(key, KEYEVENTF_KEYUP)
    }

    fn name(&self) -> &'static str {
        "windows"
    }
}
