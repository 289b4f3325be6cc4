use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the ten number-row keys of the instrument.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digit(u8);

impl Digit {
    pub fn new(value: u8) -> Option<Self> {
        (value <= 9).then_some(Self(value))
    }

    pub(crate) const fn const_new(value: u8) -> Self {
        Self(value % 10)
    }

    pub fn from_char(c: char) -> Option<Self> {
        c.to_digit(10).map(|d| Self(d as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn as_char(self) -> char {
        (b'0' + self.0) as char
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The key held together with the digits of a note.
///
/// `None` means no extra key is held at all, it is a placeholder rather than a real key.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Modifier {
    #[default]
    None,
    Shift,
    Space,
}

impl Modifier {
    /// Parses the notesheet modifier column. Matching is case-insensitive and the empty string is `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_uppercase().as_str() {
            "" => Some(Modifier::None),
            "SH" => Some(Modifier::Shift),
            "SP" => Some(Modifier::Space),
            _ => None,
        }
    }

    pub fn token(self) -> &'static str {
        match self {
            Modifier::None => "",
            Modifier::Shift => "SH",
            Modifier::Space => "SP",
        }
    }
}

/// Notesheet format versions playback knows how to schedule.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatVersion {
    /// Relative timings: press for `press_duration`, then wait `gap_duration`.
    V1,
    /// Absolute timings: press at `press_duration`, release at `gap_duration`.
    V2,
}

impl FormatVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            FormatVersion::V1 => "1.0",
            FormatVersion::V2 => "2.0",
        }
    }
}

impl FromStr for FormatVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1" | "1.0" | "v1" => Ok(FormatVersion::V1),
            "2" | "2.0" | "v2" => Ok(FormatVersion::V2),
            other => Err(format!("unsupported format version '{}'", other)),
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NoteEvent {
    /// Digits pressed together, in notesheet order and without duplicates.
    pub keys: Vec<Digit>,
    pub modifier: Modifier,
    /// Seconds. For `2.0` songs this is the absolute press timestamp.
    pub press_duration: f64,
    /// Seconds. For `2.0` songs this is the absolute release timestamp.
    pub gap_duration: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Song {
    pub name: String,
    pub creator: String,
    /// Declared format version, kept verbatim so playback can reject what it does not know.
    pub format_version: String,
    pub events: Vec<NoteEvent>,
}

impl Song {
    /// Playback wall time: the sum of every press and gap for `1.0`, the latest timestamp for `2.0`.
    ///
    /// `None` when the declared version is not one playback supports.
    pub fn length_secs(&self) -> Option<f64> {
        let version = self.format_version.parse::<FormatVersion>().ok()?;
        let events = self.events.iter();

        Some(match version {
            FormatVersion::V1 => events.map(|e| e.press_duration + e.gap_duration).sum(),
            FormatVersion::V2 => events
                .map(|e| e.press_duration.max(e.gap_duration))
                .fold(0.0, f64::max),
        })
    }
}

impl fmt::Display for Song {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.name, self.creator)
    }
}
