use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotesheetError {
    #[error("Invalid modifier '{token}' on line {line}")]
    InvalidModifier { line: usize, token: String },

    #[error("Invalid timing value '{value}' on line {line}")]
    InvalidTiming { line: usize, value: String },

    #[error("Invalid key '{key}' on line {line}")]
    InvalidKey { line: usize, key: String },

    #[error("Note line {line} has no keys")]
    EmptyKeys { line: usize },

    #[error("Note line {line} is missing its {field} field")]
    MissingField { line: usize, field: &'static str },

    #[error("Malformed song header on line {line}")]
    MalformedHeader { line: usize },

    #[error("Notesheet uses invalid characters")]
    InvalidCharacters,

    #[error("No song named '{0}' was found")]
    SongNotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl NotesheetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Failed to read MIDI file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read MIDI-CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse MIDI: {0}")]
    Midi(String),

    #[error("SMPTE timecode midi timing is not currently supported..!")]
    TimecodeUnsupported,

    #[error("Malformed MIDI-CSV row {row}: {message}")]
    MalformedRow { row: usize, message: String },

    #[error("Bad '{field}' field in {kind} record: '{value}'")]
    BadField {
        kind: String,
        field: &'static str,
        value: String,
    },

    #[error("{kind} record is missing its '{field}' field")]
    MissingField { kind: String, field: &'static str },

    #[error("Tempo of zero microseconds per quarter note")]
    ZeroTempo,
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Unsupported notesheet format version '{0}'")]
    UnsupportedVersion(String),

    #[error("Event {event} has a timing of {value} seconds that cannot be scheduled")]
    InvalidTiming { event: usize, value: f64 },

    #[error("Input backend '{0}' is not available in this build..!")]
    BackendUnavailable(&'static str),

    #[error("Input backend failed: {0:#}")]
    Backend(#[from] anyhow::Error),
}
