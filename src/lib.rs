pub mod engine;
pub mod error;
pub mod midi_importer;
pub mod model;
pub mod notesheet;
pub mod player;
pub mod util;

pub use engine::clock::{Clock, SpinClock};
pub use engine::{HeldKeys, InputEngine, KeyToken, LogEngine};
pub use error::{ImportError, NotesheetError, PlaybackError};
pub use midi_importer::extractor::TrackSelection;
pub use midi_importer::import_midi_file;
pub use model::config::*;
pub use model::layout::{LayoutKey, input_for_midi, quantize};
pub use model::song::*;
pub use player::*;
pub use util::*;
