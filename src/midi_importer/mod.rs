pub mod extractor;
pub mod generator;
pub mod records;

use crate::error::ImportError;
use crate::model::song::{FormatVersion, Song};
use extractor::{TrackSelection, extract};
use log::{debug, info};
use std::path::Path;

/// Convert a MIDI file (binary or midicsv) straight into a song.
pub fn import_midi_file<P: AsRef<Path>>(
    path: P,
    selection: &TrackSelection,
    version: FormatVersion,
    name: &str,
    creator: &str,
) -> Result<Song, ImportError> {
    let records = records::load_records(path.as_ref())?;
    let extraction = extract(&records, selection);
    debug!(
        "Extracted {} note(s) at {} ticks per quarter note with {} tempo change(s)..!",
        extraction.intervals.len(),
        extraction.tempo_map.ppq(),
        extraction.tempo_map.len()
    );
    let song = generator::generate(&extraction, name, creator, version);

    info!(
        "Converted '{}' into {} notesheet line(s) (format {})..!",
        path.as_ref().display(),
        song.events.len(),
        version
    );

    Ok(song)
}
