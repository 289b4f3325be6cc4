//! MIDI-CSV record rows.
//!
//! Rows follow the `midicsv` layout: `track, tick, Type, fields...`, with the file header on
//! track 0 and real tracks numbered from 1. Rows come either from a `.csv` text produced by
//! `midicsv` or from decoding a binary SMF with `midly`.

use crate::error::ImportError;
use csv::StringRecord;
use log::{debug, warn};
use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiRecord {
    pub track: usize,
    pub tick: u64,
    /// Event type token, e.g. `Header`, `Tempo`, `Note_on_c`.
    pub kind: String,
    pub fields: Vec<String>,
}

impl MidiRecord {
    fn new(track: usize, tick: u64, kind: &str, fields: Vec<String>) -> Self {
        Self {
            track,
            tick,
            kind: kind.to_string(),
            fields,
        }
    }

    /// The event type, lowercased and without the midicsv `_c`/`_t` suffix.
    pub fn kind_token(&self) -> String {
        let kind = self.kind.to_lowercase();
        kind.strip_suffix("_c")
            .or_else(|| kind.strip_suffix("_t"))
            .unwrap_or(&kind)
            .to_string()
    }

    pub fn field(&self, idx: usize) -> Option<&str> {
        self.fields.get(idx).map(String::as_str)
    }
}

/// midicsv writes `, "text"`; the space keeps the csv reader from seeing the quotes.
fn unquote(field: &str) -> String {
    match field.strip_prefix('"').and_then(|f| f.strip_suffix('"')) {
        Some(inner) => inner.replace("\"\"", "\""),
        None => field.to_string(),
    }
}

pub fn record_from_row(row: &StringRecord, row_no: usize) -> Result<MidiRecord, ImportError> {
    let malformed = |message: String| ImportError::MalformedRow {
        row: row_no,
        message,
    };

    let (Some(track), Some(tick), Some(kind)) = (row.get(0), row.get(1), row.get(2)) else {
        return Err(malformed(format!(
            "expected at least 3 columns, found {}",
            row.len()
        )));
    };

    let track = track
        .parse::<usize>()
        .map_err(|e| malformed(format!("bad track '{}': {}", track, e)))?;
    let tick = tick
        .parse::<u64>()
        .map_err(|e| malformed(format!("bad tick '{}': {}", tick, e)))?;

    Ok(MidiRecord::new(
        track,
        tick,
        kind,
        row.iter().skip(3).map(unquote).collect(),
    ))
}

/// Tokenize midicsv text. Rows that cannot be read are skipped with a warning.
pub fn records_from_csv(text: &str) -> Vec<MidiRecord> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(text.as_bytes());

    let mut records = Vec::new();
    for (idx, row) in reader.records().enumerate() {
        let record = row.map_err(ImportError::from).and_then(|row| {
            let row_no = row.position().map_or(idx + 1, |p| p.line() as usize);
            record_from_row(&row, row_no)
        });

        match record {
            Ok(record) => records.push(record),
            Err(why) => warn!("Skipping MIDI-CSV row: {}", why),
        }
    }

    records
}

/// Decode a binary standard MIDI file into midicsv-style records.
///
/// Only the record types the importer consumes are produced, plus track boundaries and names.
pub fn records_from_smf(bytes: &[u8]) -> Result<Vec<MidiRecord>, ImportError> {
    let smf = Smf::parse(bytes).map_err(|e| ImportError::Midi(format!("{:?}", e)))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int(),
        Timing::Timecode(_fps, _subframe) => return Err(ImportError::TimecodeUnsupported),
    };

    let format = match smf.header.format {
        midly::Format::SingleTrack => 0,
        midly::Format::Parallel => 1,
        midly::Format::Sequential => 2,
    };

    debug!(
        "MIDI format: {}, tracks: {}, ticks per quarter note: {}",
        format,
        smf.tracks.len(),
        ticks_per_quarter
    );

    let mut records = vec![MidiRecord::new(
        0,
        0,
        "Header",
        vec![
            format.to_string(),
            smf.tracks.len().to_string(),
            ticks_per_quarter.to_string(),
        ],
    )];

    for (idx, track) in smf.tracks.iter().enumerate() {
        let track_no = idx + 1;
        let mut abs_tick: u64 = 0;
        records.push(MidiRecord::new(track_no, 0, "Start_track", Vec::new()));

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            let record = match &event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(micro)) => Some(MidiRecord::new(
                    track_no,
                    abs_tick,
                    "Tempo",
                    vec![micro.as_int().to_string()],
                )),
                TrackEventKind::Meta(MetaMessage::TrackName(bytes)) => Some(MidiRecord::new(
                    track_no,
                    abs_tick,
                    "Title_t",
                    vec![String::from_utf8_lossy(bytes).into_owned()],
                )),
                TrackEventKind::Midi { channel, message } => match message {
                    MidiMessage::NoteOn { key, vel } => Some(MidiRecord::new(
                        track_no,
                        abs_tick,
                        "Note_on_c",
                        vec![
                            channel.as_int().to_string(),
                            key.as_int().to_string(),
                            vel.as_int().to_string(),
                        ],
                    )),
                    MidiMessage::NoteOff { key, vel } => Some(MidiRecord::new(
                        track_no,
                        abs_tick,
                        "Note_off_c",
                        vec![
                            channel.as_int().to_string(),
                            key.as_int().to_string(),
                            vel.as_int().to_string(),
                        ],
                    )),
                    _ => None,
                },
                _ => None,
            };

            records.extend(record);
        }

        records.push(MidiRecord::new(track_no, abs_tick, "End_track", Vec::new()));
    }

    Ok(records)
}

/// Load records from a `.csv` midicsv dump or a binary MIDI file, chosen by extension.
pub fn load_records<P: AsRef<Path>>(path: P) -> Result<Vec<MidiRecord>, ImportError> {
    let path = path.as_ref();
    let io_err = |source: std::io::Error| ImportError::Io {
        path: path.to_path_buf(),
        source,
    };

    let is_csv = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

    if is_csv {
        let text = fs::read_to_string(path).map_err(io_err)?;
        Ok(records_from_csv(&text))
    } else {
        let bytes = fs::read(path).map_err(io_err)?;
        records_from_smf(&bytes)
    }
}

/// Per-track overview used to pick a track selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSummary {
    pub track: usize,
    pub name: Option<String>,
    pub notes: usize,
}

pub fn track_summaries(records: &[MidiRecord]) -> Vec<TrackSummary> {
    let mut summaries: Vec<TrackSummary> = Vec::new();

    for record in records.iter().filter(|r| r.track > 0) {
        let idx = match summaries.iter().position(|s| s.track == record.track) {
            Some(idx) => idx,
            None => {
                summaries.push(TrackSummary {
                    track: record.track,
                    name: None,
                    notes: 0,
                });
                summaries.len() - 1
            }
        };
        let summary = &mut summaries[idx];

        match record.kind_token().as_str() {
            "title" if summary.name.is_none() => {
                summary.name = record.field(0).map(str::to_string);
            }
            "note_on" if record.field(2).is_some_and(|v| v != "0") => summary.notes += 1,
            _ => {}
        }
    }

    summaries
}
