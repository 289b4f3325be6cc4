use crate::error::ImportError;
use crate::midi_importer::records::MidiRecord;
use crate::model::layout::{LayoutKey, quantize};
use log::{debug, warn};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_PPQ: u16 = 480;
pub const DEFAULT_MPQN: u32 = 500_000;
const MICROSECONDS_PER_MINUTE: f64 = 60_000_000.0;

/// Which tracks contribute notes. Tempo changes are read from every track.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrackSelection {
    #[default]
    All,
    Tracks(BTreeSet<usize>),
}

impl TrackSelection {
    pub fn contains(&self, track: usize) -> bool {
        match self {
            TrackSelection::All => true,
            TrackSelection::Tracks(tracks) => tracks.contains(&track),
        }
    }
}

impl FromStr for TrackSelection {
    type Err = String;

    /// `all`, or a comma separated list of track numbers such as `1,3`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("all") {
            return Ok(TrackSelection::All);
        }

        let tracks = s
            .split(',')
            .map(|t| {
                t.trim()
                    .parse::<usize>()
                    .map_err(|e| format!("bad track number '{}': {}", t.trim(), e))
            })
            .collect::<Result<BTreeSet<_>, _>>()?;

        Ok(TrackSelection::Tracks(tracks))
    }
}

impl fmt::Display for TrackSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackSelection::All => f.write_str("all"),
            TrackSelection::Tracks(tracks) => {
                let list = tracks.iter().map(|t| t.to_string()).collect::<Vec<_>>();
                f.write_str(&list.join(","))
            }
        }
    }
}

/// Absolute tick to ticks-per-millisecond, valid from that tick onwards.
#[derive(Debug, Clone, PartialEq)]
pub struct TempoMap {
    ppq: u16,
    entries: BTreeMap<u64, f64>,
}

impl TempoMap {
    pub fn new(ppq: u16) -> Self {
        Self {
            ppq,
            entries: BTreeMap::new(),
        }
    }

    pub fn ticks_per_ms_for(ppq: u16, microseconds_per_quarter: u32) -> f64 {
        let bpm = MICROSECONDS_PER_MINUTE / microseconds_per_quarter as f64;
        bpm * ppq as f64 / 60_000.0
    }

    pub fn ppq(&self) -> u16 {
        self.ppq
    }

    pub fn insert(&mut self, tick: u64, ticks_per_ms: f64) {
        self.entries.insert(tick, ticks_per_ms);
    }

    /// Greatest entry at or before `tick`; never one after it.
    pub fn nearest_lower(&self, tick: u64) -> Option<(u64, f64)> {
        self.entries
            .range(..=tick)
            .next_back()
            .map(|(&t, &tpm)| (t, tpm))
    }

    /// Tempo in effect at `tick`, falling back to the MIDI default of 120 BPM before the first
    /// tempo change.
    pub fn ticks_per_ms(&self, tick: u64) -> f64 {
        match self.nearest_lower(tick) {
            Some((_, tpm)) => tpm,
            None => Self::ticks_per_ms_for(self.ppq, DEFAULT_MPQN),
        }
    }

    pub fn ticks_to_secs(&self, ticks: f64, at_tick: u64) -> f64 {
        ticks / 1000.0 / self.ticks_per_ms(at_tick)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A closed note on a selected track, snapped onto the keyboard layout.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteInterval {
    pub key: &'static LayoutKey,
    /// The pitch as written in the MIDI file.
    pub source_pitch: u8,
    pub track: usize,
    pub start_tick: u64,
    pub end_tick: u64,
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub tempo_map: TempoMap,
    /// Sorted by start tick; notes sharing a start tick keep their Note-On order.
    pub intervals: Vec<NoteInterval>,
}

struct OpenNote {
    seq: usize,
    track: usize,
    pitch: u8,
    start_tick: u64,
}

struct ClosedNote {
    seq: usize,
    track: usize,
    pitch: u8,
    start_tick: u64,
    end_tick: u64,
}

#[derive(Default)]
struct Extractor {
    ppq: Option<u16>,
    tempos: Vec<(u64, f64)>,
    open: Vec<OpenNote>,
    closed: Vec<ClosedNote>,
    next_seq: usize,
}

fn parse_field<T: FromStr>(record: &MidiRecord, idx: usize, field: &'static str) -> Result<T, ImportError> {
    let value = record.field(idx).ok_or_else(|| ImportError::MissingField {
        kind: record.kind.clone(),
        field,
    })?;

    value.trim().parse::<T>().map_err(|_| ImportError::BadField {
        kind: record.kind.clone(),
        field,
        value: value.to_string(),
    })
}

impl Extractor {
    fn apply(&mut self, record: &MidiRecord, selection: &TrackSelection) -> Result<(), ImportError> {
        match record.kind_token().as_str() {
            "header" => {
                let ppq: u16 = parse_field(record, 2, "division")?;
                debug!("Ticks per quarter note: {}", ppq);
                self.ppq = Some(ppq);
            }
            "tempo" => {
                let mpqn: u32 = parse_field(record, 0, "microseconds per quarter")?;
                if mpqn == 0 {
                    return Err(ImportError::ZeroTempo);
                }

                let ppq = self.ppq.unwrap_or(DEFAULT_PPQ);
                let tpm = TempoMap::ticks_per_ms_for(ppq, mpqn);
                debug!(
                    "Tempo change at tick {} -> {} us/qn ({:.3} ticks/ms, track {})",
                    record.tick, mpqn, tpm, record.track
                );
                self.tempos.push((record.tick, tpm));
            }
            "note_on" if selection.contains(record.track) => {
                let pitch: u8 = parse_field(record, 1, "note")?;
                let velocity: u8 = parse_field(record, 2, "velocity")?;

                if velocity == 0 {
                    self.close(record.track, pitch, record.tick);
                } else {
                    self.open.push(OpenNote {
                        seq: self.next_seq,
                        track: record.track,
                        pitch,
                        start_tick: record.tick,
                    });
                    self.next_seq += 1;
                }
            }
            "note_off" if selection.contains(record.track) => {
                let pitch: u8 = parse_field(record, 1, "note")?;
                self.close(record.track, pitch, record.tick);
            }
            _ => {}
        }

        Ok(())
    }

    /// Close the earliest still-open note of this pitch on this track.
    fn close(&mut self, track: usize, pitch: u8, tick: u64) {
        let Some(idx) = self
            .open
            .iter()
            .position(|n| n.track == track && n.pitch == pitch)
        else {
            debug!("Orphaned NoteOff for {} on track {} at tick {}..!", pitch, track, tick);
            return;
        };

        if tick <= self.open[idx].start_tick {
            debug!(
                "Ignoring NoteOff for {} on track {} at tick {}, not after its NoteOn..!",
                pitch, track, tick
            );
            return;
        }

        let note = self.open.remove(idx);
        self.closed.push(ClosedNote {
            seq: note.seq,
            track,
            pitch,
            start_tick: note.start_tick,
            end_tick: tick,
        });
    }

    fn finish(self) -> Extraction {
        for note in self.open.iter() {
            warn!(
                "Dropping unclosed NoteOn for {} on track {} at tick {}..!",
                note.pitch, note.track, note.start_tick
            );
        }

        let mut tempo_map = TempoMap::new(self.ppq.unwrap_or(DEFAULT_PPQ));
        for (tick, tpm) in self.tempos {
            tempo_map.insert(tick, tpm);
        }

        let mut closed = self.closed;
        closed.sort_by_key(|n| (n.start_tick, n.seq));

        let intervals = closed
            .into_iter()
            .map(|n| NoteInterval {
                key: quantize(n.pitch),
                source_pitch: n.pitch,
                track: n.track,
                start_tick: n.start_tick,
                end_tick: n.end_tick,
            })
            .collect();

        Extraction {
            tempo_map,
            intervals,
        }
    }
}

/// Build the tempo map and the closed note intervals of the selected tracks.
///
/// A record that cannot be interpreted is logged and skipped.
pub fn extract(records: &[MidiRecord], selection: &TrackSelection) -> Extraction {
    let mut extractor = Extractor::default();

    for record in records.iter() {
        if let Err(why) = extractor.apply(record, selection) {
            warn!(
                "Skipping {} record at tick {} on track {}: {}",
                record.kind, record.tick, record.track, why
            );
        }
    }

    let extraction = extractor.finish();
    debug!(
        "Extracted {} note interval(s) and {} tempo change(s) from tracks [{}]..!",
        extraction.intervals.len(),
        extraction.tempo_map.len(),
        selection
    );

    extraction
}
