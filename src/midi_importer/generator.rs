use crate::midi_importer::extractor::{Extraction, NoteInterval};
use crate::model::song::{Digit, FormatVersion, Modifier, NoteEvent, Song};
use log::{debug, warn};
use std::cmp::Ordering;

/// Press time used for a note picked out of an ambiguous chord.
pub const MIN_PRESS_SECS: f64 = 0.001;
/// Weight bonus for modifier-bearing groups in `2.0` generation.
const MODIFIER_GROUP_BIAS: f64 = 1.01;

/// All intervals sharing one start tick.
#[derive(Debug)]
struct Chord<'a> {
    start_tick: u64,
    notes: Vec<&'a NoteInterval>,
}

impl Chord<'_> {
    fn min_end_tick(&self) -> u64 {
        self.notes
            .iter()
            .map(|n| n.end_tick)
            .min()
            .unwrap_or(self.start_tick)
    }
}

fn chords(intervals: &[NoteInterval]) -> Vec<Chord<'_>> {
    let mut chords: Vec<Chord<'_>> = Vec::new();

    for interval in intervals.iter() {
        if let Some(chord) = chords.last_mut()
            && chord.start_tick == interval.start_tick
        {
            chord.notes.push(interval);
            continue;
        }

        chords.push(Chord {
            start_tick: interval.start_tick,
            notes: vec![interval],
        });
    }

    chords
}

fn unique_digits(notes: &[&NoteInterval]) -> Vec<Digit> {
    let mut keys: Vec<Digit> = Vec::new();
    for note in notes {
        if !keys.contains(&note.key.digit) {
            keys.push(note.key.digit);
        }
    }
    keys
}

/// Sequential events with relative timings, one per chord.
///
/// A chord of several notes containing a shift or space note is reduced to that single note, the
/// rest of the chord is dropped since one modifier cannot be held for only part of a chord.
pub fn generate_v1(extraction: &Extraction) -> Vec<NoteEvent> {
    let chords = chords(&extraction.intervals);
    let tempo = &extraction.tempo_map;
    let mut events = Vec::with_capacity(chords.len());
    let mut lossy = 0;

    for (idx, chord) in chords.iter().enumerate() {
        if chord.notes.len() > 1
            && let Some(note) = chord.notes.iter().find(|n| n.key.modifier != Modifier::None)
        {
            lossy += 1;
            events.push(NoteEvent {
                keys: vec![note.key.digit],
                modifier: note.key.modifier,
                press_duration: MIN_PRESS_SECS,
                gap_duration: 0.0,
            });
            continue;
        }

        let modifier = if chord.notes.len() == 1 {
            chord.notes[0].key.modifier
        } else {
            Modifier::None
        };

        let min_end = chord.min_end_tick();
        let next_start = chords
            .get(idx + 1)
            .map(|c| c.start_tick)
            .unwrap_or(chord.start_tick);

        let how_long = tempo.ticks_to_secs(min_end as f64 - chord.start_tick as f64, chord.start_tick);
        let till_next = tempo.ticks_to_secs(next_start as f64 - min_end as f64, chord.start_tick);

        events.push(NoteEvent {
            keys: unique_digits(&chord.notes),
            modifier,
            press_duration: how_long.max(0.0),
            gap_duration: till_next.max(0.0),
        });
    }

    if lossy > 0 {
        warn!(
            "Reduced {} chord(s) mixing modifier notes to a single note..!",
            lossy
        );
    }

    events
}

/// Absolute-time events: every chord becomes up to three lines, one per modifier group, where the
/// press and gap columns hold the group's absolute start and release times.
pub fn generate_v2(extraction: &Extraction) -> Vec<NoteEvent> {
    let tempo = &extraction.tempo_map;
    let mut events = Vec::new();

    for chord in chords(&extraction.intervals).iter() {
        let mut groups: Vec<(Modifier, f64, Vec<&NoteInterval>)> =
            [Modifier::Space, Modifier::Shift, Modifier::None]
                .into_iter()
                .map(|modifier| {
                    let notes: Vec<&NoteInterval> = chord
                        .notes
                        .iter()
                        .copied()
                        .filter(|n| n.key.modifier == modifier)
                        .collect();
                    (modifier, group_weight(modifier, &notes), notes)
                })
                .filter(|(_, _, notes)| !notes.is_empty())
                .collect();

        // stable, so equal weights keep space, shift, none order
        groups.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

        for (modifier, weight, notes) in groups.into_iter() {
            let end_tick = notes
                .iter()
                .map(|n| n.end_tick)
                .min()
                .unwrap_or(chord.start_tick);

            debug!(
                "Chord at tick {}: {:?} group of {} note(s), weight {:.1}",
                chord.start_tick,
                modifier,
                notes.len(),
                weight
            );

            events.push(NoteEvent {
                keys: unique_digits(&notes),
                modifier,
                press_duration: tempo.ticks_to_secs(chord.start_tick as f64, chord.start_tick),
                gap_duration: tempo.ticks_to_secs(end_tick as f64, chord.start_tick),
            });
        }
    }

    events
}

fn group_weight(modifier: Modifier, notes: &[&NoteInterval]) -> f64 {
    let span: f64 = notes
        .iter()
        .map(|n| n.end_tick as f64 - n.start_tick as f64)
        .sum();
    let bias = if modifier == Modifier::None {
        1.0
    } else {
        MODIFIER_GROUP_BIAS
    };

    notes.len() as f64 * span * bias
}

/// Build a complete song in the requested format.
pub fn generate(extraction: &Extraction, name: &str, creator: &str, version: FormatVersion) -> Song {
    let events = match version {
        FormatVersion::V1 => generate_v1(extraction),
        FormatVersion::V2 => generate_v2(extraction),
    };

    Song {
        name: name.to_string(),
        creator: creator.to_string(),
        format_version: version.as_str().to_string(),
        events,
    }
}
