//! The `.notesheet` text format.
//!
//! ```text
//! # comment
//! |Song name|Creator|1.0
//! 1|2 SH 0.2500 0.1000
//! 3  0.5000 0.0000
//! ```
//!
//! A header starts a song, every following non-blank non-comment line is a note line made of
//! `KEYS MODIFIER PRESS GAP` separated by single spaces. An empty modifier is the empty string
//! between two spaces. Keys may also be spread over several fields (`2 3| 0.3 0.1`), in which case
//! the modifier column may be left out.

pub mod library;

use crate::error::NotesheetError;
use crate::model::song::{Digit, Modifier, NoteEvent, Song};
use std::fmt::Write;
use std::ops::Range;
use std::sync::LazyLock;
use std::time::Duration;

pub const DEFAULT_VERSION: &str = "1.0";

static NOTE_LINE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"^([0-9.\s|]|SH|SP)*$").expect("note line pattern is valid")
});

/// A parsed song together with the lines of the source text it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct SongBlock {
    pub song: Song,
    /// Half-open, 0-based: header line up to (not including) the next header or the end of the text.
    pub lines: Range<usize>,
}

fn is_skipped(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}

fn is_header(line: &str) -> bool {
    line.starts_with('|')
}

fn lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n').map(|l| l.strip_suffix('\r').unwrap_or(l))
}

/// Cheap character check run before a full parse.
///
/// Only note lines are inspected; they may contain digits, `.`, `|`, whitespace and the tokens
/// `SH`/`SP` in any case.
pub fn validate(text: &str) -> bool {
    lines(text)
        .filter(|line| !is_skipped(line) && !is_header(line))
        .all(|line| NOTE_LINE.is_match(&line.to_uppercase()))
}

/// Parse every song of a notesheet.
pub fn parse(text: &str) -> Result<Vec<Song>, NotesheetError> {
    Ok(parse_blocks(text)?.into_iter().map(|b| b.song).collect())
}

/// Parse every song of a notesheet, keeping the source line range each one occupied.
pub fn parse_blocks(text: &str) -> Result<Vec<SongBlock>, NotesheetError> {
    let mut blocks: Vec<SongBlock> = Vec::new();
    let mut current: Option<(Song, usize)> = None;
    let mut line_count = 0;

    for (idx, line) in lines(text).enumerate() {
        line_count = idx + 1;

        if is_skipped(line) {
            continue;
        }

        if is_header(line) {
            if let Some((song, start)) = current.take() {
                blocks.push(SongBlock {
                    song,
                    lines: start..idx,
                });
            }
            current = Some((parse_header(line, idx + 1)?, idx));
            continue;
        }

        // note lines before the first header belong to no song
        if let Some((song, _)) = current.as_mut() {
            song.events.push(parse_note_line(line, idx + 1)?);
        }
    }

    if let Some((song, start)) = current {
        blocks.push(SongBlock {
            song,
            lines: start..line_count,
        });
    }

    Ok(blocks)
}

fn parse_header(line: &str, line_no: usize) -> Result<Song, NotesheetError> {
    let mut fields = line.split('|').skip(1);

    let (Some(name), Some(creator)) = (fields.next(), fields.next()) else {
        return Err(NotesheetError::MalformedHeader { line: line_no });
    };

    let format_version = match fields.next().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => DEFAULT_VERSION.to_string(),
    };

    Ok(Song {
        name: name.to_string(),
        creator: creator.to_string(),
        format_version,
        events: Vec::new(),
    })
}

fn is_key_fragment(field: &str) -> bool {
    !field.is_empty() && field.chars().all(|c| c.is_ascii_digit() || c == '|')
}

fn parse_note_line(line: &str, line_no: usize) -> Result<NoteEvent, NotesheetError> {
    let fields: Vec<&str> = line.split(' ').collect();
    let field = |i: usize, name: &'static str| {
        fields
            .get(i)
            .copied()
            .ok_or(NotesheetError::MissingField {
                line: line_no,
                field: name,
            })
    };

    // keys may be spread over several fields, as long as both timings still follow
    let mut next = 1;
    while fields.len() - next > 2 && is_key_fragment(fields[next]) {
        next += 1;
    }

    let mut keys: Vec<Digit> = Vec::new();
    for key in fields[..next]
        .iter()
        .flat_map(|spec| spec.split('|'))
        .filter(|k| !k.is_empty())
    {
        let mut chars = key.chars();
        let digit = match (chars.next().and_then(Digit::from_char), chars.next()) {
            (Some(d), None) => d,
            _ => {
                return Err(NotesheetError::InvalidKey {
                    line: line_no,
                    key: key.to_string(),
                });
            }
        };
        if !keys.contains(&digit) {
            keys.push(digit);
        }
    }

    if keys.is_empty() {
        return Err(NotesheetError::EmptyKeys { line: line_no });
    }

    // the modifier column can only be left out after a split key spec
    let token = if next > 1 && fields.len() - next == 2 {
        ""
    } else {
        next += 1;
        field(next - 1, "modifier")?
    };
    let modifier = Modifier::from_token(token).ok_or_else(|| NotesheetError::InvalidModifier {
        line: line_no,
        token: token.to_string(),
    })?;

    let press_duration = parse_seconds(field(next, "press time")?, line_no)?;
    let gap_duration = parse_seconds(field(next + 1, "gap time")?, line_no)?;

    Ok(NoteEvent {
        keys,
        modifier,
        press_duration,
        gap_duration,
    })
}

/// Non-negative seconds that still fit a `Duration`.
fn parse_seconds(value: &str, line_no: usize) -> Result<f64, NotesheetError> {
    match value.trim().parse::<f64>() {
        Ok(secs) if Duration::try_from_secs_f64(secs).is_ok() => Ok(secs),
        _ => Err(NotesheetError::InvalidTiming {
            line: line_no,
            value: value.to_string(),
        }),
    }
}

pub fn header_line(name: &str, creator: &str, version: &str) -> String {
    format!("|{}|{}|{}", name, creator, version)
}

pub fn note_line(keys: &[Digit], modifier: Modifier, press: f64, gap: f64) -> String {
    let keyspec = keys
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("|");

    format!("{} {} {:.4} {:.4}", keyspec, modifier.token(), press, gap)
}

/// Render one song in notesheet form, newline-terminated.
pub fn serialize_song(song: &Song) -> String {
    let mut out = header_line(&song.name, &song.creator, &song.format_version);
    out.push('\n');

    for event in song.events.iter() {
        let _ = writeln!(
            out,
            "{}",
            note_line(
                &event.keys,
                event.modifier,
                event.press_duration,
                event.gap_duration
            )
        );
    }

    out
}

pub fn serialize(songs: &[Song]) -> String {
    songs
        .iter()
        .map(serialize_song)
        .collect::<Vec<_>>()
        .join("\n")
}
