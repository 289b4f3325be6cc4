use crate::error::NotesheetError;
use crate::model::song::Song;
use crate::notesheet::{SongBlock, parse_blocks, serialize_song, validate};
use log::{debug, info, warn};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub const NOTESHEET_EXTENSION: &str = "notesheet";

/// A song found on disk.
#[derive(Debug, Clone)]
pub struct LibrarySong {
    pub path: PathBuf,
    pub block: SongBlock,
}

/// The notesheet files behind `path`: the file itself, or every `*.notesheet` file of a folder.
pub fn notesheet_files(path: &Path) -> Result<Vec<PathBuf>, NotesheetError> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let entries = fs::read_dir(path).map_err(|e| NotesheetError::io(path, e))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| NotesheetError::io(path, e))?;
        let file = entry.path();
        if file.is_file()
            && file
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case(NOTESHEET_EXTENSION))
        {
            files.push(file);
        }
    }

    files.sort();
    Ok(files)
}

fn read(path: &Path) -> Result<String, NotesheetError> {
    fs::read_to_string(path).map_err(|e| NotesheetError::io(path, e))
}

/// Read, validate and parse a single notesheet file.
pub fn load_file(path: &Path) -> Result<Vec<SongBlock>, NotesheetError> {
    let text = read(path)?;
    if !validate(&text) {
        return Err(NotesheetError::InvalidCharacters);
    }

    parse_blocks(&text)
}

/// Every song available under `path`.
///
/// Files that cannot be read, fail validation, or fail to parse are skipped with a warning.
pub fn scan(path: &Path) -> Result<Vec<LibrarySong>, NotesheetError> {
    let mut songs = Vec::new();

    for file in notesheet_files(path)? {
        match load_file(&file) {
            Ok(blocks) => {
                debug!("Loaded {} song(s) from {}..!", blocks.len(), file.display());
                songs.extend(blocks.into_iter().map(|block| LibrarySong {
                    path: file.clone(),
                    block,
                }));
            }
            Err(why) => {
                warn!("Skipping notesheet {}: {}", file.display(), why);
            }
        }
    }

    Ok(songs)
}

/// First song called `name` under `path`.
pub fn find_song(path: &Path, name: &str) -> Result<LibrarySong, NotesheetError> {
    scan(path)?
        .into_iter()
        .find(|s| s.block.song.name == name)
        .ok_or_else(|| NotesheetError::SongNotFound(name.to_string()))
}

/// Delete the lines of the song called `name` from the file that holds it.
pub fn remove_song(path: &Path, name: &str) -> Result<LibrarySong, NotesheetError> {
    let found = find_song(path, name)?;

    // re-read right before the splice so the line range matches what is on disk now
    let text = read(&found.path)?;
    let blocks = parse_blocks(&text)?;
    let Some(block) = blocks.iter().find(|b| b.song.name == name) else {
        return Err(NotesheetError::SongNotFound(name.to_string()));
    };

    let kept: Vec<&str> = text
        .split('\n')
        .enumerate()
        .filter(|(idx, _)| !block.lines.contains(idx))
        .map(|(_, line)| line)
        .collect();

    // the last song's range swallows the empty piece after the final newline
    let mut out = kept.join("\n");
    if text.ends_with('\n') && !out.is_empty() && !out.ends_with('\n') {
        out.push('\n');
    }

    fs::write(&found.path, out).map_err(|e| NotesheetError::io(&found.path, e))?;
    info!(
        "Removed '{}' (lines {}..{}) from {}..!",
        name,
        block.lines.start + 1,
        block.lines.end,
        found.path.display()
    );

    Ok(found)
}

fn trim_trailing_blank<'a>(mut lines: &'a [&'a str]) -> &'a [&'a str] {
    while let Some((last, rest)) = lines.split_last() {
        if !last.trim().is_empty() {
            break;
        }
        lines = rest;
    }
    lines
}

/// Write every song of `master` plus the songs of `secondary` whose names `master` lacks into `output`.
///
/// Songs are copied as raw source lines, so comments inside a song survive.
/// Returns the number of songs taken from `secondary`.
pub fn combine(master: &Path, secondary: &Path, output: &Path) -> Result<usize, NotesheetError> {
    let master_text = read(master)?;
    let secondary_text = read(secondary)?;

    let master_blocks = parse_blocks(&master_text)?;
    let secondary_blocks = parse_blocks(&secondary_text)?;

    let mut names: HashSet<&str> = master_blocks.iter().map(|b| b.song.name.as_str()).collect();

    let master_lines: Vec<&str> = master_text.split('\n').collect();
    let secondary_lines: Vec<&str> = secondary_text.split('\n').collect();

    let mut out: Vec<&str> = trim_trailing_blank(&master_lines).to_vec();
    let mut added = 0;

    for block in secondary_blocks.iter() {
        if !names.insert(block.song.name.as_str()) {
            debug!("Dropping duplicate song '{}' from {}..!", block.song.name, secondary.display());
            continue;
        }

        if !out.is_empty() {
            out.push("");
        }
        out.extend_from_slice(trim_trailing_blank(&secondary_lines[block.lines.clone()]));
        added += 1;
    }

    let mut text = out.join("\n");
    text.push('\n');
    fs::write(output, text).map_err(|e| NotesheetError::io(output, e))?;

    info!(
        "Combined {} song(s) from {} with {} new song(s) from {} into {}..!",
        master_blocks.len(),
        master.display(),
        added,
        secondary.display(),
        output.display()
    );

    Ok(added)
}

/// Append `song` to the notesheet file at `path`, creating the file if needed.
pub fn append_song(path: &Path, song: &Song) -> Result<(), NotesheetError> {
    let existing = if path.exists() { read(path)? } else { String::new() };
    let lines: Vec<&str> = existing.split('\n').collect();

    let mut text = trim_trailing_blank(&lines).join("\n");
    if !text.is_empty() {
        text.push_str("\n\n");
    }
    text.push_str(&serialize_song(song));

    fs::write(path, text).map_err(|e| NotesheetError::io(path, e))?;
    info!("Appended '{}' to {}..!", song, path.display());
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::notesheet::parse;

    fn write(dir: &Path, name: &str, text: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn scan_skips_invalid_files() {
        env_logger::try_init().unwrap_or(());
        let dir = tempfile::tempdir().unwrap();

        write(dir.path(), "good.notesheet", "|A|x|1.0\n1  0.1 0.1\n");
        write(dir.path(), "chars.notesheet", "|B|x|1.0\n1 ?? 0.1 0.1\n");
        write(dir.path(), "modifier.notesheet", "|C|x|1.0\n1 SHSH 0.1 0.1\n");
        write(dir.path(), "ignored.txt", "|D|x|1.0\n1  0.1 0.1\n");

        let songs = scan(dir.path()).unwrap();
        let names: Vec<&str> = songs.iter().map(|s| s.block.song.name.as_str()).collect();
        assert_eq!(names, vec!["A"]);
    }

    #[test]
    fn remove_deletes_exactly_the_song_lines() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(
            dir.path(),
            "songs.notesheet",
            "# keep me\n|A|x|1.0\n1  0.1 0.1\n# part of A\n|B|y|1.0\n2 SH 0.2 0.2\n",
        );

        let removed = remove_song(dir.path(), "A").unwrap();
        assert_eq!(removed.path, file);

        let text = fs::read_to_string(&file).unwrap();
        assert_eq!(text, "# keep me\n|B|y|1.0\n2 SH 0.2 0.2\n");
    }

    #[test]
    fn remove_last_song_keeps_trailing_newline() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(
            dir.path(),
            "songs.notesheet",
            "|A|x|1.0\n1  0.1 0.1\n|B|y|1.0\n2 SH 0.2 0.2\n",
        );

        remove_song(&file, "B").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "|A|x|1.0\n1  0.1 0.1\n");

        remove_song(&file, "A").unwrap();
        assert_eq!(fs::read_to_string(&file).unwrap(), "");
    }

    #[test]
    fn remove_unknown_song_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let file = write(dir.path(), "songs.notesheet", "|A|x|1.0\n1  0.1 0.1\n");

        let err = remove_song(&file, "Nope").unwrap_err();
        assert!(matches!(err, NotesheetError::SongNotFound(ref n) if n == "Nope"));
        assert_eq!(fs::read_to_string(&file).unwrap(), "|A|x|1.0\n1  0.1 0.1\n");
    }

    #[test]
    fn combine_drops_secondary_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let master = write(dir.path(), "master.notesheet", "|A|master|1.0\n1  0.1 0.1\n");
        let secondary = write(
            dir.path(),
            "secondary.notesheet",
            "|A|secondary|1.0\n9  0.9 0.9\n|B|secondary|1.0\n# kept comment\n2 SP 0.2 0.2\n",
        );
        let output = dir.path().join("out.notesheet");

        assert_eq!(combine(&master, &secondary, &output).unwrap(), 1);

        let text = fs::read_to_string(&output).unwrap();
        assert_eq!(
            text,
            "|A|master|1.0\n1  0.1 0.1\n\n|B|secondary|1.0\n# kept comment\n2 SP 0.2 0.2\n"
        );

        let songs = parse(&text).unwrap();
        assert_eq!(songs.len(), 2);
        assert_eq!(songs[0].creator, "master");
        assert_eq!(songs[1].name, "B");
    }

    #[test]
    fn append_creates_then_separates_songs() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("new.notesheet");
        let mut song = parse("|A|x|1.0\n1  0.1 0.1\n").unwrap().remove(0);

        append_song(&file, &song).unwrap();
        song.name = "B".to_string();
        append_song(&file, &song).unwrap();

        let text = fs::read_to_string(&file).unwrap();
        assert_eq!(
            text,
            "|A|x|1.0\n1  0.1000 0.1000\n\n|B|x|1.0\n1  0.1000 0.1000\n"
        );
        assert_eq!(scan(&file).unwrap().len(), 2);
    }
}
