use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info, warn};
use rafiano::midi_importer::records::{load_records, track_summaries};
use rafiano::notesheet::library::{append_song, combine, find_song, remove_song, scan};
use rafiano::notesheet::serialize_song;
use rafiano::{
    Args, Backend, Command, ControlMsg, InputEngine, LogEngine, PlaybackError, PlaybackOutcome,
    Player, PlayerConfig, SpinClock, countdown, import_midi_file, wait_for_window,
};
use std::path::Path;
use std::sync::mpsc;

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = PlayerConfig::from_args(&args);

    match &args.command {
        Command::List => list(&args.songs),
        Command::Play { name } => play(&args.songs, name, &config),
        Command::Remove { name } => {
            let removed = remove_song(&args.songs, name)?;
            println!("Removed {} from {}", removed.block.song, removed.path.display());
            Ok(())
        }
        Command::Combine {
            master,
            secondary,
            output,
        } => {
            let added = combine(master, secondary, output)?;
            println!("Wrote {} ({} song(s) added from {})", output.display(), added, secondary.display());
            Ok(())
        }
        Command::Convert {
            midi,
            tracks,
            format,
            name,
            creator,
            output,
        } => {
            let name = match name {
                Some(name) => name.clone(),
                None => midi
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "Untitled".into()),
            };

            info!("Importing MIDI file: '{}' (tracks {})...", midi.display(), tracks);
            let song = import_midi_file(midi, tracks, *format, &name, creator)?;

            match output {
                Some(path) => append_song(path, &song)?,
                None => print!("{}", serialize_song(&song)),
            }
            Ok(())
        }
        Command::Tracks { midi } => {
            let records = load_records(midi)?;
            for summary in track_summaries(&records) {
                println!(
                    "track {:>3}: {:<32} {} note(s)",
                    summary.track,
                    summary.name.as_deref().unwrap_or("<unnamed>"),
                    summary.notes
                );
            }
            Ok(())
        }
    }
}

fn list(songs: &Path) -> Result<()> {
    let found = scan(songs)?;
    if found.is_empty() {
        warn!("No songs found in {}..!", songs.display());
    }

    for entry in found.iter() {
        let song = &entry.block.song;
        let length = song
            .length_secs()
            .map(|secs| format!("{:.1}s", secs))
            .unwrap_or_else(|| "unplayable".into());

        println!(
            "{}  [{} | {} events | {} | {}]",
            song,
            song.format_version,
            song.events.len(),
            length,
            entry.path.display()
        );
    }
    Ok(())
}

fn input_engine(backend: Backend) -> Result<Box<dyn InputEngine>, PlaybackError> {
    match backend {
        Backend::Log => Ok(Box::new(LogEngine)),
        #[cfg(all(feature = "wininput", target_os = "windows"))]
        Backend::Windows => Ok(Box::new(rafiano::engine::windows::WindowsEngine::new())),
        #[cfg(not(all(feature = "wininput", target_os = "windows")))]
        Backend::Windows => Err(PlaybackError::BackendUnavailable("windows")),
    }
}

fn play(songs: &Path, name: &str, config: &PlayerConfig) -> Result<()> {
    let entry = find_song(songs, name)?;
    let song = entry.block.song;
    debug!("Found '{}' in {}..!", song, entry.path.display());

    let engine = input_engine(config.backend)?;

    let (stop_tx, stop_rx) = mpsc::channel::<ControlMsg>();
    ctrlc::set_handler(move || {
        warn!("Ctrl-C received, stopping playback..!");
        let _ = stop_tx.send(ControlMsg::Stop);
    })
    .context("Error setting Ctrl-C handler..!")?;

    if let Some(title) = config.focus_window.as_deref() {
        wait_for_window(title, config.focus_timeout)?;
    }

    if !countdown(config.countdown, &SpinClock::new(), &stop_rx) {
        return Ok(());
    }

    let player = Player::new(engine, SpinClock::new(), config.verbose);
    match player.play(&song, &stop_rx)? {
        PlaybackOutcome::Finished => info!("Playback finished, exiting..!"),
        PlaybackOutcome::Stopped => info!("Playback stopped, exiting..!"),
    }

    Ok(())
}
