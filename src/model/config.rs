use crate::midi_importer::extractor::TrackSelection;
use crate::model::song::FormatVersion;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "rafiano",
    about = "Play notesheet songs on a 3-octave digit keyboard, and convert MIDI files into notesheets!"
)]
pub struct Args {
    /// Notesheet folder (every *.notesheet inside is read) or a single notesheet file.
    #[arg(short, long, global = true, default_value = "songs")]
    pub songs: PathBuf,

    /// Where keystrokes go. `log` only prints them.
    #[arg(short, long, global = true, value_enum, default_value_t = Backend::Windows)]
    pub backend: Backend,

    /// Seconds to count down before the first key.
    #[arg(short, long, global = true, default_value_t = 5)]
    pub countdown: u64,

    /// Wait (up to 30 seconds) for a window with this title to be active before playing.
    #[arg(long = "focus-window", global = true)]
    pub focus_window: Option<String>,

    /// Prints extra information to the terminal.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List every song found in the songs path.
    List,

    /// Play a song by name.
    Play {
        name: String,
    },

    /// Delete a song from the notesheet file that holds it.
    Remove {
        name: String,
    },

    /// Append the songs of one notesheet file to another, writing the result to a new file.
    Combine {
        master: PathBuf,
        secondary: PathBuf,
        output: PathBuf,
    },

    /// Convert a MIDI file (.mid or midicsv .csv) into a notesheet song.
    Convert {
        midi: PathBuf,

        /// Tracks to read: `all` or a comma separated list such as `1,3`.
        #[arg(short, long, default_value = "all")]
        tracks: TrackSelection,

        /// Notesheet format to generate: 1 (sequential) or 2 (absolute timeline).
        #[arg(short, long, default_value = "1.0")]
        format: FormatVersion,

        /// Song name, defaults to the file stem.
        #[arg(short, long)]
        name: Option<String>,

        #[arg(long, default_value = "Unknown")]
        creator: String,

        /// Append the song to this notesheet file instead of printing it.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show the tracks of a MIDI file with their names and note counts.
    Tracks {
        midi: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Log keystrokes without sending them.
    Log,
    /// Inject keystrokes through the Win32 `SendInput` API.
    Windows,
}

/// Everything playback needs from the command line, passed around explicitly.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub backend: Backend,
    pub countdown: u64,
    pub focus_window: Option<String>,
    pub focus_timeout: Duration,
    pub verbose: bool,
}

impl PlayerConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            backend: args.backend,
            countdown: args.countdown,
            focus_window: args.focus_window.clone(),
            focus_timeout: crate::util::FOCUS_TIMEOUT,
            verbose: args.verbose,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn play_with_global_options() {
        let args = Args::try_parse_from([
            "rafiano",
            "play",
            "Ode to Joy",
            "--backend",
            "log",
            "--countdown",
            "0",
            "--songs",
            "my_songs",
        ])
        .unwrap();

        assert!(matches!(args.command, Command::Play { ref name } if name == "Ode to Joy"));
        let config = PlayerConfig::from_args(&args);
        assert_eq!(config.backend, Backend::Log);
        assert_eq!(config.countdown, 0);
        assert_eq!(args.songs, PathBuf::from("my_songs"));
        assert!(config.focus_window.is_none());
    }

    #[test]
    fn convert_defaults() {
        let args = Args::try_parse_from(["rafiano", "convert", "song.mid"]).unwrap();

        let Command::Convert {
            tracks,
            format,
            name,
            creator,
            output,
            ..
        } = args.command
        else {
            panic!("expected convert");
        };

        assert_eq!(tracks, TrackSelection::All);
        assert_eq!(format, FormatVersion::V1);
        assert!(name.is_none());
        assert_eq!(creator, "Unknown");
        assert!(output.is_none());
        assert_eq!(args.backend, Backend::Windows);
        assert_eq!(args.countdown, 5);
    }

    #[test]
    fn convert_track_list_and_format() {
        let args =
            Args::try_parse_from(["rafiano", "convert", "song.csv", "-t", "1,3", "-f", "2"]).unwrap();

        let Command::Convert { tracks, format, .. } = args.command else {
            panic!("expected convert");
        };
        assert!(tracks.contains(1) && tracks.contains(3) && !tracks.contains(2));
        assert_eq!(format, FormatVersion::V2);
    }

    #[test]
    fn rejects_unknown_backend() {
        assert!(Args::try_parse_from(["rafiano", "list", "--backend", "xorg"]).is_err());
    }
}
