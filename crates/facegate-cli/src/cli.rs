use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "facegate",
    version,
    about = "Manage enrolled faces and replay recorded frame streams through the unlock pipeline"
)]
pub struct Cli {
    /// Emit machine-readable JSON instead of human text
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Face store location (overrides $FACEGATE_STORE_PATH and the config file)
    #[arg(long, global = true, value_name = "PATH")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        OutputMode::from(self.json)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

impl From<bool> for OutputMode {
    fn from(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage the allow-list and deny-list
    #[command(subcommand)]
    Faces(FacesCommands),
    /// Feed a recorded frame stream through matcher, session and lock
    Replay(ReplayArgs),
}

#[derive(Debug, Subcommand)]
pub enum FacesCommands {
    /// Add or replace an allow-list record
    Enroll(FaceEnrollArgs),
    /// Add or replace a deny-list record
    Deny(FaceEnrollArgs),
    /// Remove every record carrying a label
    Remove(FaceRemoveArgs),
    /// List stored records
    List,
    /// Match one probe embedding against the store
    Match(FaceMatchArgs),
}

#[derive(Debug, Clone, Args)]
pub struct FaceEnrollArgs {
    #[arg(long)]
    pub label: String,

    /// JSON file of the form {"embedding": [..]}
    #[arg(long, value_name = "FILE")]
    pub embedding: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct FaceRemoveArgs {
    #[arg(long)]
    pub label: String,
}

#[derive(Debug, Clone, Args)]
pub struct FaceMatchArgs {
    /// JSON file of the form {"embedding": [..]}
    #[arg(long, value_name = "FILE")]
    pub probe: PathBuf,
}

#[derive(Debug, Clone, Args)]
pub struct ReplayArgs {
    /// JSON Lines file, one frame per line
    #[arg(long, value_name = "FILE")]
    pub frames: PathBuf,

    /// Make the simulated unlock actuator fail
    #[arg(long)]
    pub actuator_fails: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from([
            "facegate",
            "faces",
            "list",
            "--json",
            "--store",
            "/tmp/faces.json",
        ]);
        assert_eq!(cli.output_mode(), OutputMode::Json);
        assert_eq!(cli.store, Some(PathBuf::from("/tmp/faces.json")));
        assert!(matches!(cli.command, Commands::Faces(FacesCommands::List)));
    }

    #[test]
    fn replay_parses_actuator_flag() {
        let cli = Cli::parse_from([
            "facegate",
            "-vv",
            "replay",
            "--frames",
            "frames.jsonl",
            "--actuator-fails",
        ]);
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Replay(args) => {
                assert_eq!(args.frames, PathBuf::from("frames.jsonl"));
                assert!(args.actuator_fails);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
