use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli::{Commands, OutputMode};
use crate::errors::AppResult;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode>;
    fn as_any(&self) -> &dyn Any;
}

mod faces;
mod replay;

pub use faces::{FacesHandler, FacesHandlerDeps};
pub use replay::{ReplayHandler, ReplayHandlerDeps};

/// Builds the handler for `command`, carrying the global `--store` override.
pub fn build_handler(command: Commands, store: Option<PathBuf>) -> Box<dyn CommandHandler> {
    match command {
        Commands::Faces(cmd) => Box::new(FacesHandler::new(cmd).with_store(store)),
        Commands::Replay(args) => Box::new(ReplayHandler::new(args).with_store(store)),
    }
}

impl From<Commands> for Box<dyn CommandHandler> {
    fn from(command: Commands) -> Self {
        build_handler(command, None)
    }
}
