use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli::{OutputMode, ReplayArgs};
use crate::commands::CommandHandler;
use crate::config::{self, Settings};
use crate::errors::AppResult;
use crate::output::render_replay;
use crate::replay::{self, ReplayConfig, ReplayOutcome};

pub struct ReplayHandler {
    args: ReplayArgs,
    store: Option<PathBuf>,
    deps: ReplayHandlerDeps,
}

pub struct ReplayHandlerDeps {
    pub load_settings: Box<dyn Fn(Option<PathBuf>) -> AppResult<Settings> + Send + Sync>,
    pub replay: Box<dyn Fn(&ReplayConfig) -> AppResult<ReplayOutcome> + Send + Sync>,
    pub render: Box<dyn Fn(&ReplayOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync>,
}

impl ReplayHandlerDeps {
    pub fn new(
        load_settings: impl Fn(Option<PathBuf>) -> AppResult<Settings> + Send + Sync + 'static,
        replay: impl Fn(&ReplayConfig) -> AppResult<ReplayOutcome> + Send + Sync + 'static,
        render: impl Fn(&ReplayOutcome, OutputMode, bool) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            load_settings: Box::new(load_settings),
            replay: Box::new(replay),
            render: Box::new(render),
        }
    }
}

impl Default for ReplayHandlerDeps {
    fn default() -> Self {
        Self::new(config::load_settings, replay::run_replay, render_replay)
    }
}

impl ReplayHandler {
    pub fn new(args: ReplayArgs) -> Self {
        Self::with_dependencies(args, ReplayHandlerDeps::default())
    }

    pub fn with_dependencies(args: ReplayArgs, deps: ReplayHandlerDeps) -> Self {
        Self {
            args,
            store: None,
            deps,
        }
    }

    pub fn with_store(mut self, store: Option<PathBuf>) -> Self {
        self.store = store;
        self
    }
}

impl CommandHandler for ReplayHandler {
    fn execute(&self, mode: OutputMode, verbose: bool) -> AppResult<ExitCode> {
        let settings = (self.deps.load_settings)(self.store.clone())?;
        let config = ReplayConfig {
            frames: self.args.frames.clone(),
            actuator_fails: self.args.actuator_fails,
            settings,
        };
        let outcome = (self.deps.replay)(&config)?;
        (self.deps.render)(&outcome, mode, verbose)?;
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
