use std::any::Any;
use std::path::PathBuf;
use std::process::ExitCode;

use facegate_core::faces::ListKind;

use crate::cli::{FaceEnrollArgs, FacesCommands, OutputMode};
use crate::commands::CommandHandler;
use crate::config::{self, Settings};
use crate::errors::AppResult;
use crate::faces::{
    self, FaceEnrollmentConfig, FaceEnrollmentOutcome, FaceListConfig, FaceListOutcome,
    FaceMatchConfig, FaceMatchOutcome, FaceRemovalConfig, FaceRemovalOutcome,
};
use crate::output::{render_face_enroll, render_face_list, render_face_match, render_face_remove};

pub struct FacesHandler {
    command: FacesCommands,
    store: Option<PathBuf>,
    deps: FacesHandlerDeps,
}

pub struct FacesHandlerDeps {
    pub load_settings: Box<dyn Fn(Option<PathBuf>) -> AppResult<Settings> + Send + Sync>,
    pub enroll:
        Box<dyn Fn(&FaceEnrollmentConfig) -> AppResult<FaceEnrollmentOutcome> + Send + Sync>,
    pub remove: Box<dyn Fn(&FaceRemovalConfig) -> AppResult<FaceRemovalOutcome> + Send + Sync>,
    pub list: Box<dyn Fn(&FaceListConfig) -> AppResult<FaceListOutcome> + Send + Sync>,
    pub match_probe: Box<dyn Fn(&FaceMatchConfig) -> AppResult<FaceMatchOutcome> + Send + Sync>,
    pub render_enroll:
        Box<dyn Fn(&FaceEnrollmentOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_remove: Box<dyn Fn(&FaceRemovalOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_list: Box<dyn Fn(&FaceListOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
    pub render_match: Box<dyn Fn(&FaceMatchOutcome, OutputMode) -> AppResult<()> + Send + Sync>,
}

impl FacesHandlerDeps {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        load_settings: impl Fn(Option<PathBuf>) -> AppResult<Settings> + Send + Sync + 'static,
        enroll: impl Fn(&FaceEnrollmentConfig) -> AppResult<FaceEnrollmentOutcome>
            + Send
            + Sync
            + 'static,
        remove: impl Fn(&FaceRemovalConfig) -> AppResult<FaceRemovalOutcome> + Send + Sync + 'static,
        list: impl Fn(&FaceListConfig) -> AppResult<FaceListOutcome> + Send + Sync + 'static,
        match_probe: impl Fn(&FaceMatchConfig) -> AppResult<FaceMatchOutcome> + Send + Sync + 'static,
        render_enroll: impl Fn(&FaceEnrollmentOutcome, OutputMode) -> AppResult<()>
            + Send
            + Sync
            + 'static,
        render_remove: impl Fn(&FaceRemovalOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_list: impl Fn(&FaceListOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
        render_match: impl Fn(&FaceMatchOutcome, OutputMode) -> AppResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            load_settings: Box::new(load_settings),
            enroll: Box::new(enroll),
            remove: Box::new(remove),
            list: Box::new(list),
            match_probe: Box::new(match_probe),
            render_enroll: Box::new(render_enroll),
            render_remove: Box::new(render_remove),
            render_list: Box::new(render_list),
            render_match: Box::new(render_match),
        }
    }
}

impl Default for FacesHandlerDeps {
    fn default() -> Self {
        Self::new(
            config::load_settings,
            faces::run_face_enrollment,
            faces::run_face_removal,
            faces::run_face_list,
            faces::run_face_match,
            render_face_enroll,
            render_face_remove,
            render_face_list,
            render_face_match,
        )
    }
}

impl FacesHandler {
    pub fn new(command: FacesCommands) -> Self {
        Self {
            command,
            store: None,
            deps: FacesHandlerDeps::default(),
        }
    }

    pub fn with_dependencies(command: FacesCommands, deps: FacesHandlerDeps) -> Self {
        Self {
            command,
            store: None,
            deps,
        }
    }

    pub fn with_store(mut self, store: Option<PathBuf>) -> Self {
        self.store = store;
        self
    }
}

impl CommandHandler for FacesHandler {
    fn execute(&self, mode: OutputMode, _verbose: bool) -> AppResult<ExitCode> {
        let settings = (self.deps.load_settings)(self.store.clone())?;
        match &self.command {
            FacesCommands::Enroll(args) => {
                let config = build_enrollment_config(args, ListKind::Allow, &settings);
                let outcome = (self.deps.enroll)(&config)?;
                (self.deps.render_enroll)(&outcome, mode)?;
            }
            FacesCommands::Deny(args) => {
                let config = build_enrollment_config(args, ListKind::Deny, &settings);
                let outcome = (self.deps.enroll)(&config)?;
                (self.deps.render_enroll)(&outcome, mode)?;
            }
            FacesCommands::Remove(args) => {
                let config = FaceRemovalConfig {
                    label: args.label.clone(),
                    store_path: settings.store_path.clone(),
                    dimension: settings.embedding_dimension,
                };
                let outcome = (self.deps.remove)(&config)?;
                (self.deps.render_remove)(&outcome, mode)?;
            }
            FacesCommands::List => {
                let config = FaceListConfig {
                    store_path: settings.store_path.clone(),
                    dimension: settings.embedding_dimension,
                };
                let outcome = (self.deps.list)(&config)?;
                (self.deps.render_list)(&outcome, mode)?;
            }
            FacesCommands::Match(args) => {
                let config = FaceMatchConfig {
                    probe: args.probe.clone(),
                    store_path: settings.store_path.clone(),
                    dimension: settings.embedding_dimension,
                    matcher: settings.gate.matcher,
                };
                let outcome = (self.deps.match_probe)(&config)?;
                (self.deps.render_match)(&outcome, mode)?;
            }
        }
        Ok(ExitCode::SUCCESS)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn build_enrollment_config(
    args: &FaceEnrollArgs,
    list_kind: ListKind,
    settings: &Settings,
) -> FaceEnrollmentConfig {
    FaceEnrollmentConfig {
        label: args.label.clone(),
        list_kind,
        embedding: args.embedding.clone(),
        store_path: settings.store_path.clone(),
        dimension: settings.embedding_dimension,
    }
}
