pub(crate) mod core;
pub(crate) mod errors;
pub(crate) mod schemas;
pub(crate) mod services;
pub(crate) mod store;
pub(crate) mod tools;

#[cfg(test)]
mod test_support;

use crate::core::{config::Settings, telemetry};
use crate::schemas::ordering::ExamConfig;
use crate::services::consistency::DataChecker;
use crate::services::integrity::{IntegrityChecker, IntegrityFixer};
use crate::services::review::answers::AnswersReviewer;
use crate::services::review::console::{Console, ImageViewer};
use crate::services::review::names::NamesReviewer;
use crate::services::review::ReviewEngine;
use crate::services::{answer_key, ingest};
use crate::store::DataStore;

pub fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;

    let config = ExamConfig::load(&settings.project().config_file)?;
    let mut store = DataStore::open(config, settings.project().output_dir.clone())?;
    store.reload()?;
    let imported = ingest::import_analyses(&mut store)?;

    tracing::info!(
        documents = store.documents().len(),
        candidates = store.candidates().len(),
        imported,
        environment = %settings.runtime().environment.as_str(),
        "scan data loaded"
    );

    let integrity = IntegrityChecker::new(&mut store).run()?;
    if !integrity.is_clean() {
        let mut console = Console::new();
        IntegrityFixer::new(&mut store, &mut console).run(integrity)?;
    }

    let check = DataChecker::new(&mut store).run();
    if !check.is_empty() {
        let scan_dir = store.paths().scan_dir();
        let viewer = &settings.review().viewer_command;

        let mut name_console = Console::new();
        let mut name_viewer = ImageViewer::new(viewer, scan_dir.clone());
        let mut names = NamesReviewer::new(&mut name_console, &mut name_viewer);

        let mut answer_console = Console::new();
        let mut answer_viewer = ImageViewer::new(viewer, scan_dir);
        let mut answers = AnswersReviewer::new(&mut answer_console, &mut answer_viewer);

        ReviewEngine::new(&mut store, &mut names, &mut answers).run(check)?;
    }

    let key_path = answer_key::emit(&store)?;
    tracing::info!(path = %key_path.display(), "reconciliation complete");
    Ok(())
}
