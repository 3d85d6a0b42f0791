use clap::{ArgGroup, Parser};
use firestore_repro::cache::NamingPrimitives;
use firestore_repro::cancellation::RunController;
use firestore_repro::config::{Backend, ClientConfig};
use firestore_repro::context::{LogControl, LogLevel, ReproContext};
use firestore_repro::firestore::MemoryFirestore;
use firestore_repro::scenario::{Scenario, ScenarioReport};
use firestore_repro::settings::{
    FileStorage, MemoryStorage, Setting, SettingValue, Settings, SettingsError, SettingsStorage,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "firestore-repro")]
#[command(about = "Runs the Firestore reproduction scenario", long_about = None)]
#[command(group(ArgGroup::new("backend").args(["prod", "emulator", "nightly", "qa"])))]
#[command(group(ArgGroup::new("verbosity").args(["quiet", "debug"])))]
struct Args {
    /// Firebase project ID
    #[arg(short = 'p', long = "projectId")]
    project_id: Option<String>,

    /// Web API key of the Firebase project
    #[arg(long = "apiKey")]
    api_key: Option<String>,

    /// Use the production backend
    #[arg(long)]
    prod: bool,

    /// Use the local emulator on 127.0.0.1:8080
    #[arg(short, long)]
    emulator: bool,

    /// Use the nightly backend
    #[arg(long)]
    nightly: bool,

    /// Use the QA backend
    #[arg(long)]
    qa: bool,

    /// Only log warnings and errors
    #[arg(short, long)]
    quiet: bool,

    /// Enable debug logging (persisted)
    #[arg(short, long)]
    debug: bool,

    /// Persist settings to this JSON file instead of keeping them in memory
    #[arg(long, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Run the scenario against an in-process store instead of a backend
    #[arg(long)]
    in_memory: bool,
}

impl Args {
    fn backend(&self) -> Option<Backend> {
        [
            (self.prod, Backend::Prod),
            (self.emulator, Backend::Emulator),
            (self.nightly, Backend::Nightly),
            (self.qa, Backend::Qa),
        ]
        .into_iter()
        .find_map(|(selected, backend)| selected.then_some(backend))
    }

    fn baseline_log_level(&self) -> LogLevel {
        if self.quiet {
            LogLevel::Quiet
        } else {
            LogLevel::Normal
        }
    }

    /// Stages every flag that differs from the current settings.
    fn stage_overrides(&self, settings: &mut Settings) -> Result<(), SettingsError> {
        if let Some(project_id) = &self.project_id {
            stage(&mut settings.project_id, SettingValue::Text(project_id.clone()))?;
        }
        if let Some(api_key) = &self.api_key {
            stage(&mut settings.api_key, SettingValue::Text(api_key.clone()))?;
        }
        if let Some(backend) = self.backend() {
            stage(&mut settings.host, SettingValue::Host(backend))?;
        }
        if self.debug {
            stage(&mut settings.debug_logging, SettingValue::Bool(true))?;
        } else if self.quiet {
            stage(&mut settings.debug_logging, SettingValue::Bool(false))?;
        }
        Ok(())
    }
}

fn stage(setting: &mut Setting, value: SettingValue) -> Result<(), SettingsError> {
    if setting.value() != &value {
        setting.set_value(value)?;
    }
    Ok(())
}

enum Outcome {
    Completed,
    Cancelled,
}

fn init_logging(baseline: LogLevel) -> LogControl {
    let (filter, env_override) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (baseline.filter(), false),
    };
    let (filter, handle) = reload::Layer::new(filter);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    LogControl::new(handle, baseline, env_override)
}

fn log_report(report: &ScenarioReport) {
    tracing::info!(
        "Scenario completed in collection {}: before={} after={}",
        report.collection_id,
        report.before,
        report.after
    );
}

async fn run(args: Args, log: LogControl) -> anyhow::Result<Outcome> {
    let mut context = ReproContext::with_parts(NamingPrimitives::standard(), log);

    let mut storage: Box<dyn SettingsStorage> = match &args.settings {
        Some(path) => Box::new(FileStorage::open(path)?),
        None => Box::new(MemoryStorage::new()),
    };
    let mut settings = Settings::load(&*storage);

    args.stage_overrides(&mut settings)?;
    let saved = settings.save_all(&mut *storage, &mut context)?;
    if !saved.is_empty() {
        tracing::info!("Saved settings: {}", saved.join(", "));
    }
    settings.apply_all(&mut context);

    let mut runs = RunController::new();
    let source = runs.begin();
    let interrupt = source.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() && interrupt.cancel() {
            tracing::warn!("Cancellation requested; stopping after the current step");
        }
    });

    let result = if args.in_memory {
        tracing::info!("Running against an in-process store");
        let store = MemoryFirestore::new();
        Scenario::new(&store, source.token()).run().await
    } else {
        let config = ClientConfig::from_settings(&settings)?;
        tracing::info!(
            "Running against {} ({}) with project {}",
            config.backend,
            config.backend.base_url(),
            config.project_id
        );
        let db = context.firestore(&config, None)?;
        Scenario::new(&*db, source.token()).run().await
    };
    runs.finish();

    match result {
        Ok(report) => {
            log_report(&report);
            Ok(Outcome::Completed)
        }
        Err(e) if e.is_cancellation() => {
            tracing::info!("Scenario cancelled");
            Ok(Outcome::Cancelled)
        }
        Err(e) => Err(anyhow::Error::from(e).context("scenario failed")),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let log = init_logging(args.baseline_log_level());

    match run(args, log).await {
        Ok(Outcome::Completed) | Ok(Outcome::Cancelled) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("ERROR: {:#}", e);
            tracing::debug!("{:?}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn test_backend_flags_are_mutually_exclusive() {
        let err = Args::try_parse_from(["firestore-repro", "--prod", "-e"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);

        let err = Args::try_parse_from(["firestore-repro", "--nightly", "--qa"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_quiet_and_debug_are_mutually_exclusive() {
        let err = Args::try_parse_from(["firestore-repro", "-q", "-d"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArgumentConflict);
    }

    #[test]
    fn test_flags_parse() {
        let args = Args::try_parse_from([
            "firestore-repro",
            "-p",
            "my-project",
            "--apiKey",
            "abc",
            "--qa",
            "-d",
        ])
        .unwrap();
        assert_eq!(args.project_id.as_deref(), Some("my-project"));
        assert_eq!(args.api_key.as_deref(), Some("abc"));
        assert_eq!(args.backend(), Some(Backend::Qa));
        assert!(args.debug);
    }

    #[test]
    fn test_overrides_stage_only_changes() {
        let storage = MemoryStorage::new();
        let mut settings = Settings::load(&storage);
        let args =
            Args::try_parse_from(["firestore-repro", "--prod", "--projectId", "p1"]).unwrap();

        args.stage_overrides(&mut settings).unwrap();
        // prod is already the default host.
        assert!(!settings.host.is_dirty());
        assert!(settings.project_id.is_dirty());
        assert!(!settings.debug_logging.is_dirty());
        assert_eq!(settings.project_id(), "p1");
    }

    #[test]
    fn test_quiet_turns_persisted_debug_off() {
        let mut storage = MemoryStorage::new();
        storage
            .save(firestore_repro::settings::DEBUG_LOGGING_KEY, "true")
            .unwrap();
        let mut settings = Settings::load(&storage);
        let args = Args::try_parse_from(["firestore-repro", "-q"]).unwrap();

        args.stage_overrides(&mut settings).unwrap();
        assert!(!settings.debug_logging_enabled());
        assert_eq!(args.baseline_log_level(), LogLevel::Quiet);
    }
}
