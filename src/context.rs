//! Process-wide state, constructed once in `main` and handed down.
//!
//! [`ReproContext`] owns the naming primitives used for stable instance
//! names, the app and database caches, and the switch that moves logging
//! between its normal and debug filters.

use crate::cache::{CacheError, CacheKey, NamingPrimitives, ObjectCache};
use crate::config::ClientConfig;
use crate::firestore::Firestore;
use crate::settings::SettingEffects;
use crate::FirebaseApp;
use std::sync::Arc;
use tracing_subscriber::{reload, EnvFilter, Registry};

/// Reload handle for the filter layer installed in `main`.
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Baseline verbosity chosen on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Quiet,
    #[default]
    Normal,
    Debug,
}

impl LogLevel {
    /// `EnvFilter` directives for this level.
    pub fn directives(self) -> &'static str {
        match self {
            LogLevel::Quiet => "warn",
            LogLevel::Normal => "firestore_repro=info,warn",
            LogLevel::Debug => "firestore_repro=debug,reqwest=debug,reqwest_retry=debug,info",
        }
    }

    pub fn filter(self) -> EnvFilter {
        EnvFilter::new(self.directives())
    }
}

/// Switches the active log filter at runtime.
pub struct LogControl {
    handle: Option<FilterHandle>,
    baseline: LogLevel,
    env_override: bool,
}

impl LogControl {
    /// A control that changes nothing (tests, or logging not yet installed).
    pub fn disabled() -> Self {
        Self {
            handle: None,
            baseline: LogLevel::Normal,
            env_override: false,
        }
    }

    /// `env_override` means `RUST_LOG` chose the filter; it is then left alone.
    pub fn new(handle: FilterHandle, baseline: LogLevel, env_override: bool) -> Self {
        Self {
            handle: Some(handle),
            baseline,
            env_override,
        }
    }

    pub fn baseline(&self) -> LogLevel {
        self.baseline
    }

    /// Moves to the debug filter, or back to the baseline.
    pub fn set_debug(&self, enabled: bool) -> Result<(), reload::Error> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        if self.env_override {
            tracing::debug!("RUST_LOG is set; leaving the log filter unchanged");
            return Ok(());
        }
        let level = if enabled { LogLevel::Debug } else { self.baseline };
        handle.reload(level.filter())
    }
}

/// Caches and configuration shared by every run in this process.
pub struct ReproContext {
    naming: NamingPrimitives,
    apps: ObjectCache<FirebaseApp>,
    databases: ObjectCache<Firestore>,
    log: LogControl,
    applied_debug_logging: Option<bool>,
}

impl ReproContext {
    pub fn new() -> Self {
        Self::with_parts(NamingPrimitives::standard(), LogControl::disabled())
    }

    pub fn with_parts(naming: NamingPrimitives, log: LogControl) -> Self {
        Self {
            naming,
            apps: ObjectCache::new(),
            databases: ObjectCache::new(),
            log,
            applied_debug_logging: None,
        }
    }

    pub fn naming(&self) -> &NamingPrimitives {
        &self.naming
    }

    /// The debug-logging state last applied, if any has been.
    pub fn applied_debug_logging(&self) -> Option<bool> {
        self.applied_debug_logging
    }

    /// Returns the cached app for `config`, building it on a miss.
    pub fn app(&mut self, config: &ClientConfig) -> Result<Arc<FirebaseApp>, CacheError> {
        let key = CacheKey::from_config(config, None);
        if let Some(app) = self.apps.get(&key) {
            tracing::debug!(app = app.name(), "re-using cached app");
            return Ok(app);
        }

        let name = self.naming.stable_name(&key);
        tracing::debug!(app = %name, backend = %config.backend, "creating app");
        self.apps.set(&key, FirebaseApp::new(name, config.clone()))
    }

    /// Returns the cached database handle for `config` and `instance_id`,
    /// building it (and its app) on a miss.
    pub fn firestore(
        &mut self,
        config: &ClientConfig,
        instance_id: Option<&str>,
    ) -> Result<Arc<Firestore>, CacheError> {
        let key = CacheKey::from_config(config, instance_id);
        if let Some(db) = self.databases.get(&key) {
            tracing::debug!(key = %key, "re-using cached Firestore instance");
            return Ok(db);
        }

        let app = self.app(config)?;
        tracing::debug!(key = %key, app = app.name(), "creating Firestore instance");
        self.databases.set(&key, app.firestore())
    }

    pub fn cached_apps(&self) -> usize {
        self.apps.len()
    }

    pub fn cached_databases(&self) -> usize {
        self.databases.len()
    }
}

impl Default for ReproContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SettingEffects for ReproContext {
    fn set_debug_logging(&mut self, enabled: bool) {
        if self.applied_debug_logging == Some(enabled) {
            return;
        }
        if let Err(e) = self.log.set_debug(enabled) {
            tracing::warn!("failed to change log level: {}", e);
        }
        self.applied_debug_logging = Some(enabled);
        tracing::debug!(enabled, "debug logging applied");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Backend;
    use crate::settings::{MemoryStorage, SettingValue, Settings};

    fn emulator() -> ClientConfig {
        ClientConfig::new(Backend::Emulator, "demo", "unused").unwrap()
    }

    #[test]
    fn test_firestore_handle_is_reused() {
        let mut context = ReproContext::new();
        let first = context.firestore(&emulator(), None).unwrap();
        let second = context.firestore(&emulator(), None).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(context.cached_apps(), 1);
        assert_eq!(context.cached_databases(), 1);
    }

    #[test]
    fn test_instance_id_gets_its_own_database_but_shares_the_app() {
        let mut context = ReproContext::new();
        let first = context.firestore(&emulator(), None).unwrap();
        let second = context.firestore(&emulator(), Some("second")).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(context.cached_apps(), 1);
        assert_eq!(context.cached_databases(), 2);
    }

    #[test]
    fn test_app_name_is_stable_name_of_config() {
        let mut context = ReproContext::new();
        let config = ClientConfig::new(Backend::Prod, "project", "key").unwrap();
        let app = context.app(&config).unwrap();
        let expected = context
            .naming()
            .stable_name(&CacheKey::from_config(&config, None));
        assert_eq!(app.name(), expected);
    }

    #[test]
    fn test_different_configs_get_different_apps() {
        let mut context = ReproContext::new();
        let a = context.app(&emulator()).unwrap();
        let b = context
            .app(&ClientConfig::new(Backend::Qa, "project", "key").unwrap())
            .unwrap();
        assert_ne!(a.name(), b.name());
    }

    #[test]
    fn test_saving_debug_flag_applies_once() {
        let mut storage = MemoryStorage::new();
        let mut settings = Settings::load(&storage);
        let mut context = ReproContext::new();
        assert_eq!(context.applied_debug_logging(), None);

        settings.debug_logging.set_value(SettingValue::Bool(true)).unwrap();
        settings.save_all(&mut storage, &mut context).unwrap();
        assert_eq!(context.applied_debug_logging(), Some(true));

        settings.debug_logging.set_value(SettingValue::Bool(false)).unwrap();
        settings.save_all(&mut storage, &mut context).unwrap();
        assert_eq!(context.applied_debug_logging(), Some(false));
    }

    #[test]
    fn test_disabled_log_control_accepts_changes() {
        let control = LogControl::disabled();
        assert!(control.set_debug(true).is_ok());
        assert_eq!(control.baseline(), LogLevel::Normal);
    }
}
