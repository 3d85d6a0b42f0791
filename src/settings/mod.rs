//! User-overridable settings with default / persisted / pending layering.
//!
//! Each [`Setting`] resolves its effective value from three layers, highest
//! priority first:
//!
//! 1. a pending change staged with [`Setting::set_value`] or
//!    [`Setting::reset_value`] but not yet saved,
//! 2. the value loaded from (or last saved to) a [`SettingsStorage`],
//! 3. the compiled-in default.
//!
//! The [`Settings`] collection owns the four settings the harness knows
//! about and persists the dirty ones in one pass with [`Settings::save_all`].
//!
//! # Examples
//!
//! ```rust
//! # use firestore_repro::settings::{MemoryStorage, NoEffects, Settings, SettingValue};
//! # use firestore_repro::config::Backend;
//! let mut storage = MemoryStorage::new();
//! let mut settings = Settings::load(&storage);
//!
//! settings.host.set_value(SettingValue::Host(Backend::Emulator)).unwrap();
//! let saved = settings.save_all(&mut storage, &mut NoEffects).unwrap();
//! assert_eq!(saved, vec!["firestore-repro.host"]);
//!
//! let reloaded = Settings::load(&storage);
//! assert_eq!(reloaded.backend(), Backend::Emulator);
//! ```

pub mod storage;


pub use storage::{FileStorage, MemoryStorage, SettingsStorage, StorageError};

use crate::config::{Backend, API_KEY_PLACEHOLDER, PROJECT_ID_PLACEHOLDER};
use thiserror::Error;

pub const DEBUG_LOGGING_KEY: &str = "firestore-repro.debugLogging";
pub const HOST_KEY: &str = "firestore-repro.host";
pub const PROJECT_ID_KEY: &str = "firestore-repro.projectId";
pub const API_KEY_KEY: &str = "firestore-repro.apiKey";

/// Errors that can occur while changing or persisting settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// A value of the wrong type was staged on a setting.
    #[error("setting {key} expects a {expected} value")]
    TypeMismatch {
        key: &'static str,
        expected: &'static str,
    },
    #[error("settings storage failed: {0}")]
    Storage(#[from] StorageError),
    /// [`Settings::save_all`] wrote (and applied) `saved` before `source` stopped it.
    #[error("saved {} before failing: {source}", .saved.join(", "))]
    PartialSave {
        saved: Vec<&'static str>,
        #[source]
        source: Box<SettingsError>,
    },
}

impl SettingsError {
    /// Keys that were persisted before the failure; empty unless some were.
    pub fn saved_keys(&self) -> &[&'static str] {
        match self {
            SettingsError::PartialSave { saved, .. } => saved,
            _ => &[],
        }
    }
}

/// What a setting holds, and whether saving it has a side effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKind {
    Text,
    Flag,
    Host,
    /// A boolean that switches debug logging when saved.
    DebugFlag,
}

impl SettingKind {
    fn expected(self) -> &'static str {
        match self {
            SettingKind::Text => "string",
            SettingKind::Flag | SettingKind::DebugFlag => "boolean",
            SettingKind::Host => "backend",
        }
    }

    fn accepts(self, value: &SettingValue) -> bool {
        matches!(
            (self, value),
            (SettingKind::Text, SettingValue::Text(_))
                | (SettingKind::Flag | SettingKind::DebugFlag, SettingValue::Bool(_))
                | (SettingKind::Host, SettingValue::Host(_))
        )
    }

    /// Parses a persisted raw string. `None` means the stored value is unusable.
    fn parse(self, raw: &str) -> Option<SettingValue> {
        match self {
            SettingKind::Text => Some(SettingValue::Text(raw.to_string())),
            SettingKind::Flag | SettingKind::DebugFlag => match raw {
                "true" => Some(SettingValue::Bool(true)),
                "false" => Some(SettingValue::Bool(false)),
                _ => None,
            },
            SettingKind::Host => raw.parse().ok().map(SettingValue::Host),
        }
    }
}

/// A typed setting value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingValue {
    Text(String),
    Bool(bool),
    Host(Backend),
}

impl SettingValue {
    /// The string written to storage.
    pub fn to_raw(&self) -> String {
        match self {
            SettingValue::Text(s) => s.clone(),
            SettingValue::Bool(b) => b.to_string(),
            SettingValue::Host(backend) => backend.name().to_string(),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            SettingValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SettingValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_backend(&self) -> Option<Backend> {
        match self {
            SettingValue::Host(backend) => Some(*backend),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingChange {
    Set(SettingValue),
    Reset,
}

/// Side effects a saved setting can trigger.
pub trait SettingEffects {
    fn set_debug_logging(&mut self, enabled: bool);
}

/// A [`SettingEffects`] that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEffects;

impl SettingEffects for NoEffects {
    fn set_debug_logging(&mut self, _enabled: bool) {}
}

/// One named, typed setting.
#[derive(Debug, Clone)]
pub struct Setting {
    key: &'static str,
    kind: SettingKind,
    default: SettingValue,
    persisted: Option<SettingValue>,
    pending: Option<PendingChange>,
}

impl Setting {
    pub(crate) fn new(key: &'static str, kind: SettingKind, default: SettingValue) -> Self {
        debug_assert!(kind.accepts(&default));
        Self {
            key,
            kind,
            default,
            persisted: None,
            pending: None,
        }
    }

    /// The storage key.
    pub fn key(&self) -> &'static str {
        self.key
    }

    pub fn kind(&self) -> SettingKind {
        self.kind
    }

    pub fn persisted_value(&self) -> Option<&SettingValue> {
        self.persisted.as_ref()
    }

    /// The effective value: pending, then persisted, then default.
    pub fn value(&self) -> &SettingValue {
        match &self.pending {
            Some(PendingChange::Set(value)) => value,
            Some(PendingChange::Reset) => &self.default,
            None => self.persisted.as_ref().unwrap_or(&self.default),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.pending.is_some()
    }

    /// Stages `value` without touching storage.
    pub fn set_value(&mut self, value: SettingValue) -> Result<(), SettingsError> {
        if !self.kind.accepts(&value) {
            return Err(SettingsError::TypeMismatch {
                key: self.key,
                expected: self.kind.expected(),
            });
        }
        self.pending = Some(PendingChange::Set(value));
        Ok(())
    }

    /// Stages removal of the persisted value so the default applies after saving.
    pub fn reset_value(&mut self) {
        self.pending = Some(PendingChange::Reset);
    }

    /// Reloads the persisted layer from `storage`.
    ///
    /// A stored string that does not parse as this setting's kind counts as absent.
    pub fn load(&mut self, storage: &dyn SettingsStorage) {
        self.persisted = storage.load(self.key).and_then(|raw| {
            let parsed = self.kind.parse(&raw);
            if parsed.is_none() {
                tracing::debug!(key = self.key, raw = %raw, "ignoring unparseable stored setting");
            }
            parsed
        });
    }

    /// Writes the staged change to `storage` and returns whether anything was written.
    pub fn save(&mut self, storage: &mut dyn SettingsStorage) -> Result<bool, SettingsError> {
        let Some(change) = self.pending.take() else {
            return Ok(false);
        };
        let result = match &change {
            PendingChange::Set(value) => storage.save(self.key, &value.to_raw()),
            PendingChange::Reset => storage.clear(self.key),
        };
        if let Err(e) = result {
            self.pending = Some(change);
            return Err(e.into());
        }
        self.persisted = match change {
            PendingChange::Set(value) => Some(value),
            PendingChange::Reset => None,
        };
        Ok(true)
    }

    /// Runs the side effect associated with this setting's kind, if any.
    pub fn apply(&self, effects: &mut dyn SettingEffects) {
        match (self.kind, self.value()) {
            (SettingKind::DebugFlag, SettingValue::Bool(enabled)) => {
                effects.set_debug_logging(*enabled)
            }
            _ => {}
        }
    }
}

/// The harness's settings, in a fixed order.
#[derive(Debug, Clone)]
pub struct Settings {
    pub debug_logging: Setting,
    pub host: Setting,
    pub project_id: Setting,
    pub api_key: Setting,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug_logging: Setting::new(
                DEBUG_LOGGING_KEY,
                SettingKind::DebugFlag,
                SettingValue::Bool(false),
            ),
            host: Setting::new(HOST_KEY, SettingKind::Host, SettingValue::Host(Backend::Prod)),
            project_id: Setting::new(
                PROJECT_ID_KEY,
                SettingKind::Text,
                SettingValue::Text(PROJECT_ID_PLACEHOLDER.to_string()),
            ),
            api_key: Setting::new(
                API_KEY_KEY,
                SettingKind::Text,
                SettingValue::Text(API_KEY_PLACEHOLDER.to_string()),
            ),
        }
    }
}

impl Settings {
    /// Creates the collection and loads each member from `storage`.
    pub fn load(storage: &dyn SettingsStorage) -> Self {
        let mut settings = Self::default();
        for setting in settings.iter_mut() {
            setting.load(storage);
        }
        settings
    }

    pub fn iter(&self) -> impl Iterator<Item = &Setting> {
        [&self.debug_logging, &self.host, &self.project_id, &self.api_key].into_iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Setting> {
        [
            &mut self.debug_logging,
            &mut self.host,
            &mut self.project_id,
            &mut self.api_key,
        ]
        .into_iter()
    }

    pub fn is_dirty(&self) -> bool {
        self.iter().any(Setting::is_dirty)
    }

    /// Persists every dirty member, applies its side effect, and returns the
    /// keys that were written.
    ///
    /// Stops at the first storage failure. Members saved before it stay saved
    /// and applied; their keys come back in [`SettingsError::PartialSave`].
    pub fn save_all(
        &mut self,
        storage: &mut dyn SettingsStorage,
        effects: &mut dyn SettingEffects,
    ) -> Result<Vec<&'static str>, SettingsError> {
        let mut saved = Vec::new();
        for setting in self.iter_mut() {
            match setting.save(storage) {
                Ok(true) => {
                    setting.apply(effects);
                    saved.push(setting.key());
                }
                Ok(false) => {}
                Err(e) if saved.is_empty() => return Err(e),
                Err(e) => {
                    return Err(SettingsError::PartialSave {
                        saved,
                        source: Box::new(e),
                    })
                }
            }
        }
        Ok(saved)
    }

    /// Applies every member's side effect using its current value.
    pub fn apply_all(&self, effects: &mut dyn SettingEffects) {
        for setting in self.iter() {
            setting.apply(effects);
        }
    }

    pub fn debug_logging_enabled(&self) -> bool {
        self.debug_logging.value().as_bool().unwrap_or(false)
    }

    pub fn backend(&self) -> Backend {
        self.host.value().as_backend().unwrap_or_default()
    }

    pub fn project_id(&self) -> &str {
        self.project_id.value().as_str().unwrap_or(PROJECT_ID_PLACEHOLDER)
    }

    pub fn api_key(&self) -> &str {
        self.api_key.value().as_str().unwrap_or(API_KEY_PLACEHOLDER)
    }
}
