//! Keyed cache for expensive client handles.
//!
//! Handles are keyed by the configuration that built them. The cache never
//! constructs anything and never replaces an entry: callers `get` first and
//! only `set` on a miss.

use crate::config::ClientConfig;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::Value as SerdeValue;
use sha2::digest::DynDigest;
use sha2::Sha256;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// An entry already exists for the key. Carries the redacted form.
    #[error("duplicate cache key: {0}")]
    DuplicateKey(String),
}

/// Stands in for the API key wherever a key is printed.
const REDACTED: &str = "<redacted>";

/// Identifies one cached handle.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub host: String,
    pub project_id: String,
    pub api_key: String,
    pub instance_id: Option<String>,
}

impl CacheKey {
    pub fn new(
        host: impl Into<String>,
        project_id: impl Into<String>,
        api_key: impl Into<String>,
        instance_id: Option<&str>,
    ) -> Self {
        Self {
            host: host.into(),
            project_id: project_id.into(),
            api_key: api_key.into(),
            instance_id: instance_id.map(str::to_string),
        }
    }

    pub fn from_config(config: &ClientConfig, instance_id: Option<&str>) -> Self {
        Self::new(
            config.backend.name(),
            config.project_id.as_str(),
            config.api_key.as_str(),
            instance_id,
        )
    }

    /// The string form used for lookup: a JSON array of the four components.
    ///
    /// Contains the API key in clear; print [`CacheKey::redacted`] instead.
    pub fn canonical(&self) -> String {
        self.encode(&self.api_key, true)
    }

    /// The canonical form with the API key masked.
    pub fn redacted(&self) -> String {
        self.encode(REDACTED, true)
    }

    /// Canonical form of the key without its instance id.
    fn canonical_config(&self) -> String {
        self.encode(&self.api_key, false)
    }

    fn encode(&self, api_key: &str, with_instance: bool) -> String {
        let mut parts = vec![
            SerdeValue::from(self.host.as_str()),
            SerdeValue::from(self.project_id.as_str()),
            SerdeValue::from(api_key),
        ];
        if with_instance {
            parts.push(
                self.instance_id
                    .as_deref()
                    .map_or(SerdeValue::Null, SerdeValue::from),
            );
        }
        SerdeValue::Array(parts).to_string()
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheKey")
            .field("host", &self.host)
            .field("project_id", &self.project_id)
            .field("api_key", &REDACTED)
            .field("instance_id", &self.instance_id)
            .finish()
    }
}

/// Creates a fresh streaming hasher.
pub type HasherFactory = fn() -> Box<dyn DynDigest>;

/// Encodes a digest as text.
pub type DigestEncoder = fn(&[u8]) -> String;

fn sha256_hasher() -> Box<dyn DynDigest> {
    Box::new(Sha256::default())
}

fn base64_standard(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// The hash and encoding used to derive stable instance names.
#[derive(Clone, Copy)]
pub struct NamingPrimitives {
    new_hasher: HasherFactory,
    encode: DigestEncoder,
}

impl NamingPrimitives {
    pub fn new(new_hasher: HasherFactory, encode: DigestEncoder) -> Self {
        Self { new_hasher, encode }
    }

    /// SHA-256 with standard, padded base64.
    pub fn standard() -> Self {
        Self::new(sha256_hasher, base64_standard)
    }

    /// Derives the name handed to the client as its instance name.
    ///
    /// Equal host, project and API key give equal names; the instance id is ignored.
    pub fn stable_name(&self, key: &CacheKey) -> String {
        let mut hasher = (self.new_hasher)();
        hasher.update(key.canonical_config().as_bytes());
        let digest = hasher.finalize();
        (self.encode)(&digest)
    }
}

impl Default for NamingPrimitives {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for NamingPrimitives {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NamingPrimitives").finish_non_exhaustive()
    }
}

/// Map from canonical key to a shared handle.
pub struct ObjectCache<T> {
    entries: HashMap<String, Arc<T>>,
}

impl<T> ObjectCache<T> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the handle cached under `key`'s canonical form.
    pub fn get(&self, key: &CacheKey) -> Option<Arc<T>> {
        self.entries.get(&key.canonical()).cloned()
    }

    /// Inserts `value` under `key`. Fails if an entry already exists.
    pub fn set(&mut self, key: &CacheKey, value: T) -> Result<Arc<T>, CacheError> {
        let canonical = key.canonical();
        if self.entries.contains_key(&canonical) {
            return Err(CacheError::DuplicateKey(key.redacted()));
        }
        let value = Arc::new(value);
        self.entries.insert(canonical, Arc::clone(&value));
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T> Default for ObjectCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
