//! # firestore-repro
//!
//! A harness for reproducing Cloud Firestore issues from the command line.
//!
//! - [`settings`]: persisted, user-overridable configuration
//! - [`cache`]: keyed cache so repeated runs re-use client handles
//! - [`cancellation`]: cooperative cancellation polled between steps
//! - [`scenario`]: the hand-edited sequence of document operations
//! - [`firestore`]: the REST client and an in-process stand-in
//!
//! ```rust,no_run
//! # use firestore_repro::cancellation::CancellationSource;
//! # use firestore_repro::config::{Backend, ClientConfig};
//! # use firestore_repro::context::ReproContext;
//! # use firestore_repro::scenario::Scenario;
//! # async fn run() -> anyhow::Result<()> {
//! let mut context = ReproContext::new();
//! let config = ClientConfig::new(Backend::Emulator, "demo-project", "unused")?;
//! let db = context.firestore(&config, None)?;
//!
//! let source = CancellationSource::new();
//! let report = Scenario::new(&*db, source.token()).run().await?;
//! println!("{}", report.after);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cancellation;
pub mod config;
pub mod context;
pub mod core;
pub mod firestore;
pub mod scenario;
pub mod settings;

use config::ClientConfig;
use firestore::Firestore;

/// A named, configured app. Database handles are built from it.
#[derive(Debug, Clone)]
pub struct FirebaseApp {
    name: String,
    options: ClientConfig,
}

impl FirebaseApp {
    pub fn new(name: impl Into<String>, options: ClientConfig) -> Self {
        Self {
            name: name.into(),
            options,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &ClientConfig {
        &self.options
    }

    pub fn firestore(&self) -> Firestore {
        Firestore::new(self)
    }
}
