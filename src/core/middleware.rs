use crate::config::ClientConfig;
use http::Extensions;
use reqwest::{header, Request, Response};
use reqwest_middleware::{Middleware, Next};

/// How requests identify themselves to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credential {
    /// Appended as the `key` query parameter.
    ApiKey(String),
    /// The emulator's admin bearer token, which bypasses security rules.
    EmulatorOwner,
}

/// Attaches a [`Credential`] to every outgoing request.
#[derive(Clone, Debug)]
pub struct CredentialMiddleware {
    credential: Credential,
}

impl CredentialMiddleware {
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }

    pub fn for_config(config: &ClientConfig) -> Self {
        if config.backend.is_emulator() {
            Self::new(Credential::EmulatorOwner)
        } else {
            Self::new(Credential::ApiKey(config.api_key.clone()))
        }
    }
}

#[async_trait::async_trait]
impl Middleware for CredentialMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<Response> {
        match &self.credential {
            Credential::ApiKey(key) => {
                req.url_mut().query_pairs_mut().append_pair("key", key);
            }
            Credential::EmulatorOwner => {
                req.headers_mut().insert(
                    header::AUTHORIZATION,
                    header::HeaderValue::from_static("Bearer owner"),
                );
            }
        }

        next.run(req, extensions).await
    }
}
