//! Shared application state injected into handlers as an `Extension`.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::auth::{SessionManager, TicketIssuer};
use crate::git::GitBackend;
use crate::ids::IdGenerator;
use crate::kv::KvStore;
use crate::mail::Mailer;
use crate::sync::SyncEngine;

pub struct AppState {
    pub kv: Arc<dyn KvStore>,
    pub sessions: SessionManager,
    pub tickets: TicketIssuer,
    pub ids: Arc<IdGenerator>,
    pub mailer: Arc<dyn Mailer>,
    pub git: Arc<dyn GitBackend>,
    pub sync: SyncEngine,
    /// Shared secret the trusted frontend gateway presents on the
    /// registration, login, verify-request, and reset-request routes.
    pub service_secret: SecretString,
    /// Issuer label embedded in otpauth provisioning URIs.
    pub totp_issuer: String,
}

impl AppState {
    #[must_use]
    pub fn secret_matches(&self, presented: &str) -> bool {
        // Not constant-time; the secret gates trusted-gateway routes, not
        // user credentials.
        self.service_secret.expose_secret() == presented
    }
}
