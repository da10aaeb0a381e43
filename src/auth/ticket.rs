//! One-shot tickets: short-lived, single-purpose tokens backing email
//! verification, password reset, and pending TOTP step-up.
//!
//! Each purpose gets its own key namespace so a ticket can never be redeemed
//! for a different purpose, even if the raw token leaks across flows.

use std::sync::Arc;
use std::time::Duration;

use rand::RngCore;

use crate::ids::IdGenerator;
use crate::kv::{KvError, KvStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketPurpose {
    VerifyEmail,
    ResetPassword,
    TotpPending,
}

impl TicketPurpose {
    fn prefix(self) -> &'static str {
        match self {
            Self::VerifyEmail => "verification",
            Self::ResetPassword => "reset",
            Self::TotpPending => "totp",
        }
    }

    fn ttl(self) -> Duration {
        match self {
            Self::VerifyEmail | Self::ResetPassword => Duration::from_secs(30 * 60),
            Self::TotpPending => Duration::from_secs(15 * 60),
        }
    }
}

pub struct TicketIssuer {
    kv: Arc<dyn KvStore>,
    ids: Arc<IdGenerator>,
}

impl TicketIssuer {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>, ids: Arc<IdGenerator>) -> Self {
        Self { kv, ids }
    }

    /// Issue a ticket bound to `user_id`, returning the opaque token the
    /// caller hands to the user (by email link or login response).
    pub async fn create(&self, purpose: TicketPurpose, user_id: &str) -> Result<String, KvError> {
        // Step-up tickets travel in JSON responses, so use an ID the client
        // can correlate; the email-link purposes get unguessable hex.
        let token = match purpose {
            TicketPurpose::TotpPending => self.ids.next_id(),
            _ => {
                let mut bytes = [0u8; 16];
                rand::thread_rng().fill_bytes(&mut bytes);
                hex::encode(bytes)
            }
        };
        self.kv
            .set(
                &format!("{}:{token}", purpose.prefix()),
                user_id,
                purpose.ttl(),
            )
            .await?;
        Ok(token)
    }

    /// Atomically consume a ticket: look it up and delete it. Returns the
    /// bound user id, or `None` if the ticket is absent or expired. A second
    /// redeem of the same token always yields `None`.
    pub async fn redeem(&self, purpose: TicketPurpose, token: &str) -> Result<Option<String>, KvError> {
        let key = format!("{}:{token}", purpose.prefix());
        match self.kv.get(&key).await? {
            Some(user_id) => {
                self.kv.delete(&key).await?;
                Ok(Some(user_id))
            }
            None => Ok(None),
        }
    }

    /// Peek at a ticket without consuming it. Step-up verification uses this
    /// so a wrong TOTP code does not burn the ticket.
    pub async fn peek(&self, purpose: TicketPurpose, token: &str) -> Result<Option<String>, KvError> {
        self.kv.get(&format!("{}:{token}", purpose.prefix())).await
    }

    /// Drop a ticket without redeeming it.
    pub async fn delete(&self, purpose: TicketPurpose, token: &str) -> Result<bool, KvError> {
        self.kv.delete(&format!("{}:{token}", purpose.prefix())).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKv;

    fn issuer() -> TicketIssuer {
        TicketIssuer::new(Arc::new(MemoryKv::new()), Arc::new(IdGenerator::new()))
    }

    #[test]
    fn email_tickets_live_half_an_hour() {
        assert_eq!(
            TicketPurpose::VerifyEmail.ttl(),
            Duration::from_secs(30 * 60)
        );
        assert_eq!(
            TicketPurpose::ResetPassword.ttl(),
            Duration::from_secs(30 * 60)
        );
        assert_eq!(TicketPurpose::TotpPending.ttl(), Duration::from_secs(15 * 60));
    }

    #[tokio::test]
    async fn redeem_is_single_use() {
        let tickets = issuer();
        let token = tickets
            .create(TicketPurpose::VerifyEmail, "user-1")
            .await
            .unwrap();
        assert_eq!(
            tickets
                .redeem(TicketPurpose::VerifyEmail, &token)
                .await
                .unwrap(),
            Some("user-1".to_string())
        );
        assert_eq!(
            tickets
                .redeem(TicketPurpose::VerifyEmail, &token)
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn purposes_do_not_cross() {
        let tickets = issuer();
        let token = tickets
            .create(TicketPurpose::ResetPassword, "user-1")
            .await
            .unwrap();
        assert_eq!(
            tickets
                .redeem(TicketPurpose::VerifyEmail, &token)
                .await
                .unwrap(),
            None
        );
        assert_eq!(
            tickets
                .redeem(TicketPurpose::ResetPassword, &token)
                .await
                .unwrap(),
            Some("user-1".to_string())
        );
    }

    #[tokio::test]
    async fn peek_leaves_the_ticket_alive() {
        let tickets = issuer();
        let token = tickets
            .create(TicketPurpose::TotpPending, "user-1")
            .await
            .unwrap();
        assert_eq!(token.len(), 26);
        assert_eq!(
            tickets
                .peek(TicketPurpose::TotpPending, &token)
                .await
                .unwrap(),
            Some("user-1".to_string())
        );
        assert!(tickets
            .delete(TicketPurpose::TotpPending, &token)
            .await
            .unwrap());
        assert_eq!(
            tickets
                .peek(TicketPurpose::TotpPending, &token)
                .await
                .unwrap(),
            None
        );
    }
}
