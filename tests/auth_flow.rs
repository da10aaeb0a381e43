//! End-to-end account flows over the in-memory key-value store: registration
//! tickets, two-factor login, and session lifecycle.

use std::sync::Arc;
use std::time::Duration;

use atelier::auth::{SessionManager, TicketIssuer, TicketPurpose, password, totp};
use atelier::ids::IdGenerator;
use atelier::kv::{KvStore, MemoryKv};
use totp_rs::{Algorithm, Secret, TOTP};

fn tickets(kv: Arc<dyn KvStore>) -> TicketIssuer {
    TicketIssuer::new(kv, Arc::new(IdGenerator::new()))
}

fn sessions(kv: Arc<dyn KvStore>) -> SessionManager {
    SessionManager::new(kv, Duration::from_secs(60), Duration::from_secs(600))
}

/// Generate the code an authenticator app would show for a stored secret.
fn current_code(secret_base32: &str) -> String {
    let secret = Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap();
    let totp = TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        secret,
        Some("atelier".to_string()),
        "someone@example.com".to_string(),
    )
    .unwrap();
    totp.generate_current().unwrap()
}

#[tokio::test]
async fn registration_verification_is_single_use() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let tickets = tickets(kv);

    // Registration stores the hash and mails out a verification link.
    let hash = password::hash("hunter2-hunter2").unwrap();
    assert!(password::verify("hunter2-hunter2", &hash).unwrap());
    assert!(!password::verify("wrong-password", &hash).unwrap());

    let token = tickets
        .create(TicketPurpose::VerifyEmail, "user-1")
        .await
        .unwrap();

    // First click verifies, a replay of the same link does not.
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
async fn two_factor_login_survives_a_wrong_code() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let tickets = tickets(Arc::clone(&kv));
    let sessions = sessions(kv);

    let provisioned = totp::provision("atelier", "someone@example.com").unwrap();

    // Login with a TOTP-enabled account yields a pending challenge instead of
    // a session.
    let challenge = tickets
        .create(TicketPurpose::TotpPending, "user-1")
        .await
        .unwrap();

    // A wrong code peeks at the ticket without burning it.
    let pending = tickets
        .peek(TicketPurpose::TotpPending, &challenge)
        .await
        .unwrap();
    assert_eq!(pending, Some("user-1".to_string()));
    let code = current_code(&provisioned.secret);
    if code != "000000" {
        assert!(!totp::verify(&provisioned.secret, "000000").unwrap());
    }
    assert!(
        tickets
            .peek(TicketPurpose::TotpPending, &challenge)
            .await
            .unwrap()
            .is_some()
    );

    // The right code consumes the ticket and a session is issued.
    assert!(totp::verify(&provisioned.secret, &code).unwrap());
    assert!(
        tickets
            .delete(TicketPurpose::TotpPending, &challenge)
            .await
            .unwrap()
    );
    let token = sessions.issue("user-1", "10.0.0.1", false).await.unwrap();
    assert_eq!(sessions.resolve(&token).await.unwrap().user_id, "user-1");

    // The challenge cannot be replayed for a second session.
    assert_eq!(
        tickets
            .peek(TicketPurpose::TotpPending, &challenge)
            .await
            .unwrap(),
        None
    );
}

#[tokio::test]
async fn sessions_expire_on_their_own() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let sessions = SessionManager::new(kv, Duration::from_millis(20), Duration::from_secs(600));

    let token = sessions.issue("user-1", "10.0.0.1", false).await.unwrap();
    assert!(sessions.resolve(&token).await.is_ok());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sessions.resolve(&token).await.is_err());
}

#[tokio::test]
async fn remembered_sessions_outlive_default_ones() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    let sessions = SessionManager::new(kv, Duration::from_millis(20), Duration::from_secs(600));

    let short = sessions.issue("user-1", "10.0.0.1", false).await.unwrap();
    let long = sessions.issue("user-1", "10.0.0.1", true).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(sessions.resolve(&short).await.is_err());
    assert!(sessions.resolve(&long).await.is_ok());
}

#[tokio::test]
async fn password_reset_ticket_expires() {
    let kv: Arc<dyn KvStore> = Arc::new(MemoryKv::new());
    // Drive expiry through the store directly; ticket TTLs are minutes long.
    kv.set("reset:tok", "user-1", Duration::from_millis(10))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;

    let tickets = tickets(kv);
    assert_eq!(
        tickets.redeem(TicketPurpose::ResetPassword, "tok").await.unwrap(),
        None
    );
}
