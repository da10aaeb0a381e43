//! Credential and session primitives: password hashing, bearer sessions,
//! one-shot tickets, and TOTP provisioning/verification.

pub mod password;
pub mod session;
pub mod ticket;
pub mod totp;

pub use session::{Session, SessionManager};
pub use ticket::{TicketIssuer, TicketPurpose};
