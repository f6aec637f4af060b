//! Business logic services.
//!
//! Services borrow what they need from [`crate::state::AppState`] for the
//! duration of one request.

pub mod auth;
pub mod email;
pub mod orders;
pub mod token;

pub use auth::{AuthError, AuthService, PasswordService};
pub use email::{EmailError, EmailService, LogMailer, Mailer, SmtpMailer};
pub use orders::{OrderError, OrderService};
