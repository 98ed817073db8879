//! Authentication: credential checks, bearer sessions with idle expiry, the
//! first-login rotation gate and the per-role operation table.

pub mod access;
pub mod handlers;
pub mod password;
mod service;

pub use access::{Operation, SessionContext};
pub use service::{AuthService, Claims, Credentials, LoginOutcome};
