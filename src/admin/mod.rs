//! Admin-only teacher account management.

pub mod handlers;
mod service;

pub use service::{AdminService, NewTeacher};
