//! Student reflections: the one-per-day lifecycle, backups and teacher
//! review.

pub mod handlers;
mod service;

pub use service::{
    BackupRow, ClassReflection, ImportReport, ReflectionBackup, ReflectionInput, ReflectionService,
    StudentSummary, MIN_TEXT_CHARS,
};
