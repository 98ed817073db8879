//! Teacher-side classroom management: roster, classes and analysis.

pub mod analysis;
pub mod handlers;
pub mod roster;

use uuid::Uuid;

use crate::db::{ClassInfo, Role, Store, User};
use crate::error::{AuthError, DatabaseError};
use crate::Result;

pub use analysis::AnalysisService;
pub use roster::RosterService;

/// Loads a class and checks that `teacher` owns it.
pub async fn owned_class(store: &dyn Store, teacher: &User, class_id: Uuid) -> Result<ClassInfo> {
    let class = store.get_class(class_id).await?.ok_or(DatabaseError::NotFound)?;
    if class.teacher_id != teacher.id {
        return Err(AuthError::Forbidden("class belongs to another teacher".to_string()).into());
    }
    Ok(class)
}

/// Loads a student and the class they belong to, which `teacher` must own.
pub async fn owned_student(store: &dyn Store, teacher: &User, student_id: Uuid) -> Result<(User, ClassInfo)> {
    let student = store
        .get_user(student_id)
        .await?
        .filter(|u| u.role == Role::Student)
        .ok_or(DatabaseError::NotFound)?;
    let class_id = student.class_id.ok_or(DatabaseError::NotFound)?;
    let class = owned_class(store, teacher, class_id).await?;
    Ok((student, class))
}
