use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::auth::AuthService;
use crate::classroom::{owned_class, owned_student};
use crate::clock::Clock;
use crate::db::{ClassInfo, Store, StudentProfile, User};
use crate::export::{self, RosterLine};
use crate::{AppError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassDraft {
    pub name: String,
    /// Defaults to the current year in the reference timezone.
    #[serde(default)]
    pub year: Option<String>,
    pub target_days: i32,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub student_number: String,
    pub class_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentUpdate {
    pub name: Option<String>,
    pub student_number: Option<String>,
    pub class_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RosterFormat {
    /// Uploaded file with a `studentNumber,name` header.
    Csv,
    /// Pasted "number name" lines.
    Lines,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkImportReport {
    pub count: usize,
    /// Student numbers skipped because an active student already holds
    /// them, in input order.
    pub duplicates: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentCompletion {
    pub student_id: Uuid,
    pub name: String,
    pub student_number: String,
    pub submitted: usize,
    pub completion_rate: i64,
}

pub struct RosterService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    auth: Arc<AuthService>,
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::ValidationError(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

impl RosterService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, auth: Arc<AuthService>) -> Self {
        Self { store, clock, auth }
    }

    // classes

    pub async fn list_classes(&self, teacher: &User) -> Result<Vec<ClassInfo>> {
        self.store.list_classes_by_teacher(teacher.id).await
    }

    fn class_fields(&self, draft: &ClassDraft) -> Result<(String, String)> {
        let name = required(&draft.name, "name")?;
        if draft.target_days < 1 {
            return Err(AppError::ValidationError("targetDays must be at least 1".to_string()));
        }
        let year = match draft.year.as_deref().map(str::trim).filter(|y| !y.is_empty()) {
            Some(year) => year.to_string(),
            None => self.clock.today().format("%Y").to_string(),
        };
        Ok((name, year))
    }

    pub async fn create_class(&self, teacher: &User, draft: &ClassDraft) -> Result<ClassInfo> {
        let (name, year) = self.class_fields(draft)?;
        let class = self
            .store
            .insert_class(&ClassInfo::new(name, year, teacher.id, draft.target_days))
            .await?;
        info!("Teacher {} created class {}", teacher.id, class.id);
        Ok(class)
    }

    pub async fn update_class(&self, teacher: &User, class_id: Uuid, draft: &ClassDraft) -> Result<ClassInfo> {
        let mut class = owned_class(&*self.store, teacher, class_id).await?;
        let (name, year) = self.class_fields(draft)?;
        class.name = name;
        class.year = year;
        class.target_days = draft.target_days;
        self.store.update_class(&class).await
    }

    /// Refused while any student, active or not, still references the class.
    pub async fn delete_class(&self, teacher: &User, class_id: Uuid) -> Result<()> {
        let class = owned_class(&*self.store, teacher, class_id).await?;
        let students = self.store.count_students_in_class(class.id).await?;
        if students > 0 {
            return Err(AppError::ReferentialConflict(format!(
                "class still has {} student records",
                students
            )));
        }
        self.store.delete_class(class.id).await?;
        info!("Teacher {} deleted class {}", teacher.id, class.id);
        Ok(())
    }

    // students

    pub async fn list_students(&self, teacher: &User, class_id: Uuid, include_inactive: bool) -> Result<Vec<User>> {
        let class = owned_class(&*self.store, teacher, class_id).await?;
        Ok(self
            .store
            .list_students(class.id)
            .await?
            .into_iter()
            .filter(|s| include_inactive || s.is_active)
            .collect())
    }

    async fn number_taken(&self, class_id: Uuid, student_number: &str) -> Result<bool> {
        Ok(self
            .store
            .find_students_by_number(class_id, student_number)
            .await?
            .iter()
            .any(|s| s.is_active))
    }

    pub async fn add_student(&self, teacher: &User, new: &NewStudent) -> Result<User> {
        let class = owned_class(&*self.store, teacher, new.class_id).await?;
        let name = required(&new.name, "name")?;
        let number = required(&new.student_number, "studentNumber")?;
        if self.number_taken(class.id, &number).await? {
            return Err(AppError::UniquenessConflict(format!(
                "student number {} is already in use",
                number
            )));
        }

        let hash = self.auth.default_password_hash()?;
        let student = self
            .store
            .insert_user(&User::new_student(name, number, class.id, hash))
            .await?;
        info!("Teacher {} added student {} to class {}", teacher.id, student.id, class.id);
        Ok(student)
    }

    /// Inserts rows in order, skipping any whose number is already held by
    /// an active student of the same class (including rows inserted earlier
    /// in this batch).
    pub async fn bulk_add(&self, teacher: &User, rows: &[NewStudent]) -> Result<BulkImportReport> {
        let class_ids: HashSet<Uuid> = rows.iter().map(|r| r.class_id).collect();
        for class_id in &class_ids {
            owned_class(&*self.store, teacher, *class_id).await?;
        }

        let hash = self.auth.default_password_hash()?;
        let mut report = BulkImportReport::default();
        for row in rows {
            let number = row.student_number.trim();
            if number.is_empty() {
                continue;
            }
            if self.number_taken(row.class_id, number).await? {
                report.duplicates.push(number.to_string());
                continue;
            }
            let name = match row.name.trim() {
                "" => "이름없음".to_string(),
                name => name.to_string(),
            };
            self.store
                .insert_user(&User::new_student(name, number.to_string(), row.class_id, hash.clone()))
                .await?;
            report.count += 1;
        }

        info!(
            "Teacher {} bulk-added {} students ({} duplicates)",
            teacher.id,
            report.count,
            report.duplicates.len()
        );
        Ok(report)
    }

    pub async fn import_roster_text(
        &self,
        teacher: &User,
        class_id: Uuid,
        format: RosterFormat,
        text: &str,
    ) -> Result<BulkImportReport> {
        let lines = match format {
            RosterFormat::Csv => export::parse_roster_csv(text),
            RosterFormat::Lines => export::parse_roster_lines(text),
        };
        let rows: Vec<NewStudent> = lines
            .into_iter()
            .map(|RosterLine { student_number, name }| NewStudent { name, student_number, class_id })
            .collect();
        if rows.is_empty() {
            owned_class(&*self.store, teacher, class_id).await?;
            return Ok(BulkImportReport::default());
        }
        self.bulk_add(teacher, &rows).await
    }

    /// Changes a student's identity fields. No uniqueness check here.
    pub async fn update_student(&self, teacher: &User, student_id: Uuid, update: &StudentUpdate) -> Result<User> {
        let (student, class) = owned_student(&*self.store, teacher, student_id).await?;
        let class_id = match update.class_id {
            Some(target) if target != class.id => owned_class(&*self.store, teacher, target).await?.id,
            _ => class.id,
        };
        let profile = StudentProfile {
            name: match update.name.as_deref() {
                Some(name) => required(name, "name")?,
                None => student.name.clone(),
            },
            student_number: match update.student_number.as_deref() {
                Some(number) => required(number, "studentNumber")?,
                None => student.student_number.clone().unwrap_or_default(),
            },
            class_id,
        };
        self.store.update_student_profile(student.id, &profile).await
    }

    /// Soft-deactivates (e.g. a transfer) or reactivates a student.
    pub async fn set_student_active(&self, teacher: &User, student_id: Uuid, active: bool) -> Result<User> {
        let (student, class) = owned_student(&*self.store, teacher, student_id).await?;
        if active && !student.is_active {
            let number = student.student_number.clone().unwrap_or_default();
            if self.number_taken(class.id, &number).await? {
                return Err(AppError::UniquenessConflict(format!(
                    "student number {} is already in use",
                    number
                )));
            }
        }

        let updated = self.store.set_user_active(student.id, active).await?;
        if !active {
            self.auth.revoke_sessions(student.id).await?;
        }
        info!("Teacher {} set student {} active={}", teacher.id, student.id, active);
        Ok(updated)
    }

    pub async fn reset_student_password(&self, teacher: &User, student_id: Uuid) -> Result<User> {
        let (student, _) = owned_student(&*self.store, teacher, student_id).await?;
        self.auth.reset_password(student.id).await
    }

    pub async fn roster_csv(&self, teacher: &User, class_id: Uuid) -> Result<String> {
        let students = self.list_students(teacher, class_id, true).await?;
        Ok(export::roster_csv(&students))
    }

    /// Per active student: reflections written over the class target.
    pub async fn completion_rates(&self, teacher: &User, class_id: Uuid) -> Result<Vec<StudentCompletion>> {
        let class = owned_class(&*self.store, teacher, class_id).await?;
        let students = self.list_students(teacher, class.id, false).await?;
        let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
        let reflections = self.store.list_reflections_for_students(&ids, None).await?;

        Ok(students
            .into_iter()
            .map(|s| {
                let submitted = reflections.iter().filter(|r| r.student_id == s.id).count();
                StudentCompletion {
                    student_id: s.id,
                    name: s.name,
                    student_number: s.student_number.unwrap_or_default(),
                    submitted,
                    completion_rate: class.completion_rate(submitted),
                }
            })
            .collect())
    }
}
