use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::AiAdvisor;
use crate::classroom::{owned_class, owned_student};
use crate::clock::Clock;
use crate::db::{Reflection, Sentiment, Store, User};
use crate::error::{AuthError, DatabaseError};
use crate::{AppError, Result};

/// Minimum length of each free-text field, counted in characters after
/// trimming.
pub const MIN_TEXT_CHARS: usize = 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionInput {
    /// Defaults to today in the reference timezone.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub attitude_rating: i32,
    pub learned_content: String,
    pub activities: String,
    pub collaboration: String,
}

impl ReflectionInput {
    pub fn validate(&self) -> Result<()> {
        if !(1..=5).contains(&self.attitude_rating) {
            return Err(AppError::ValidationError("attitudeRating must be between 1 and 5".to_string()));
        }
        for (field, value) in [
            ("learnedContent", &self.learned_content),
            ("activities", &self.activities),
            ("collaboration", &self.collaboration),
        ] {
            if value.trim().chars().count() < MIN_TEXT_CHARS {
                return Err(AppError::ValidationError(format!(
                    "{} must be at least {} characters",
                    field, MIN_TEXT_CHARS
                )));
            }
        }
        Ok(())
    }

    fn apply_to(&self, reflection: &mut Reflection, now: DateTime<Utc>) {
        reflection.attitude_rating = self.attitude_rating;
        reflection.learned_content = self.learned_content.trim().to_string();
        reflection.activities = self.activities.trim().to_string();
        reflection.collaboration = self.collaboration.trim().to_string();
        reflection.ai_feedback = None;
        reflection.sentiment = None;
        reflection.updated_at = now;
    }
}

/// A reflection as a teacher sees it in a class listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassReflection {
    pub student_name: String,
    pub student_number: String,
    #[serde(flatten)]
    pub reflection: Reflection,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub today: NaiveDate,
    pub submitted_today: bool,
    pub total_count: usize,
    pub target_days: i32,
    pub completion_rate: i64,
}

/// One row of a student backup file. Only the submitted fields are
/// required; AI output is restored when present.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRow {
    pub date: NaiveDate,
    pub attitude_rating: i32,
    pub learned_content: String,
    pub activities: String,
    pub collaboration: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ai_feedback: Option<String>,
    #[serde(default)]
    pub sentiment: Option<Sentiment>,
}

impl From<&Reflection> for BackupRow {
    fn from(r: &Reflection) -> Self {
        Self {
            date: r.date,
            attitude_rating: r.attitude_rating,
            learned_content: r.learned_content.clone(),
            activities: r.activities.clone(),
            collaboration: r.collaboration.clone(),
            created_at: Some(r.created_at),
            updated_at: Some(r.updated_at),
            ai_feedback: r.ai_feedback.clone(),
            sentiment: r.sentiment,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReflectionBackup {
    #[serde(alias = "studentId")]
    pub student_number: String,
    #[serde(default)]
    pub student_name: String,
    #[serde(default)]
    pub exported_at: Option<DateTime<Utc>>,
    pub reflections: Vec<BackupRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportReport {
    pub imported: usize,
    pub skipped: usize,
}

pub struct ReflectionService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    advisor: Arc<AiAdvisor>,
}

impl ReflectionService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, advisor: Arc<AiAdvisor>) -> Self {
        Self { store, clock, advisor }
    }

    /// Creates today's reflection or edits the one already written for the
    /// target date, then asks for AI encouragement.
    pub async fn submit(&self, student: &User, input: &ReflectionInput) -> Result<Reflection> {
        input.validate()?;
        let today = self.clock.today();
        let target = input.date.unwrap_or(today);

        let saved = match self.store.find_reflection(student.id, target).await? {
            Some(existing) => self.rewrite(existing, input, today).await?,
            None => {
                if target != today {
                    return Err(AppError::ValidationError(
                        "New reflections can only be written for today".to_string(),
                    ));
                }
                let now = self.clock.now();
                let mut reflection = Reflection {
                    id: Uuid::new_v4(),
                    student_id: student.id,
                    date: today,
                    attitude_rating: 0,
                    learned_content: String::new(),
                    activities: String::new(),
                    collaboration: String::new(),
                    created_at: now,
                    updated_at: now,
                    ai_feedback: None,
                    sentiment: None,
                    teacher_feedback: None,
                };
                input.apply_to(&mut reflection, now);
                let saved = self.store.insert_reflection(&reflection).await?;
                info!("Student {} submitted reflection for {}", student.id, today);
                saved
            }
        };

        Ok(self.enrich(student, saved).await)
    }

    /// Edits a reflection addressed by id. Same window as [`Self::submit`].
    pub async fn edit(&self, student: &User, reflection_id: Uuid, input: &ReflectionInput) -> Result<Reflection> {
        input.validate()?;
        let existing = self
            .store
            .get_reflection(reflection_id)
            .await?
            .filter(|r| r.student_id == student.id)
            .ok_or(DatabaseError::NotFound)?;
        if matches!(input.date, Some(date) if date != existing.date) {
            return Err(AppError::ValidationError("A reflection's date cannot be changed".to_string()));
        }

        let saved = self.rewrite(existing, input, self.clock.today()).await?;
        Ok(self.enrich(student, saved).await)
    }

    async fn rewrite(&self, mut existing: Reflection, input: &ReflectionInput, today: NaiveDate) -> Result<Reflection> {
        if existing.date != today {
            return Err(AppError::EditWindowClosed);
        }
        input.apply_to(&mut existing, self.clock.now());
        let saved = self.store.update_reflection_content(&existing).await?;
        info!("Student {} edited reflection {}", saved.student_id, saved.id);
        Ok(saved)
    }

    // Best effort: the reflection is already stored, so any failure here
    // just leaves it without AI feedback.
    async fn enrich(&self, student: &User, saved: Reflection) -> Reflection {
        let feedback = self.advisor.encouraging_feedback(student, &saved).await;
        if feedback.is_empty() {
            return saved;
        }
        match self
            .store
            .set_ai_feedback(saved.id, &feedback.feedback, feedback.sentiment)
            .await
        {
            Ok(enriched) => enriched,
            Err(e) => {
                warn!("Could not store AI feedback for reflection {}: {}", saved.id, e);
                saved
            }
        }
    }

    /// Newest first, optionally bounded by an inclusive date range.
    pub async fn history(&self, student_id: Uuid, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<Vec<Reflection>> {
        let reflections = self.store.list_reflections_for_student(student_id).await?;
        Ok(reflections
            .into_iter()
            .filter(|r| from.map_or(true, |f| r.date >= f) && to.map_or(true, |t| r.date <= t))
            .collect())
    }

    pub async fn summary(&self, student: &User) -> Result<StudentSummary> {
        let today = self.clock.today();
        let reflections = self.store.list_reflections_for_student(student.id).await?;
        let class = match student.class_id {
            Some(id) => self.store.get_class(id).await?,
            None => None,
        };
        let target_days = class.as_ref().map_or(0, |c| c.target_days);

        Ok(StudentSummary {
            today,
            submitted_today: reflections.iter().any(|r| r.date == today),
            total_count: reflections.len(),
            target_days,
            completion_rate: class.map_or(0, |c| c.completion_rate(reflections.len())),
        })
    }

    pub async fn export_backup(&self, student: &User) -> Result<ReflectionBackup> {
        let reflections = self.store.list_reflections_for_student(student.id).await?;
        Ok(ReflectionBackup {
            student_number: student.student_number.clone().unwrap_or_default(),
            student_name: student.name.clone(),
            exported_at: Some(self.clock.now()),
            reflections: reflections.iter().map(BackupRow::from).collect(),
        })
    }

    /// Merges a backup into the student's history. Dates already present
    /// are never overwritten.
    pub async fn import_backup(&self, student: &User, backup: &ReflectionBackup) -> Result<ImportReport> {
        if student.student_number.as_deref() != Some(backup.student_number.trim()) {
            return Err(AppError::ValidationError(
                "Backup belongs to a different student".to_string(),
            ));
        }

        let mut known: HashSet<NaiveDate> = self
            .store
            .list_reflections_for_student(student.id)
            .await?
            .into_iter()
            .map(|r| r.date)
            .collect();

        let now = self.clock.now();
        let mut report = ImportReport::default();
        for row in &backup.reflections {
            if !(1..=5).contains(&row.attitude_rating) || known.contains(&row.date) {
                report.skipped += 1;
                continue;
            }
            let reflection = Reflection {
                id: Uuid::new_v4(),
                student_id: student.id,
                date: row.date,
                attitude_rating: row.attitude_rating,
                learned_content: row.learned_content.clone(),
                activities: row.activities.clone(),
                collaboration: row.collaboration.clone(),
                created_at: row.created_at.unwrap_or(now),
                updated_at: row.updated_at.unwrap_or(now),
                ai_feedback: row.ai_feedback.clone(),
                sentiment: row.sentiment,
                teacher_feedback: None,
            };
            self.store.insert_reflection(&reflection).await?;
            known.insert(row.date);
            report.imported += 1;
        }

        info!(
            "Student {} restored {} reflections ({} skipped)",
            student.id, report.imported, report.skipped
        );
        Ok(report)
    }

    /// Reflections of a class's active students, newest first.
    pub async fn list_for_class(&self, teacher: &User, class_id: Uuid, date: Option<NaiveDate>) -> Result<Vec<ClassReflection>> {
        let class = owned_class(&*self.store, teacher, class_id).await?;
        let students: Vec<User> = self
            .store
            .list_students(class.id)
            .await?
            .into_iter()
            .filter(|s| s.is_active)
            .collect();
        let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
        let reflections = self.store.list_reflections_for_students(&ids, date).await?;

        Ok(reflections
            .into_iter()
            .filter_map(|reflection| {
                let student = students.iter().find(|s| s.id == reflection.student_id)?;
                Some(ClassReflection {
                    student_name: student.name.clone(),
                    student_number: student.student_number.clone().unwrap_or_default(),
                    reflection,
                })
            })
            .collect())
    }

    pub async fn student_history_for_teacher(&self, teacher: &User, student_id: Uuid) -> Result<Vec<Reflection>> {
        let (student, _) = owned_student(&*self.store, teacher, student_id).await?;
        self.store.list_reflections_for_student(student.id).await
    }

    /// Sets the teacher's note on a reflection; blank text clears it.
    pub async fn set_teacher_feedback(&self, teacher: &User, reflection_id: Uuid, text: Option<&str>) -> Result<Reflection> {
        let reflection = self
            .store
            .get_reflection(reflection_id)
            .await?
            .ok_or(DatabaseError::NotFound)?;
        owned_student(&*self.store, teacher, reflection.student_id)
            .await
            .map_err(|e| match e {
                AppError::DatabaseError(DatabaseError::NotFound) => {
                    AuthError::Forbidden("reflection belongs to another class".to_string()).into()
                }
                other => other,
            })?;

        let text = text.map(str::trim).filter(|t| !t.is_empty());
        let updated = self
            .store
            .set_teacher_feedback(reflection.id, text, self.clock.now())
            .await?;
        info!(
            "Teacher {} {} feedback on reflection {}",
            teacher.id,
            if text.is_some() { "left" } else { "cleared" },
            reflection.id
        );
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::MockTextGenerator;
    use crate::ai::{ApiKeyVault, EncouragingFeedback};
    use crate::clock::FixedClock;
    use crate::db::{ClassInfo, MemoryStore, Role};
    use crate::error::AiError;
    use chrono::{Duration, TimeZone};

    const TEXT: &str = "오늘은 분수의 덧셈을 배우고 친구와 문제를 풀었다";

    struct Harness {
        store: MemoryStore,
        clock: Arc<FixedClock>,
        service: ReflectionService,
        teacher: User,
        student: User,
    }

    async fn harness(generator: MockTextGenerator, with_key: bool) -> Harness {
        let store = MemoryStore::new();
        // 2024-05-01 10:00 in UTC+9
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap()));
        let vault = ApiKeyVault::new([1u8; 32]);

        let mut teacher = User::new_staff(Role::Teacher, "김선생님".into(), "teacher1".into(), "h".into());
        if with_key {
            teacher.ai_api_key = Some(vault.seal("key").unwrap());
        }
        store.insert_user(&teacher).await.unwrap();
        let class = ClassInfo::new("1학년 3반".into(), "2024".into(), teacher.id, 190);
        store.insert_class(&class).await.unwrap();
        let student = User::new_student("홍길동".into(), "10301".into(), class.id, "h".into());
        store.insert_user(&student).await.unwrap();

        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let advisor = Arc::new(AiAdvisor::new(
            shared.clone(),
            Arc::new(generator),
            vault,
            "flash".into(),
            "pro".into(),
        ));
        let service = ReflectionService::new(shared, clock.clone(), advisor);
        Harness { store, clock, service, teacher, student }
    }

    fn input(rating: i32) -> ReflectionInput {
        ReflectionInput {
            date: None,
            attitude_rating: rating,
            learned_content: TEXT.to_string(),
            activities: TEXT.to_string(),
            collaboration: TEXT.to_string(),
        }
    }

    fn no_ai() -> MockTextGenerator {
        let mut generator = MockTextGenerator::new();
        generator.expect_generate().times(0);
        generator
    }

    #[test]
    fn test_validation_counts_trimmed_chars() {
        let mut short = input(3);
        short.activities = format!("   {}   ", "가".repeat(19));
        assert!(short.validate().is_err());
        short.activities = "가".repeat(20);
        assert!(short.validate().is_ok());
        assert!(input(0).validate().is_err());
        assert!(input(6).validate().is_err());
    }

    #[tokio::test]
    async fn test_second_submit_same_day_edits() {
        let h = harness(no_ai(), false).await;
        let first = h.service.submit(&h.student, &input(3)).await.unwrap();
        h.clock.advance(Duration::hours(2));
        let second = h.service.submit(&h.student, &input(5)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.attitude_rating, 5);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at > first.updated_at);
        assert_eq!(h.store.list_reflections_for_student(h.student.id).await.unwrap().len(), 1);
        assert!(second.ai_feedback.is_none());
        assert!(second.sentiment.is_none());
    }

    #[tokio::test]
    async fn test_short_text_changes_nothing() {
        let h = harness(no_ai(), false).await;
        let mut bad = input(3);
        bad.collaboration = "짧음".to_string();
        assert!(matches!(
            h.service.submit(&h.student, &bad).await,
            Err(AppError::ValidationError(_))
        ));
        assert!(h.store.list_reflections_for_student(h.student.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_edit_window_closes_at_reference_midnight() {
        let h = harness(no_ai(), false).await;
        let saved = h.service.submit(&h.student, &input(3)).await.unwrap();

        // 2024-05-02 00:00 in UTC+9
        h.clock.set(Utc.with_ymd_and_hms(2024, 5, 1, 15, 0, 0).unwrap());
        let mut late = input(1);
        late.date = Some(saved.date);
        assert!(matches!(
            h.service.submit(&h.student, &late).await,
            Err(AppError::EditWindowClosed)
        ));
        assert!(matches!(
            h.service.edit(&h.student, saved.id, &input(1)).await,
            Err(AppError::EditWindowClosed)
        ));
        let unchanged = h.store.get_reflection(saved.id).await.unwrap().unwrap();
        assert_eq!(unchanged.attitude_rating, 3);
    }

    #[tokio::test]
    async fn test_new_reflection_for_other_day_rejected() {
        let h = harness(no_ai(), false).await;
        let mut past = input(3);
        past.date = NaiveDate::from_ymd_opt(2024, 4, 30);
        assert!(matches!(
            h.service.submit(&h.student, &past).await,
            Err(AppError::ValidationError(_))
        ));
    }

    #[tokio::test]
    async fn test_ai_feedback_attached_when_available() {
        let mut generator = MockTextGenerator::new();
        generator.expect_generate().times(1).returning(|_, _, _| {
            Ok(serde_json::to_string(&EncouragingFeedback {
                feedback: "협동하는 모습이 멋져요".into(),
                sentiment: Sentiment::Positive,
            })
            .unwrap())
        });
        let h = harness(generator, true).await;

        let saved = h.service.submit(&h.student, &input(4)).await.unwrap();
        assert_eq!(saved.ai_feedback.as_deref(), Some("협동하는 모습이 멋져요"));
        assert_eq!(saved.sentiment, Some(Sentiment::Positive));
    }

    #[tokio::test]
    async fn test_ai_failure_still_persists() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_, _, _| Err(AiError::RequestFailed("connection refused".into())));
        let h = harness(generator, true).await;

        let saved = h.service.submit(&h.student, &input(4)).await.unwrap();
        assert!(saved.ai_feedback.is_none());
        assert!(h.store.get_reflection(saved.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_backup_round_trip_merges_only_new_dates() {
        let h = harness(no_ai(), false).await;
        let saved = h.service.submit(&h.student, &input(4)).await.unwrap();

        let mut backup = h.service.export_backup(&h.student).await.unwrap();
        assert_eq!(backup.student_number, "10301");
        let mut older = backup.reflections[0].clone();
        older.date = NaiveDate::from_ymd_opt(2024, 4, 29).unwrap();
        let mut broken = older.clone();
        broken.date = NaiveDate::from_ymd_opt(2024, 4, 28).unwrap();
        broken.attitude_rating = 9;
        backup.reflections.push(older);
        backup.reflections.push(broken);

        let report = h.service.import_backup(&h.student, &backup).await.unwrap();
        assert_eq!(report, ImportReport { imported: 1, skipped: 2 });

        let history = h.service.history(h.student.id, None, None).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, saved.id);
        assert_ne!(history[1].id, saved.id);

        backup.student_number = "99999".into();
        assert!(h.service.import_backup(&h.student, &backup).await.is_err());
    }

    #[tokio::test]
    async fn test_teacher_feedback_set_and_clear() {
        let h = harness(no_ai(), false).await;
        let saved = h.service.submit(&h.student, &input(4)).await.unwrap();

        let updated = h
            .service
            .set_teacher_feedback(&h.teacher, saved.id, Some("잘했어요"))
            .await
            .unwrap();
        assert_eq!(updated.teacher_feedback.as_deref(), Some("잘했어요"));

        let cleared = h
            .service
            .set_teacher_feedback(&h.teacher, saved.id, Some("  "))
            .await
            .unwrap();
        assert!(cleared.teacher_feedback.is_none());

        let stranger = User::new_staff(Role::Teacher, "박선생님".into(), "teacher2".into(), "h".into());
        assert!(matches!(
            h.service.set_teacher_feedback(&stranger, saved.id, Some("x")).await,
            Err(AppError::AuthError(AuthError::Forbidden(_)))
        ));
    }

    #[tokio::test]
    async fn test_summary_reports_completion() {
        let h = harness(no_ai(), false).await;
        h.service.submit(&h.student, &input(4)).await.unwrap();

        let summary = h.service.summary(&h.student).await.unwrap();
        assert!(summary.submitted_today);
        assert_eq!(summary.total_count, 1);
        assert_eq!(summary.target_days, 190);
        assert_eq!(summary.completion_rate, 1);
    }
}
