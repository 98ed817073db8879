use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::ai::{weekly_rollup, AiAdvisor, AnalysisRow, ClassAnalysis, WeeklyRollup};
use crate::classroom::owned_class;
use crate::clock::Clock;
use crate::db::{AnalysisEntry, Store, User};
use crate::error::DatabaseError;
use crate::{AppError, Result};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisView {
    pub class_id: Uuid,
    pub date: NaiveDate,
    pub generated_at: DateTime<Utc>,
    /// False when the provider failed and `result` is a placeholder.
    pub cached: bool,
    pub result: ClassAnalysis,
}

impl From<AnalysisEntry> for AnalysisView {
    fn from(entry: AnalysisEntry) -> Self {
        Self {
            class_id: entry.class_id,
            date: entry.date,
            generated_at: entry.generated_at,
            cached: true,
            result: entry.result.0,
        }
    }
}

fn degraded(reason: &str) -> ClassAnalysis {
    ClassAnalysis {
        summary: format!("AI 분석 중 오류가 발생했습니다: {}", reason),
        ..ClassAnalysis::default()
    }
}

pub struct AnalysisService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    advisor: Arc<AiAdvisor>,
}

impl AnalysisService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, advisor: Arc<AiAdvisor>) -> Self {
        Self { store, clock, advisor }
    }

    /// Runs the classroom analysis for `date` (default today) and caches it,
    /// replacing any earlier result for the same day. A provider failure
    /// yields an uncached placeholder.
    pub async fn analyze(&self, teacher: &User, class_id: Uuid, date: Option<NaiveDate>) -> Result<AnalysisView> {
        let class = owned_class(&*self.store, teacher, class_id).await?;
        let date = date.unwrap_or_else(|| self.clock.today());

        let students: Vec<User> = self
            .store
            .list_students(class.id)
            .await?
            .into_iter()
            .filter(|s| s.is_active)
            .collect();
        let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
        let rows: Vec<AnalysisRow> = self
            .store
            .list_reflections_for_students(&ids, Some(date))
            .await?
            .into_iter()
            .filter_map(|reflection| {
                let student = students.iter().find(|s| s.id == reflection.student_id)?;
                Some(AnalysisRow { student_name: student.name.clone(), reflection })
            })
            .collect();
        if rows.is_empty() {
            return Err(AppError::PreconditionFailed(format!("no reflections submitted on {}", date)));
        }

        let api_key = self
            .advisor
            .resolve_api_key(teacher)
            .await?
            .ok_or_else(|| AppError::PreconditionFailed("no AI API key configured".to_string()))?;

        match self.advisor.classroom_analysis(&api_key, &rows).await {
            Ok(result) => {
                let mut entry = AnalysisEntry::new(class.id, date, result);
                entry.generated_at = self.clock.now();
                self.store.put_analysis(&entry).await?;
                info!(
                    "Cached analysis {} over {} reflections ({} issues)",
                    entry.cache_key(),
                    rows.len(),
                    entry.result.detected_issues.len()
                );
                Ok(entry.into())
            }
            Err(e) => {
                warn!("Classroom analysis for {} on {} degraded: {}", class.id, date, e);
                Ok(AnalysisView {
                    class_id: class.id,
                    date,
                    generated_at: self.clock.now(),
                    cached: false,
                    result: degraded(&e.to_string()),
                })
            }
        }
    }

    pub async fn get_cached(&self, teacher: &User, class_id: Uuid, date: NaiveDate) -> Result<Option<AnalysisView>> {
        let class = owned_class(&*self.store, teacher, class_id).await?;
        Ok(self.store.get_analysis(class.id, date).await?.map(AnalysisView::from))
    }

    /// Date descending.
    pub async fn history(&self, teacher: &User, class_id: Uuid) -> Result<Vec<AnalysisView>> {
        let class = owned_class(&*self.store, teacher, class_id).await?;
        Ok(self
            .store
            .list_analyses(class.id)
            .await?
            .into_iter()
            .map(AnalysisView::from)
            .collect())
    }

    pub async fn delete(&self, teacher: &User, class_id: Uuid, date: NaiveDate) -> Result<()> {
        let class = owned_class(&*self.store, teacher, class_id).await?;
        if !self.store.delete_analysis(class.id, date).await? {
            return Err(DatabaseError::NotFound.into());
        }
        info!("Teacher {} deleted analysis for {} on {}", teacher.id, class.id, date);
        Ok(())
    }

    pub async fn weekly(&self, teacher: &User, class_id: Uuid) -> Result<Option<WeeklyRollup>> {
        let class = owned_class(&*self.store, teacher, class_id).await?;
        let analyses: Vec<ClassAnalysis> = self
            .store
            .list_analyses(class.id)
            .await?
            .into_iter()
            .map(|e| e.result.0)
            .collect();
        Ok(weekly_rollup(&analyses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::client::MockTextGenerator;
    use crate::ai::ApiKeyVault;
    use crate::clock::FixedClock;
    use crate::db::{ClassInfo, MemoryStore, Reflection, Role};
    use crate::error::AiError;
    use chrono::TimeZone;

    const TEXT: &str = "오늘은 분수의 덧셈을 배우고 친구와 문제를 풀었다";

    fn reply(summary: &str, names: &[&str]) -> String {
        let issues: Vec<serde_json::Value> = names
            .iter()
            .map(|n| {
                serde_json::json!({
                    "studentName": n, "issueType": "관계갈등", "severity": "medium",
                    "description": "d", "actionTip": "t"
                })
            })
            .collect();
        serde_json::json!({
            "summary": summary,
            "detectedIssues": issues,
            "statistics": {"averageRating": 4.0, "positiveCount": 1, "alertCount": names.len()}
        })
        .to_string()
    }

    struct Harness {
        store: MemoryStore,
        service: AnalysisService,
        teacher: User,
        class: ClassInfo,
    }

    async fn harness(generator: MockTextGenerator, with_key: bool, with_reflection: bool) -> Harness {
        let store = MemoryStore::new();
        let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap()));
        let vault = ApiKeyVault::new([2u8; 32]);

        let mut teacher = User::new_staff(Role::Teacher, "김선생님".into(), "teacher1".into(), "h".into());
        if with_key {
            teacher.ai_api_key = Some(vault.seal("key").unwrap());
        }
        store.insert_user(&teacher).await.unwrap();
        let class = ClassInfo::new("1학년 3반".into(), "2024".into(), teacher.id, 190);
        store.insert_class(&class).await.unwrap();
        let student = User::new_student("홍길동".into(), "10301".into(), class.id, "h".into());
        store.insert_user(&student).await.unwrap();

        if with_reflection {
            let now = clock.now();
            store
                .insert_reflection(&Reflection {
                    id: Uuid::new_v4(),
                    student_id: student.id,
                    date: clock.today(),
                    attitude_rating: 4,
                    learned_content: TEXT.into(),
                    activities: TEXT.into(),
                    collaboration: TEXT.into(),
                    created_at: now,
                    updated_at: now,
                    ai_feedback: None,
                    sentiment: None,
                    teacher_feedback: None,
                })
                .await
                .unwrap();
        }

        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let advisor = Arc::new(AiAdvisor::new(shared.clone(), Arc::new(generator), vault, "flash".into(), "pro".into()));
        let service = AnalysisService::new(shared, clock, advisor);
        Harness { store, service, teacher, class }
    }

    fn may_1() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    #[tokio::test]
    async fn test_rerun_overwrites_cache() {
        let mut generator = MockTextGenerator::new();
        let mut replies = vec![reply("first", &[]), reply("second", &["홍길동"])].into_iter();
        generator
            .expect_generate()
            .withf(|_, model, prompt| model == "pro" && prompt.contains("[학생:홍길동]"))
            .times(2)
            .returning(move |_, _, _| Ok(replies.next().unwrap_or_default()));
        let h = harness(generator, true, true).await;

        h.service.analyze(&h.teacher, h.class.id, Some(may_1())).await.unwrap();
        let second = h.service.analyze(&h.teacher, h.class.id, None).await.unwrap();
        assert!(second.cached);

        let cached = h.service.get_cached(&h.teacher, h.class.id, may_1()).await.unwrap().unwrap();
        assert_eq!(cached.result.summary, "second");
        assert_eq!(h.store.list_analyses(h.class.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_empty_day_is_a_precondition_failure() {
        let mut generator = MockTextGenerator::new();
        generator.expect_generate().times(0);
        let h = harness(generator, true, false).await;

        assert!(matches!(
            h.service.analyze(&h.teacher, h.class.id, Some(may_1())).await,
            Err(AppError::PreconditionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_key_is_a_precondition_failure() {
        let mut generator = MockTextGenerator::new();
        generator.expect_generate().times(0);
        let h = harness(generator, false, true).await;

        assert!(matches!(
            h.service.analyze(&h.teacher, h.class.id, Some(may_1())).await,
            Err(AppError::PreconditionFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_provider_failure_is_not_cached() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(|_, _, _| Err(AiError::QuotaExceeded));
        let h = harness(generator, true, true).await;

        let view = h.service.analyze(&h.teacher, h.class.id, Some(may_1())).await.unwrap();
        assert!(!view.cached);
        assert!(view.result.detected_issues.is_empty());
        assert!(h.service.get_cached(&h.teacher, h.class.id, may_1()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_and_weekly() {
        let mut generator = MockTextGenerator::new();
        generator
            .expect_generate()
            .returning(|_, _, _| Ok(reply("ok", &["홍길동"])));
        let h = harness(generator, true, true).await;

        assert!(h.service.weekly(&h.teacher, h.class.id).await.unwrap().is_none());
        h.service.analyze(&h.teacher, h.class.id, Some(may_1())).await.unwrap();
        let rollup = h.service.weekly(&h.teacher, h.class.id).await.unwrap().unwrap();
        assert_eq!(rollup.days_analyzed, 1);
        assert!(rollup.frequent_issues.is_empty());

        h.service.delete(&h.teacher, h.class.id, may_1()).await.unwrap();
        assert!(matches!(
            h.service.delete(&h.teacher, h.class.id, may_1()).await,
            Err(AppError::DatabaseError(DatabaseError::NotFound))
        ));
    }
}
