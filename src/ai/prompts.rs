use crate::db::Reflection;

/// One student's reflection as fed into the classroom analysis.
#[derive(Debug, Clone)]
pub struct AnalysisRow {
    pub student_name: String,
    pub reflection: Reflection,
}

pub fn encouragement_prompt(reflection: &Reflection) -> String {
    format!(
        r#"학생이 오늘 작성한 수업 성찰을 읽고, 따뜻하고 구체적인 격려 피드백을 한국어로 작성해 주세요.

성찰 내용:
- 오늘 학습한 내용: {learned}
- 학습 활동: {activities}
- 협동 과정: {collaboration}
- 수업 태도 자기평가: {rating}점 (5점 만점)

다른 설명 없이 아래 JSON 형식으로만 답하세요:
{{"feedback": "격려 메시지 (2~3문장)", "sentiment": "positive" | "neutral" | "negative"}}"#,
        learned = reflection.learned_content,
        activities = reflection.activities,
        collaboration = reflection.collaboration,
        rating = reflection.attitude_rating,
    )
}

pub fn classroom_prompt(rows: &[AnalysisRow]) -> String {
    let roster = rows
        .iter()
        .map(|row| {
            format!(
                "[학생:{}] 별점:{} 학습내용:{} 활동:{} 협동:{}",
                row.student_name,
                row.reflection.attitude_rating,
                row.reflection.learned_content,
                row.reflection.activities,
                row.reflection.collaboration,
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"당신은 경험 많은 담임 교사입니다. 아래 학생들의 오늘 성찰 일지를 읽고 교사용 지도 가이드를 작성하세요.

다음 측면을 중점적으로 살피세요:
1. 학업부진: 학습 내용이 빈약하거나 '모르겠다', '어렵다'는 표현이 두드러지는 학생
2. 관계갈등: 협동 과정에서 친구에 대한 불만, 소외감, 갈등 징후가 보이는 학생
3. 정서위기: 무기력, 지나친 자기비하가 보이는 학생
4. 태도불량: 수업 거부나 불성실한 태도가 드러나는 학생

학생 데이터:
{roster}

다른 설명 없이 아래 구조의 JSON으로만 답하세요:
{{
  "summary": "학급 전체 분위기와 주요 흐름 요약",
  "detectedIssues": [
    {{"studentName": "이름", "issueType": "학업부진" | "관계갈등" | "정서위기" | "태도불량",
      "severity": "high" | "medium" | "low", "description": "관찰된 근거", "actionTip": "교사를 위한 지도 조언"}}
  ],
  "statistics": {{"averageRating": 0.0, "positiveCount": 0, "alertCount": 0}}
}}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use uuid::Uuid;

    fn reflection(rating: i32) -> Reflection {
        let now = Utc::now();
        Reflection {
            id: Uuid::new_v4(),
            student_id: Uuid::new_v4(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            attitude_rating: rating,
            learned_content: "분수의 덧셈과 뺄셈을 배웠습니다 정말로".to_string(),
            activities: "모둠별로 문제를 만들어 서로 풀어 보았습니다".to_string(),
            collaboration: "친구가 설명해 줘서 어려운 부분을 이해했어요".to_string(),
            created_at: now,
            updated_at: now,
            ai_feedback: None,
            sentiment: None,
            teacher_feedback: None,
        }
    }

    #[test]
    fn test_classroom_prompt_lists_every_student() {
        let rows = vec![
            AnalysisRow { student_name: "홍길동".to_string(), reflection: reflection(5) },
            AnalysisRow { student_name: "김철수".to_string(), reflection: reflection(2) },
        ];
        let prompt = classroom_prompt(&rows);
        assert!(prompt.contains("[학생:홍길동] 별점:5"));
        assert!(prompt.contains("[학생:김철수] 별점:2"));
    }

    #[test]
    fn test_encouragement_prompt_embeds_fields() {
        let prompt = encouragement_prompt(&reflection(4));
        assert!(prompt.contains("분수의 덧셈"));
        assert!(prompt.contains("4점"));
    }
}
