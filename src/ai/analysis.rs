//! Classroom analysis payload and the weekly rollup over cached analyses.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

/// Number of most recent cached analyses the weekly rollup covers.
pub const ROLLUP_WINDOW: usize = 7;

/// Minimum number of analyses a student must be flagged in to count as a
/// continued concern.
pub const REPEAT_THRESHOLD: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssueType {
    #[serde(rename = "학업부진")]
    AcademicStruggle,
    #[serde(rename = "관계갈등")]
    PeerConflict,
    #[serde(rename = "정서위기")]
    EmotionalCrisis,
    #[serde(rename = "태도불량")]
    Attitude,
    #[serde(rename = "기타", other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectedIssue {
    pub student_name: String,
    pub issue_type: IssueType,
    pub severity: Severity,
    pub description: String,
    pub action_tip: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatistics {
    pub average_rating: f64,
    #[serde(deserialize_with = "count_from_number")]
    pub positive_count: u32,
    #[serde(deserialize_with = "count_from_number")]
    pub alert_count: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassAnalysis {
    pub summary: String,
    #[serde(default)]
    pub detected_issues: Vec<DetectedIssue>,
    pub statistics: AnalysisStatistics,
}

// The model types counts as JSON numbers, so 3.0 has to be accepted too.
fn count_from_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    if !value.is_finite() || value < 0.0 {
        return Err(serde::de::Error::custom(format!("invalid count {}", value)));
    }
    Ok(value.round() as u32)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequentIssue {
    pub student_name: String,
    pub occurrences: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyRollup {
    pub days_analyzed: usize,
    pub average_rating: f64,
    pub total_alerts: u32,
    pub frequent_issues: Vec<FrequentIssue>,
}

/// Summarises the [`ROLLUP_WINDOW`] newest analyses. `newest_first` must be
/// ordered by date, descending. Returns `None` when nothing is cached.
pub fn weekly_rollup(newest_first: &[ClassAnalysis]) -> Option<WeeklyRollup> {
    let recent = &newest_first[..newest_first.len().min(ROLLUP_WINDOW)];
    if recent.is_empty() {
        return None;
    }

    let average_rating =
        recent.iter().map(|a| a.statistics.average_rating).sum::<f64>() / recent.len() as f64;
    let total_alerts = recent.iter().map(|a| a.statistics.alert_count).sum();

    // a student listed twice in one analysis still counts once for that day
    let mut occurrences: HashMap<&str, usize> = HashMap::new();
    for analysis in recent {
        let names: HashSet<&str> = analysis
            .detected_issues
            .iter()
            .map(|issue| issue.student_name.as_str())
            .collect();
        for name in names {
            *occurrences.entry(name).or_insert(0) += 1;
        }
    }

    let mut frequent_issues: Vec<FrequentIssue> = occurrences
        .into_iter()
        .filter(|(_, count)| *count >= REPEAT_THRESHOLD)
        .map(|(name, count)| FrequentIssue {
            student_name: name.to_string(),
            occurrences: count,
        })
        .collect();
    frequent_issues.sort_by(|a, b| {
        b.occurrences
            .cmp(&a.occurrences)
            .then_with(|| a.student_name.cmp(&b.student_name))
    });

    Some(WeeklyRollup {
        days_analyzed: recent.len(),
        average_rating,
        total_alerts,
        frequent_issues,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(name: &str) -> DetectedIssue {
        DetectedIssue {
            student_name: name.to_string(),
            issue_type: IssueType::PeerConflict,
            severity: Severity::Medium,
            description: "친구와 다툼".to_string(),
            action_tip: "개별 상담".to_string(),
        }
    }

    fn analysis(rating: f64, alerts: u32, names: &[&str]) -> ClassAnalysis {
        ClassAnalysis {
            summary: "요약".to_string(),
            detected_issues: names.iter().map(|n| issue(n)).collect(),
            statistics: AnalysisStatistics {
                average_rating: rating,
                positive_count: 0,
                alert_count: alerts,
            },
        }
    }

    #[test]
    fn test_rollup_flags_repeated_students_only() {
        let entries = vec![
            analysis(4.0, 1, &["Kim"]),
            analysis(3.0, 2, &["Kim", "Lee"]),
            analysis(5.0, 0, &[]),
            analysis(4.0, 1, &["Kim"]),
            analysis(4.0, 0, &[]),
            analysis(4.0, 0, &[]),
            analysis(4.0, 0, &[]),
        ];

        let rollup = weekly_rollup(&entries).unwrap();
        assert_eq!(rollup.days_analyzed, 7);
        assert_eq!(rollup.total_alerts, 4);
        assert!((rollup.average_rating - 4.0).abs() < 1e-9);
        assert_eq!(
            rollup.frequent_issues,
            vec![FrequentIssue { student_name: "Kim".to_string(), occurrences: 3 }]
        );
    }

    #[test]
    fn test_rollup_only_reads_seven_newest() {
        let mut entries = vec![analysis(5.0, 0, &[]); 7];
        entries.push(analysis(1.0, 9, &["Park"]));
        entries.push(analysis(1.0, 9, &["Park"]));

        let rollup = weekly_rollup(&entries).unwrap();
        assert_eq!(rollup.days_analyzed, 7);
        assert_eq!(rollup.total_alerts, 0);
        assert!(rollup.frequent_issues.is_empty());
    }

    #[test]
    fn test_rollup_counts_each_day_once_and_sorts() {
        let entries = vec![
            analysis(3.0, 0, &["Lee", "Lee", "Choi"]),
            analysis(3.0, 0, &["Lee", "Choi"]),
            analysis(3.0, 0, &["Choi"]),
        ];
        let rollup = weekly_rollup(&entries).unwrap();
        let names: Vec<(&str, usize)> = rollup
            .frequent_issues
            .iter()
            .map(|f| (f.student_name.as_str(), f.occurrences))
            .collect();
        assert_eq!(names, vec![("Choi", 3), ("Lee", 2)]);
    }

    #[test]
    fn test_rollup_empty() {
        assert!(weekly_rollup(&[]).is_none());
    }

    #[test]
    fn test_parse_provider_payload() {
        let raw = r#"{
            "summary": "전반적으로 차분한 분위기",
            "detectedIssues": [
                {"studentName": "홍길동", "issueType": "정서위기", "severity": "high",
                 "description": "무기력함 표현", "actionTip": "오늘 중 면담"},
                {"studentName": "김철수", "issueType": "수면부족", "severity": "low",
                 "description": "졸림", "actionTip": "관찰"}
            ],
            "statistics": {"averageRating": 3.6, "positiveCount": 12.0, "alertCount": 2}
        }"#;

        let parsed: ClassAnalysis = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.detected_issues[0].issue_type, IssueType::EmotionalCrisis);
        assert_eq!(parsed.detected_issues[0].severity, Severity::High);
        assert_eq!(parsed.detected_issues[1].issue_type, IssueType::Other);
        assert_eq!(parsed.statistics.positive_count, 12);
        assert_eq!(parsed.statistics.alert_count, 2);
    }

    #[test]
    fn test_parse_rejects_negative_count() {
        let raw = r#"{"summary":"x","detectedIssues":[],"statistics":{"averageRating":1,"positiveCount":-1,"alertCount":0}}"#;
        assert!(serde_json::from_str::<ClassAnalysis>(raw).is_err());
    }
}
