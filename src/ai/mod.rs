//! Generative AI integration: per-reflection encouragement and classroom
//! analysis, plus storage of teachers' Gemini keys.

pub mod analysis;
pub mod client;
pub mod prompts;
pub mod vault;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::{Reflection, Role, Sentiment, Store, User};
use crate::error::AiError;
use crate::{AppError, Result};

pub use analysis::{weekly_rollup, ClassAnalysis, WeeklyRollup};
pub use client::{GeminiClient, TextGenerator};
pub use prompts::AnalysisRow;
pub use vault::ApiKeyVault;

/// Stored in place of a real key by older clients; treated as "no key".
pub const PLACEHOLDER_API_KEY: &str = "PLACEHOLDER_API_KEY";

// Marker the provider puts in otherwise well-formed replies when the key
// has run out of quota.
const QUOTA_MARKERS: [&str; 2] = ["API 사용량", "quota"];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncouragingFeedback {
    pub feedback: String,
    pub sentiment: Sentiment,
}

impl EncouragingFeedback {
    pub fn neutral() -> Self {
        Self {
            feedback: String::new(),
            sentiment: Sentiment::Neutral,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.feedback.trim().is_empty()
    }
}

fn usable_key(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() || key == PLACEHOLDER_API_KEY {
        None
    } else {
        Some(key.to_string())
    }
}

pub struct AiAdvisor {
    store: Arc<dyn Store>,
    generator: Arc<dyn TextGenerator>,
    vault: ApiKeyVault,
    feedback_model: String,
    analysis_model: String,
}

impl AiAdvisor {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn TextGenerator>,
        vault: ApiKeyVault,
        feedback_model: String,
        analysis_model: String,
    ) -> Self {
        Self {
            store,
            generator,
            vault,
            feedback_model,
            analysis_model,
        }
    }

    /// The key a request on behalf of `requester` should use: a student
    /// borrows their class teacher's key, a teacher uses their own.
    pub async fn resolve_api_key(&self, requester: &User) -> Result<Option<String>> {
        let owner = match requester.role {
            Role::Teacher => Some(requester.clone()),
            Role::Student => {
                let Some(class_id) = requester.class_id else {
                    return Ok(None);
                };
                match self.store.get_class(class_id).await? {
                    Some(class) => self.store.get_user(class.teacher_id).await?,
                    None => None,
                }
            }
            Role::Admin => None,
        };

        let Some(sealed) = owner.and_then(|u| u.ai_api_key) else {
            return Ok(None);
        };
        match self.vault.open(&sealed) {
            Ok(key) => Ok(usable_key(&key)),
            Err(e) => {
                warn!("Stored AI key for {} could not be opened: {}", requester.id, e);
                Ok(None)
            }
        }
    }

    pub async fn has_api_key(&self, teacher: &User) -> Result<bool> {
        Ok(self.resolve_api_key(teacher).await?.is_some())
    }

    /// Stores (or with `None`/blank input, clears) a teacher's key. Returns
    /// whether a key is now on file.
    pub async fn set_api_key(&self, teacher: &User, api_key: Option<&str>) -> Result<bool> {
        if teacher.role != Role::Teacher {
            return Err(AppError::ValidationError("Only teachers hold AI keys".to_string()));
        }
        let sealed = match api_key.and_then(usable_key) {
            Some(key) => {
                if key.contains('•') {
                    return Err(AppError::ValidationError("API key looks masked".to_string()));
                }
                Some(self.vault.seal(&key)?)
            }
            None => None,
        };
        self.store.set_ai_api_key(teacher.id, sealed.as_deref()).await?;
        info!("AI key {} for teacher {}", if sealed.is_some() { "stored" } else { "cleared" }, teacher.id);
        Ok(sealed.is_some())
    }

    /// Encouragement for one reflection. Never fails: any problem resolving
    /// the key or talking to the provider yields [`EncouragingFeedback::neutral`].
    pub async fn encouraging_feedback(&self, requester: &User, reflection: &Reflection) -> EncouragingFeedback {
        let api_key = match self.resolve_api_key(requester).await {
            Ok(Some(key)) => key,
            Ok(None) => return EncouragingFeedback::neutral(),
            Err(e) => {
                warn!("AI key lookup failed for reflection {}: {}", reflection.id, e);
                return EncouragingFeedback::neutral();
            }
        };

        match self.request_feedback(&api_key, reflection).await {
            Ok(feedback) if QUOTA_MARKERS.iter().any(|m| feedback.feedback.contains(m)) => {
                warn!("AI feedback for reflection {} signalled a quota problem", reflection.id);
                EncouragingFeedback::neutral()
            }
            Ok(feedback) => feedback,
            Err(e) => {
                warn!("AI feedback for reflection {} degraded: {}", reflection.id, e);
                EncouragingFeedback::neutral()
            }
        }
    }

    async fn request_feedback(&self, api_key: &str, reflection: &Reflection) -> std::result::Result<EncouragingFeedback, AiError> {
        let prompt = prompts::encouragement_prompt(reflection);
        let raw = self.generator.generate(api_key, &self.feedback_model, &prompt).await?;
        client::parse_reply(&raw)
    }

    /// One analysis request over a class's reflections for a day.
    pub async fn classroom_analysis(&self, api_key: &str, rows: &[AnalysisRow]) -> std::result::Result<ClassAnalysis, AiError> {
        let prompt = prompts::classroom_prompt(rows);
        let raw = self.generator.generate(api_key, &self.analysis_model, &prompt).await?;
        client::parse_reply(&raw)
    }
}
