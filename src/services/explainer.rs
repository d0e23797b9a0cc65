//! Wrong-answer explanations.
//!
//! Asks the LLM for an encouraging, structured explanation after a miss.
//! Any failure degrades to a static encouragement so the turn never blocks
//! on explanation quality.

use serde::Serialize;

use crate::constants::EXPLAIN_TEMPERATURE;
use crate::services::llm::LlmClient;
use crate::services::llm_json;

const EXPLAIN_SYSTEM_PROMPT: &str = r#"You are a patient tutor explaining a concept after a wrong answer.

Return ONLY valid JSON:
{
  "encouragement": "Brief positive message",
  "explanation": "Clear step-by-step explanation of the correct solution",
  "key_concept": "The core concept the learner should understand",
  "tip": "A practical tip for similar questions"
}

Return ONLY the JSON, no other text."#;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub encouragement: String,
    pub explanation: String,
    pub key_concept: String,
    pub tip: String,
}

impl Explanation {
    fn fallback() -> Self {
        Self {
            encouragement: "Keep going!".to_string(),
            explanation: String::new(),
            key_concept: String::new(),
            tip: String::new(),
        }
    }

    /// Single feedback line for the submit result.
    pub fn as_feedback(&self) -> String {
        let mut parts = vec![self.encouragement.as_str()];
        if !self.explanation.is_empty() {
            parts.push(self.explanation.as_str());
        }
        parts.join(" ")
    }
}

pub async fn explain(
    llm: &LlmClient,
    question: &str,
    correct_answer: &str,
    learner_answer: &str,
    concept_name: &str,
    concept_description: &str,
) -> Explanation {
    let user_prompt = format!(
        "The learner got this wrong:\n\
         Question: {question}\n\
         Learner's answer: {learner_answer}\n\
         Correct answer: {correct_answer}\n\
         Concept: {concept_name}. {concept_description}\n\n\
         Explain clearly. Return JSON only."
    );

    let output = match llm
        .chat(EXPLAIN_SYSTEM_PROMPT, &user_prompt, EXPLAIN_TEMPERATURE)
        .await
    {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!(error = %e, "Explanation call failed, using fallback");
            return Explanation::fallback();
        }
    };

    match llm_json::parse_object(&output.text) {
        Ok(map) => Explanation {
            encouragement: text_or(&map, "encouragement", "Keep going!"),
            explanation: text_or(&map, "explanation", ""),
            key_concept: text_or(&map, "key_concept", ""),
            tip: text_or(&map, "tip", ""),
        },
        Err(e) => {
            tracing::warn!(error = %e, "Explanation JSON malformed, using fallback");
            Explanation::fallback()
        }
    }
}

fn text_or(
    map: &serde_json::Map<String, serde_json::Value>,
    key: &str,
    default: &str,
) -> String {
    map.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}
