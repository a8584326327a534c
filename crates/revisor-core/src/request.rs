use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use revisor_roles::Language;

/// Closest matching intent of a customer's question
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    #[serde(default)]
    pub name: Option<String>,
    /// Any other fields the caller attached to the intent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One question/answer pair submitted for revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub question: String,
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(default)]
    pub locale: String,
    #[serde(default)]
    pub intent: Intent,
    #[serde(default)]
    pub context: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub category: String,
}

impl RevisionRequest {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            id: None,
            question: question.into(),
            answer: answer.into(),
            correct: None,
            feedback: None,
            locale: String::new(),
            intent: Intent::default(),
            context: Value::Null,
            metadata: Value::Null,
            category: String::new(),
        }
    }

    pub fn language(&self) -> Language {
        Language::from_locale(&self.locale)
    }

    pub fn intent_name(&self) -> Option<&str> {
        self.intent.name.as_deref().filter(|n| !n.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_full_request() {
        let json = r#"{
            "id": 42,
            "question": "Serve no modelo 2020?",
            "answer": "Sim, serve.",
            "correct": false,
            "feedback": "too short",
            "locale": "pt",
            "intent": {"name": "compatibility", "confidence": 0.91},
            "context": {"product": {"title": "Capa"}},
            "metadata": {"rules": ["no links"]},
            "category": "accessories"
        }"#;
        let request: RevisionRequest = serde_json::from_str(json).unwrap();

        assert_eq!(request.id, Some(42));
        assert_eq!(request.language(), Language::Portuguese);
        assert_eq!(request.intent_name(), Some("compatibility"));
        assert_eq!(request.intent.extra["confidence"], 0.91);
        assert_eq!(request.context["product"]["title"], "Capa");
    }

    #[test]
    fn test_minimal_request_defaults() {
        let request: RevisionRequest =
            serde_json::from_str(r#"{"question": "q", "answer": "a"}"#).unwrap();
        assert_eq!(request.language(), Language::Spanish);
        assert_eq!(request.intent_name(), None);
        assert!(request.metadata.is_null());
    }
}
