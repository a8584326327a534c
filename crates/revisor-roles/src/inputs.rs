//! Declared input views, one per role.
//!
//! A role never sees the whole revision state: it borrows exactly the
//! fields listed in its view, and the view is what gets serialized into the
//! prompt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::output::{Judgment, Rewrite, Suggestion, Verdict};
use crate::RoleOutput;

/// The five roles of the revision protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleKind {
    SemanticReviewer,
    ContextualReviewer,
    Suggester,
    Rewriter,
    Decider,
}

impl RoleKind {
    pub const ALL: [RoleKind; 5] = [
        RoleKind::SemanticReviewer,
        RoleKind::ContextualReviewer,
        RoleKind::Suggester,
        RoleKind::Rewriter,
        RoleKind::Decider,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::SemanticReviewer => "semantic_reviewer",
            RoleKind::ContextualReviewer => "contextual_reviewer",
            RoleKind::Suggester => "suggester",
            RoleKind::Rewriter => "rewriter",
            RoleKind::Decider => "decider",
        }
    }
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RoleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.to_lowercase().replace('-', "_");
        RoleKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("Unknown role: {}", s))
    }
}

/// Which answer the reviewers are currently scoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationTarget {
    #[default]
    Original,
    Revised,
}

/// Language of the customer's question, derived from the request locale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Portuguese,
    Spanish,
}

impl Language {
    /// `"pt"` maps to Portuguese; every other locale is treated as Spanish
    pub fn from_locale(locale: &str) -> Self {
        if locale.trim().eq_ignore_ascii_case("pt") {
            Language::Portuguese
        } else {
            Language::Spanish
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Portuguese => "portuguese",
            Language::Spanish => "spanish",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ties an input view to its role and the typed reply it expects
pub trait RoleInput: Serialize + Sync {
    type Output: RoleOutput;
    const KIND: RoleKind;
}

#[derive(Debug, Serialize)]
pub struct SemanticInput<'a> {
    pub question: &'a str,
    pub category: &'a str,
    pub intent: Option<&'a str>,
    pub language: Language,
    pub target: EvaluationTarget,
    pub answer: &'a str,
}

impl RoleInput for SemanticInput<'_> {
    type Output = Judgment;
    const KIND: RoleKind = RoleKind::SemanticReviewer;
}

#[derive(Debug, Serialize)]
pub struct ContextualInput<'a> {
    pub question: &'a str,
    pub category: &'a str,
    pub intent: Option<&'a str>,
    pub context: &'a Value,
    pub metadata: &'a Value,
    pub target: EvaluationTarget,
    pub answer: &'a str,
}

impl RoleInput for ContextualInput<'_> {
    type Output = Judgment;
    const KIND: RoleKind = RoleKind::ContextualReviewer;
}

#[derive(Debug, Serialize)]
pub struct SuggesterInput<'a> {
    pub question: &'a str,
    pub category: &'a str,
    pub context: &'a Value,
    pub metadata: &'a Value,
    pub answer: &'a str,
    pub semantic: &'a Judgment,
    pub contextual: &'a Judgment,
}

impl RoleInput for SuggesterInput<'_> {
    type Output = Suggestion;
    const KIND: RoleKind = RoleKind::Suggester;
}

#[derive(Debug, Serialize)]
pub struct RewriterInput<'a> {
    pub question: &'a str,
    pub category: &'a str,
    pub intent: Option<&'a str>,
    pub language: Language,
    pub context: &'a Value,
    pub metadata: &'a Value,
    pub answer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decider_feedback: Option<&'a str>,
}

impl RoleInput for RewriterInput<'_> {
    type Output = Rewrite;
    const KIND: RoleKind = RoleKind::Rewriter;
}

/// An answer together with both of its reviews
#[derive(Debug, Serialize)]
pub struct ScoredAnswer<'a> {
    pub answer: &'a str,
    pub semantic: &'a Judgment,
    pub contextual: &'a Judgment,
    pub aggregate: u8,
}

#[derive(Debug, Serialize)]
pub struct DeciderInput<'a> {
    pub question: &'a str,
    pub context: &'a Value,
    pub metadata: &'a Value,
    pub original_answer: &'a str,
    pub previous: ScoredAnswer<'a>,
    pub revised: ScoredAnswer<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<&'a str>,
    pub revision_count: u32,
    pub revision_cap: u32,
}

impl RoleInput for DeciderInput<'_> {
    type Output = Verdict;
    const KIND: RoleKind = RoleKind::Decider;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_locale() {
        assert_eq!(Language::from_locale("pt"), Language::Portuguese);
        assert_eq!(Language::from_locale(" PT "), Language::Portuguese);
        assert_eq!(Language::from_locale("es"), Language::Spanish);
        assert_eq!(Language::from_locale("pt-BR"), Language::Spanish);
        assert_eq!(Language::from_locale(""), Language::Spanish);
    }

    #[test]
    fn test_role_kind_round_trips_through_str() {
        for kind in RoleKind::ALL {
            assert_eq!(kind.as_str().parse::<RoleKind>().unwrap(), kind);
        }
        assert_eq!(
            "Semantic-Reviewer".parse::<RoleKind>().unwrap(),
            RoleKind::SemanticReviewer
        );
        assert!("editor".parse::<RoleKind>().is_err());
    }

    #[test]
    fn test_rewriter_input_omits_absent_feedback() {
        let context = serde_json::json!({"product": "X"});
        let metadata = Value::Null;
        let input = RewriterInput {
            question: "q",
            category: "c",
            intent: None,
            language: Language::Spanish,
            context: &context,
            metadata: &metadata,
            answer: "a",
            suggestions: Some("be specific"),
            decider_feedback: None,
        };
        let json = serde_json::to_value(&input).unwrap();
        assert_eq!(json["suggestions"], "be specific");
        assert!(json.get("decider_feedback").is_none());
        assert_eq!(json["language"], "spanish");
    }
}
