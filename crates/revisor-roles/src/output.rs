use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Highest score a reviewer may give for one dimension
pub const MAX_DIMENSION_SCORE: u8 = 5;

/// Highest aggregate (semantic + contextual) score
pub const MAX_AGGREGATE_SCORE: u8 = MAX_DIMENSION_SCORE * 2;

const OPEN_TAG: &str = "<output>";
const CLOSE_TAG: &str = "</output>";

/// Literal some models still emit instead of the tagged cannot-rewrite status
const CANNOT_REWRITE_LITERAL: &str = "CANNOT REWRITE";

/// Reason recorded when the rewriter declines without giving one
pub const DEFAULT_DECLINE_REASON: &str = "Rewriter returned CANNOT REWRITE";

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("No <output> block found in role reply")]
    NoOutputBlock,

    #[error("Malformed output block: {0}")]
    MalformedBlock(String),

    #[error("Failed to parse output JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Score {score} is outside 0..={max}")]
    ScoreOutOfRange { score: u8, max: u8 },

    #[error("Required field `{0}` is empty")]
    EmptyField(&'static str),
}

/// A typed reply a role must produce. `validate` runs after deserialization
/// and may normalize the value.
pub trait RoleOutput: DeserializeOwned + Send + Sized {
    fn validate(self) -> Result<Self, OutputError>;
}

/// Score plus short justification from a reviewer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Judgment {
    pub score: u8,
    pub justification: String,
}

impl RoleOutput for Judgment {
    fn validate(self) -> Result<Self, OutputError> {
        if self.score > MAX_DIMENSION_SCORE {
            return Err(OutputError::ScoreOutOfRange {
                score: self.score,
                max: MAX_DIMENSION_SCORE,
            });
        }
        if self.justification.trim().is_empty() {
            return Err(OutputError::EmptyField("justification"));
        }
        Ok(Self {
            score: self.score,
            justification: self.justification.trim().to_string(),
        })
    }
}

/// Improvement suggestions for the rewriter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggestions: String,
}

impl RoleOutput for Suggestion {
    fn validate(self) -> Result<Self, OutputError> {
        let suggestions = self.suggestions.trim();
        if suggestions.is_empty() {
            return Err(OutputError::EmptyField("suggestions"));
        }
        Ok(Self {
            suggestions: suggestions.to_string(),
        })
    }
}

/// Rewriter reply: a new candidate, or a refusal when the context is insufficient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Rewrite {
    Revised {
        revised_answer: String,
    },
    CannotRewrite {
        #[serde(default)]
        reason: String,
    },
}

impl RoleOutput for Rewrite {
    fn validate(self) -> Result<Self, OutputError> {
        match self {
            Rewrite::Revised { revised_answer } => {
                let answer = collapse_repeats(&revised_answer);
                if answer.is_empty() {
                    return Err(OutputError::EmptyField("revised_answer"));
                }
                if answer == CANNOT_REWRITE_LITERAL {
                    return Ok(Rewrite::CannotRewrite {
                        reason: DEFAULT_DECLINE_REASON.to_string(),
                    });
                }
                Ok(Rewrite::Revised {
                    revised_answer: answer,
                })
            }
            Rewrite::CannotRewrite { reason } => {
                let reason = match reason.trim() {
                    "" => DEFAULT_DECLINE_REASON,
                    reason => reason,
                };
                Ok(Rewrite::CannotRewrite {
                    reason: reason.to_string(),
                })
            }
        }
    }
}

/// The decider's possible verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    AnswerOriginal,
    AnswerRevised,
    Rewrite,
    DoNotAnswer,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::AnswerOriginal => "ANSWER_ORIGINAL",
            Decision::AnswerRevised => "ANSWER_REVISED",
            Decision::Rewrite => "REWRITE",
            Decision::DoNotAnswer => "DO_NOT_ANSWER",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision plus justification from the decider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub decision: Decision,
    pub justification: String,
}

impl RoleOutput for Verdict {
    fn validate(self) -> Result<Self, OutputError> {
        if self.justification.trim().is_empty() {
            return Err(OutputError::EmptyField("justification"));
        }
        Ok(Self {
            decision: self.decision,
            justification: self.justification.trim().to_string(),
        })
    }
}

/// Parse and validate the last `<output>` block of a role reply.
///
/// Expected format at the end of the reply:
/// ```text
/// <output>
/// {"score": 4, "justification": "..."}
/// </output>
/// ```
pub fn parse_output<T: RoleOutput>(reply: &str) -> Result<T, OutputError> {
    debug!(reply_len = reply.len(), "Parsing role output");

    let start = reply.rfind(OPEN_TAG);
    let end = reply.rfind(CLOSE_TAG);

    let body = match (start, end) {
        (Some(start), Some(end)) if start < end => &reply[start + OPEN_TAG.len()..end],
        (Some(_), Some(_)) => {
            return Err(OutputError::MalformedBlock(
                "closing tag precedes opening tag".to_string(),
            ))
        }
        (Some(_), None) => {
            return Err(OutputError::MalformedBlock(
                "missing closing </output> tag".to_string(),
            ))
        }
        _ => return Err(OutputError::NoOutputBlock),
    };

    let json = strip_code_fence(body.trim());
    debug!(json, "Found output block");
    let value: T = serde_json::from_str(json)?;
    value.validate()
}

fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    // Drop an optional language tag on the opening fence line
    let rest = rest.split_once('\n').map(|(_, r)| r).unwrap_or("");
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Collapse adjacent repeated lines and paragraphs, e.g. a signature the
/// model copied twice. Leading and trailing blank lines are dropped.
pub fn collapse_repeats(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    let mut paragraphs: Vec<String> = Vec::new();

    for block in normalized.split("\n\n") {
        let mut lines: Vec<&str> = Vec::new();
        for line in block.lines() {
            if line.trim().is_empty() {
                continue;
            }
            if lines.last().is_some_and(|prev| prev.trim() == line.trim()) {
                continue;
            }
            lines.push(line.trim_end());
        }
        if lines.is_empty() {
            continue;
        }

        let paragraph = lines.join("\n");
        if paragraphs.last().is_some_and(|prev| prev.trim() == paragraph.trim()) {
            continue;
        }
        paragraphs.push(paragraph);
    }

    paragraphs.join("\n\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_judgment() {
        let reply = r#"
The answer addresses the question directly.

<output>
{"score": 4, "justification": "Clear and grammatical."}
</output>
"#;
        let judgment: Judgment = parse_output(reply).unwrap();
        assert_eq!(judgment.score, 4);
        assert_eq!(judgment.justification, "Clear and grammatical.");
    }

    #[test]
    fn test_parse_uses_last_block() {
        let reply = r#"Format example: <output>{"score": 0, "justification": "x"}</output>
Actual:
<output>{"score": 5, "justification": "Complete."}</output>"#;
        let judgment: Judgment = parse_output(reply).unwrap();
        assert_eq!(judgment.score, 5);
    }

    #[test]
    fn test_parse_fenced_json() {
        let reply = "<output>\n```json\n{\"suggestions\": \"Mention the warranty.\"}\n```\n</output>";
        let suggestion: Suggestion = parse_output(reply).unwrap();
        assert_eq!(suggestion.suggestions, "Mention the warranty.");
    }

    #[test]
    fn test_score_out_of_range() {
        let reply = r#"<output>{"score": 9, "justification": "Great"}</output>"#;
        let result: Result<Judgment, _> = parse_output(reply);
        assert!(matches!(
            result,
            Err(OutputError::ScoreOutOfRange { score: 9, max: 5 })
        ));
    }

    #[test]
    fn test_negative_or_fractional_score_is_json_error() {
        for reply in [
            r#"<output>{"score": -1, "justification": "x"}</output>"#,
            r#"<output>{"score": 3.5, "justification": "x"}</output>"#,
        ] {
            let result: Result<Judgment, _> = parse_output(reply);
            assert!(matches!(result, Err(OutputError::Json(_))));
        }
    }

    #[test]
    fn test_missing_block() {
        let result: Result<Judgment, _> = parse_output("Score: 4/5");
        assert!(matches!(result, Err(OutputError::NoOutputBlock)));
    }

    #[test]
    fn test_unclosed_block() {
        let result: Result<Judgment, _> = parse_output("<output>{\"score\": 4");
        assert!(matches!(result, Err(OutputError::MalformedBlock(_))));
    }

    #[test]
    fn test_empty_justification_rejected() {
        let reply = r#"<output>{"score": 3, "justification": "   "}</output>"#;
        let result: Result<Judgment, _> = parse_output(reply);
        assert!(matches!(result, Err(OutputError::EmptyField("justification"))));
    }

    #[test]
    fn test_parse_rewrite_variants() {
        let revised: Rewrite = parse_output(
            r#"<output>{"status": "revised", "revised_answer": "Olá! Sim, é à prova d'água."}</output>"#,
        )
        .unwrap();
        assert_eq!(
            revised,
            Rewrite::Revised {
                revised_answer: "Olá! Sim, é à prova d'água.".into()
            }
        );

        let refused: Rewrite =
            parse_output(r#"<output>{"status": "cannot_rewrite"}</output>"#).unwrap();
        assert!(matches!(refused, Rewrite::CannotRewrite { .. }));
    }

    #[test]
    fn test_cannot_rewrite_literal_is_normalized() {
        let reply = r#"<output>{"status": "revised", "revised_answer": "CANNOT REWRITE"}</output>"#;
        let rewrite: Rewrite = parse_output(reply).unwrap();
        assert_eq!(
            rewrite,
            Rewrite::CannotRewrite {
                reason: DEFAULT_DECLINE_REASON.into()
            }
        );
    }

    #[test]
    fn test_cannot_rewrite_without_reason_gets_default() {
        let rewrite: Rewrite =
            parse_output(r#"<output>{"status": "cannot_rewrite", "reason": "  "}</output>"#).unwrap();
        assert_eq!(
            rewrite,
            Rewrite::CannotRewrite {
                reason: DEFAULT_DECLINE_REASON.into()
            }
        );

        let rewrite: Rewrite = parse_output(
            r#"<output>{"status": "cannot_rewrite", "reason": "No stock data."}</output>"#,
        )
        .unwrap();
        assert_eq!(
            rewrite,
            Rewrite::CannotRewrite {
                reason: "No stock data.".into()
            }
        );
    }

    #[test]
    fn test_parse_verdict() {
        let reply = r#"<output>{"decision": "ANSWER_REVISED", "justification": "Grounded in context."}</output>"#;
        let verdict: Verdict = parse_output(reply).unwrap();
        assert_eq!(verdict.decision, Decision::AnswerRevised);

        let bad = r#"<output>{"decision": "MAYBE", "justification": "?"}</output>"#;
        assert!(matches!(
            parse_output::<Verdict>(bad),
            Err(OutputError::Json(_))
        ));
    }

    #[test]
    fn test_collapse_repeats() {
        let text = "Hola!\n\nSí, es impermeable.\n\nSaludos, Tienda X\nSaludos, Tienda X\n\n\n";
        assert_eq!(
            collapse_repeats(text),
            "Hola!\n\nSí, es impermeable.\n\nSaludos, Tienda X"
        );

        let repeated_paragraph = "Olá!\n\nObrigado.\n\nObrigado.";
        assert_eq!(collapse_repeats(repeated_paragraph), "Olá!\n\nObrigado.");
    }
}
