use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder written for a request that ended without an answer
pub const NOT_ANSWERABLE: &str = "-";

/// One row of the results log, written for every completed revision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRecord {
    #[serde(rename = "Request Id")]
    pub request_id: String,
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "Question")]
    pub question: String,
    #[serde(rename = "Original Answer")]
    pub original_answer: String,
    #[serde(rename = "Original Score")]
    pub original_score: u8,
    /// Prior feedback the caller sent with the request
    #[serde(rename = "Original Feedback")]
    pub original_feedback: String,
    /// Reviewer justifications for the original answer
    #[serde(rename = "Original Justification")]
    pub original_justification: String,
    #[serde(rename = "Suggestions")]
    pub suggestions: String,
    #[serde(rename = "Revised Answer")]
    pub revised_answer: String,
    #[serde(rename = "Final Score")]
    pub final_score: Option<u8>,
    #[serde(rename = "Final Answer")]
    pub final_answer: String,
    #[serde(rename = "Decision")]
    pub decision: String,
    #[serde(rename = "Justification")]
    pub justification: String,
    #[serde(rename = "Number of Revisions")]
    pub revisions: u32,
    #[serde(rename = "Language")]
    pub language: String,
    #[serde(rename = "Intent")]
    pub intent: String,
    #[serde(rename = "Category")]
    pub category: String,
    /// Total tokens used; empty when the backend does not report usage
    #[serde(rename = "Token Usage")]
    pub token_usage: Option<u64>,
}

/// Append-only CSV log of revision results, shared by every request the
/// process serves.
pub struct ResultsLog {
    file: Mutex<File>,
    path: PathBuf,
}

impl ResultsLog {
    /// Open (or create) the log at `path` in append mode
    pub fn open(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    /// `<data dir>/revisor/results.csv`
    pub fn default_path() -> io::Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                "Could not determine data directory",
            )
        })?;
        Ok(data_dir.join("revisor").join("results.csv"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row. The header goes out only when the file is still empty;
    /// that check happens under the same lock as the write.
    pub fn append(&self, record: &AuditRecord) -> io::Result<()> {
        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("results log lock poisoned"))?;

        let empty = file.metadata()?.len() == 0;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(empty)
            .from_writer(&mut *file);
        writer.serialize(record)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn record(question: &str) -> AuditRecord {
        AuditRecord {
            request_id: "7f3c".into(),
            timestamp: Utc::now(),
            question: question.into(),
            original_answer: "Sim, é à prova d'água.".into(),
            original_score: 4,
            original_feedback: "Customer asked for the depth rating.".into(),
            original_justification: "Semantic (2): vague | Contextual (2): wrong depth".into(),
            suggestions: "Mention the 30m rating".into(),
            revised_answer: "Sim, até 30 metros.\nAtenciosamente".into(),
            final_score: Some(9),
            final_answer: "Sim, até 30 metros.\nAtenciosamente".into(),
            decision: "ANSWER_REVISED".into(),
            justification: "Grounded in context".into(),
            revisions: 1,
            language: "portuguese".into(),
            intent: "specification".into(),
            category: "watches".into(),
            token_usage: Some(2140),
        }
    }

    fn read_rows(path: &Path) -> (csv::StringRecord, Vec<AuditRecord>) {
        let mut reader = csv::Reader::from_path(path).unwrap();
        let headers = reader.headers().unwrap().clone();
        let rows = reader.deserialize().map(|r| r.unwrap()).collect();
        (headers, rows)
    }

    #[test]
    fn test_header_written_once_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");

        let log = ResultsLog::open(&path).unwrap();
        log.append(&record("first")).unwrap();
        drop(log);

        let log = ResultsLog::open(&path).unwrap();
        log.append(&record("second")).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Request Id").count(), 1);

        let (headers, rows) = read_rows(&path);
        assert_eq!(&headers[0], "Request Id");
        assert_eq!(&headers[2], "Question");
        assert_eq!(&headers[5], "Original Feedback");
        assert_eq!(&headers[6], "Original Justification");
        assert_eq!(&headers[16], "Category");
        assert_eq!(&headers[17], "Token Usage");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].original_feedback, "Customer asked for the depth rating.");
        assert_eq!(rows[0].token_usage, Some(2140));
        assert_eq!(rows[1].question, "second");
        assert_eq!(rows[0].revised_answer, "Sim, até 30 metros.\nAtenciosamente");
    }

    #[test]
    fn test_missing_final_score_is_empty_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.csv");
        let log = ResultsLog::open(&path).unwrap();

        let mut row = record("accepted");
        row.final_score = None;
        row.final_answer = NOT_ANSWERABLE.into();
        row.token_usage = None;
        log.append(&row).unwrap();

        let (_, rows) = read_rows(&path);
        assert_eq!(rows[0].final_score, None);
        assert_eq!(rows[0].final_answer, "-");
        assert_eq!(rows[0].token_usage, None);
    }

    #[test]
    fn test_concurrent_appends_keep_rows_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let log = Arc::new(ResultsLog::open(&path).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let log = log.clone();
                std::thread::spawn(move || {
                    for j in 0..10 {
                        log.append(&record(&format!("q{}-{}", i, j))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("Request Id").count(), 1);
        let (_, rows) = read_rows(&path);
        assert_eq!(rows.len(), 80);
    }
}
