use crate::research::SourceDoc;
use agent::Result;
use agent::text::truncate_chars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const PREVIEW_CHARS: usize = 500;
const MAX_FILENAME_CHARS: usize = 120;
const MAX_FILENAME_BYTES: usize = 200;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub index: usize,
    pub title: String,
    pub url: String,
}

/// One line of the run log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: String,
    pub query: String,
    pub model: String,
    pub sources: Vec<SourceRef>,
    pub report_preview: String,
}

impl RunRecord {
    pub fn new(
        at: DateTime<Utc>,
        query: &str,
        model: &str,
        docs: &[SourceDoc],
        report: &str,
    ) -> Self {
        Self {
            timestamp: timestamp(at),
            query: query.to_string(),
            model: model.to_string(),
            sources: docs
                .iter()
                .filter(|doc| doc.summary_bullets().is_some())
                .map(|doc| SourceRef {
                    index: doc.index(),
                    title: doc.title().to_string(),
                    url: doc.url().to_string(),
                })
                .collect(),
            report_preview: truncate_chars(report, PREVIEW_CHARS).to_string(),
        }
    }
}

/// ISO-8601 UTC with second precision, e.g. `2026-10-15T09:30:00Z`.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// Keeps alphanumerics, space, `_`, `-` and `.`, turns spaces into `_` and caps the length.
///
/// The cap is both in chars and in bytes so multibyte names stay under filesystem limits.
pub fn safe_filename(text: &str) -> String {
    let cleaned = text
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.'))
        .collect::<String>()
        .trim_end()
        .replace(' ', "_");

    let mut name = String::new();
    for c in cleaned.chars().take(MAX_FILENAME_CHARS) {
        if name.len() + c.len_utf8() > MAX_FILENAME_BYTES {
            break;
        }
        name.push(c);
    }
    name
}

pub struct Persister {
    out_dir: PathBuf,
    memory_file: String,
}

impl Persister {
    pub fn new(out_dir: &Path, memory_file: &str) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
            memory_file: memory_file.to_string(),
        }
    }

    pub fn memory_path(&self) -> PathBuf {
        self.out_dir.join(&self.memory_file)
    }

    fn report_stem(&self, record: &RunRecord) -> String {
        safe_filename(&format!("{}_{}", record.timestamp, record.query))
    }

    /// Creates a report file that did not exist before, adding `_2`, `_3`, ... on collision.
    fn create_report(&self, stem: &str) -> Result<(PathBuf, File)> {
        let mut attempt = 1;
        loop {
            let name = match attempt {
                1 => format!("{}.md", stem),
                n => format!("{}_{}.md", stem, n),
            };
            let path = self.out_dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Writes the full report, then appends `record` to the run log.
    ///
    /// If the log cannot be appended the report is removed again.
    pub fn persist(&self, record: &RunRecord, report: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.out_dir)?;

        let line = serde_json::to_string(record)?;
        let (path, mut file) = self.create_report(&self.report_stem(record))?;
        if let Err(e) = file.write_all(report.as_bytes()) {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }

        if let Err(e) = self.append_log(&line) {
            tracing::warn!(path = %path.display(), "run log not updated, removing report");
            let _ = fs::remove_file(&path);
            return Err(e);
        }

        Ok(path)
    }

    fn append_log(&self, line: &str) -> Result<()> {
        let mut log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.memory_path())?;
        writeln!(log, "{}", line)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{Persister, RunRecord, safe_filename, timestamp};
    use crate::research::SourceDoc;
    use agent::Result;
    use chrono::{TimeZone, Utc};

    fn docs() -> Vec<SourceDoc> {
        vec![
            SourceDoc::new(1, "Qubits", "https://a.example/q", "")
                .with_text("text".to_string())
                .with_summary("- a".to_string()),
            SourceDoc::new(2, "Unsummarized", "https://b.example/", "")
                .with_text("text".to_string()),
        ]
    }

    #[test]
    fn test_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 10, 15, 9, 5, 7).unwrap();
        assert_eq!(timestamp(at), "2026-10-15T09:05:07Z");
    }

    #[test]
    fn test_safe_filename() {
        assert_eq!(
            safe_filename("2026-10-15T09:05:07Z_what is C++/Rust?  "),
            "2026-10-15T090507Z_what_is_CRust"
        );
        assert_eq!(safe_filename(&"x".repeat(300)).len(), 120);
        assert_eq!(safe_filename("a.b_c-d"), "a.b_c-d");
    }

    #[test]
    fn test_safe_filename_multibyte() {
        let name = safe_filename(&format!("2026-10-15T09:05:07Z_{}", "量子计算".repeat(25)));

        assert!(name.len() <= 200);
        assert!(name.starts_with("2026-10-15T090507Z_量子计算"));
        assert!(name.ends_with('算'));
    }

    #[test]
    fn test_record_lists_summarized_sources() {
        let at = Utc.with_ymd_and_hms(2026, 10, 15, 9, 5, 7).unwrap();
        let report = "é".repeat(600);
        let record = RunRecord::new(at, "quantum", "gpt-4o-mini", &docs(), &report);

        assert_eq!(record.sources.len(), 1);
        assert_eq!(record.sources[0].index, 1);
        assert_eq!(record.report_preview.chars().count(), 500);

        let json: serde_json::Value = serde_json::to_value(&record).unwrap();
        assert_eq!(json["timestamp"], "2026-10-15T09:05:07Z");
        assert_eq!(json["sources"][0]["url"], "https://a.example/q");
    }

    #[test]
    fn test_persist_appends() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let out_dir = dir.path().join("out");
        let persister = Persister::new(&out_dir, "memory.jsonl");

        let first = RunRecord::new(
            Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap(),
            "first question",
            "m",
            &docs(),
            "report one",
        );
        let path = persister.persist(&first, "report one")?;
        assert_eq!(path, out_dir.join("2026-10-15T090000Z_first_question.md"));
        assert_eq!(std::fs::read_to_string(&path)?, "report one");

        let before = std::fs::read_to_string(persister.memory_path())?;

        let second = RunRecord::new(
            Utc.with_ymd_and_hms(2026, 10, 15, 10, 0, 0).unwrap(),
            "second question",
            "m",
            &docs(),
            "report two",
        );
        persister.persist(&second, "report two")?;

        let after = std::fs::read_to_string(persister.memory_path())?;
        assert!(after.starts_with(&before));

        let lines = after.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert_eq!(serde_json::from_str::<RunRecord>(lines[0])?, first);
        assert_eq!(serde_json::from_str::<RunRecord>(lines[1])?, second);

        Ok(())
    }

    #[test]
    fn test_persist_long_multibyte_query() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persister = Persister::new(dir.path(), "memory.jsonl");

        let query = "量子计算".repeat(25);
        let record = RunRecord::new(
            Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap(),
            &query,
            "m",
            &docs(),
            "report",
        );
        let path = persister.persist(&record, "report")?;

        assert_eq!(std::fs::read_to_string(&path)?, "report");
        let log = std::fs::read_to_string(persister.memory_path())?;
        assert_eq!(log.lines().count(), 1);
        assert_eq!(serde_json::from_str::<RunRecord>(log.trim_end())?.query, query);
        Ok(())
    }

    #[test]
    fn test_persist_same_second_keeps_both_reports() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let persister = Persister::new(dir.path(), "memory.jsonl");
        let record = RunRecord::new(
            Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap(),
            "same question",
            "m",
            &docs(),
            "first",
        );

        let first = persister.persist(&record, "first")?;
        let second = persister.persist(&record, "second")?;

        assert_eq!(first, dir.path().join("2026-10-15T090000Z_same_question.md"));
        assert_eq!(second, dir.path().join("2026-10-15T090000Z_same_question_2.md"));
        assert_eq!(std::fs::read_to_string(&first)?, "first");
        assert_eq!(std::fs::read_to_string(&second)?, "second");
        Ok(())
    }

    #[test]
    fn test_persist_failure_leaves_no_report() -> Result<()> {
        let dir = tempfile::tempdir()?;
        // a directory where the run log should be makes the append fail
        std::fs::create_dir(dir.path().join("memory.jsonl"))?;
        let persister = Persister::new(dir.path(), "memory.jsonl");

        let record = RunRecord::new(
            Utc.with_ymd_and_hms(2026, 10, 15, 9, 0, 0).unwrap(),
            "question",
            "m",
            &docs(),
            "report",
        );
        assert!(persister.persist(&record, "report").is_err());

        let names = std::fs::read_dir(dir.path())?
            .map(|entry| entry.map(|e| e.file_name()))
            .collect::<std::io::Result<Vec<_>>>()?;
        assert_eq!(names, vec![std::ffi::OsString::from("memory.jsonl")]);
        Ok(())
    }
}
