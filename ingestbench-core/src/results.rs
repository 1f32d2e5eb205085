use std::io::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::evaluate::{BaselineRecord, Capacity};
use crate::scenario::ScenarioKind;
use crate::stats::StatisticsSnapshot;
use crate::{Error, Result};

/// Persisted outcome of a run, later read back as a baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<String>,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p999_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_ms: Option<f64>,
    pub error_rate: f64,
    pub total_requests: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_requests: Option<u64>,
    #[serde(alias = "rps_avg")]
    pub rps: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_assessment: Option<Capacity>,
}

impl ResultsDocument {
    /// Stress runs carry the extended field set.
    #[must_use]
    pub fn from_snapshot(kind: ScenarioKind, s: &StatisticsSnapshot) -> Self {
        let stress = kind.is_stress();
        Self {
            test_type: stress.then(|| kind.to_string()),
            p50_ms: s.p50_ms,
            p95_ms: s.p95_ms,
            p99_ms: s.p99_ms,
            p999_ms: stress.then_some(s.p999_ms),
            max_ms: stress.then_some(s.max_ms),
            error_rate: s.error_rate,
            total_requests: s.total_requests,
            failed_requests: stress.then_some(s.failed_requests),
            rps: s.rps,
            capacity_assessment: stress.then(|| Capacity::classify(s.error_rate)),
        }
    }

    /// Writes pretty JSON through a temp file in the target directory, then
    /// renames it over `path`; readers never see a partial document.
    pub fn write_atomic(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            Some(_) => Path::new("."),
            None => return Err(Error::InvalidOutputPath(path.display().to_string())),
        };
        if path.file_name().is_none() {
            return Err(Error::InvalidOutputPath(path.display().to_string()));
        }
        std::fs::create_dir_all(dir)?;

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, self).map_err(Error::ResultsEncode)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}

/// Reads only the fields a comparison needs; other keys are ignored so any
/// results document (load or stress) works as a baseline.
pub fn read_baseline(path: &Path) -> Result<BaselineRecord> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|source| Error::ResultsParse {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn snapshot() -> StatisticsSnapshot {
        StatisticsSnapshot {
            total_requests: 200,
            failed_requests: 6,
            error_rate: 0.03,
            p50_ms: 12.0,
            p95_ms: 40.5,
            p99_ms: 80.25,
            p999_ms: 120.0,
            max_ms: 130.0,
            rps: 20.0,
            ..StatisticsSnapshot::default()
        }
    }

    #[test]
    fn load_document_has_the_core_fields_only() {
        let doc = ResultsDocument::from_snapshot(ScenarioKind::Load, &snapshot());
        let v = serde_json::to_value(&doc).unwrap();
        let mut keys: Vec<&str> = v.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["error_rate", "p50_ms", "p95_ms", "p99_ms", "rps", "total_requests"]
        );
    }

    #[test]
    fn stress_document_adds_extended_fields() {
        let doc = ResultsDocument::from_snapshot(ScenarioKind::Stress, &snapshot());
        let v = serde_json::to_value(&doc).unwrap();
        assert_eq!(v["test_type"], "stress");
        assert_eq!(v["p999_ms"], 120.0);
        assert_eq!(v["max_ms"], 130.0);
        assert_eq!(v["failed_requests"], 6);
        assert_eq!(v["capacity_assessment"], "at-capacity");
    }

    #[test]
    fn write_then_read_as_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports").join("latest.json");

        let doc = ResultsDocument::from_snapshot(ScenarioKind::Stress, &snapshot());
        doc.write_atomic(&path).unwrap();
        // Overwrite in place.
        doc.write_atomic(&path).unwrap();

        let back: ResultsDocument =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(back, doc);

        let baseline = read_baseline(&path).unwrap();
        assert_eq!(
            baseline,
            BaselineRecord {
                p95_ms: 40.5,
                p99_ms: 80.25,
                error_rate: 0.03,
            }
        );
    }

    #[test]
    fn baseline_accepts_foreign_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("baseline.json");
        std::fs::write(
            &path,
            r#"{"p50_ms": 10, "p95_ms": 100, "p99_ms": 200, "error_rate": 0.0, "rps_avg": 3.5, "note": "x"}"#,
        )
        .unwrap();

        let b = read_baseline(&path).unwrap();
        assert_eq!(b.p95_ms, 100.0);
        assert_eq!(b.p99_ms, 200.0);

        let doc = serde_json::from_slice::<ResultsDocument>(&std::fs::read(&path).unwrap());
        assert!(doc.is_err(), "total_requests is required in a results document");
    }

    #[test]
    fn missing_fields_are_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, r#"{"p95_ms": 100}"#).unwrap();
        assert!(matches!(read_baseline(&path), Err(Error::ResultsParse { .. })));
    }
}
