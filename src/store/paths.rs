use std::path::{Path, PathBuf};

use crate::schemas::ids::{CandidateId, DocumentId, Page};

/// Layout of the scan working tree under the output directory:
///
/// ```text
/// <output>/analysis/*.json                 page records from the analyzer
/// <output>/.scan/data/<stem>.scandata      per-document JSON records
/// <output>/.scan/data/<stem>-<page>.webp   stored page images
/// <output>/.scan/verified.txt              human-confirmed picture paths
/// <output>/.scan/skipped.txt               discarded picture paths
/// <output>/.scan/ingested.txt              fingerprints of imported records
/// <output>/.scan/manual_infos.jsonl        operator-entered identities
/// <output>/answer_key.json                 final emitted key
/// ```
///
/// Confirmed documents use their numeric id as stem; candidate pages use
/// a `tmp` prefix so both kinds coexist in the same directory.
#[derive(Debug, Clone)]
pub(crate) struct ScanPaths {
    output_dir: PathBuf,
}

impl ScanPaths {
    pub(crate) fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub(crate) fn make_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.data_dir())
    }

    pub(crate) fn scan_dir(&self) -> PathBuf {
        self.output_dir.join(".scan")
    }

    pub(crate) fn data_dir(&self) -> PathBuf {
        self.scan_dir().join("data")
    }

    pub(crate) fn scandata(&self, stem: &str) -> PathBuf {
        self.data_dir().join(format!("{stem}.scandata"))
    }

    pub(crate) fn page_image(&self, stem: &str, page: Page) -> PathBuf {
        self.data_dir().join(format!("{stem}-{page}.webp"))
    }

    pub(crate) fn verified_file(&self) -> PathBuf {
        self.scan_dir().join("verified.txt")
    }

    pub(crate) fn skipped_file(&self) -> PathBuf {
        self.scan_dir().join("skipped.txt")
    }

    pub(crate) fn ingested_file(&self) -> PathBuf {
        self.scan_dir().join("ingested.txt")
    }

    /// Drop directory for the image-analysis collaborator's page records.
    pub(crate) fn analysis_dir(&self) -> PathBuf {
        self.output_dir.join("analysis")
    }

    pub(crate) fn manual_infos_file(&self) -> PathBuf {
        self.scan_dir().join("manual_infos.jsonl")
    }

    pub(crate) fn answer_key_file(&self) -> PathBuf {
        self.output_dir.join("answer_key.json")
    }
}

pub(crate) fn doc_stem(doc_id: DocumentId) -> String {
    doc_id.to_string()
}

pub(crate) fn candidate_stem(id: CandidateId) -> String {
    format!("tmp{id}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StemKind {
    Document(DocumentId),
    Candidate(CandidateId),
}

/// Classifies a scandata file stem; `None` for foreign files.
pub(crate) fn parse_stem(stem: &str) -> Option<StemKind> {
    if let Some(suffix) = stem.strip_prefix("tmp") {
        return suffix.parse().ok().map(|n| StemKind::Candidate(CandidateId(n)));
    }
    stem.parse().ok().map(|n| StemKind::Document(DocumentId(n)))
}

/// File stem of a scandata path, when it has the `.scandata` extension.
pub(crate) fn scandata_stem(path: &Path) -> Option<&str> {
    if path.extension().and_then(|ext| ext.to_str()) != Some("scandata") {
        return None;
    }
    path.file_stem().and_then(|stem| stem.to_str())
}
