use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

use crate::errors::ReconcileError;
use crate::schemas::document::{CandidatePage, DocumentData, PicData};
use crate::schemas::ids::{CandidateId, DocumentId, Page, StudentId, StudentName};
use crate::schemas::ordering::{ExamConfig, Ordering};

pub(crate) mod paths;

use paths::{candidate_stem, doc_stem, parse_stem, scandata_stem, ScanPaths, StemKind};

/// Outcome of ingesting one analyzed page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PageRegistration {
    /// The page landed in a free (document, page) slot.
    Stored,
    /// The slot was occupied; the page was parked as a candidate.
    Conflict(CandidateId),
    /// The picture was discarded in an earlier session.
    SkippedEarlier,
}

/// One line of the manual-infos journal. The journal is append-only; on
/// reload the last record per document wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ManualInfoRecord {
    doc_id: DocumentId,
    name: StudentName,
    student_id: StudentId,
    #[serde(with = "time::serde::rfc3339")]
    recorded_at: OffsetDateTime,
}

/// In-memory scan state plus its on-disk persistence.
///
/// Every confirmed mutation is written through immediately, so a crash
/// loses at most the answer to the current prompt and a rerun converges
/// instead of re-asking resolved questions.
pub(crate) struct DataStore {
    config: ExamConfig,
    paths: ScanPaths,
    documents: BTreeMap<DocumentId, DocumentData>,
    candidates: BTreeMap<CandidateId, CandidatePage>,
    manual_infos: BTreeMap<DocumentId, (StudentName, StudentId)>,
    verified: BTreeSet<PathBuf>,
    skipped: BTreeSet<PathBuf>,
    ingested: BTreeSet<String>,
    next_candidate: u32,
}

impl DataStore {
    pub(crate) fn open(config: ExamConfig, output_dir: PathBuf) -> anyhow::Result<Self> {
        let paths = ScanPaths::new(output_dir);
        paths.make_dirs().context("creating scan directories")?;
        Ok(Self {
            config,
            paths,
            documents: BTreeMap::new(),
            candidates: BTreeMap::new(),
            manual_infos: BTreeMap::new(),
            verified: BTreeSet::new(),
            skipped: BTreeSet::new(),
            ingested: BTreeSet::new(),
            next_candidate: 1,
        })
    }

    pub(crate) fn config(&self) -> &ExamConfig {
        &self.config
    }

    pub(crate) fn paths(&self) -> &ScanPaths {
        &self.paths
    }

    pub(crate) fn ordering(&self, doc_id: DocumentId) -> Result<&Ordering, ReconcileError> {
        self.config.ordering(doc_id)
    }

    pub(crate) fn documents(&self) -> &BTreeMap<DocumentId, DocumentData> {
        &self.documents
    }

    pub(crate) fn document(&self, doc_id: DocumentId) -> Option<&DocumentData> {
        self.documents.get(&doc_id)
    }

    pub(crate) fn document_mut(&mut self, doc_id: DocumentId) -> Option<&mut DocumentData> {
        self.documents.get_mut(&doc_id)
    }

    pub(crate) fn page(&self, doc_id: DocumentId, page: Page) -> Option<&PicData> {
        self.documents.get(&doc_id).and_then(|doc| doc.pages.get(&page))
    }

    pub(crate) fn page_mut(&mut self, doc_id: DocumentId, page: Page) -> Option<&mut PicData> {
        self.documents.get_mut(&doc_id).and_then(|doc| doc.pages.get_mut(&page))
    }

    pub(crate) fn candidates(&self) -> &BTreeMap<CandidateId, CandidatePage> {
        &self.candidates
    }

    pub(crate) fn manual_infos(&self) -> &BTreeMap<DocumentId, (StudentName, StudentId)> {
        &self.manual_infos
    }

    pub(crate) fn is_verified(&self, pic_path: &str) -> bool {
        self.verified.contains(Path::new(pic_path))
    }

    pub(crate) fn is_skipped(&self, pic_path: &str) -> bool {
        self.skipped.contains(Path::new(pic_path))
    }

    pub(crate) fn is_ingested(&self, digest: &str) -> bool {
        self.ingested.contains(digest)
    }

    /// Rebuilds the in-memory state from the scan directory. Safe to call
    /// on a fresh directory; everything simply stays empty.
    pub(crate) fn reload(&mut self) -> anyhow::Result<()> {
        self.documents.clear();
        self.candidates.clear();
        self.manual_infos.clear();
        self.verified.clear();
        self.skipped.clear();
        self.ingested.clear();
        self.next_candidate = 1;

        let data_dir = self.paths.data_dir();
        for entry in std::fs::read_dir(&data_dir)
            .with_context(|| format!("reading scan data directory {}", data_dir.display()))?
        {
            let path = entry?.path();
            let Some(stem) = scandata_stem(&path) else { continue };
            match parse_stem(stem) {
                Some(StemKind::Document(doc_id)) => {
                    let doc = read_json::<DocumentData>(&path)?;
                    self.documents.insert(doc_id, doc);
                }
                Some(StemKind::Candidate(id)) => {
                    let candidate = read_json::<CandidatePage>(&path)?;
                    self.next_candidate = self.next_candidate.max(id.0 + 1);
                    self.candidates.insert(id, candidate);
                }
                None => {
                    tracing::warn!(path = %path.display(), "ignoring unrecognized scandata file");
                }
            }
        }

        self.verified = read_path_set(&self.paths.verified_file())?;
        self.skipped = read_path_set(&self.paths.skipped_file())?;
        self.ingested = read_line_set(&self.paths.ingested_file())?;

        let journal = self.paths.manual_infos_file();
        if journal.exists() {
            let raw = std::fs::read_to_string(&journal)
                .with_context(|| format!("reading manual infos {}", journal.display()))?;
            for line in raw.lines().filter(|line| !line.trim().is_empty()) {
                let record: ManualInfoRecord =
                    serde_json::from_str(line).context("parsing manual infos record")?;
                self.manual_infos.insert(record.doc_id, (record.name, record.student_id));
            }
        }

        Ok(())
    }

    /// Ingests one analyzed page. An occupied slot parks the new version
    /// as a candidate instead of overwriting silently.
    pub(crate) fn register_page(&mut self, pic: PicData) -> anyhow::Result<PageRegistration> {
        if self.is_skipped(&pic.pic_path) {
            tracing::debug!(path = %pic.pic_path, "picture was discarded earlier; ignoring");
            return Ok(PageRegistration::SkippedEarlier);
        }

        let doc_id = pic.doc_id;
        let page = pic.page;
        let occupied =
            self.documents.get(&doc_id).is_some_and(|doc| doc.pages.contains_key(&page));

        if occupied {
            let id = CandidateId(self.next_candidate);
            self.next_candidate += 1;
            let candidate = CandidatePage { conflicts_with: doc_id, page, pic };
            write_json(&self.paths.scandata(&candidate_stem(id)), &candidate)?;
            self.candidates.insert(id, candidate);
            return Ok(PageRegistration::Conflict(id));
        }

        let doc = self.documents.entry(doc_id).or_default();
        if doc.name.is_empty() {
            doc.name = pic.student_name.clone();
        }
        if doc.student_id.is_empty() {
            doc.student_id = pic.student_id.clone();
        }
        doc.pages.insert(page, pic);
        self.write_scandata_file(doc_id)?;
        Ok(PageRegistration::Stored)
    }

    /// Rewrites the persistent record of one document. Must be called
    /// whenever a PicData is replaced wholesale, not only mutated.
    pub(crate) fn write_scandata_file(&self, doc_id: DocumentId) -> anyhow::Result<()> {
        let doc = self
            .documents
            .get(&doc_id)
            .with_context(|| format!("document #{doc_id} is not stored"))?;
        write_json(&self.paths.scandata(&doc_stem(doc_id)), doc)
    }

    /// Drops a candidate and its backing files.
    pub(crate) fn remove_candidate(&mut self, id: CandidateId) -> anyhow::Result<()> {
        if self.candidates.remove(&id).is_none() {
            return Ok(());
        }
        let stem = candidate_stem(id);
        remove_if_exists(&self.paths.scandata(&stem))?;
        for page in candidate_pages(&self.paths, &stem)? {
            remove_if_exists(&page)?;
        }
        Ok(())
    }

    /// Replaces the stored version of the conflicting slot with the
    /// candidate's, keeping every other page of the document untouched.
    pub(crate) fn promote_candidate(&mut self, id: CandidateId) -> anyhow::Result<()> {
        let candidate = self
            .candidates
            .remove(&id)
            .with_context(|| format!("candidate #{id} is not stored"))?;
        let doc_id = candidate.conflicts_with;
        let page = candidate.page;

        let doc = self.documents.entry(doc_id).or_default();
        doc.pages.insert(page, candidate.pic);

        let candidate_image = self.paths.page_image(&candidate_stem(id), page);
        if candidate_image.exists() {
            let target = self.paths.page_image(&doc_stem(doc_id), page);
            std::fs::rename(&candidate_image, &target).with_context(|| {
                format!("replacing page image {}", target.display())
            })?;
        }
        remove_if_exists(&self.paths.scandata(&candidate_stem(id)))?;

        // The candidate record only covered one page, so the document's
        // own scandata file must be rewritten, not replaced.
        self.write_scandata_file(doc_id)
    }

    /// Removes a document and every file that backs it.
    pub(crate) fn remove_document(
        &mut self,
        doc_id: DocumentId,
    ) -> anyhow::Result<Option<DocumentData>> {
        let Some(doc) = self.documents.remove(&doc_id) else {
            return Ok(None);
        };
        let stem = doc_stem(doc_id);
        remove_if_exists(&self.paths.scandata(&stem))?;
        for page in doc.pages.keys() {
            remove_if_exists(&self.paths.page_image(&stem, *page))?;
        }
        Ok(Some(doc))
    }

    /// Commits an operator-confirmed identity: document fields, scandata
    /// record and the manual-infos journal, so reruns pre-fill it.
    pub(crate) fn set_identity(
        &mut self,
        doc_id: DocumentId,
        name: StudentName,
        student_id: StudentId,
    ) -> anyhow::Result<()> {
        let doc = self
            .documents
            .get_mut(&doc_id)
            .with_context(|| format!("document #{doc_id} is not stored"))?;
        doc.name = name.clone();
        doc.student_id = student_id.clone();
        self.write_scandata_file(doc_id)?;

        self.manual_infos.insert(doc_id, (name.clone(), student_id.clone()));
        let record = ManualInfoRecord {
            doc_id,
            name,
            student_id,
            recorded_at: OffsetDateTime::now_utc(),
        };
        let line = serde_json::to_string(&record).context("serializing manual infos record")?;
        append_line(&self.paths.manual_infos_file(), &line)
    }

    /// In-memory identity update without a journal entry. Used for the
    /// discard marker, which must stay revocable until finalization.
    pub(crate) fn set_identity_unjournaled(
        &mut self,
        doc_id: DocumentId,
        name: StudentName,
        student_id: StudentId,
    ) {
        if let Some(doc) = self.documents.get_mut(&doc_id) {
            doc.name = name;
            doc.student_id = student_id;
        }
    }

    /// Marks a picture as human-confirmed. Append-only.
    pub(crate) fn store_verified_pic(&mut self, pic_path: &str) -> anyhow::Result<()> {
        if self.verified.insert(PathBuf::from(pic_path)) {
            append_line(&self.paths.verified_file(), pic_path)?;
        }
        Ok(())
    }

    /// Marks a picture as discarded so later scans ignore it. Append-only.
    pub(crate) fn store_skipped_pic(&mut self, pic_path: &str) -> anyhow::Result<()> {
        if self.skipped.insert(PathBuf::from(pic_path)) {
            append_line(&self.paths.skipped_file(), pic_path)?;
        }
        Ok(())
    }

    /// Records an imported analysis record's fingerprint so reruns do not
    /// ingest the same file twice. Append-only.
    pub(crate) fn store_ingested(&mut self, digest: &str) -> anyhow::Result<()> {
        if self.ingested.insert(digest.to_string()) {
            append_line(&self.paths.ingested_file(), digest)?;
        }
        Ok(())
    }
}

/// Content fingerprint used to key scanned input bundles, so re-importing
/// the same file lands in the same place.
pub(crate) fn fingerprint(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let raw = serde_json::to_string(value).context("serializing scandata")?;
    std::fs::write(path, raw).with_context(|| format!("writing {}", path.display()))
}

fn read_path_set(path: &Path) -> anyhow::Result<BTreeSet<PathBuf>> {
    Ok(read_line_set(path)?.into_iter().map(PathBuf::from).collect())
}

fn read_line_set(path: &Path) -> anyhow::Result<BTreeSet<String>> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(raw.lines().filter(|line| !line.trim().is_empty()).map(str::to_string).collect())
}

fn append_line(path: &Path, line: &str) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening {}", path.display()))?;
    writeln!(file, "{line}").with_context(|| format!("appending to {}", path.display()))
}

fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("removing {}", path.display())),
    }
}

fn candidate_pages(paths: &ScanPaths, stem: &str) -> anyhow::Result<Vec<PathBuf>> {
    let prefix = format!("{stem}-");
    let mut found = Vec::new();
    for entry in std::fs::read_dir(paths.data_dir())? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|name| name.to_str()) else { continue };
        if name.starts_with(&prefix) && name.ends_with(".webp") {
            found.push(path);
        }
    }
    Ok(found)
}
