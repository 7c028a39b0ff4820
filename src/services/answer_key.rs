use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::schemas::ids::{DocumentId, OriginalAnswerNumber, OriginalQuestionNumber, StudentId, StudentName};
use crate::services::review::DISCARD_MARKER;
use crate::store::DataStore;

/// Reconciled answers of every kept document, in canonical numbering.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AnswerKey {
    pub(crate) generated_at: String,
    pub(crate) documents: BTreeMap<DocumentId, AnswerKeyEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct AnswerKeyEntry {
    pub(crate) name: StudentName,
    pub(crate) student_id: StudentId,
    pub(crate) answers: BTreeMap<OriginalQuestionNumber, BTreeSet<OriginalAnswerNumber>>,
}

/// Writes the final answer key next to the scan directory and returns its
/// path. Discarded documents are left out.
pub(crate) fn emit(store: &DataStore) -> anyhow::Result<PathBuf> {
    let mut documents = BTreeMap::new();
    for (doc_id, doc) in store.documents() {
        if doc.name.as_str() == DISCARD_MARKER {
            continue;
        }
        documents.insert(
            *doc_id,
            AnswerKeyEntry {
                name: doc.name.clone(),
                student_id: doc.student_id.clone(),
                answers: doc.answered(),
            },
        );
    }

    let generated_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("formatting generation timestamp")?;
    let key = AnswerKey { generated_at, documents };

    let path = store.paths().answer_key_file();
    let raw = serde_json::to_string_pretty(&key).context("serializing answer key")?;
    std::fs::write(&path, raw)
        .with_context(|| format!("writing answer key {}", path.display()))?;

    tracing::info!(path = %path.display(), documents = key.documents.len(), "answer key written");
    Ok(path)
}
