use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

use crate::schemas::document::{DetectionStatus, PicData};
use crate::schemas::ids::{DocumentId, Page, StudentId, StudentName};
use crate::schemas::ordering::parse_checkbox_tag;
use crate::store::{fingerprint, DataStore, PageRegistration};

/// One page record as dropped by the image-analysis collaborator.
/// Detections are keyed by the layout checkbox tag (`Q<q>-<a>`, canonical
/// numbering) so the record stays readable next to the layout table.
#[derive(Debug, Deserialize)]
struct PageAnalysis {
    doc_id: DocumentId,
    page: Page,
    pic_path: String,
    #[serde(default)]
    student_name: StudentName,
    #[serde(default)]
    student_id: StudentId,
    detections: BTreeMap<String, DetectionRecord>,
    cell_size: u32,
}

#[derive(Debug, Deserialize)]
struct DetectionRecord {
    status: DetectionStatus,
    #[serde(default)]
    position: (u32, u32),
}

impl PageAnalysis {
    fn into_pic_data(self) -> anyhow::Result<PicData> {
        let mut pic = PicData {
            doc_id: self.doc_id,
            page: self.page,
            pic_path: self.pic_path,
            student_name: self.student_name,
            student_id: self.student_id,
            detection_status: BTreeMap::new(),
            revision_status: BTreeMap::new(),
            positions: BTreeMap::new(),
            cell_size: self.cell_size,
            answered: BTreeMap::new(),
        };
        for (tag, record) in self.detections {
            let checkbox = parse_checkbox_tag(&tag)
                .with_context(|| format!("unrecognized checkbox tag {tag:?}"))?;
            pic.detection_status.insert(checkbox, record.status);
            pic.positions.insert(checkbox, record.position);
        }
        pic.derive_answered();
        Ok(pic)
    }
}

/// Imports every analysis record not already ingested. Each file is keyed
/// by its content fingerprint, so reruns skip records they have already
/// consumed and a re-exported identical file is a no-op.
pub(crate) fn import_analyses(store: &mut DataStore) -> anyhow::Result<usize> {
    let dir = store.paths().analysis_dir();
    if !dir.is_dir() {
        tracing::debug!(path = %dir.display(), "no analysis directory; nothing to import");
        return Ok(0);
    }

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(&dir)
        .with_context(|| format!("reading analysis directory {}", dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();

    let mut imported = 0usize;
    for path in files {
        let bytes =
            std::fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
        let digest = fingerprint(&bytes);
        if store.is_ingested(&digest) {
            continue;
        }

        let analysis: PageAnalysis = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing analysis record {}", path.display()))?;
        let pic = analysis
            .into_pic_data()
            .with_context(|| format!("converting analysis record {}", path.display()))?;
        let doc_id = pic.doc_id;
        let page = pic.page;

        match store.register_page(pic)? {
            PageRegistration::Stored => {
                tracing::debug!(doc = %doc_id, page = %page, "page imported");
                imported += 1;
            }
            PageRegistration::Conflict(id) => {
                tracing::warn!(doc = %doc_id, page = %page, candidate = %id, "page already stored; parked as a candidate");
                imported += 1;
            }
            PageRegistration::SkippedEarlier => {}
        }
        store.store_ingested(&digest)?;
    }

    if imported > 0 {
        tracing::info!(imported, "analysis records imported");
    }
    Ok(imported)
}
