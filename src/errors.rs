use std::collections::BTreeMap;

use thiserror::Error;

use crate::schemas::ids::{
    ApparentAnswerNumber, ApparentQuestionNumber, DocumentId, OriginalAnswerNumber,
    OriginalQuestionNumber,
};

/// Fatal reconciliation failures. These propagate all the way to `run()`
/// and abort the session; they are never caught by a prompt loop.
#[derive(Debug, Error)]
pub(crate) enum ReconcileError {
    #[error(
        "document #{doc_id} has no entry in the ordering table.\n\
         The configuration file does not match the scanned data.\n\
         Regenerate the exam set with at least {max_doc_id} versions \
         (or restore the matching configuration file), then rescan."
    )]
    MissingConfigurationData { doc_id: DocumentId, max_doc_id: DocumentId },

    #[error("some questions were never seen while scanning:\n{}", format_missing_questions(.0))]
    MissingQuestions(BTreeMap<DocumentId, Vec<OriginalQuestionNumber>>),
}

/// Recoverable problems with operator input. Callers catch these at the
/// innermost prompt loop, print the message and ask again.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub(crate) enum InputError {
    #[error("document #{doc_id}: no question is numbered {position} on this test")]
    QuestionOutOfRange { doc_id: DocumentId, position: ApparentQuestionNumber },

    #[error("document #{doc_id}: question {question} has no answer numbered {position}")]
    AnswerOutOfRange {
        doc_id: DocumentId,
        question: ApparentQuestionNumber,
        position: ApparentAnswerNumber,
    },

    #[error("document #{doc_id}: question {question} does not appear in the ordering table")]
    UnknownQuestion { doc_id: DocumentId, question: OriginalQuestionNumber },

    #[error(
        "document #{doc_id}: answer {answer} to question {question} \
         does not appear in the ordering table"
    )]
    UnknownAnswer {
        doc_id: DocumentId,
        question: OriginalQuestionNumber,
        answer: OriginalAnswerNumber,
    },

    #[error("cannot parse {input:?} as a number")]
    NotANumber { input: String },

    #[error("cannot parse {input:?} as an answer edit (expected +N or -N)")]
    MalformedEdit { input: String },
}

fn format_missing_questions(
    missing: &BTreeMap<DocumentId, Vec<OriginalQuestionNumber>>,
) -> String {
    missing
        .iter()
        .map(|(doc_id, questions)| {
            let list: Vec<String> = questions.iter().map(|q| q.to_string()).collect();
            format!("  - document #{doc_id}: questions {}", list.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_configuration_names_document_and_remedy() {
        let err = ReconcileError::MissingConfigurationData {
            doc_id: DocumentId(42),
            max_doc_id: DocumentId(50),
        };
        let message = err.to_string();
        assert!(message.contains("#42"));
        assert!(message.contains("50 versions"));
    }

    #[test]
    fn missing_questions_lists_each_document() {
        let mut missing = BTreeMap::new();
        missing.insert(DocumentId(3), vec![OriginalQuestionNumber(2), OriginalQuestionNumber(7)]);
        let message = ReconcileError::MissingQuestions(missing).to_string();
        assert!(message.contains("document #3"));
        assert!(message.contains("2, 7"));
    }
}
