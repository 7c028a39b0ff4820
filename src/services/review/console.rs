use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use anyhow::Context;

use crate::schemas::document::PicData;
use crate::schemas::ids::{DocumentId, OriginalQuestionNumber, StudentName};
use crate::services::integrity::{IntegrityPrompt, KeptVersion};
use crate::services::review::answers::AnswersPrompt;
use crate::services::review::names::IdentityPrompt;
use crate::services::review::PageDisplay;

/// Terminal frontend for every interactive prompt of a review session.
pub(crate) struct Console;

impl Console {
    pub(crate) fn new() -> Self {
        Self
    }

    fn prompt_line(&mut self, prompt: &str) -> anyhow::Result<String> {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{prompt}").context("writing prompt")?;
        write!(stdout, "> ").context("writing prompt")?;
        stdout.flush().context("flushing prompt")?;

        let mut line = String::new();
        std::io::stdin()
            .lock()
            .read_line(&mut line)
            .context("reading operator input")?;
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    fn prompt_confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        loop {
            let answer = self.prompt_line(prompt)?;
            match answer.trim().to_lowercase().as_str() {
                "" | "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => println!("Please answer 'y' or 'n'."),
            }
        }
    }
}

impl IdentityPrompt for Console {
    fn ask_identity(
        &mut self,
        doc_id: DocumentId,
        current: &StudentName,
    ) -> anyhow::Result<String> {
        let heading = if current.is_empty() {
            format!("Document #{doc_id} has no name.")
        } else {
            format!("Document #{doc_id} is named \"{current}\".")
        };
        self.prompt_line(&format!(
            "{heading}\n\
             Enter a name or a student id ([<] back, [>] skip, [/] discard):"
        ))
    }

    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        self.prompt_confirm(prompt)
    }
}

impl AnswersPrompt for Console {
    fn read_line(&mut self, prompt: &str) -> anyhow::Result<String> {
        self.prompt_line(prompt)
    }

    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        self.prompt_confirm(prompt)
    }

    fn notify(&mut self, message: &str) {
        println!("{message}");
    }
}

impl IntegrityPrompt for Console {
    fn select_version(
        &mut self,
        stored: &PicData,
        candidate: &PicData,
    ) -> anyhow::Result<KeptVersion> {
        println!(
            "Page {} of document #{} was scanned twice with different content:\n\
             \x20 1) {}\n\
             \x20 2) {}",
            stored.page, stored.doc_id, stored.pic_path, candidate.pic_path,
        );
        loop {
            let answer = self.prompt_line("Which version should be kept? (1/2)")?;
            match answer.trim() {
                "1" => return Ok(KeptVersion::Stored),
                "2" => return Ok(KeptVersion::Candidate),
                _ => println!("Please answer '1' or '2'."),
            }
        }
    }

    fn allow_missing_questions(
        &mut self,
        missing: &BTreeMap<DocumentId, Vec<OriginalQuestionNumber>>,
    ) -> anyhow::Result<bool> {
        println!("Some questions were never seen while scanning:");
        for (doc_id, questions) in missing {
            let list: Vec<String> = questions.iter().map(|q| q.to_string()).collect();
            println!("  - document #{doc_id}: questions {}", list.join(", "));
        }
        self.prompt_confirm("Continue anyway? (Y/n)")
    }
}

/// Shows page images in an external viewer while the operator answers a
/// prompt. One viewer window at a time; a new page replaces the old one.
pub(crate) struct ImageViewer {
    command: String,
    scan_dir: PathBuf,
    child: Option<Child>,
}

impl ImageViewer {
    pub(crate) fn new(command: &str, scan_dir: PathBuf) -> Self {
        Self { command: command.to_string(), scan_dir, child: None }
    }
}

impl PageDisplay for ImageViewer {
    fn show_page(&mut self, pic: &PicData) -> anyhow::Result<()> {
        self.close();
        let image = self.scan_dir.join(&pic.pic_path);
        let child = Command::new(&self.command)
            .arg(&image)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("launching viewer {:?} for {}", self.command, image.display()))?;
        self.child = Some(child);
        Ok(())
    }

    fn close(&mut self) {
        if let Some(mut child) = self.child.take() {
            if let Err(err) = child.kill() {
                tracing::debug!(error = %err, "viewer already gone");
            }
            let _ = child.wait();
        }
    }
}

impl Drop for ImageViewer {
    fn drop(&mut self) {
        self.close();
    }
}
