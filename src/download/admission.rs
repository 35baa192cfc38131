//! Overwrite decisions made before the concurrent phase.
//!
//! With [`OverwritePolicy::PromptUser`] the user is asked about each conflicting
//! file one at a time, before any transfer starts. The answers are frozen into
//! [`Admissions`], which the transfer tasks only read.

use std::collections::HashMap;

use tracing::{debug, info};

use super::HttpClient;
use super::engine::SkipReason;
use crate::config::{Configuration, OverwritePolicy};
use crate::inventory::{Inventory, LocalFile};
use crate::target::DownloadTarget;

/// Asks whether an existing local file may be replaced.
pub trait Prompter {
    /// Returns true to overwrite `local`.
    fn confirm_overwrite(&mut self, filename: &str, local: &LocalFile) -> bool;
}

/// Prompter that always gives the same answer.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Prompter for FixedAnswer {
    fn confirm_overwrite(&mut self, _filename: &str, _local: &LocalFile) -> bool {
        self.0
    }
}

/// Pre-pass verdict for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    Skip(SkipReason),
}

/// Filename → verdict for every target settled by the pre-pass.
#[derive(Debug, Clone, Default)]
pub struct Admissions {
    decisions: HashMap<String, Admission>,
}

impl Admissions {
    /// No pre-decided targets.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, filename: &str) -> Option<Admission> {
        self.decisions.get(filename).copied()
    }

    pub fn insert(&mut self, filename: impl Into<String>, admission: Admission) {
        self.decisions.insert(filename.into(), admission);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }
}

/// Runs the smart size check and the overwrite prompt for every target that
/// already exists locally. Does nothing unless the policy is `PromptUser`.
///
/// A size-matching file is skipped without asking. When the target carries no
/// expected size, a `HEAD` probe is made; a failed probe just means the user is asked.
pub async fn resolve_prompts(
    targets: &[DownloadTarget],
    config: &Configuration,
    inventory: &Inventory,
    client: &HttpClient,
    prompter: &mut dyn Prompter,
) -> Admissions {
    let mut admissions = Admissions::none();
    if config.overwrite_policy != OverwritePolicy::PromptUser {
        return admissions;
    }

    for target in targets {
        let Some(local) = inventory.get(&target.filename) else {
            continue;
        };

        if config.smart_size_check {
            let full_size = match target.expected_size {
                Some(size) => Some(size),
                None => client
                    .probe_content_length(&target.source_url)
                    .await
                    .unwrap_or_else(|error| {
                        debug!(filename = %target.filename, error = %error, "size probe failed");
                        None
                    }),
            };
            if full_size == Some(local.size_bytes) {
                admissions.insert(&target.filename, Admission::Skip(SkipReason::SizeMatch));
                continue;
            }
        }

        let verdict = if prompter.confirm_overwrite(&target.filename, local) {
            Admission::Proceed
        } else {
            info!(filename = %target.filename, "overwrite declined");
            Admission::Skip(SkipReason::Declined)
        };
        admissions.insert(&target.filename, verdict);
    }

    admissions
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::path::PathBuf;
    use std::time::Duration;

    use super::*;
    use tempfile::TempDir;

    struct Recording {
        asked: Vec<String>,
        answer: bool,
    }

    impl Prompter for Recording {
        fn confirm_overwrite(&mut self, filename: &str, _local: &LocalFile) -> bool {
            self.asked.push(filename.to_string());
            self.answer
        }
    }

    fn prompt_config() -> Configuration {
        Configuration {
            overwrite_policy: OverwritePolicy::PromptUser,
            ..Configuration::default()
        }
    }

    fn client() -> HttpClient {
        HttpClient::new(Duration::from_secs(2)).unwrap()
    }

    fn inventory_with(dir: &TempDir, files: &[(&str, usize)]) -> Inventory {
        for (name, len) in files {
            std::fs::write(dir.path().join(name), vec![0u8; *len]).unwrap();
        }
        Inventory::scan(dir.path(), None).unwrap()
    }

    #[tokio::test]
    async fn test_size_match_skips_without_prompt() {
        let dir = TempDir::new().unwrap();
        let inventory = inventory_with(&dir, &[("a.zip", 10)]);
        let targets = vec![
            DownloadTarget::new("a.zip", "http://127.0.0.1:9/a.zip")
                .unwrap()
                .with_expected_size(10),
        ];
        let mut prompter = Recording {
            asked: vec![],
            answer: true,
        };

        let admissions =
            resolve_prompts(&targets, &prompt_config(), &inventory, &client(), &mut prompter).await;

        assert!(prompter.asked.is_empty());
        assert_eq!(
            admissions.get("a.zip"),
            Some(Admission::Skip(SkipReason::SizeMatch))
        );
    }

    #[tokio::test]
    async fn test_prompt_answers_are_recorded() {
        let dir = TempDir::new().unwrap();
        let inventory = inventory_with(&dir, &[("a.zip", 10), ("b.zip", 10)]);
        let targets = vec![
            DownloadTarget::new("a.zip", "http://127.0.0.1:9/a.zip")
                .unwrap()
                .with_expected_size(99),
            DownloadTarget::new("new.zip", "http://127.0.0.1:9/new.zip").unwrap(),
        ];

        let mut no = Recording {
            asked: vec![],
            answer: false,
        };
        let admissions =
            resolve_prompts(&targets, &prompt_config(), &inventory, &client(), &mut no).await;
        assert_eq!(no.asked, vec!["a.zip".to_string()]);
        assert_eq!(
            admissions.get("a.zip"),
            Some(Admission::Skip(SkipReason::Declined))
        );
        assert_eq!(admissions.get("new.zip"), None);

        let admissions = resolve_prompts(
            &targets,
            &prompt_config(),
            &inventory,
            &client(),
            &mut FixedAnswer(true),
        )
        .await;
        assert_eq!(admissions.get("a.zip"), Some(Admission::Proceed));
    }

    #[tokio::test]
    async fn test_other_policies_skip_pre_pass() {
        let dir = TempDir::new().unwrap();
        let inventory = inventory_with(&dir, &[("a.zip", 10)]);
        let targets = vec![DownloadTarget::new("a.zip", "http://127.0.0.1:9/a.zip").unwrap()];
        let mut prompter = Recording {
            asked: vec![],
            answer: true,
        };

        let admissions = resolve_prompts(
            &targets,
            &Configuration::default(),
            &inventory,
            &client(),
            &mut prompter,
        )
        .await;
        assert!(admissions.is_empty());
        assert!(prompter.asked.is_empty());
    }

    #[test]
    fn test_fixed_answer() {
        let local = LocalFile {
            name: "a".into(),
            path: PathBuf::from("a"),
            size_bytes: 1,
        };
        assert!(FixedAnswer(true).confirm_overwrite("a", &local));
        assert!(!FixedAnswer(false).confirm_overwrite("a", &local));
    }
}
