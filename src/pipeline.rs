// Per-email orchestration: parse each calendar attachment, reconcile it into
// the group calendar, then archive the email.
use crate::archive::ArchiveRouter;
use crate::config::Config;
use crate::error::{PipelineError, StoreError};
use crate::model::parse_invite;
use crate::reconciler::{EventReconciler, Outcome};
use crate::repository::{NodeId, Repository};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoAttachments,
    /// The email is no longer in a folder named like the inbox, which is what
    /// a successful archive leaves behind.
    NotInInbox,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentReport {
    Reconciled(Outcome),
    Ignored { content_type: Option<String> },
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Skipped(SkipReason),
    Processed {
        archived_to: NodeId,
        /// One report per attachment, in attachment order.
        reports: Vec<AttachmentReport>,
    },
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessOutcome::Skipped(reason) => write!(f, "skipped ({:?})", reason),
            ProcessOutcome::Processed {
                archived_to,
                reports,
            } => {
                let applied = reports
                    .iter()
                    .filter(|r| matches!(r, AttachmentReport::Reconciled(_)))
                    .count();
                let failed = reports
                    .iter()
                    .filter(|r| matches!(r, AttachmentReport::Failed(_)))
                    .count();
                write!(
                    f,
                    "archived to {}: {} applied, {} failed, {} ignored",
                    archived_to,
                    applied,
                    failed,
                    reports.len() - applied - failed
                )
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct InvitationPipeline {
    inbox_folder: String,
    calendar_component: String,
    calendar_folder: String,
    calendar_mime_type: String,
    reconciler: EventReconciler,
    archive: ArchiveRouter,
}

impl InvitationPipeline {
    pub fn new(config: &Config) -> Self {
        Self {
            inbox_folder: config.inbox_folder.clone(),
            calendar_component: config.calendar_component.clone(),
            calendar_folder: config.calendar_folder.clone(),
            calendar_mime_type: config.calendar_mime_type.clone(),
            reconciler: EventReconciler::new(),
            archive: ArchiveRouter::from_config(config),
        }
    }

    /// Runs one inbound email through the pipeline.
    ///
    /// Parse and reconcile failures only affect their own attachment. The
    /// email is archived whatever happened to its attachments; only an archive
    /// failure is returned as an error.
    pub fn process_email(
        &self,
        repo: &mut dyn Repository,
        email: &NodeId,
    ) -> Result<ProcessOutcome, PipelineError> {
        let email_err = |source: StoreError| PipelineError::Email {
            email: email.clone(),
            source,
        };

        let attachments = repo.attachments(email).map_err(email_err)?;
        if attachments.is_empty() {
            log::debug!("Email {} has no attachments, skipping", email);
            return Ok(ProcessOutcome::Skipped(SkipReason::NoAttachments));
        }

        if !self.in_inbox(repo, email).map_err(email_err)? {
            log::debug!("Email {} is not in '{}', skipping", email, self.inbox_folder);
            return Ok(ProcessOutcome::Skipped(SkipReason::NotInInbox));
        }

        log::debug!(
            "Processing email {} with {} attachment(s)",
            email,
            attachments.len()
        );

        let mut collection = None;
        let reports = attachments
            .iter()
            .map(|attachment| self.process_attachment(repo, email, attachment, &mut collection))
            .collect();

        let archived_to = self.archive.archive(repo, email, &attachments)?;
        Ok(ProcessOutcome::Processed {
            archived_to,
            reports,
        })
    }

    /// Whether the email's parent carries the inbox folder name.
    pub fn in_inbox(&self, repo: &dyn Repository, email: &NodeId) -> Result<bool, StoreError> {
        match repo.parent(email)? {
            Some(parent) => Ok(repo.name(&parent)? == self.inbox_folder),
            None => Ok(false),
        }
    }

    fn process_attachment(
        &self,
        repo: &mut dyn Repository,
        email: &NodeId,
        attachment: &NodeId,
        collection: &mut Option<NodeId>,
    ) -> AttachmentReport {
        let content_type = match repo.content_type(attachment) {
            Ok(ct) => ct,
            Err(e) => {
                log::error!("Cannot read content type of attachment {}: {}", attachment, e);
                return AttachmentReport::Failed(e.to_string());
            }
        };
        if !content_type
            .as_deref()
            .is_some_and(|ct| mime_matches(ct, &self.calendar_mime_type))
        {
            log::debug!(
                "Attachment {} is {}, not a calendar document",
                attachment,
                content_type.as_deref().unwrap_or("untyped")
            );
            return AttachmentReport::Ignored { content_type };
        }

        let bytes = match repo.read_content(attachment) {
            Ok(b) => b,
            Err(e) => {
                log::error!("Cannot read attachment {}: {}", attachment, e);
                return AttachmentReport::Failed(e.to_string());
            }
        };

        let record = match parse_invite(&bytes) {
            Ok(r) => r,
            Err(e) => {
                log::error!("Invalid calendar attachment {} on email {}: {}", attachment, email, e);
                return AttachmentReport::Failed(e.to_string());
            }
        };

        let target = match collection.as_ref() {
            Some(c) => c.clone(),
            None => match self.calendar_collection(repo, email) {
                Ok(c) => collection.insert(c).clone(),
                Err(reason) => {
                    log::error!("No calendar for email {}: {}", email, reason);
                    return AttachmentReport::Failed(reason);
                }
            },
        };

        match self.reconciler.reconcile(repo, &target, &record, email) {
            Ok(outcome) => AttachmentReport::Reconciled(outcome),
            Err(e) => {
                log::error!("Cannot apply invite from attachment {}: {}", attachment, e);
                AttachmentReport::Failed(e.to_string())
            }
        }
    }

    /// Calendar container of the email's group, created on first use.
    fn calendar_collection(
        &self,
        repo: &mut dyn Repository,
        email: &NodeId,
    ) -> Result<NodeId, String> {
        let group = repo
            .group_of(email)
            .map_err(|e| e.to_string())?
            .ok_or_else(|| format!("email {} does not belong to a group", email))?;

        if let Some(existing) = repo
            .group_container(&group, &self.calendar_component)
            .map_err(|e| e.to_string())?
        {
            return Ok(existing);
        }

        log::info!("Creating '{}' container for group {}", self.calendar_folder, group);
        repo.create_group_container(&group, &self.calendar_component, &self.calendar_folder)
            .map_err(|e| e.to_string())
    }
}

/// Compares the type/subtype part only, case-insensitively.
pub fn mime_matches(content_type: &str, expected: &str) -> bool {
    let essence = |s: &str| s.split(';').next().unwrap_or_default().trim().to_string();
    essence(content_type).eq_ignore_ascii_case(&essence(expected))
}
