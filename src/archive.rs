// Moves a processed email and its attachments out of the inbox.
use crate::config::{ArchiveMode, Config};
use crate::error::{ArchiveError, StoreError};
use crate::repository::{NodeId, Repository};

#[derive(Debug, Clone)]
pub struct ArchiveRouter {
    processed_folder: String,
    mode: ArchiveMode,
}

impl ArchiveRouter {
    pub fn new(processed_folder: impl Into<String>, mode: ArchiveMode) -> Self {
        Self {
            processed_folder: processed_folder.into(),
            mode,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.processed_folder.clone(), config.archive_mode)
    }

    /// Moves `email`, then each attachment, into
    /// `<email parent>/<processed>/<email id>/` and returns that folder.
    ///
    /// The shared processed folder is created on demand; the per-email folder
    /// must not exist yet. If the email cannot be moved nothing else is
    /// touched and the per-email folder is removed again, so a later
    /// notification can retry.
    pub fn archive(
        &self,
        repo: &mut dyn Repository,
        email: &NodeId,
        attachments: &[NodeId],
    ) -> Result<NodeId, ArchiveError> {
        let resolve_err = |source: StoreError| ArchiveError::Resolve {
            email: email.clone(),
            source,
        };

        let inbox = repo
            .parent(email)
            .map_err(resolve_err)?
            .ok_or_else(|| resolve_err(StoreError::Other("email has no parent".to_string())))?;

        let processed = match repo
            .child_by_name(&inbox, &self.processed_folder)
            .map_err(resolve_err)?
        {
            Some(folder) => folder,
            None => {
                log::debug!("Creating '{}' folder under {}", self.processed_folder, inbox);
                repo.create_folder(&inbox, &self.processed_folder)
                    .map_err(resolve_err)?
            }
        };

        let destination = repo
            .create_folder(&processed, email.as_str())
            .map_err(resolve_err)?;

        if let Err(source) = repo.move_node(email, &destination) {
            log::error!("Problem moving email {} to processed folder: {}", email, source);
            discard_folder(repo, &destination);
            return Err(ArchiveError::EmailMove {
                email: email.clone(),
                source,
            });
        }

        // (attachment, where it came from)
        let mut moved: Vec<(NodeId, NodeId)> = Vec::with_capacity(attachments.len());
        for attachment in attachments {
            match move_attachment(repo, attachment, &destination) {
                Ok(origin) => moved.push((attachment.clone(), origin)),
                Err(source) => {
                    log::error!(
                        "Problem moving attachment {} to processed folder: {}",
                        attachment,
                        source
                    );
                    self.abandon(repo, email, &inbox, &moved, &destination, attachments.len());
                    return Err(ArchiveError::AttachmentMove {
                        attachment: attachment.clone(),
                        moved: moved.len(),
                        total: attachments.len(),
                        source,
                    });
                }
            }
        }

        log::info!(
            "Archived email {} and {} attachment(s) to {}",
            email,
            attachments.len(),
            destination
        );
        Ok(destination)
    }
}

impl ArchiveRouter {
    /// Handles an attachment that could not be archived, per the archive mode.
    fn abandon(
        &self,
        repo: &mut dyn Repository,
        email: &NodeId,
        inbox: &NodeId,
        moved: &[(NodeId, NodeId)],
        destination: &NodeId,
        total: usize,
    ) {
        match self.mode {
            ArchiveMode::Transactional => roll_back(repo, email, inbox, moved, destination),
            ArchiveMode::BestEffort => log::warn!(
                "Email {} left partially archived in {} ({} of {} attachments moved)",
                email,
                destination,
                moved.len(),
                total
            ),
        }
    }
}

/// Moves one attachment and returns the folder it came from.
fn move_attachment(
    repo: &mut dyn Repository,
    attachment: &NodeId,
    destination: &NodeId,
) -> Result<NodeId, StoreError> {
    let origin = repo
        .parent(attachment)?
        .ok_or_else(|| StoreError::Other(format!("attachment {} has no parent", attachment)))?;
    repo.move_node(attachment, destination)?;
    Ok(origin)
}

/// Puts everything back where it was. Best effort: failures are logged and the
/// per-email folder is only removed once it is known to be empty.
fn roll_back(
    repo: &mut dyn Repository,
    email: &NodeId,
    inbox: &NodeId,
    moved: &[(NodeId, NodeId)],
    destination: &NodeId,
) {
    let mut clean = true;
    for (attachment, origin) in moved.iter().rev() {
        if let Err(e) = repo.move_node(attachment, origin) {
            log::error!("Rollback: cannot return attachment {} to {}: {}", attachment, origin, e);
            clean = false;
        }
    }
    if let Err(e) = repo.move_node(email, inbox) {
        log::error!("Rollback: cannot return email {} to {}: {}", email, inbox, e);
        clean = false;
    }
    if clean {
        discard_folder(repo, destination);
        log::warn!("Archive of email {} rolled back; it stays in the inbox", email);
    }
}

fn discard_folder(repo: &mut dyn Repository, folder: &NodeId) {
    if let Err(e) = repo.delete_node(folder) {
        log::error!("Cannot remove archive folder {}: {}", folder, e);
    }
}
