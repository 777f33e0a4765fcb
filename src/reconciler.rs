// Applies a parsed invite to a calendar collection.
use crate::error::ReconcileError;
use crate::model::{CalendarEntry, InviteAction, InviteRecord, Provenance};
use crate::repository::{NodeId, Repository, props};
use chrono::Utc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created(NodeId),
    Updated(NodeId),
    Deleted(NodeId),
    /// Cancel for an identifier that has no entry.
    AlreadyAbsent,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventReconciler;

impl EventReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Creates, replaces or deletes the entry for `record.uid` in `collection`.
    /// `origin` is the email the invite arrived on; its headers become the
    /// provenance of a newly created entry.
    pub fn reconcile(
        &self,
        repo: &mut dyn Repository,
        collection: &NodeId,
        record: &InviteRecord,
        origin: &NodeId,
    ) -> Result<Outcome, ReconcileError> {
        let existing = self.find_existing(repo, collection, &record.uid)?;

        match (record.action, existing) {
            (InviteAction::Publish, None) => {
                let provenance = read_provenance(repo, origin);
                let entry = CalendarEntry::from_invite(record, provenance);
                let name = entry_name(&record.uid);
                let node = repo.create_entry(collection, &name, entry).map_err(|source| {
                    ReconcileError::Create {
                        uid: record.uid.clone(),
                        source,
                    }
                })?;
                log::info!("Created calendar entry {} for '{}'", node, record.uid);
                Ok(Outcome::Created(node))
            }
            (InviteAction::Publish, Some(node)) => {
                let mut entry = repo.entry(&node).map_err(|source| ReconcileError::Update {
                    node: node.clone(),
                    source,
                })?;
                entry.apply_invite(record);
                repo.update_entry(&node, entry)
                    .map_err(|source| ReconcileError::Update {
                        node: node.clone(),
                        source,
                    })?;
                log::info!("Updated calendar entry {} for '{}'", node, record.uid);
                Ok(Outcome::Updated(node))
            }
            (InviteAction::Cancel, Some(node)) => {
                repo.delete_node(&node)
                    .map_err(|source| ReconcileError::Delete {
                        node: node.clone(),
                        source,
                    })?;
                log::info!("Deleted calendar entry {} for '{}'", node, record.uid);
                Ok(Outcome::Deleted(node))
            }
            (InviteAction::Cancel, None) => {
                log::debug!("Cancel for '{}' but no entry exists", record.uid);
                Ok(Outcome::AlreadyAbsent)
            }
        }
    }

    /// Point lookup by uid. More than one hit is a data-integrity anomaly:
    /// logged, first hit wins, nothing is repaired.
    pub fn find_existing(
        &self,
        repo: &dyn Repository,
        collection: &NodeId,
        uid: &str,
    ) -> Result<Option<NodeId>, ReconcileError> {
        let matches = repo
            .find_entries(collection, uid)
            .map_err(|source| ReconcileError::Lookup {
                uid: uid.to_string(),
                source,
            })?;
        if matches.len() > 1 {
            log::warn!(
                "Data integrity anomaly: {} entries share uid '{}' in {} ({}); using the first",
                matches.len(),
                uid,
                collection,
                matches
                    .iter()
                    .map(NodeId::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
        Ok(matches.into_iter().next())
    }
}

/// Sender, recipients and sent time of the originating email. Missing or
/// unreadable headers are left empty.
pub fn read_provenance(repo: &dyn Repository, email: &NodeId) -> Provenance {
    let get = |key: &str| match repo.property(email, key) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("Cannot read {} on email {}: {}", key, email, e);
            None
        }
    };
    Provenance {
        sent: get(props::SENT_DATE).and_then(|v| v.as_time()),
        originator: get(props::ORIGINATOR).and_then(|v| v.as_text().map(str::to_string)),
        addressee: get(props::ADDRESSEE).and_then(|v| v.as_text().map(str::to_string)),
        addressees: get(props::ADDRESSEES)
            .map(|v| v.to_list())
            .unwrap_or_default(),
    }
}

/// `emailed-event-<uid>-<millis>-<suffix>.ics`. The random suffix keeps two
/// entries for the same uid created in the same millisecond apart.
pub fn entry_name(uid: &str) -> String {
    let safe_uid: String = uid
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'))
        .take(96)
        .collect();
    let suffix: String = (0..6).map(|_| fastrand::alphanumeric()).collect();
    format!(
        "emailed-event-{}-{}-{}.ics",
        safe_uid,
        Utc::now().timestamp_millis(),
        suffix.to_lowercase()
    )
}
