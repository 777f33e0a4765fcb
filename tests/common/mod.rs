// Shared fixtures for the scenario tests.
#![allow(dead_code)]

use inbound_invites::config::Config;
use inbound_invites::error::StoreError;
use inbound_invites::model::CalendarEntry;
use inbound_invites::provision::GroupProvisioner;
use inbound_invites::repository::{NodeId, PropertyValue, Repository, StoreResult};
use inbound_invites::store::{EmailHeaders, MemoryRepository};
use std::cell::RefCell;
use std::collections::HashSet;

pub const GROUP: &str = "finance";

/// A minimal Outlook-style invite.
pub fn invite(method: &str, uid: &str, summary: &str) -> String {
    format!(
        "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:-//Example Corp//Mail 16.0//EN\r\n\
METHOD:{method}\r\n\
BEGIN:VEVENT\r\n\
UID:{uid}\r\n\
DTSTAMP:20250401T080000Z\r\n\
SUMMARY:{summary}\r\n\
DTSTART;TZID=Europe/Berlin:20250415T100000\r\n\
DTEND;TZID=Europe/Berlin:20250415T110000\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n"
    )
}

/// Store wrapper that fails selected operations and records content reads.
pub struct FlakyRepository {
    pub inner: MemoryRepository,
    pub fail_moves: HashSet<NodeId>,
    pub fail_parent_lookups: HashSet<NodeId>,
    pub fail_entry_writes: bool,
    pub reads: RefCell<Vec<NodeId>>,
}

impl FlakyRepository {
    pub fn new(inner: MemoryRepository) -> Self {
        Self {
            inner,
            fail_moves: HashSet::new(),
            fail_parent_lookups: HashSet::new(),
            fail_entry_writes: false,
            reads: RefCell::new(Vec::new()),
        }
    }

    fn injected(what: &str, node: &NodeId) -> StoreError {
        StoreError::Other(format!("injected {} failure on {}", what, node))
    }
}

impl Repository for FlakyRepository {
    fn exists(&self, node: &NodeId) -> bool {
        self.inner.exists(node)
    }
    fn name(&self, node: &NodeId) -> StoreResult<String> {
        self.inner.name(node)
    }
    fn parent(&self, node: &NodeId) -> StoreResult<Option<NodeId>> {
        if self.fail_parent_lookups.contains(node) {
            return Err(Self::injected("parent lookup", node));
        }
        self.inner.parent(node)
    }
    fn child_by_name(&self, parent: &NodeId, name: &str) -> StoreResult<Option<NodeId>> {
        self.inner.child_by_name(parent, name)
    }
    fn create_folder(&mut self, parent: &NodeId, name: &str) -> StoreResult<NodeId> {
        self.inner.create_folder(parent, name)
    }
    fn move_node(&mut self, node: &NodeId, new_parent: &NodeId) -> StoreResult<()> {
        if self.fail_moves.contains(node) {
            return Err(Self::injected("move", node));
        }
        self.inner.move_node(node, new_parent)
    }
    fn delete_node(&mut self, node: &NodeId) -> StoreResult<()> {
        self.inner.delete_node(node)
    }
    fn has_marker(&self, node: &NodeId, marker: &str) -> StoreResult<bool> {
        self.inner.has_marker(node, marker)
    }
    fn property(&self, node: &NodeId, key: &str) -> StoreResult<Option<PropertyValue>> {
        self.inner.property(node, key)
    }
    fn set_property(
        &mut self,
        node: &NodeId,
        key: &str,
        value: PropertyValue,
    ) -> StoreResult<()> {
        self.inner.set_property(node, key, value)
    }
    fn attachments(&self, email: &NodeId) -> StoreResult<Vec<NodeId>> {
        self.inner.attachments(email)
    }
    fn content_type(&self, node: &NodeId) -> StoreResult<Option<String>> {
        self.inner.content_type(node)
    }
    fn read_content(&self, node: &NodeId) -> StoreResult<Vec<u8>> {
        self.reads.borrow_mut().push(node.clone());
        self.inner.read_content(node)
    }
    fn group_of(&self, node: &NodeId) -> StoreResult<Option<String>> {
        self.inner.group_of(node)
    }
    fn is_group_root(&self, node: &NodeId) -> StoreResult<bool> {
        self.inner.is_group_root(node)
    }
    fn group_container(&self, group: &str, component: &str) -> StoreResult<Option<NodeId>> {
        self.inner.group_container(group, component)
    }
    fn create_group_container(
        &mut self,
        group: &str,
        component: &str,
        name: &str,
    ) -> StoreResult<NodeId> {
        self.inner.create_group_container(group, component, name)
    }
    fn find_entries(&self, collection: &NodeId, uid: &str) -> StoreResult<Vec<NodeId>> {
        self.inner.find_entries(collection, uid)
    }
    fn entry(&self, node: &NodeId) -> StoreResult<CalendarEntry> {
        self.inner.entry(node)
    }
    fn create_entry(
        &mut self,
        collection: &NodeId,
        name: &str,
        entry: CalendarEntry,
    ) -> StoreResult<NodeId> {
        if self.fail_entry_writes {
            return Err(Self::injected("create", collection));
        }
        self.inner.create_entry(collection, name, entry)
    }
    fn update_entry(&mut self, node: &NodeId, entry: CalendarEntry) -> StoreResult<()> {
        if self.fail_entry_writes {
            return Err(Self::injected("update", node));
        }
        self.inner.update_entry(node, entry)
    }
}

/// A provisioned group, returning the repository and its inbox.
pub fn provisioned_group() -> (MemoryRepository, NodeId) {
    let mut repo = MemoryRepository::new();
    repo.create_group(GROUP).unwrap();
    let inbox = GroupProvisioner::new(&Config::default())
        .ensure_group(&mut repo, GROUP)
        .unwrap();
    (repo, inbox)
}

/// Delivers an email into `inbox` with `(file name, mime type, body)` attachments.
pub fn deliver(
    repo: &mut MemoryRepository,
    inbox: &NodeId,
    attachments: &[(&str, &str, &str)],
) -> (NodeId, Vec<NodeId>) {
    let stem = uuid::Uuid::new_v4().to_string();
    let headers = EmailHeaders {
        from: Some("organizer@example.com".to_string()),
        to: Some("finance@example.com".to_string()),
        recipients: vec!["finance@example.com".to_string()],
        subject: Some("Invitation".to_string()),
        sent: None,
    };
    let email = repo
        .add_email(inbox, &format!("{}.eml", stem), "emailed", &headers)
        .unwrap();
    let ids = attachments
        .iter()
        .map(|(name, mime, body)| {
            repo.add_attachment(
                &email,
                &format!("{}-{}", stem, name),
                mime,
                body.as_bytes().to_vec(),
            )
            .unwrap()
        })
        .collect();
    (email, ids)
}

pub fn calendar(repo: &dyn Repository) -> Option<NodeId> {
    repo.group_container(GROUP, "calendar").unwrap()
}
