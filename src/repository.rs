/*
 * src/repository.rs
 *
 * The capability set the pipeline needs from the host content repository.
 *
 * Every component receives the store as an explicit `&mut dyn Repository`
 * (or `&dyn Repository` for read-only work). There are no ambient service
 * handles; the host decides which implementation backs a call.
 */

use crate::error::StoreError;
use crate::model::CalendarEntry;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known property keys.
pub mod props {
    pub const SENT_DATE: &str = "cm:sentdate";
    pub const ORIGINATOR: &str = "cm:originator";
    pub const ADDRESSEE: &str = "cm:addressee";
    pub const ADDRESSEES: &str = "cm:addressees";
    pub const SUBJECT: &str = "cm:subjectline";
    /// Mail-routing alias set on a group's inbox container.
    pub const ALIAS: &str = "emailserver:alias";
}

/// Opaque, stable identity of a repository node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
    Time(DateTime<Utc>),
    Flag(bool),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Time(t) => Some(*t),
            _ => None,
        }
    }

    /// A list, or a single text value as a one-element list.
    pub fn to_list(&self) -> Vec<String> {
        match self {
            PropertyValue::List(items) => items.clone(),
            PropertyValue::Text(s) => vec![s.clone()],
            _ => Vec::new(),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Typed objects with properties, a parent/child hierarchy and an indexed
/// uid lookup for calendar entries.
pub trait Repository {
    // --- Hierarchy ---
    fn exists(&self, node: &NodeId) -> bool;
    fn name(&self, node: &NodeId) -> StoreResult<String>;
    fn parent(&self, node: &NodeId) -> StoreResult<Option<NodeId>>;
    fn child_by_name(&self, parent: &NodeId, name: &str) -> StoreResult<Option<NodeId>>;
    /// Fails with `AlreadyExists` if `parent` already has a child called `name`.
    fn create_folder(&mut self, parent: &NodeId, name: &str) -> StoreResult<NodeId>;
    /// Fails with `AlreadyExists` on a name clash in `new_parent`.
    fn move_node(&mut self, node: &NodeId, new_parent: &NodeId) -> StoreResult<()>;
    fn delete_node(&mut self, node: &NodeId) -> StoreResult<()>;

    // --- Properties & content ---
    fn has_marker(&self, node: &NodeId, marker: &str) -> StoreResult<bool>;
    fn property(&self, node: &NodeId, key: &str) -> StoreResult<Option<PropertyValue>>;
    fn set_property(&mut self, node: &NodeId, key: &str, value: PropertyValue)
    -> StoreResult<()>;
    fn attachments(&self, email: &NodeId) -> StoreResult<Vec<NodeId>>;
    fn content_type(&self, node: &NodeId) -> StoreResult<Option<String>>;
    fn read_content(&self, node: &NodeId) -> StoreResult<Vec<u8>>;

    // --- Groups ---
    /// Group owning `node`, found by walking up from the node itself.
    fn group_of(&self, node: &NodeId) -> StoreResult<Option<String>>;
    fn is_group_root(&self, node: &NodeId) -> StoreResult<bool>;
    fn group_container(&self, group: &str, component: &str) -> StoreResult<Option<NodeId>>;
    fn create_group_container(
        &mut self,
        group: &str,
        component: &str,
        name: &str,
    ) -> StoreResult<NodeId>;

    // --- Calendar entries ---
    /// Entries in `collection` whose uid equals `uid`, in insertion order.
    fn find_entries(&self, collection: &NodeId, uid: &str) -> StoreResult<Vec<NodeId>>;
    fn entry(&self, node: &NodeId) -> StoreResult<CalendarEntry>;
    fn create_entry(
        &mut self,
        collection: &NodeId,
        name: &str,
        entry: CalendarEntry,
    ) -> StoreResult<NodeId>;
    fn update_entry(&mut self, node: &NodeId, entry: CalendarEntry) -> StoreResult<()>;
}
