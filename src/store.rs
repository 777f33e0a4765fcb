// File: src/store.rs
// In-memory reference implementation of the repository boundary.
use crate::error::StoreError;
use crate::model::CalendarEntry;
use crate::repository::{NodeId, PropertyValue, Repository, StoreResult, props};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub const ROOT_NAME: &str = "Company Home";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum NodeKind {
    Folder,
    Email,
    Content { mime_type: String, bytes: Vec<u8> },
    Event { entry: CalendarEntry },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub parent: Option<NodeId>,
    pub kind: NodeKind,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub markers: BTreeSet<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
    #[serde(default)]
    pub attachments: Vec<NodeId>,
}

impl Node {
    fn new(name: &str, parent: Option<NodeId>, kind: NodeKind) -> Self {
        Self {
            id: NodeId::generate(),
            name: name.to_string(),
            parent,
            kind,
            children: Vec::new(),
            markers: BTreeSet::new(),
            properties: BTreeMap::new(),
            attachments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRecord {
    pub root: NodeId,
    /// component id -> container node
    #[serde(default)]
    pub containers: BTreeMap<String, NodeId>,
}

/// Header fields of an inbound email, stored as properties on the email node.
#[derive(Debug, Clone, Default)]
pub struct EmailHeaders {
    pub from: Option<String>,
    pub to: Option<String>,
    pub recipients: Vec<String>,
    pub subject: Option<String>,
    pub sent: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRepository {
    pub root: NodeId,
    nodes: HashMap<NodeId, Node>,
    #[serde(default)]
    groups: BTreeMap<String, GroupRecord>,
    /// collection -> uid -> entries, in insertion order
    #[serde(skip)]
    index: HashMap<NodeId, HashMap<String, Vec<NodeId>>>,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    pub fn new() -> Self {
        let root = Node::new(ROOT_NAME, None, NodeKind::Folder);
        let root_id = root.id.clone();
        let mut nodes = HashMap::new();
        nodes.insert(root_id.clone(), root);
        Self {
            root: root_id,
            nodes,
            groups: BTreeMap::new(),
            index: HashMap::new(),
        }
    }

    /// Rebuilds the uid index from the node table. Needed after deserializing.
    pub fn rebuild_index(&mut self) {
        self.index.clear();
        let mut events: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| matches!(n.kind, NodeKind::Event { .. }))
            .collect();
        // Keep insertion order stable: walk parents' child lists.
        events.sort_by_key(|n| {
            n.parent
                .as_ref()
                .and_then(|p| self.nodes.get(p))
                .and_then(|p| p.children.iter().position(|c| c == &n.id))
                .unwrap_or(usize::MAX)
        });
        let pairs: Vec<(NodeId, String, NodeId)> = events
            .iter()
            .filter_map(|n| match (&n.kind, &n.parent) {
                (NodeKind::Event { entry }, Some(parent)) => {
                    Some((parent.clone(), entry.uid.clone(), n.id.clone()))
                }
                _ => None,
            })
            .collect();
        for (collection, uid, node) in pairs {
            self.index_insert(collection, uid, node);
        }
    }

    fn index_insert(&mut self, collection: NodeId, uid: String, node: NodeId) {
        self.index
            .entry(collection)
            .or_default()
            .entry(uid)
            .or_default()
            .push(node);
    }

    fn index_remove(&mut self, collection: &NodeId, uid: &str, node: &NodeId) {
        if let Some(by_uid) = self.index.get_mut(collection)
            && let Some(list) = by_uid.get_mut(uid)
        {
            list.retain(|n| n != node);
            if list.is_empty() {
                by_uid.remove(uid);
            }
        }
    }

    fn node(&self, id: &NodeId) -> StoreResult<&Node> {
        self.nodes
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn node_mut(&mut self, id: &NodeId) -> StoreResult<&mut Node> {
        self.nodes
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    fn ensure_name_free(&self, parent: &NodeId, name: &str) -> StoreResult<()> {
        if self.child_by_name(parent, name)?.is_some() {
            return Err(StoreError::AlreadyExists {
                parent: parent.clone(),
                name: name.to_string(),
            });
        }
        Ok(())
    }

    fn insert_child(&mut self, node: Node) -> StoreResult<NodeId> {
        let parent = node
            .parent
            .clone()
            .ok_or_else(|| StoreError::Other("node without parent".to_string()))?;
        self.ensure_name_free(&parent, &node.name)?;
        let id = node.id.clone();
        self.node_mut(&parent)?.children.push(id.clone());
        if let NodeKind::Event { entry } = &node.kind {
            self.index_insert(parent, entry.uid.clone(), id.clone());
        }
        self.nodes.insert(id.clone(), node);
        Ok(id)
    }

    // --- Host-side helpers (not part of the pipeline's capability set) ---

    /// Creates the group's root folder, or returns the existing one.
    pub fn create_group(&mut self, group: &str) -> StoreResult<NodeId> {
        if let Some(record) = self.groups.get(group) {
            return Ok(record.root.clone());
        }
        let root = self.root.clone();
        let id = self.insert_child(Node::new(group, Some(root), NodeKind::Folder))?;
        self.groups.insert(
            group.to_string(),
            GroupRecord {
                root: id.clone(),
                containers: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Stores an inbound email in `folder`, tagged with `marker`.
    pub fn add_email(
        &mut self,
        folder: &NodeId,
        name: &str,
        marker: &str,
        headers: &EmailHeaders,
    ) -> StoreResult<NodeId> {
        let mut node = Node::new(name, Some(folder.clone()), NodeKind::Email);
        node.markers.insert(marker.to_string());
        if let Some(from) = &headers.from {
            node.properties
                .insert(props::ORIGINATOR.to_string(), PropertyValue::Text(from.clone()));
        }
        if let Some(to) = &headers.to {
            node.properties
                .insert(props::ADDRESSEE.to_string(), PropertyValue::Text(to.clone()));
        }
        if !headers.recipients.is_empty() {
            node.properties.insert(
                props::ADDRESSEES.to_string(),
                PropertyValue::List(headers.recipients.clone()),
            );
        }
        if let Some(subject) = &headers.subject {
            node.properties
                .insert(props::SUBJECT.to_string(), PropertyValue::Text(subject.clone()));
        }
        if let Some(sent) = headers.sent {
            node.properties
                .insert(props::SENT_DATE.to_string(), PropertyValue::Time(sent));
        }
        self.insert_child(node)
    }

    /// Stores an attachment next to `email` and associates it.
    pub fn add_attachment(
        &mut self,
        email: &NodeId,
        name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> StoreResult<NodeId> {
        let folder = self
            .node(email)?
            .parent
            .clone()
            .ok_or_else(|| StoreError::Other(format!("email {} has no parent", email)))?;
        let node = Node::new(
            name,
            Some(folder),
            NodeKind::Content {
                mime_type: mime_type.to_string(),
                bytes,
            },
        );
        let id = self.insert_child(node)?;
        self.node_mut(email)?.attachments.push(id.clone());
        Ok(id)
    }

    /// Node whose routing alias property equals `alias`.
    pub fn resolve_alias(&self, alias: &str) -> Option<NodeId> {
        self.nodes
            .values()
            .find(|n| {
                n.properties
                    .get(props::ALIAS)
                    .and_then(PropertyValue::as_text)
                    .is_some_and(|a| a.eq_ignore_ascii_case(alias))
            })
            .map(|n| n.id.clone())
    }

    pub fn children(&self, node: &NodeId) -> Vec<NodeId> {
        self.nodes
            .get(node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// All entries stored in `collection`, in insertion order.
    pub fn entries_in(&self, collection: &NodeId) -> Vec<CalendarEntry> {
        self.children(collection)
            .iter()
            .filter_map(|id| match self.nodes.get(id).map(|n| &n.kind) {
                Some(NodeKind::Event { entry }) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Repository for MemoryRepository {
    fn exists(&self, node: &NodeId) -> bool {
        self.nodes.contains_key(node)
    }

    fn name(&self, node: &NodeId) -> StoreResult<String> {
        Ok(self.node(node)?.name.clone())
    }

    fn parent(&self, node: &NodeId) -> StoreResult<Option<NodeId>> {
        Ok(self.node(node)?.parent.clone())
    }

    fn child_by_name(&self, parent: &NodeId, name: &str) -> StoreResult<Option<NodeId>> {
        let parent = self.node(parent)?;
        Ok(parent
            .children
            .iter()
            .find(|c| self.nodes.get(c).is_some_and(|n| n.name == name))
            .cloned())
    }

    fn create_folder(&mut self, parent: &NodeId, name: &str) -> StoreResult<NodeId> {
        self.insert_child(Node::new(name, Some(parent.clone()), NodeKind::Folder))
    }

    fn move_node(&mut self, node: &NodeId, new_parent: &NodeId) -> StoreResult<()> {
        let (name, old_parent, uid) = {
            let n = self.node(node)?;
            let uid = match &n.kind {
                NodeKind::Event { entry } => Some(entry.uid.clone()),
                _ => None,
            };
            (n.name.clone(), n.parent.clone(), uid)
        };
        self.node(new_parent)?;
        if old_parent.as_ref() == Some(new_parent) {
            return Ok(());
        }
        let mut ancestor = Some(new_parent.clone());
        while let Some(id) = ancestor {
            if &id == node {
                return Err(StoreError::Other(format!(
                    "cannot move {} into itself or its descendant {}",
                    node, new_parent
                )));
            }
            ancestor = self.node(&id)?.parent.clone();
        }
        self.ensure_name_free(new_parent, &name)?;

        if let Some(old) = &old_parent {
            self.node_mut(old)?.children.retain(|c| c != node);
            if let Some(uid) = &uid {
                self.index_remove(old, uid, node);
            }
        }
        self.node_mut(new_parent)?.children.push(node.clone());
        self.node_mut(node)?.parent = Some(new_parent.clone());
        if let Some(uid) = uid {
            self.index_insert(new_parent.clone(), uid, node.clone());
        }
        Ok(())
    }

    fn delete_node(&mut self, node: &NodeId) -> StoreResult<()> {
        let removed = self
            .nodes
            .remove(node)
            .ok_or_else(|| StoreError::NotFound(node.clone()))?;
        if let Some(parent) = &removed.parent {
            if let Some(p) = self.nodes.get_mut(parent) {
                p.children.retain(|c| c != node);
            }
            if let NodeKind::Event { entry } = &removed.kind {
                self.index_remove(parent, &entry.uid, node);
            }
        }
        for child in &removed.children {
            // Children go with their parent.
            let _ = self.delete_node(child);
        }
        self.index.remove(node);
        Ok(())
    }

    fn has_marker(&self, node: &NodeId, marker: &str) -> StoreResult<bool> {
        Ok(self.node(node)?.markers.contains(marker))
    }

    fn property(&self, node: &NodeId, key: &str) -> StoreResult<Option<PropertyValue>> {
        Ok(self.node(node)?.properties.get(key).cloned())
    }

    fn set_property(
        &mut self,
        node: &NodeId,
        key: &str,
        value: PropertyValue,
    ) -> StoreResult<()> {
        self.node_mut(node)?
            .properties
            .insert(key.to_string(), value);
        Ok(())
    }

    fn attachments(&self, email: &NodeId) -> StoreResult<Vec<NodeId>> {
        Ok(self.node(email)?.attachments.clone())
    }

    fn content_type(&self, node: &NodeId) -> StoreResult<Option<String>> {
        Ok(match &self.node(node)?.kind {
            NodeKind::Content { mime_type, .. } => Some(mime_type.clone()),
            _ => None,
        })
    }

    fn read_content(&self, node: &NodeId) -> StoreResult<Vec<u8>> {
        match &self.node(node)?.kind {
            NodeKind::Content { bytes, .. } => Ok(bytes.clone()),
            _ => Err(StoreError::NoContent(node.clone())),
        }
    }

    fn group_of(&self, node: &NodeId) -> StoreResult<Option<String>> {
        let mut current = Some(node.clone());
        while let Some(id) = current {
            if let Some((group, _)) = self.groups.iter().find(|(_, g)| g.root == id) {
                return Ok(Some(group.clone()));
            }
            current = self.node(&id)?.parent.clone();
        }
        Ok(None)
    }

    fn is_group_root(&self, node: &NodeId) -> StoreResult<bool> {
        self.node(node)?;
        Ok(self.groups.values().any(|g| &g.root == node))
    }

    fn group_container(&self, group: &str, component: &str) -> StoreResult<Option<NodeId>> {
        let record = self
            .groups
            .get(group)
            .ok_or_else(|| StoreError::UnknownGroup(group.to_string()))?;
        Ok(record
            .containers
            .get(component)
            .filter(|id| self.nodes.contains_key(*id))
            .cloned())
    }

    fn create_group_container(
        &mut self,
        group: &str,
        component: &str,
        name: &str,
    ) -> StoreResult<NodeId> {
        let root = self
            .groups
            .get(group)
            .map(|g| g.root.clone())
            .ok_or_else(|| StoreError::UnknownGroup(group.to_string()))?;
        let id = self.create_folder(&root, name)?;
        if let Some(record) = self.groups.get_mut(group) {
            record.containers.insert(component.to_string(), id.clone());
        }
        Ok(id)
    }

    fn find_entries(&self, collection: &NodeId, uid: &str) -> StoreResult<Vec<NodeId>> {
        self.node(collection)?;
        Ok(self
            .index
            .get(collection)
            .and_then(|by_uid| by_uid.get(uid))
            .cloned()
            .unwrap_or_default())
    }

    fn entry(&self, node: &NodeId) -> StoreResult<CalendarEntry> {
        match &self.node(node)?.kind {
            NodeKind::Event { entry } => Ok(entry.clone()),
            _ => Err(StoreError::NotAnEntry(node.clone())),
        }
    }

    fn create_entry(
        &mut self,
        collection: &NodeId,
        name: &str,
        entry: CalendarEntry,
    ) -> StoreResult<NodeId> {
        self.insert_child(Node::new(
            name,
            Some(collection.clone()),
            NodeKind::Event { entry },
        ))
    }

    fn update_entry(&mut self, node: &NodeId, entry: CalendarEntry) -> StoreResult<()> {
        let new_uid = entry.uid.clone();
        let n = self.node_mut(node)?;
        let parent = n.parent.clone();
        let NodeKind::Event { entry: current } = &mut n.kind else {
            return Err(StoreError::NotAnEntry(node.clone()));
        };
        let old_uid = std::mem::replace(current, entry).uid;
        if old_uid != new_uid
            && let Some(parent) = parent
        {
            self.index_remove(&parent, &old_uid, node);
            self.index_insert(parent, new_uid, node.clone());
        }
        Ok(())
    }
}
