// Registration table mapping change notifications to handlers.
use crate::config::Config;
use crate::error::StoreError;
use crate::pipeline::InvitationPipeline;
use crate::provision::GroupProvisioner;
use crate::repository::{NodeId, Repository};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum ChangeKind {
    NodeCreated,
    NodeUpdated,
}

/// Predicate a node must satisfy before a handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Node carries this marker.
    Marker(String),
    /// Node's parent is named exactly this.
    ParentNamed(String),
    GroupRoot,
}

impl Guard {
    pub fn check(&self, repo: &dyn Repository, node: &NodeId) -> Result<bool, StoreError> {
        match self {
            Guard::Marker(marker) => repo.has_marker(node, marker),
            Guard::ParentNamed(name) => match repo.parent(node)? {
                Some(parent) => Ok(&repo.name(&parent)? == name),
                None => Ok(false),
            },
            Guard::GroupRoot => repo.is_group_root(node),
        }
    }
}

/// Returns a one-line summary of what it did.
pub type HandlerFn = Box<dyn Fn(&mut dyn Repository, &NodeId) -> anyhow::Result<String>>;

struct Binding {
    name: String,
    kinds: Vec<ChangeKind>,
    guards: Vec<Guard>,
    handler: HandlerFn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchStatus {
    Handled(String),
    /// At least one guard did not hold.
    Rejected,
    Failed(String),
}

/// What one binding did with a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    pub binding: String,
    pub status: DispatchStatus,
}

#[derive(Default)]
pub struct TriggerTable {
    bindings: Vec<Binding>,
}

impl TriggerTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// The email binding feeds the invitation pipeline once an inbox email
    /// is updated with its attachments; the group binding keeps each group's
    /// inbox provisioned from the moment the group root is created.
    pub fn standard(config: &Config) -> Self {
        let mut table = Self::new();

        let pipeline = InvitationPipeline::new(config);
        table.register(
            "inbound-email",
            &[ChangeKind::NodeUpdated],
            vec![
                Guard::Marker(config.email_marker.clone()),
                Guard::ParentNamed(config.inbox_folder.clone()),
            ],
            Box::new(move |repo: &mut dyn Repository, node: &NodeId| {
                let outcome = pipeline.process_email(repo, node)?;
                Ok(outcome.to_string())
            }),
        );

        let provisioner = GroupProvisioner::new(config);
        table.register(
            "group-inbox",
            &[ChangeKind::NodeCreated, ChangeKind::NodeUpdated],
            vec![Guard::GroupRoot],
            Box::new(move |repo: &mut dyn Repository, node: &NodeId| {
                let group = repo
                    .group_of(node)?
                    .ok_or_else(|| anyhow::anyhow!("{} is not a group root", node))?;
                let inbox = provisioner.ensure_group(repo, &group)?;
                Ok(format!("group {} inbox {}", group, inbox))
            }),
        );

        table
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        kinds: &[ChangeKind],
        guards: Vec<Guard>,
        handler: HandlerFn,
    ) {
        self.bindings.push(Binding {
            name: name.into(),
            kinds: kinds.to_vec(),
            guards,
            handler,
        });
    }

    /// Offers the notification to every binding registered for `kind`, in
    /// registration order. Handler and guard errors are logged and reported,
    /// never propagated.
    pub fn dispatch(
        &self,
        repo: &mut dyn Repository,
        kind: ChangeKind,
        node: &NodeId,
    ) -> Vec<Dispatch> {
        let mut results = Vec::new();
        for binding in self.bindings.iter().filter(|b| b.kinds.contains(&kind)) {
            let status = match guards_hold(&binding.guards, repo, node) {
                Ok(false) => {
                    log::debug!("{} on {}: '{}' guard rejected", kind, node, binding.name);
                    DispatchStatus::Rejected
                }
                Ok(true) => match (binding.handler)(repo, node) {
                    Ok(summary) => {
                        log::debug!("{} on {}: '{}' handled: {}", kind, node, binding.name, summary);
                        DispatchStatus::Handled(summary)
                    }
                    Err(e) => {
                        log::error!("{} on {}: '{}' failed: {:#}", kind, node, binding.name, e);
                        DispatchStatus::Failed(format!("{:#}", e))
                    }
                },
                Err(e) => {
                    log::error!("{} on {}: '{}' guard failed: {}", kind, node, binding.name, e);
                    DispatchStatus::Failed(e.to_string())
                }
            };
            results.push(Dispatch {
                binding: binding.name.clone(),
                status,
            });
        }
        results
    }
}

fn guards_hold(
    guards: &[Guard],
    repo: &dyn Repository,
    node: &NodeId,
) -> Result<bool, StoreError> {
    for guard in guards {
        if !guard.check(repo, node)? {
            return Ok(false);
        }
    }
    Ok(true)
}
