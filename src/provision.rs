// Ensures a group can receive invitations by mail.
use crate::config::Config;
use crate::error::{ProvisionError, StoreError};
use crate::repository::{NodeId, PropertyValue, Repository, props};

#[derive(Debug, Clone)]
pub struct GroupProvisioner {
    inbox_component: String,
    inbox_folder: String,
}

impl GroupProvisioner {
    pub fn new(config: &Config) -> Self {
        Self {
            inbox_component: config.inbox_component.clone(),
            inbox_folder: config.inbox_folder.clone(),
        }
    }

    /// Returns the group's inbox container, creating it if needed, and makes
    /// sure its routing alias equals the group id. Safe to call repeatedly.
    pub fn ensure_group(
        &self,
        repo: &mut dyn Repository,
        group: &str,
    ) -> Result<NodeId, ProvisionError> {
        let store_err = |source: StoreError| ProvisionError::Store {
            group: group.to_string(),
            source,
        };

        let inbox = match repo
            .group_container(group, &self.inbox_component)
            .map_err(store_err)?
        {
            Some(existing) => existing,
            None => {
                let created = repo
                    .create_group_container(group, &self.inbox_component, &self.inbox_folder)
                    .map_err(store_err)?;
                log::info!("Created '{}' container {} for group {}", self.inbox_folder, created, group);
                created
            }
        };

        let alias = repo.property(&inbox, props::ALIAS).map_err(store_err)?;
        if alias.as_ref().and_then(PropertyValue::as_text) != Some(group) {
            repo.set_property(&inbox, props::ALIAS, PropertyValue::Text(group.to_string()))
                .map_err(store_err)?;
            log::info!("Set mail alias '{}' on {}", group, inbox);
        }

        Ok(inbox)
    }
}
