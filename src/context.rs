// Where the host keeps its snapshot, config and log file.
use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::fs;
use std::path::PathBuf;
use strum::Display;

/// The three directories the host writes to. The display name is also the
/// subdirectory used under an explicit root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum DirKind {
    Data,
    Config,
    Cache,
}

/// Resolves host directories. Every returned directory exists.
pub trait AppContext: Send + Sync + std::fmt::Debug {
    fn dir(&self, kind: DirKind) -> Result<PathBuf>;

    fn get_config_file_path(&self) -> Result<PathBuf> {
        Ok(self.dir(DirKind::Config)?.join("config.toml"))
    }

    fn get_repository_path(&self) -> Result<PathBuf> {
        Ok(self.dir(DirKind::Data)?.join("repository.json"))
    }

    fn get_log_file_path(&self) -> Option<PathBuf> {
        self.dir(DirKind::Cache).ok().map(|p| p.join("inbound-invites.log"))
    }
}

fn created(path: PathBuf) -> Result<PathBuf> {
    fs::create_dir_all(&path)
        .with_context(|| format!("Failed to create directory {}", path.display()))?;
    Ok(path)
}

/// Platform directories, or `<root>/{data,config,cache}` when the user passes
/// `--root`.
#[derive(Clone, Debug)]
pub struct StandardContext {
    root: Option<PathBuf>,
}

impl StandardContext {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }
}

impl AppContext for StandardContext {
    fn dir(&self, kind: DirKind) -> Result<PathBuf> {
        if let Some(root) = &self.root {
            return created(root.join(kind.to_string()));
        }
        let project = ProjectDirs::from("com", "inbound-invites", "inbound-invites")
            .ok_or_else(|| anyhow::anyhow!("No home directory to place {} files in", kind))?;
        let path = match kind {
            DirKind::Data => project.data_dir(),
            DirKind::Config => project.config_dir(),
            DirKind::Cache => project.cache_dir(),
        };
        created(path.to_path_buf())
    }
}

/// A throwaway root under the system temp dir, deleted on drop.
#[derive(Clone, Debug)]
pub struct TestContext {
    pub root: PathBuf,
}

impl TestContext {
    pub fn new() -> Self {
        let name = format!("inbound_invites_test_{}", uuid::Uuid::new_v4());
        let root = std::env::temp_dir().join(name);
        fs::create_dir_all(&root).expect("failed to create TestContext temp dir");
        Self { root }
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

impl AppContext for TestContext {
    fn dir(&self, kind: DirKind) -> Result<PathBuf> {
        created(self.root.join(kind.to_string()))
    }
}

impl Drop for TestContext {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.root);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_root_layout() {
        let tmp = TestContext::new();
        let ctx = StandardContext::new(Some(tmp.root.clone()));

        assert_eq!(ctx.dir(DirKind::Data).unwrap(), tmp.root.join("data"));
        assert_eq!(
            ctx.get_config_file_path().unwrap(),
            tmp.root.join("config").join("config.toml")
        );
        let cache = ctx.dir(DirKind::Cache).unwrap();
        assert_eq!(cache, tmp.root.join("cache"));
        assert!(cache.is_dir());
        assert_eq!(
            ctx.get_log_file_path(),
            Some(tmp.root.join("cache").join("inbound-invites.log"))
        );
    }

    #[test]
    fn test_context_removed_on_drop() {
        let root = {
            let ctx = TestContext::new();
            ctx.get_repository_path().unwrap();
            ctx.root.clone()
        };
        assert!(!root.exists());
    }
}
