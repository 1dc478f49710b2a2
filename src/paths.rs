use std::path::{Path, PathBuf};

/// Layout of the admin data directory.
///
/// ```text
/// <root>/
///   fixtures/pooled/{coaches,locations,clubs}.yaml
///   fixtures/users/<user>/{auth,profile,equipment,memberships,maintenance}.yaml
///   migrations/shared_mappings.yaml
///   migrations/<user>/user_mappings.yaml
///   sessions/<user>/*.csv
/// ```
#[derive(Debug, Clone)]
pub struct AdminPaths {
    root: PathBuf,
}

impl AdminPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pooled_dir(&self) -> PathBuf {
        self.root.join("fixtures").join("pooled")
    }

    pub fn user_dir(&self, user: &str) -> PathBuf {
        self.root.join("fixtures").join("users").join(user)
    }

    pub fn shared_mappings(&self) -> PathBuf {
        self.root.join("migrations").join("shared_mappings.yaml")
    }

    pub fn user_migrations_dir(&self, user: &str) -> PathBuf {
        self.root.join("migrations").join(user)
    }

    pub fn user_mappings(&self, user: &str) -> PathBuf {
        self.user_migrations_dir(user).join("user_mappings.yaml")
    }

    pub fn sessions_dir(&self, user: &str) -> PathBuf {
        self.root.join("sessions").join(user)
    }
}
