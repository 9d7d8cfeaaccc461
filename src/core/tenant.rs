//! Tenant switcher - tracks the named ledgers ("databases") of a backend.
//!
//! Only bookkeeping lives here. Settling in-flight commands, clearing the
//! ledger and reloading after a switch are orchestrated by the session.

use crate::{
    backend::{Backend, TenantList},
    errors::{Error, Result},
};
use tracing::{debug, info, instrument};

/// Known tenant names and the active one, as last reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantSwitcher {
    known: Vec<String>,
    active: Option<String>,
}

impl TenantSwitcher {
    /// Creates a switcher that knows no tenants until the first [`Self::list`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tenant names from the most recent refresh.
    #[must_use]
    pub fn known(&self) -> &[String] {
        &self.known
    }

    #[must_use]
    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    fn apply(&mut self, list: &TenantList) {
        self.known.clone_from(&list.databases);
        self.active = Some(list.active.clone());
    }

    /// Fetches the tenant list from the backend and caches it.
    #[instrument(skip(self, backend))]
    pub async fn list<B: Backend>(&mut self, backend: &B) -> Result<TenantList> {
        let list = backend.list_tenants().await?;
        debug!(count = list.databases.len(), active = %list.active, "tenants listed");
        self.apply(&list);
        Ok(list)
    }

    /// Creates a new empty tenant without activating it.
    #[instrument(skip(self, backend))]
    pub async fn create<B: Backend>(&mut self, backend: &B, name: &str) -> Result<String> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::validation("Database name cannot be empty"));
        }
        self.list(backend).await?;
        if self.known.iter().any(|known| known == name) {
            return Err(Error::validation(format!(
                "Database \"{name}\" already exists"
            )));
        }

        backend.create_tenant(name).await?;
        self.known.push(name.to_string());
        info!(name, "tenant created");
        Ok(name.to_string())
    }

    /// Asks the backend to make `name` the active tenant.
    #[instrument(skip(self, backend))]
    pub async fn switch<B: Backend>(&mut self, backend: &B, name: &str) -> Result<()> {
        self.list(backend).await?;
        if !self.known.iter().any(|known| known == name) {
            return Err(Error::NotFound {
                entity: "Tenant",
                id: name.to_string(),
            });
        }

        backend.switch_tenant(name).await?;
        self.active = Some(name.to_string());
        info!(name, "tenant switched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::backend::{DEFAULT_TENANT, MemoryBackend};

    #[tokio::test]
    async fn test_list_caches_backend_state() -> Result<()> {
        let backend = MemoryBackend::new();
        let mut tenants = TenantSwitcher::new();
        assert_eq!(tenants.active(), None);

        let list = tenants.list(&backend).await?;
        assert_eq!(list.databases, vec![DEFAULT_TENANT]);
        assert_eq!(tenants.active(), Some(DEFAULT_TENANT));
        Ok(())
    }

    #[tokio::test]
    async fn test_create_validates_names() -> Result<()> {
        let backend = MemoryBackend::new();
        let mut tenants = TenantSwitcher::new();

        let err = tenants.create(&backend, "   ").await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let err = tenants.create(&backend, DEFAULT_TENANT).await.unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));

        let created = tenants.create(&backend, " vacation ").await?;
        assert_eq!(created, "vacation");
        assert!(tenants.known().contains(&"vacation".to_string()));
        // Creating does not activate
        assert_eq!(tenants.active(), Some(DEFAULT_TENANT));
        Ok(())
    }

    #[tokio::test]
    async fn test_switch() -> Result<()> {
        let backend = MemoryBackend::new();
        let mut tenants = TenantSwitcher::new();

        let err = tenants.switch(&backend, "nowhere").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { entity: "Tenant", .. }));

        backend.create_tenant("vacation").await?;
        tenants.switch(&backend, "vacation").await?;
        assert_eq!(tenants.active(), Some("vacation"));
        assert_eq!(backend.list_tenants().await?.active, "vacation");
        Ok(())
    }
}
