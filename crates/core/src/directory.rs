use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{Principal, PrincipalId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("principal directory unavailable: {0}")]
    Unavailable(String),
}

/// Externally authoritative id -> role lookup.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    async fn lookup(&self, id: &PrincipalId) -> Result<Option<Principal>, DirectoryError>;
}

#[async_trait]
impl<D> PrincipalDirectory for Arc<D>
where
    D: PrincipalDirectory + ?Sized,
{
    async fn lookup(&self, id: &PrincipalId) -> Result<Option<Principal>, DirectoryError> {
        (**self).lookup(id).await
    }
}

#[derive(Default)]
pub struct InMemoryPrincipalDirectory {
    principals: RwLock<HashMap<String, Principal>>,
}

impl InMemoryPrincipalDirectory {
    pub fn with_principals(principals: Vec<Principal>) -> Self {
        Self {
            principals: RwLock::new(
                principals
                    .into_iter()
                    .map(|principal| (principal.id.0.clone(), principal))
                    .collect(),
            ),
        }
    }

    pub async fn insert(&self, principal: Principal) {
        let mut principals = self.principals.write().await;
        principals.insert(principal.id.0.clone(), principal);
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryPrincipalDirectory {
    async fn lookup(&self, id: &PrincipalId) -> Result<Option<Principal>, DirectoryError> {
        let principals = self.principals.read().await;
        Ok(principals.get(&id.0).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::{InMemoryPrincipalDirectory, PrincipalDirectory};
    use crate::domain::{Principal, PrincipalId, Role};

    #[tokio::test]
    async fn lookup_returns_registered_principals_only() {
        let directory = InMemoryPrincipalDirectory::with_principals(vec![Principal::new(
            "D1",
            "Dana Director",
            Role::Director,
        )]);
        directory.insert(Principal::new("C1", "Casey Chief", Role::Ceo)).await;

        let director = directory.lookup(&PrincipalId::new("D1")).await.expect("lookup");
        assert_eq!(director.map(|principal| principal.role), Some(Role::Director));

        let ceo = directory.lookup(&PrincipalId::new("C1")).await.expect("lookup");
        assert_eq!(ceo.map(|principal| principal.role), Some(Role::Ceo));

        let missing = directory.lookup(&PrincipalId::new("nobody")).await.expect("lookup");
        assert!(missing.is_none());
    }
}
