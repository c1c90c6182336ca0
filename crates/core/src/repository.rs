use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::domain::{Application, ApplicationId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("application `{application_id}` already exists")]
    AlreadyExists { application_id: ApplicationId },
    #[error("application `{application_id}` does not exist")]
    Missing { application_id: ApplicationId },
    #[error(
        "version conflict on `{application_id}`: expected {expected}, found {actual}"
    )]
    VersionConflict { application_id: ApplicationId, expected: u64, actual: u64 },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Durable store of applications and their approval history.
///
/// `compare_and_swap` is the only write path for an existing application: it
/// replaces the stored aggregate if and only if the stored `version` still
/// equals `expected_version`, so two writers racing from the same snapshot
/// cannot both win.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn find_by_id(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;

    async fn insert(&self, application: Application) -> Result<(), RepositoryError>;

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        application: Application,
    ) -> Result<(), RepositoryError>;

    /// Every application as of a single point in time.
    async fn snapshot(&self) -> Result<Vec<Application>, RepositoryError>;
}

#[async_trait]
impl<R> ApplicationRepository for Arc<R>
where
    R: ApplicationRepository + ?Sized,
{
    async fn find_by_id(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        (**self).find_by_id(id).await
    }

    async fn insert(&self, application: Application) -> Result<(), RepositoryError> {
        (**self).insert(application).await
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        application: Application,
    ) -> Result<(), RepositoryError> {
        (**self).compare_and_swap(expected_version, application).await
    }

    async fn snapshot(&self) -> Result<Vec<Application>, RepositoryError> {
        (**self).snapshot().await
    }
}

#[derive(Default)]
pub struct InMemoryApplicationRepository {
    applications: RwLock<HashMap<String, Application>>,
}

#[async_trait]
impl ApplicationRepository for InMemoryApplicationRepository {
    async fn find_by_id(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let applications = self.applications.read().await;
        Ok(applications.get(&id.0).cloned())
    }

    async fn insert(&self, application: Application) -> Result<(), RepositoryError> {
        let mut applications = self.applications.write().await;
        if applications.contains_key(&application.id.0) {
            return Err(RepositoryError::AlreadyExists { application_id: application.id });
        }
        applications.insert(application.id.0.clone(), application);
        Ok(())
    }

    async fn compare_and_swap(
        &self,
        expected_version: u64,
        application: Application,
    ) -> Result<(), RepositoryError> {
        let mut applications = self.applications.write().await;
        let Some(stored) = applications.get(&application.id.0) else {
            return Err(RepositoryError::Missing { application_id: application.id });
        };

        if stored.version != expected_version {
            return Err(RepositoryError::VersionConflict {
                application_id: application.id.clone(),
                expected: expected_version,
                actual: stored.version,
            });
        }

        applications.insert(application.id.0.clone(), application);
        Ok(())
    }

    async fn snapshot(&self) -> Result<Vec<Application>, RepositoryError> {
        let applications = self.applications.read().await;
        Ok(applications.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{ApplicationRepository, InMemoryApplicationRepository, RepositoryError};
    use crate::domain::{
        Application, ApplicationId, ApplicationStatus, Priority, PrincipalId, StageRole,
        StageSlot,
    };

    fn draft(id: &str) -> Application {
        let now = Utc::now();
        Application {
            id: ApplicationId(id.to_string()),
            requester_id: PrincipalId::new("E1"),
            title: "Forklift service".to_string(),
            content: "Annual maintenance".to_string(),
            amount: None,
            priority: Priority::Normal,
            skip_manager_stage: false,
            status: ApplicationStatus::Draft,
            current_stage_index: 0,
            effective_stages: vec![StageSlot::bound(
                StageRole::FactoryManagerReview,
                PrincipalId::new("F1"),
            )],
            history: Vec::new(),
            reassignments: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            submitted_at: None,
            completed_at: None,
        }
    }

    #[tokio::test]
    async fn insert_rejects_duplicate_ids() {
        let repo = InMemoryApplicationRepository::default();
        repo.insert(draft("APP-1")).await.expect("first insert");

        let error = repo.insert(draft("APP-1")).await.expect_err("duplicate insert");
        assert!(matches!(error, RepositoryError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn compare_and_swap_only_accepts_the_current_version() {
        let repo = InMemoryApplicationRepository::default();
        repo.insert(draft("APP-1")).await.expect("insert");

        let mut first = draft("APP-1");
        first.status = ApplicationStatus::InReview;
        first.version = 1;
        repo.compare_and_swap(0, first.clone()).await.expect("first writer wins");

        let mut second = draft("APP-1");
        second.status = ApplicationStatus::Cancelled;
        second.version = 1;
        let error = repo.compare_and_swap(0, second).await.expect_err("stale writer loses");
        assert_eq!(
            error,
            RepositoryError::VersionConflict {
                application_id: ApplicationId("APP-1".to_string()),
                expected: 0,
                actual: 1,
            }
        );

        let stored = repo.find_by_id(&first.id).await.expect("find").expect("exists");
        assert_eq!(stored.status, ApplicationStatus::InReview);
    }

    #[tokio::test]
    async fn compare_and_swap_requires_an_existing_application() {
        let repo = InMemoryApplicationRepository::default();
        let error = repo.compare_and_swap(0, draft("APP-404")).await.expect_err("missing");
        assert!(matches!(error, RepositoryError::Missing { .. }));
    }

    #[tokio::test]
    async fn snapshot_returns_every_application() {
        let repo = InMemoryApplicationRepository::default();
        repo.insert(draft("APP-1")).await.expect("insert 1");
        repo.insert(draft("APP-2")).await.expect("insert 2");

        let snapshot = repo.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.len(), 2);
    }
}
