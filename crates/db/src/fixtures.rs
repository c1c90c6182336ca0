use countersign_core::domain::{Principal, PrincipalId, Role};
use countersign_core::repository::RepositoryError;

use crate::repositories::{storage_error, SqlPrincipalDirectory};
use crate::DbPool;

/// Deterministic organisation used by demos and end-to-end tests.
///
/// `D1` and `C1` match the `director_approver_id` and `ceo_approver_id`
/// values shipped in the sample configuration.
pub struct DemoSeedDataset;

struct SeedPrincipal {
    id: &'static str,
    display_name: &'static str,
    role: Role,
}

const DEMO_PRINCIPALS: &[SeedPrincipal] = &[
    SeedPrincipal { id: "E1", display_name: "Erin Employee", role: Role::Employee },
    SeedPrincipal { id: "E2", display_name: "Eli Employee", role: Role::Employee },
    SeedPrincipal { id: "F1", display_name: "Farah Factory", role: Role::FactoryManager },
    SeedPrincipal { id: "F2", display_name: "Finn Factory", role: Role::FactoryManager },
    SeedPrincipal { id: "D1", display_name: "Dana Director", role: Role::Director },
    SeedPrincipal { id: "M1", display_name: "Morgan Manager", role: Role::Manager },
    SeedPrincipal { id: "M2", display_name: "Mika Manager", role: Role::Manager },
    SeedPrincipal { id: "C1", display_name: "Casey Chief", role: Role::Ceo },
    SeedPrincipal { id: "A1", display_name: "Alex Admin", role: Role::Admin },
    SeedPrincipal { id: "R1", display_name: "Robin Auditor", role: Role::ReadOnly },
];

impl DemoSeedDataset {
    pub const DIRECTOR_ID: &'static str = "D1";
    pub const CEO_ID: &'static str = "C1";

    pub fn principals() -> Vec<Principal> {
        DEMO_PRINCIPALS
            .iter()
            .map(|seed| Principal::new(seed.id, seed.display_name, seed.role))
            .collect()
    }

    /// Upserts the demo principals. Safe to run repeatedly.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let directory = SqlPrincipalDirectory::new(pool.clone());
        let principals = Self::principals();
        for principal in &principals {
            directory.save(principal).await?;
        }

        Ok(SeedResult { principals_seeded: principals.into_iter().map(|p| p.id).collect() })
    }

    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::with_capacity(DEMO_PRINCIPALS.len());

        for seed in DEMO_PRINCIPALS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM principal WHERE id = ?1 AND role = ?2)",
            )
            .bind(seed.id)
            .bind(seed.role.as_str())
            .fetch_one(pool)
            .await
            .map_err(storage_error)?;
            checks.push((seed.id, present == 1));
        }

        Ok(VerificationResult { all_present: checks.iter().all(|(_, ok)| *ok), checks })
    }

    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await.map_err(storage_error)?;
        for seed in DEMO_PRINCIPALS {
            sqlx::query("DELETE FROM principal WHERE id = ?")
                .bind(seed.id)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }
        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct SeedResult {
    pub principals_seeded: Vec<PrincipalId>,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}

#[cfg(test)]
mod tests {
    use countersign_core::directory::PrincipalDirectory;
    use countersign_core::domain::{PrincipalId, Role};

    use super::DemoSeedDataset;
    use crate::repositories::SqlPrincipalDirectory;
    use crate::{connect_with_settings, migrations};

    #[tokio::test]
    async fn load_is_idempotent_and_verifiable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let before = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(!before.all_present);

        let first = DemoSeedDataset::load(&pool).await.expect("first load");
        DemoSeedDataset::load(&pool).await.expect("second load");
        assert_eq!(first.principals_seeded.len(), DemoSeedDataset::principals().len());

        let after = DemoSeedDataset::verify(&pool).await.expect("verify");
        assert!(after.all_present, "checks: {:?}", after.checks);

        let directory = SqlPrincipalDirectory::new(pool.clone());
        let director = directory
            .lookup(&PrincipalId::new(DemoSeedDataset::DIRECTOR_ID))
            .await
            .expect("lookup")
            .expect("director seeded");
        assert_eq!(director.role, Role::Director);

        DemoSeedDataset::clean(&pool).await.expect("clean");
        assert!(directory.list().await.expect("list").is_empty());
    }
}
