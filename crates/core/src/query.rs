use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    Application, ApplicationId, ApplicationStatus, Principal, PrincipalId, Priority, StageRole,
};
use crate::errors::EngineError;
use crate::permissions::{Action, PermissionGate};
use crate::repository::ApplicationRepository;

const CONTENT_PREVIEW_CHARS: usize = 200;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSummary {
    pub id: ApplicationId,
    pub title: String,
    pub content_preview: String,
    pub amount: Option<Decimal>,
    pub priority: Priority,
    pub status: ApplicationStatus,
    pub current_stage: Option<StageRole>,
    pub current_approver_id: Option<PrincipalId>,
    pub requester_id: PrincipalId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ApplicationSummary {
    pub fn from_application(application: &Application) -> Self {
        let current = application.current_stage();
        Self {
            id: application.id.clone(),
            title: application.title.clone(),
            content_preview: application.content.chars().take(CONTENT_PREVIEW_CHARS).collect(),
            amount: application.amount,
            priority: application.priority,
            status: application.status,
            current_stage: current.map(|stage| stage.role),
            current_approver_id: current.and_then(|stage| stage.approver_id.clone()),
            requester_id: application.requester_id.clone(),
            created_at: application.created_at,
            updated_at: application.updated_at,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatisticsFilter {
    pub status: Option<ApplicationStatus>,
    pub priority: Option<Priority>,
    /// Case-insensitive match against title or content.
    pub keyword: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
}

impl StatisticsFilter {
    pub fn matches(&self, application: &Application) -> bool {
        if self.status.is_some_and(|status| status != application.status) {
            return false;
        }
        if self.priority.is_some_and(|priority| priority != application.priority) {
            return false;
        }
        if self.created_from.is_some_and(|from| application.created_at < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| application.created_at > to) {
            return false;
        }
        match self.keyword.as_deref().map(str::trim).filter(|keyword| !keyword.is_empty()) {
            Some(keyword) => {
                let keyword = keyword.to_lowercase();
                application.title.to_lowercase().contains(&keyword)
                    || application.content.to_lowercase().contains(&keyword)
            }
            None => true,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistics {
    pub total: usize,
    pub draft: usize,
    pub pending: usize,
    pub approved: usize,
    pub rejected: usize,
    pub cancelled: usize,
    pub amount_sum: Decimal,
    pub amount_by_status: BTreeMap<String, Decimal>,
}

impl Statistics {
    /// Folds one consistent snapshot. Applications without an amount count
    /// toward the totals but add nothing to the sums.
    pub fn fold<'a>(applications: impl IntoIterator<Item = &'a Application>) -> Self {
        applications.into_iter().fold(Self::default(), |mut stats, application| {
            stats.total += 1;
            match application.status {
                ApplicationStatus::Draft => stats.draft += 1,
                ApplicationStatus::InReview => stats.pending += 1,
                ApplicationStatus::Approved => stats.approved += 1,
                ApplicationStatus::Rejected => stats.rejected += 1,
                ApplicationStatus::Cancelled => stats.cancelled += 1,
            }
            if let Some(amount) = application.amount {
                stats.amount_sum += amount;
                *stats
                    .amount_by_status
                    .entry(application.status.as_str().to_string())
                    .or_insert(Decimal::ZERO) += amount;
            }
            stats
        })
    }
}

/// Read-only projections over a single repository snapshot.
pub struct QueryService<R> {
    repository: R,
    gate: PermissionGate,
}

impl<R> QueryService<R>
where
    R: ApplicationRepository,
{
    pub fn new(repository: R) -> Self {
        Self { repository, gate: PermissionGate::new() }
    }

    pub async fn all_visible(
        &self,
        principal: &Principal,
    ) -> Result<Vec<ApplicationSummary>, EngineError> {
        self.project(|application| self.is_visible(application, principal)).await
    }

    /// In review and waiting on `principal` specifically.
    pub async fn pending_for(
        &self,
        principal: &Principal,
    ) -> Result<Vec<ApplicationSummary>, EngineError> {
        self.project(|application| application.is_current_approver(&principal.id)).await
    }

    pub async fn decided_by(
        &self,
        principal: &Principal,
    ) -> Result<Vec<ApplicationSummary>, EngineError> {
        self.project(|application| application.has_decided(&principal.id)).await
    }

    pub async fn created_by(
        &self,
        principal: &Principal,
    ) -> Result<Vec<ApplicationSummary>, EngineError> {
        self.project(|application| application.requester_id == principal.id).await
    }

    pub async fn statistics(
        &self,
        principal: &Principal,
        filter: &StatisticsFilter,
    ) -> Result<Statistics, EngineError> {
        let snapshot = self.repository.snapshot().await?;
        Ok(Statistics::fold(snapshot.iter().filter(|application| {
            self.is_visible(application, principal) && filter.matches(application)
        })))
    }

    fn is_visible(&self, application: &Application, principal: &Principal) -> bool {
        self.gate.can_act(application, principal, Action::View).allowed
    }

    async fn project<F>(&self, include: F) -> Result<Vec<ApplicationSummary>, EngineError>
    where
        F: Fn(&Application) -> bool,
    {
        let snapshot = self.repository.snapshot().await?;
        let mut selected: Vec<&Application> =
            snapshot.iter().filter(|application| include(application)).collect();
        selected.sort_by(|left, right| {
            right.created_at.cmp(&left.created_at).then_with(|| left.id.cmp(&right.id))
        });
        Ok(selected.into_iter().map(ApplicationSummary::from_application).collect())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    use super::{QueryService, Statistics, StatisticsFilter};
    use crate::domain::{
        Application, ApplicationId, ApplicationStatus, ApprovalRecord, Decision, Principal,
        PrincipalId, Priority, Role, StageRole, StageSlot,
    };
    use crate::repository::{ApplicationRepository, InMemoryApplicationRepository};

    fn application(
        id: &str,
        requester: &str,
        status: ApplicationStatus,
        amount: Option<i64>,
        age_days: i64,
    ) -> Application {
        let created_at = Utc::now() - Duration::days(age_days);
        Application {
            id: ApplicationId(id.to_string()),
            requester_id: PrincipalId::new(requester),
            title: format!("Request {id}"),
            content: "Tooling for the press line".to_string(),
            amount: amount.map(Decimal::from),
            priority: Priority::Normal,
            skip_manager_stage: true,
            status,
            current_stage_index: 0,
            effective_stages: vec![
                StageSlot::bound(StageRole::FactoryManagerReview, PrincipalId::new("F1")),
                StageSlot::bound(StageRole::DirectorReview, PrincipalId::new("D1")),
                StageSlot::bound(StageRole::CeoReview, PrincipalId::new("C1")),
            ],
            history: Vec::new(),
            reassignments: Vec::new(),
            version: 1,
            created_at,
            updated_at: created_at,
            submitted_at: None,
            completed_at: None,
        }
    }

    fn decided_by_factory_manager(mut app: Application) -> Application {
        app.history.push(ApprovalRecord {
            sequence: 0,
            stage_index: 0,
            stage_role: StageRole::FactoryManagerReview,
            actor_id: PrincipalId::new("F1"),
            decision: Decision::Approved,
            comment: None,
            next_approver_id: None,
            decided_at: Utc::now(),
        });
        app.current_stage_index = 1;
        app
    }

    async fn seeded() -> QueryService<Arc<InMemoryApplicationRepository>> {
        let repo = Arc::new(InMemoryApplicationRepository::default());
        let apps = [
            application("APP-1", "E1", ApplicationStatus::InReview, Some(100), 3),
            decided_by_factory_manager(application(
                "APP-2",
                "E1",
                ApplicationStatus::InReview,
                Some(250),
                2,
            )),
            application("APP-3", "E2", ApplicationStatus::Draft, None, 1),
            decided_by_factory_manager(application(
                "APP-4",
                "E2",
                ApplicationStatus::Approved,
                Some(40),
                0,
            )),
        ];
        for app in apps {
            repo.insert(app).await.expect("insert");
        }
        QueryService::new(repo)
    }

    fn ids(summaries: &[super::ApplicationSummary]) -> Vec<&str> {
        summaries.iter().map(|summary| summary.id.as_str()).collect()
    }

    #[tokio::test]
    async fn pending_lists_only_applications_waiting_on_the_principal() {
        let queries = seeded().await;
        let factory = Principal::new("F1", "Frank", Role::FactoryManager);
        let director = Principal::new("D1", "Dana", Role::Director);

        let pending = queries.pending_for(&factory).await.expect("pending");
        assert_eq!(ids(&pending), vec!["APP-1"]);

        let pending = queries.pending_for(&director).await.expect("pending");
        assert_eq!(ids(&pending), vec!["APP-2"]);
        assert_eq!(pending[0].current_stage, Some(StageRole::DirectorReview));
    }

    #[tokio::test]
    async fn decided_and_mine_views_are_newest_first() {
        let queries = seeded().await;
        let factory = Principal::new("F1", "Frank", Role::FactoryManager);
        let requester = Principal::new("E2", "Eli", Role::Employee);

        let decided = queries.decided_by(&factory).await.expect("decided");
        assert_eq!(ids(&decided), vec!["APP-4", "APP-2"]);

        let mine = queries.created_by(&requester).await.expect("mine");
        assert_eq!(ids(&mine), vec!["APP-4", "APP-3"]);
    }

    #[tokio::test]
    async fn all_visible_hides_other_peoples_drafts() {
        let queries = seeded().await;
        let factory = Principal::new("F1", "Frank", Role::FactoryManager);
        let admin = Principal::new("A1", "Ada", Role::Admin);

        let visible = queries.all_visible(&factory).await.expect("visible");
        assert_eq!(ids(&visible), vec!["APP-4", "APP-2", "APP-1"]);

        let visible = queries.all_visible(&admin).await.expect("visible");
        assert_eq!(visible.len(), 4);
    }

    #[tokio::test]
    async fn statistics_fold_counts_and_sums_over_visible_set() {
        let queries = seeded().await;
        let admin = Principal::new("A1", "Ada", Role::Admin);

        let stats =
            queries.statistics(&admin, &StatisticsFilter::default()).await.expect("statistics");
        assert_eq!(stats.total, 4);
        assert_eq!(stats.draft, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.approved, 1);
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.amount_sum, Decimal::from(390));
        assert_eq!(stats.amount_by_status.get("in_review"), Some(&Decimal::from(350)));

        let requester = Principal::new("E1", "Eve", Role::Employee);
        let stats = queries
            .statistics(&requester, &StatisticsFilter::default())
            .await
            .expect("statistics");
        assert_eq!(stats.total, 2);
        assert_eq!(stats.amount_sum, Decimal::from(350));
    }

    #[tokio::test]
    async fn statistics_filters_narrow_the_fold() {
        let queries = seeded().await;
        let admin = Principal::new("A1", "Ada", Role::Admin);

        let filter = StatisticsFilter {
            status: Some(ApplicationStatus::InReview),
            ..StatisticsFilter::default()
        };
        let stats = queries.statistics(&admin, &filter).await.expect("statistics");
        assert_eq!(stats.total, 2);

        let filter =
            StatisticsFilter { keyword: Some("request app-4".to_string()), ..Default::default() };
        let stats = queries.statistics(&admin, &filter).await.expect("statistics");
        assert_eq!(stats.total, 1);
        assert_eq!(stats.approved, 1);

        let filter = StatisticsFilter {
            created_from: Some(Utc::now() - Duration::hours(36)),
            ..StatisticsFilter::default()
        };
        let stats = queries.statistics(&admin, &filter).await.expect("statistics");
        assert_eq!(stats.total, 2);
    }

    #[test]
    fn summary_truncates_content_preview_on_char_boundaries() {
        let mut app = application("APP-9", "E1", ApplicationStatus::Draft, None, 0);
        app.content = "é".repeat(250);

        let summary = super::ApplicationSummary::from_application(&app);
        assert_eq!(summary.content_preview.chars().count(), 200);
        assert_eq!(summary.current_stage, None);
        assert_eq!(Statistics::fold([&app]).draft, 1);
    }
}
