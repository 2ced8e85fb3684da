pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod date_util;
pub mod error;
pub mod metrics;
pub mod model;
pub mod storage;

use std::sync::Arc;

pub use api::{GraphqlClient, HttpOptions, HttpTransport, LinearApi, Transport};
pub use cache::{CacheKey, ResponseCache};
pub use clock::{Clock, ManualClock, SystemClock};
pub use dashboard::{Dashboard, DashboardRequest, DashboardTotals};
pub use error::{Error, Result};
pub use metrics::{compute_metrics, MemberMetrics, UnresponsiveMention};
pub use model::{Comment, HistoryEntry, Issue, Member, Team};
pub use storage::Database;

/// Main entry point: one team's daily activity, backed by the remote API and
/// the local response cache.
pub struct Linealyzer {
    db: Database,
    api: LinearApi,
    clock: Arc<dyn Clock>,
}

impl Linealyzer {
    pub fn new(db: Database, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let cache = ResponseCache::new(db.clone(), clock.clone());
        let api = LinearApi::new(GraphqlClient::new(transport), cache);
        Self { db, api, clock }
    }

    /// Override the page size of every paged query.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.api = self.api.with_page_size(page_size);
        self
    }

    /// Scope credential-dependent cache entries to one endpoint and token.
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.api = self.api.with_workspace(workspace);
        self
    }

    /// Access the database (for settings in the CLI).
    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn api(&self) -> &LinearApi {
        &self.api
    }

    pub fn cache(&self) -> &ResponseCache {
        self.api.cache()
    }

    pub async fn teams(&self) -> Result<Vec<Team>> {
        self.api.teams().await
    }

    pub async fn issue_history(&self, issue_id: &str) -> Result<Vec<HistoryEntry>> {
        self.api.issue_history(issue_id).await
    }

    /// Fetch members, the day's updated/created/completed issues and the
    /// lookback comments concurrently, then rank per-member metrics.
    ///
    /// The first failing query fails the whole load; nothing partial is returned.
    pub async fn load_dashboard(&self, request: &DashboardRequest) -> Result<Dashboard> {
        let team_id = request.team_id.as_str();
        let range = request.range();
        let since = request.comments_since()?;
        log::info!(
            "Loading dashboard for team {team_id} on {} (comments since {})",
            request.date,
            date_util::to_iso(since)
        );

        let (members, updated, created, completed, comments) = tokio::try_join!(
            self.api.team_members(team_id),
            self.api.issues_updated_in_range(team_id, range),
            self.api.issues_created_in_range(team_id, range),
            self.api.issues_completed_in_range(team_id, range),
            self.api.issue_comments_since(team_id, since),
        )?;
        log::debug!(
            "Fetched {} members, {}/{}/{} updated/created/completed issues, {} comments",
            members.len(),
            updated.len(),
            created.len(),
            completed.len(),
            comments.len()
        );

        let now = self.clock.now();
        let members = compute_metrics(&members, &updated, &created, &completed, &comments, now);

        Ok(Dashboard {
            team_id: request.team_id.clone(),
            date: request.date,
            generated_at: now,
            members,
        })
    }

    /// Load the dashboard and, only if that succeeds, remember its team as
    /// the default for later runs.
    pub async fn load_dashboard_and_select(&self, request: &DashboardRequest) -> Result<Dashboard> {
        let dashboard = self.load_dashboard(request).await?;
        config::set(&self.db, config::TEAM_KEY, &request.team_id).await?;
        Ok(dashboard)
    }
}
