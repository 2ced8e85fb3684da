use std::collections::BTreeSet;
use std::future::Future;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::documents::{self, QueryDocument};
use super::pagination::{decode, fetch_all, Connection, PageExtractor};
use super::GraphqlClient;
use crate::cache::{CacheKey, ResponseCache, DEFAULT_WORKSPACE};
use crate::date_util::{to_iso, DayRange};
use crate::error::{Error, Result};
use crate::model::{Comment, HistoryEntry, Issue, IssueRef, Member, Team, UserRef};

/// Which timestamp an issue query filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueDateField {
    Updated,
    Created,
    Completed,
}

impl IssueDateField {
    fn document(self) -> &'static QueryDocument {
        match self {
            IssueDateField::Updated => &documents::ISSUES_UPDATED,
            IssueDateField::Created => &documents::ISSUES_CREATED,
            IssueDateField::Completed => &documents::ISSUES_COMPLETED,
        }
    }

    fn cache_key(self, team_id: &str, range: DayRange) -> CacheKey {
        let team_id = team_id.to_string();
        match self {
            IssueDateField::Updated => CacheKey::IssuesUpdated { team_id, range },
            IssueDateField::Created => CacheKey::IssuesCreated { team_id, range },
            IssueDateField::Completed => CacheKey::IssuesCompleted { team_id, range },
        }
    }
}

// ── Extractors ─────────────────────────────────────────────────────

pub struct TeamsPage;

#[derive(Deserialize)]
struct TeamsData {
    teams: Connection<Team>,
}

impl PageExtractor for TeamsPage {
    type Node = Team;

    fn extract(&self, data: Value) -> Result<Connection<Team>> {
        Ok(decode::<TeamsData>(documents::TEAMS.operation, data)?.teams)
    }
}

pub struct TeamMembersPage<'a> {
    pub team_id: &'a str,
}

#[derive(Deserialize)]
struct TeamMembersData {
    team: Option<TeamMembersNode>,
}

#[derive(Deserialize)]
struct TeamMembersNode {
    members: Connection<Member>,
}

impl PageExtractor for TeamMembersPage<'_> {
    type Node = Member;

    fn extract(&self, data: Value) -> Result<Connection<Member>> {
        decode::<TeamMembersData>(documents::TEAM_MEMBERS.operation, data)?
            .team
            .map(|t| t.members)
            .ok_or_else(|| Error::NotFound(format!("team {}", self.team_id)))
    }
}

pub struct IssuesPage;

#[derive(Deserialize)]
struct IssuesData<N> {
    issues: Connection<N>,
}

impl PageExtractor for IssuesPage {
    type Node = Issue;

    fn extract(&self, data: Value) -> Result<Connection<Issue>> {
        Ok(decode::<IssuesData<Issue>>("issues", data)?.issues)
    }
}

/// An issue with its nested comment thread, as returned by the comments query.
#[derive(Debug, Deserialize)]
pub struct IssueWithComments {
    id: String,
    identifier: String,
    title: String,
    url: String,
    comments: CommentList,
}

#[derive(Debug, Deserialize)]
struct CommentList {
    nodes: Vec<RawComment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawComment {
    id: String,
    body: String,
    created_at: DateTime<Utc>,
    user: Option<UserRef>,
    #[serde(default)]
    reactions: Vec<RawReaction>,
}

#[derive(Debug, Deserialize)]
struct RawReaction {
    user: Option<IdOnly>,
}

#[derive(Debug, Deserialize)]
struct IdOnly {
    id: String,
}

impl IssueWithComments {
    /// Flatten the thread into comments carrying a back-reference to this issue.
    fn into_comments(self) -> impl Iterator<Item = Comment> {
        let issue = IssueRef {
            id: self.id,
            identifier: self.identifier,
            title: self.title,
            url: self.url,
        };
        self.comments.nodes.into_iter().map(move |c| Comment {
            id: c.id,
            body: c.body,
            created_at: c.created_at,
            author: c.user,
            reactor_ids: c
                .reactions
                .into_iter()
                .filter_map(|r| r.user.map(|u| u.id))
                .collect::<BTreeSet<_>>(),
            issue: issue.clone(),
        })
    }
}

pub struct IssueCommentsPage;

impl PageExtractor for IssueCommentsPage {
    type Node = IssueWithComments;

    fn extract(&self, data: Value) -> Result<Connection<IssueWithComments>> {
        Ok(decode::<IssuesData<IssueWithComments>>(documents::ISSUE_COMMENTS.operation, data)?.issues)
    }
}

pub struct IssueHistoryPage<'a> {
    pub issue_id: &'a str,
}

#[derive(Deserialize)]
struct IssueHistoryData {
    issue: Option<IssueHistoryNode>,
}

#[derive(Deserialize)]
struct IssueHistoryNode {
    history: Connection<HistoryEntry>,
}

impl PageExtractor for IssueHistoryPage<'_> {
    type Node = HistoryEntry;

    fn extract(&self, data: Value) -> Result<Connection<HistoryEntry>> {
        decode::<IssueHistoryData>(documents::ISSUE_HISTORY.operation, data)?
            .issue
            .map(|i| i.history)
            .ok_or_else(|| Error::NotFound(format!("issue {}", self.issue_id)))
    }
}

// ── Named queries ──────────────────────────────────────────────────

fn vars(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// The named remote queries, each paginated to completion and cached under
/// its own [`CacheKey`].
#[derive(Clone)]
pub struct LinearApi {
    client: GraphqlClient,
    cache: ResponseCache,
    page_size: Option<u32>,
    workspace: String,
}

impl LinearApi {
    pub fn new(client: GraphqlClient, cache: ResponseCache) -> Self {
        Self {
            client,
            cache,
            page_size: None,
            workspace: DEFAULT_WORKSPACE.to_string(),
        }
    }

    /// Scope credential-dependent cache entries, see
    /// [`workspace_fingerprint`](crate::cache::workspace_fingerprint).
    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = workspace.into();
        self
    }

    /// Override every query's default page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// Return the cached value for `key`, or run `fetch` and cache its result.
    async fn cached<T, F>(&self, key: CacheKey, fetch: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send + Sync,
        F: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.cache.get::<T>(&key).await {
            log::info!("Using cached {}", key.to_key());
            return Ok(hit);
        }
        let fresh = fetch.await?;
        self.cache.set(&key, &fresh).await;
        Ok(fresh)
    }

    pub async fn teams(&self) -> Result<Vec<Team>> {
        let key = CacheKey::Teams {
            workspace: self.workspace.clone(),
        };
        self.cached(key, async {
            log::info!("Fetching teams");
            fetch_all(&self.client, &documents::TEAMS, Map::new(), self.page_size, &TeamsPage).await
        })
        .await
    }

    /// Active members of a team. Inactive members are dropped before caching.
    pub async fn team_members(&self, team_id: &str) -> Result<Vec<Member>> {
        let key = CacheKey::TeamMembers {
            team_id: team_id.to_string(),
        };
        self.cached(key, async {
            log::info!("Fetching members of team {team_id}");
            let members = fetch_all(
                &self.client,
                &documents::TEAM_MEMBERS,
                vars(json!({ "teamId": team_id })),
                self.page_size,
                &TeamMembersPage { team_id },
            )
            .await?;
            Ok(members.into_iter().filter(|m| m.active).collect())
        })
        .await
    }

    async fn issues_in_range(
        &self,
        field: IssueDateField,
        team_id: &str,
        range: DayRange,
    ) -> Result<Vec<Issue>> {
        self.cached(field.cache_key(team_id, range), async {
            log::info!("Fetching {field:?} issues for team {team_id}");
            fetch_all(
                &self.client,
                field.document(),
                vars(json!({
                    "teamId": team_id,
                    "gte": to_iso(range.start),
                    "lt": to_iso(range.end),
                })),
                self.page_size,
                &IssuesPage,
            )
            .await
        })
        .await
    }

    pub async fn issues_updated_in_range(&self, team_id: &str, range: DayRange) -> Result<Vec<Issue>> {
        self.issues_in_range(IssueDateField::Updated, team_id, range).await
    }

    pub async fn issues_created_in_range(&self, team_id: &str, range: DayRange) -> Result<Vec<Issue>> {
        self.issues_in_range(IssueDateField::Created, team_id, range).await
    }

    pub async fn issues_completed_in_range(
        &self,
        team_id: &str,
        range: DayRange,
    ) -> Result<Vec<Issue>> {
        self.issues_in_range(IssueDateField::Completed, team_id, range).await
    }

    /// Comments on every team issue updated since `since`, flattened out of
    /// their threads.
    pub async fn issue_comments_since(
        &self,
        team_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Comment>> {
        let key = CacheKey::CommentsSince {
            team_id: team_id.to_string(),
            since,
        };
        self.cached(key, async {
            log::info!("Fetching comments for team {team_id} since {}", to_iso(since));
            let issues = fetch_all(
                &self.client,
                &documents::ISSUE_COMMENTS,
                vars(json!({ "teamId": team_id, "since": to_iso(since) })),
                self.page_size,
                &IssueCommentsPage,
            )
            .await?;
            Ok(issues
                .into_iter()
                .flat_map(IssueWithComments::into_comments)
                .collect())
        })
        .await
    }

    /// State history of one issue. Not cached.
    pub async fn issue_history(&self, issue_id: &str) -> Result<Vec<HistoryEntry>> {
        fetch_all(
            &self.client,
            &documents::ISSUE_HISTORY,
            vars(json!({ "issueId": issue_id })),
            self.page_size,
            &IssueHistoryPage { issue_id },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, NaiveDate, TimeZone};

    use super::*;
    use crate::api::testing::{page, ScriptedTransport};
    use crate::cache::DEFAULT_TTL_SECS;
    use crate::clock::ManualClock;
    use crate::date_util::day_range;
    use crate::storage::Database;

    async fn api() -> (LinearApi, Arc<ScriptedTransport>, Arc<ManualClock>) {
        let db = Database::open_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 1, 15, 12, 0, 0).unwrap(),
        ));
        let transport = Arc::new(ScriptedTransport::new());
        let api = LinearApi::new(
            GraphqlClient::new(transport.clone()),
            ResponseCache::new(db, clock.clone()),
        );
        (api, transport, clock)
    }

    fn issue_json(id: &str, identifier: &str) -> Value {
        json!({
            "id": id,
            "identifier": identifier,
            "title": format!("Issue {identifier}"),
            "url": format!("https://linear.app/acme/issue/{identifier}"),
            "createdAt": "2025-01-15T08:00:00.000Z",
            "updatedAt": "2025-01-15T09:00:00.000Z",
            "completedAt": null,
            "assignee": { "id": "u1", "name": "Ada Lovelace" },
            "creator": null,
            "state": { "name": "Todo", "type": "unstarted" }
        })
    }

    #[tokio::test]
    async fn test_teams_cached_after_first_fetch() {
        let (api, transport, _) = api().await;
        transport.push_data(
            "Teams",
            json!({ "teams": page(json!([{ "id": "t1", "name": "Engineering", "key": "ENG" }]), false, None) }),
        );

        let first = api.teams().await.unwrap();
        let second = api.teams().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first[0].key, "ENG");
        assert_eq!(transport.requests_for("Teams").len(), 1);
    }

    #[tokio::test]
    async fn test_teams_refetched_after_ttl() {
        let (api, transport, clock) = api().await;
        let data = json!({ "teams": page(json!([]), false, None) });
        transport.push_data("Teams", data.clone());
        transport.push_data("Teams", data);

        api.teams().await.unwrap();
        clock.advance(Duration::seconds(DEFAULT_TTL_SECS + 1));
        api.teams().await.unwrap();
        assert_eq!(transport.requests_for("Teams").len(), 2);
    }

    #[tokio::test]
    async fn test_teams_scoped_by_workspace() {
        let (api, transport, _) = api().await;
        transport.push_data(
            "Teams",
            json!({ "teams": page(json!([{ "id": "t1", "name": "Engineering", "key": "ENG" }]), false, None) }),
        );
        transport.push_data(
            "Teams",
            json!({ "teams": page(json!([{ "id": "t9", "name": "Design", "key": "DES" }]), false, None) }),
        );

        let first = api.clone().with_workspace("one").teams().await.unwrap();
        let other = api.clone().with_workspace("two").teams().await.unwrap();
        assert_eq!(first[0].id, "t1");
        assert_eq!(other[0].id, "t9");
        assert_eq!(transport.requests_for("Teams").len(), 2);

        let again = api.with_workspace("one").teams().await.unwrap();
        assert_eq!(again, first);
        assert_eq!(transport.requests_for("Teams").len(), 2);
    }

    #[tokio::test]
    async fn test_team_members_filters_inactive() {
        let (api, transport, _) = api().await;
        transport.push_data(
            "TeamMembers",
            json!({ "team": { "members": page(json!([
                { "id": "u1", "name": "Ada Lovelace", "displayName": "ada", "email": "ada@example.com", "avatarUrl": null, "active": true },
                { "id": "u2", "name": "Old Timer", "displayName": "old", "email": "old@example.com", "avatarUrl": null, "active": false }
            ]), false, None) } }),
        );

        let members = api.team_members("t1").await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, "u1");

        let sent = transport.requests_for("TeamMembers");
        assert_eq!(sent[0].variables["teamId"], json!("t1"));
    }

    #[tokio::test]
    async fn test_team_members_unknown_team() {
        let (api, transport, _) = api().await;
        transport.push_data("TeamMembers", json!({ "team": null }));

        let err = api.team_members("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let (api, transport, _) = api().await;
        transport.push_raw("Teams", 500, "boom");
        transport.push_data("Teams", json!({ "teams": page(json!([]), false, None) }));

        assert!(api.teams().await.is_err());
        assert!(api.teams().await.unwrap().is_empty());
        assert_eq!(transport.requests_for("Teams").len(), 2);
    }

    #[tokio::test]
    async fn test_issue_queries_send_range_and_use_distinct_keys() {
        let (api, transport, _) = api().await;
        let d1 = day_range(NaiveDate::from_ymd_opt(2025, 1, 14).unwrap());
        let d2 = day_range(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        transport.push_data("UpdatedIssues", json!({ "issues": page(json!([issue_json("i1", "ENG-1")]), false, None) }));
        transport.push_data("UpdatedIssues", json!({ "issues": page(json!([issue_json("i2", "ENG-2")]), false, None) }));
        transport.push_data("CreatedIssues", json!({ "issues": page(json!([]), false, None) }));

        let a = api.issues_updated_in_range("t1", d1).await.unwrap();
        let b = api.issues_updated_in_range("t1", d2).await.unwrap();
        let c = api.issues_created_in_range("t1", d1).await.unwrap();
        assert_eq!(a[0].id, "i1");
        assert_eq!(b[0].id, "i2");
        assert!(c.is_empty());

        let sent = transport.requests_for("UpdatedIssues");
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].variables["gte"], json!("2025-01-14T00:00:00.000Z"));
        assert_eq!(sent[0].variables["lt"], json!("2025-01-15T00:00:00.000Z"));
        assert_eq!(sent[1].variables["gte"], json!("2025-01-15T00:00:00.000Z"));
        assert_eq!(transport.requests_for("CreatedIssues").len(), 1);
    }

    #[tokio::test]
    async fn test_completed_issues_paginate() {
        let (api, transport, _) = api().await;
        let range = day_range(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap());
        transport.push_data("CompletedIssues", json!({ "issues": page(json!([issue_json("i1", "ENG-1")]), true, Some("c1")) }));
        transport.push_data("CompletedIssues", json!({ "issues": page(json!([issue_json("i2", "ENG-2")]), false, None) }));

        let api = api.with_page_size(1);
        let issues = api.issues_completed_in_range("t1", range).await.unwrap();
        assert_eq!(issues.len(), 2);
        let sent = transport.requests_for("CompletedIssues");
        assert_eq!(sent[0].variables["first"], json!(1));
        assert_eq!(sent[1].variables["after"], json!("c1"));
    }

    #[tokio::test]
    async fn test_comments_flattened_with_issue_backref() {
        let (api, transport, _) = api().await;
        transport.push_data(
            "TeamIssueComments",
            json!({ "issues": page(json!([
                {
                    "id": "i1", "identifier": "ENG-1", "title": "Login", "url": "https://linear.app/acme/issue/ENG-1",
                    "comments": { "nodes": [
                        {
                            "id": "c1", "body": "hey @ada", "createdAt": "2025-01-10T10:00:00.000Z",
                            "user": { "id": "u2", "name": "Bob" },
                            "reactions": [{ "user": { "id": "u1" } }, { "user": { "id": "u3" } }, { "user": null }]
                        },
                        {
                            "id": "c2", "body": "bot message", "createdAt": "2025-01-10T11:00:00.000Z",
                            "user": null, "reactions": []
                        }
                    ] }
                },
                {
                    "id": "i2", "identifier": "ENG-2", "title": "Signup", "url": "https://linear.app/acme/issue/ENG-2",
                    "comments": { "nodes": [] }
                }
            ]), false, None) }),
        );

        let since = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let comments = api.issue_comments_since("t1", since).await.unwrap();
        assert_eq!(comments.len(), 2);
        assert_eq!(comments[0].issue.identifier, "ENG-1");
        assert_eq!(comments[0].author.as_ref().unwrap().id, "u2");
        assert_eq!(
            comments[0].reactor_ids.iter().cloned().collect::<Vec<_>>(),
            vec!["u1".to_string(), "u3".to_string()]
        );
        assert!(comments[1].author.is_none());
        assert_eq!(comments[1].issue.id, "i1");

        let sent = transport.requests_for("TeamIssueComments");
        assert_eq!(sent[0].variables["since"], json!("2025-01-01T00:00:00.000Z"));

        // Served from cache the second time.
        let again = api.issue_comments_since("t1", since).await.unwrap();
        assert_eq!(again, comments);
        assert_eq!(transport.requests_for("TeamIssueComments").len(), 1);
    }

    #[tokio::test]
    async fn test_issue_history_not_cached() {
        let (api, transport, _) = api().await;
        let data = json!({ "issue": { "history": page(json!([
            {
                "id": "h1", "createdAt": "2025-01-10T10:00:00.000Z",
                "actor": { "id": "u1", "name": "Ada" },
                "fromState": { "name": "Todo" }, "toState": { "name": "Done" }
            }
        ]), false, None) } });
        transport.push_data("IssueHistory", data.clone());
        transport.push_data("IssueHistory", data);

        let first = api.issue_history("i1").await.unwrap();
        let second = api.issue_history("i1").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(transport.requests_for("IssueHistory").len(), 2);
        assert_eq!(api.cache().len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_issue_history_unknown_issue() {
        let (api, transport, _) = api().await;
        transport.push_data("IssueHistory", json!({ "issue": null }));
        let err = api.issue_history("nope").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
