//! Snapshots of remote entities. Field names follow the API's camelCase so
//! the same types deserialize from responses and round-trip through the cache.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub avatar_url: Option<String>,
    pub active: bool,
}

/// Lightweight `{id, name}` reference to a user, as embedded in issues and comments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueState {
    pub name: String,
    /// Workflow category, e.g. `started`, `completed`, `canceled`.
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub assignee: Option<UserRef>,
    pub creator: Option<UserRef>,
    pub state: IssueState,
}

/// Back-reference from a comment to the issue whose thread it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub id: String,
    pub identifier: String,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub author: Option<UserRef>,
    /// Ids of members who reacted to this comment.
    #[serde(default)]
    pub reactor_ids: BTreeSet<String>,
    pub issue: IssueRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateName {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub actor: Option<UserRef>,
    pub from_state: Option<StateName>,
    pub to_state: Option<StateName>,
}

impl HistoryEntry {
    /// True when the entry records a workflow state change.
    pub fn is_transition(&self) -> bool {
        self.from_state.is_some() || self.to_state.is_some()
    }
}
