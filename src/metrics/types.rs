use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Issue, Member};

/// Longest comment prefix kept in an [`UnresponsiveMention`].
pub const SNIPPET_CHARS: usize = 120;

/// An @-mention of a member that went unanswered past the response deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnresponsiveMention {
    pub issue_identifier: String,
    pub issue_title: String,
    pub issue_url: String,
    pub mentioned_at: DateTime<Utc>,
    /// First [`SNIPPET_CHARS`] characters of the mentioning comment.
    pub comment_snippet: String,
}

/// One member's activity for the selected day.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberMetrics {
    pub member: Member,
    /// Updated issues assigned to the member.
    pub worked_on: Vec<Issue>,
    /// Issues the member created.
    pub created: Vec<Issue>,
    /// Completed issues assigned to the member.
    pub completed: Vec<Issue>,
    /// Every issue in any of the above, or updated with the member as creator.
    pub interacted: Vec<Issue>,
    pub unresponsive_mentions: Vec<UnresponsiveMention>,
}

impl MemberMetrics {
    /// Ranking score: the sum of the four issue bucket sizes.
    pub fn activity_score(&self) -> usize {
        self.worked_on.len() + self.created.len() + self.completed.len() + self.interacted.len()
    }

    pub fn is_idle(&self) -> bool {
        self.activity_score() == 0 && self.unresponsive_mentions.is_empty()
    }
}
