pub mod types;

pub use types::{MemberMetrics, UnresponsiveMention, SNIPPET_CHARS};

use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Duration, Utc};

use crate::model::{Comment, Issue, Member, UserRef};

/// A mention is unresponsive once this long has passed without a reply or reaction.
pub const RESPONSE_WINDOW_HOURS: i64 = 48;

/// Compute one [`MemberMetrics`] per active member, ranked by descending
/// activity score. Members with equal scores keep their input order.
pub fn compute_metrics(
    members: &[Member],
    updated: &[Issue],
    created: &[Issue],
    completed: &[Issue],
    comments: &[Comment],
    now: DateTime<Utc>,
) -> Vec<MemberMetrics> {
    let mut metrics: Vec<MemberMetrics> = members
        .iter()
        .filter(|m| m.active)
        .map(|member| member_metrics(member, updated, created, completed, comments, now))
        .collect();
    metrics.sort_by_key(|m| Reverse(m.activity_score()));
    metrics
}

fn member_metrics(
    member: &Member,
    updated: &[Issue],
    created: &[Issue],
    completed: &[Issue],
    comments: &[Comment],
    now: DateTime<Utc>,
) -> MemberMetrics {
    let assigned = |issue: &&Issue| is_member(issue.assignee.as_ref(), member);
    let authored = |issue: &&Issue| is_member(issue.creator.as_ref(), member);

    let interacted = unique_issues(
        updated
            .iter()
            .filter(|i| assigned(i) || authored(i))
            .chain(created.iter().filter(authored))
            .chain(completed.iter().filter(assigned)),
    );

    MemberMetrics {
        member: member.clone(),
        worked_on: unique_issues(updated.iter().filter(assigned)),
        created: unique_issues(created.iter().filter(authored)),
        completed: unique_issues(completed.iter().filter(assigned)),
        interacted,
        unresponsive_mentions: find_unresponsive_mentions(member, comments, now),
    }
}

/// Drop repeated issue ids, keeping the first occurrence and the input order.
pub fn unique_issues<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Vec<Issue> {
    let mut seen: HashSet<&'a str> = HashSet::new();
    issues
        .into_iter()
        .filter(|&issue| seen.insert(issue.id.as_str()))
        .cloned()
        .collect()
}

/// A user reference matches a member only on a non-empty, equal id.
fn is_member(user: Option<&UserRef>, member: &Member) -> bool {
    !member.id.is_empty() && user.is_some_and(|u| u.id == member.id)
}

/// Lower-cased `@`-needles for a member: display name, full name, and the
/// first space-separated token of the name. Empty names yield no needle.
fn mention_needles(member: &Member) -> Vec<String> {
    let first_name = member.name.split(' ').next().unwrap_or("");
    [member.display_name.as_str(), member.name.as_str(), first_name]
        .into_iter()
        .filter(|n| !n.is_empty())
        .map(|n| format!("@{}", n.to_lowercase()))
        .collect()
}

/// Case-insensitive substring check for any of the member's mention needles.
pub fn mentions_member(body: &str, member: &Member) -> bool {
    let body = body.to_lowercase();
    mention_needles(member)
        .iter()
        .any(|needle| body.contains(needle.as_str()))
}

/// Mentions of `member` that got neither a reaction from them nor a later
/// comment by them in the same thread, and whose deadline has passed.
/// At most one mention is reported per issue (the earliest found).
pub fn find_unresponsive_mentions(
    member: &Member,
    comments: &[Comment],
    now: DateTime<Utc>,
) -> Vec<UnresponsiveMention> {
    let needles = mention_needles(member);
    if needles.is_empty() {
        return Vec::new();
    }

    // Group by issue, remembering the order issues were first seen.
    let mut issue_order: Vec<&str> = Vec::new();
    let mut threads: HashMap<&str, Vec<&Comment>> = HashMap::new();
    for comment in comments {
        threads
            .entry(comment.issue.id.as_str())
            .or_insert_with(|| {
                issue_order.push(comment.issue.id.as_str());
                Vec::new()
            })
            .push(comment);
    }

    let window = Duration::hours(RESPONSE_WINDOW_HOURS);
    let mut seen_urls: HashSet<&str> = HashSet::new();
    let mut mentions = Vec::new();

    for issue_id in issue_order {
        let mut thread = threads.remove(issue_id).unwrap_or_default();
        thread.sort_by_key(|c| c.created_at);

        for (i, comment) in thread.iter().enumerate() {
            if is_member(comment.author.as_ref(), member) {
                continue;
            }
            let body = comment.body.to_lowercase();
            if !needles.iter().any(|n| body.contains(n.as_str())) {
                continue;
            }

            let reacted = comment.reactor_ids.contains(&member.id);
            let replied = thread[i + 1..]
                .iter()
                .any(|later| is_member(later.author.as_ref(), member));
            let overdue = now > comment.created_at + window;

            if !reacted && !replied && overdue && seen_urls.insert(comment.issue.url.as_str()) {
                mentions.push(UnresponsiveMention {
                    issue_identifier: comment.issue.identifier.clone(),
                    issue_title: comment.issue.title.clone(),
                    issue_url: comment.issue.url.clone(),
                    mentioned_at: comment.created_at,
                    comment_snippet: comment.body.chars().take(SNIPPET_CHARS).collect(),
                });
            }
        }
    }

    mentions
}
