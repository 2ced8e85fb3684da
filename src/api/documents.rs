//! GraphQL documents for the named queries. Every paged field takes
//! `$first` and `$after` and selects `pageInfo { hasNextPage endCursor }`.

/// A paged GraphQL operation.
#[derive(Debug, Clone, Copy)]
pub struct QueryDocument {
    pub operation: &'static str,
    pub text: &'static str,
    /// Page size sent as `$first` unless the client overrides it.
    pub page_size: u32,
}

pub const TEAMS: QueryDocument = QueryDocument {
    operation: "Teams",
    page_size: 50,
    text: r#"
query Teams($first: Int!, $after: String) {
  teams(first: $first, after: $after) {
    nodes { id name key }
    pageInfo { hasNextPage endCursor }
  }
}"#,
};

pub const TEAM_MEMBERS: QueryDocument = QueryDocument {
    operation: "TeamMembers",
    page_size: 50,
    text: r#"
query TeamMembers($teamId: String!, $first: Int!, $after: String) {
  team(id: $teamId) {
    members(first: $first, after: $after) {
      nodes { id name displayName email avatarUrl active }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#,
};

pub const ISSUES_UPDATED: QueryDocument = QueryDocument {
    operation: "UpdatedIssues",
    page_size: 100,
    text: r#"
query UpdatedIssues($teamId: ID, $gte: DateTimeOrDuration!, $lt: DateTimeOrDuration!, $first: Int!, $after: String) {
  issues(
    filter: { team: { id: { eq: $teamId } }, updatedAt: { gte: $gte, lt: $lt } }
    first: $first
    after: $after
  ) {
    nodes {
      id identifier title url createdAt updatedAt completedAt
      assignee { id name }
      creator { id name }
      state { name type }
    }
    pageInfo { hasNextPage endCursor }
  }
}"#,
};

pub const ISSUES_CREATED: QueryDocument = QueryDocument {
    operation: "CreatedIssues",
    page_size: 100,
    text: r#"
query CreatedIssues($teamId: ID, $gte: DateTimeOrDuration!, $lt: DateTimeOrDuration!, $first: Int!, $after: String) {
  issues(
    filter: { team: { id: { eq: $teamId } }, createdAt: { gte: $gte, lt: $lt } }
    first: $first
    after: $after
  ) {
    nodes {
      id identifier title url createdAt updatedAt completedAt
      assignee { id name }
      creator { id name }
      state { name type }
    }
    pageInfo { hasNextPage endCursor }
  }
}"#,
};

pub const ISSUES_COMPLETED: QueryDocument = QueryDocument {
    operation: "CompletedIssues",
    page_size: 100,
    text: r#"
query CompletedIssues($teamId: ID, $gte: DateTimeOrDuration!, $lt: DateTimeOrDuration!, $first: Int!, $after: String) {
  issues(
    filter: { team: { id: { eq: $teamId } }, completedAt: { gte: $gte, lt: $lt } }
    first: $first
    after: $after
  ) {
    nodes {
      id identifier title url createdAt updatedAt completedAt
      assignee { id name }
      creator { id name }
      state { name type }
    }
    pageInfo { hasNextPage endCursor }
  }
}"#,
};

pub const ISSUE_COMMENTS: QueryDocument = QueryDocument {
    operation: "TeamIssueComments",
    page_size: 100,
    text: r#"
query TeamIssueComments($teamId: ID, $since: DateTimeOrDuration!, $first: Int!, $after: String) {
  issues(
    filter: { team: { id: { eq: $teamId } }, updatedAt: { gte: $since } }
    first: $first
    after: $after
  ) {
    nodes {
      id identifier title url
      comments {
        nodes {
          id body createdAt
          user { id name }
          reactions { user { id } }
        }
      }
    }
    pageInfo { hasNextPage endCursor }
  }
}"#,
};

pub const ISSUE_HISTORY: QueryDocument = QueryDocument {
    operation: "IssueHistory",
    page_size: 50,
    text: r#"
query IssueHistory($issueId: String!, $first: Int!, $after: String) {
  issue(id: $issueId) {
    history(first: $first, after: $after) {
      nodes {
        id createdAt
        actor { id name }
        fromState { name }
        toState { name }
      }
      pageInfo { hasNextPage endCursor }
    }
  }
}"#,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documents_declare_pagination_variables() {
        for doc in [
            TEAMS,
            TEAM_MEMBERS,
            ISSUES_UPDATED,
            ISSUES_CREATED,
            ISSUES_COMPLETED,
            ISSUE_COMMENTS,
            ISSUE_HISTORY,
        ] {
            assert!(
                doc.text.contains(&format!("query {}(", doc.operation)),
                "{} operation name mismatch",
                doc.operation
            );
            assert!(doc.text.contains("$after: String"), "{}", doc.operation);
            assert!(doc.text.contains("$first: Int!"), "{}", doc.operation);
            assert!(doc.text.contains("pageInfo { hasNextPage endCursor }"));
            assert!(doc.page_size > 0);
        }
    }
}
