use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::documents::QueryDocument;
use super::GraphqlClient;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// One page of a paged field: `{nodes, pageInfo}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<N> {
    pub nodes: Vec<N>,
    pub page_info: PageInfo,
}

/// Locates the paged connection inside one response's `data`.
///
/// Each named query supplies its own extractor so the fetch loop stays generic.
pub trait PageExtractor: Send + Sync {
    type Node: Send;

    fn extract(&self, data: Value) -> Result<Connection<Self::Node>>;
}

/// Deserialize a response `data` value into the typed shape an extractor expects.
pub fn decode<T: DeserializeOwned>(operation: &str, data: Value) -> Result<T> {
    serde_json::from_value(data).map_err(|e| Error::Decode(format!("{operation}: {e}")))
}

/// Fetch every page of `document`, following `endCursor` until the remote
/// reports no next page.
///
/// Pages are requested strictly in sequence. Any failure aborts the whole
/// fetch and the pages gathered so far are dropped.
pub async fn fetch_all<E: PageExtractor>(
    client: &GraphqlClient,
    document: &QueryDocument,
    base_variables: Map<String, Value>,
    page_size: Option<u32>,
    extractor: &E,
) -> Result<Vec<E::Node>> {
    let first = page_size.unwrap_or(document.page_size);
    let mut all = Vec::new();
    let mut cursor: Option<String> = None;
    let mut pages: u32 = 0;

    loop {
        let mut variables = base_variables.clone();
        variables.insert("first".into(), Value::from(first));
        variables.insert(
            "after".into(),
            cursor.take().map_or(Value::Null, Value::String),
        );

        let data = client
            .execute(document.operation, document.text, variables)
            .await?;
        let connection = extractor.extract(data)?;
        pages += 1;
        log::debug!(
            "{}: page {pages} returned {} nodes (has_next_page={})",
            document.operation,
            connection.nodes.len(),
            connection.page_info.has_next_page
        );

        all.extend(connection.nodes);
        if !connection.page_info.has_next_page {
            break;
        }
        cursor = connection.page_info.end_cursor;
    }

    Ok(all)
}
