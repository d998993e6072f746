//! Paginated reads from the REST API v2.
//!
//! The server returns at most `num` rows per request and a `nextHref`
//! continuation link when more rows exist. [`Session::get`] follows those
//! links and reassembles the full result set.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::{segment, Session};
use crate::error::{MolgenisError, Result};
use crate::query::{build_api_url, QueryOptions, Sort};
use crate::Row;

/// A page of rows from the v2 API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Link to this collection.
    #[serde(default)]
    pub href: Option<String>,
    /// Index of the first row on this page.
    #[serde(default)]
    pub start: u64,
    /// Requested page size.
    #[serde(default)]
    pub num: u64,
    /// Total number of rows matching the query.
    #[serde(default)]
    pub total: u64,
    /// The rows on this page.
    #[serde(default)]
    pub items: Vec<Row>,
    /// Continuation link, present when more rows exist.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_href: Option<String>,
    /// Link to the previous page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_href: Option<String>,
}

impl Page {
    /// Returns true if there are more rows after this page.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.next_href.is_some()
    }

    /// Returns true if this page has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Returns the number of rows on this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns an iterator over the rows in this page.
    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.items.iter()
    }
}

impl IntoIterator for Page {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a Page {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// Extract the `start` offset from a continuation link.
///
/// The link is usually relative to the server root (`/api/v2/Person?start=200&num=100`).
pub fn continuation_start(base: &Url, next_href: &str) -> Result<u32> {
    let url = base.join(next_href)?;
    url.query_pairs()
        .find(|(key, _)| key == "start")
        .and_then(|(_, value)| value.parse().ok())
        .ok_or_else(|| {
            MolgenisError::InvalidResponse(format!(
                "continuation link without start offset: {next_href}"
            ))
        })
}

impl Session {
    /// Retrieve rows from an entity type, following continuation links.
    ///
    /// Rows are requested in batches of `options.page_size` (default 100)
    /// beginning at `options.start`. With a `limit`, fetching stops once that
    /// many rows have been collected and the result is truncated to it.
    /// A limit of 0 means no limit, like an absent one.
    ///
    /// Without an explicit sort column the identifier attribute is used, so
    /// that successive batches neither overlap nor skip rows.
    ///
    /// # Errors
    ///
    /// Fails if any batch request fails; rows collected so far are discarded.
    #[tracing::instrument(skip(self, options))]
    pub async fn get(
        &self,
        entity: &str,
        options: &QueryOptions,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let limit = limit.filter(|n| *n != 0);
        let mut batch = self.batch_options(entity, options).await?;
        let mut items: Vec<Row> = Vec::new();
        let mut requests = 0usize;

        while limit.map_or(true, |n| items.len() < n) {
            let page = self.get_page(entity, &batch).await?;
            requests += 1;
            items.extend(page.items);

            let Some(next_href) = page.next_href else {
                break;
            };

            let next_start = continuation_start(self.root_url(), &next_href)?;
            if next_start <= batch.start.unwrap_or(0) {
                return Err(MolgenisError::InvalidResponse(format!(
                    "continuation link does not advance past start {next_start}"
                )));
            }
            tracing::debug!(collected = items.len(), next_start, "fetching next batch");
            batch.start = Some(next_start);
        }

        if let Some(n) = limit {
            items.truncate(n);
        }

        tracing::debug!(rows = items.len(), requests, "fetch complete");
        Ok(items)
    }

    /// Retrieve the first batch as the raw response body.
    ///
    /// Use this for server-side pagination metadata such as `total`.
    #[tracing::instrument(skip(self, options))]
    pub async fn get_raw(&self, entity: &str, options: &QueryOptions) -> Result<serde_json::Value> {
        let batch = self.batch_options(entity, options).await?;
        let response = self.send(self.page_request(entity, &batch)?).await?;
        response.json().await.map_err(MolgenisError::HttpError)
    }

    /// Retrieve a single page exactly as described by `options`.
    #[tracing::instrument(skip(self, options))]
    pub async fn get_page(&self, entity: &str, options: &QueryOptions) -> Result<Page> {
        let response = self.send(self.page_request(entity, options)?).await?;
        response.json().await.map_err(MolgenisError::HttpError)
    }

    fn page_request(&self, entity: &str, options: &QueryOptions) -> Result<reqwest::RequestBuilder> {
        let base = self.api_url().join(&format!("v2/{}", segment(entity)))?;
        let url = Url::parse(&build_api_url(base.as_str(), options))?;
        Ok(self.request_url(Method::GET, url))
    }

    /// Fill in the default sort column and batch size.
    async fn batch_options(&self, entity: &str, options: &QueryOptions) -> Result<QueryOptions> {
        let mut batch = options.clone();

        if !options.has_sort_column() {
            let meta = self.get_entity_meta_data(entity).await?;
            let id_attribute = meta.id_attribute.ok_or_else(|| {
                MolgenisError::InvalidResponse(format!("entity type '{entity}' has no idAttribute"))
            })?;
            let order = options.sort.as_ref().and_then(|s| s.order);
            batch.sort = Some(Sort {
                column: id_attribute,
                order,
            });
        }

        batch.page_size = Some(options.effective_page_size());
        Ok(batch)
    }
}
