//! Mock server state management.
//!
//! Provides the in-memory data store for the mock MOLGENIS server.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use crate::{EntityType, FieldType, ImportStatus, Row};

/// A table: its entity type and rows in insertion order.
#[derive(Debug, Clone)]
pub struct MockTable {
    pub meta: EntityType,
    pub rows: Vec<Row>,
}

impl MockTable {
    pub fn new(meta: EntityType) -> Self {
        Self {
            meta,
            rows: Vec::new(),
        }
    }

    /// Name of the identifier attribute.
    pub fn id_attribute(&self) -> Option<&str> {
        self.meta
            .attributes
            .iter()
            .find(|a| a.id_attribute)
            .map(|a| a.name.as_str())
    }

    /// Identifier of a row as a string.
    pub fn row_id(&self, row: &Row) -> Option<String> {
        let id_attribute = self.id_attribute()?;
        row.get(id_attribute).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    pub fn find(&self, id: &str) -> Option<&Row> {
        self.rows
            .iter()
            .find(|row| self.row_id(row).as_deref() == Some(id))
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| self.row_id(row).as_deref() == Some(id))
    }

    /// Names of one-to-many attributes.
    pub fn one_to_many_attributes(&self) -> Vec<&str> {
        self.meta
            .attributes
            .iter()
            .filter(|a| a.field_type == FieldType::OneToMany)
            .map(|a| a.name.as_str())
            .collect()
    }
}

/// A scripted import run.
#[derive(Debug, Clone)]
pub struct MockImportRun {
    /// Statuses returned by successive status checks; the last one repeats.
    pub statuses: VecDeque<ImportStatus>,
    pub message: Option<String>,
    /// Number of status checks served so far.
    pub checks: usize,
}

impl MockImportRun {
    /// Serve the next status.
    pub fn next_status(&mut self) -> ImportStatus {
        self.checks += 1;
        if self.statuses.len() > 1 {
            self.statuses.pop_front().unwrap_or(ImportStatus::Finished)
        } else {
            self.statuses.front().cloned().unwrap_or(ImportStatus::Finished)
        }
    }
}

/// An archive received by the import endpoint.
#[derive(Debug, Clone)]
pub struct MockUpload {
    pub run_id: String,
    pub action: Option<String>,
    pub metadata_action: Option<String>,
    pub body: Vec<u8>,
}

/// A bulk write received on a v2 endpoint.
#[derive(Debug, Clone)]
pub struct BulkRequest {
    /// `POST` for adds, `PUT` for updates.
    pub method: &'static str,
    pub entity: String,
    pub entities: Vec<Row>,
}

/// Shared state for the mock server.
///
/// This struct holds all the mock data that the server will serve.
/// It's wrapped in `Arc<RwLock<_>>` for concurrent access.
#[derive(Debug, Default)]
pub struct MockState {
    /// Tables indexed by entity type id.
    pub tables: BTreeMap<String, MockTable>,

    /// Known users and their passwords.
    pub users: HashMap<String, String>,

    /// Tokens issued by login (or registered up front).
    pub tokens: HashSet<String>,

    /// If set, every data request must carry a valid token.
    pub require_auth: bool,

    /// Import runs indexed by id.
    pub import_runs: HashMap<String, MockImportRun>,

    /// Status script for the next uploaded archive.
    pub next_import: Option<(Vec<ImportStatus>, Option<String>)>,

    /// Archives received, in order.
    pub uploads: Vec<MockUpload>,

    /// Bulk adds and updates received, in order.
    pub bulk_requests: Vec<BulkRequest>,

    issued: u64,
}

impl MockState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create state wrapped in Arc<RwLock> for sharing.
    pub fn shared(self) -> Arc<RwLock<Self>> {
        Arc::new(RwLock::new(self))
    }

    /// Add a table with rows.
    pub fn with_table(mut self, meta: EntityType, rows: Vec<Row>) -> Self {
        let mut table = MockTable::new(meta);
        table.rows = rows;
        self.tables.insert(table.meta.id.clone(), table);
        self
    }

    /// Register a user that can log in.
    pub fn with_user(mut self, username: &str, password: &str) -> Self {
        self.users
            .insert(username.to_string(), password.to_string());
        self
    }

    /// Require a valid token on data requests and accept `token` as one.
    pub fn with_required_token(mut self, token: &str) -> Self {
        self.require_auth = true;
        self.tokens.insert(token.to_string());
        self
    }

    /// Script the statuses of the next import run.
    pub fn with_import_script(mut self, statuses: Vec<ImportStatus>, message: Option<&str>) -> Self {
        self.next_import = Some((statuses, message.map(str::to_string)));
        self
    }

    /// Generate a fresh identifier with the given prefix.
    pub fn issue_id(&mut self, prefix: &str) -> String {
        self.issued += 1;
        format!("{prefix}-{}", self.issued)
    }

    /// Whether a token is currently valid.
    pub fn is_authorized(&self, token: Option<&str>) -> bool {
        !self.require_auth || token.is_some_and(|t| self.tokens.contains(t))
    }

    pub fn table(&self, entity: &str) -> Option<&MockTable> {
        self.tables.get(entity)
    }

    pub fn table_mut(&mut self, entity: &str) -> Option<&mut MockTable> {
        self.tables.get_mut(entity)
    }

    /// Rows of a table matching an optional `attr==value` filter, sorted.
    pub fn query_rows(
        &self,
        entity: &str,
        filter: Option<&str>,
        sort: Option<(&str, bool)>,
    ) -> Option<Vec<&Row>> {
        let table = self.table(entity)?;
        let condition = filter.and_then(|q| q.split_once("=="));

        let mut rows: Vec<&Row> = table
            .rows
            .iter()
            .filter(|row| match condition {
                Some((attribute, expected)) => row
                    .get(attribute)
                    .is_some_and(|v| value_text(v) == expected),
                None => true,
            })
            .collect();

        if let Some((column, descending)) = sort {
            rows.sort_by(|a, b| {
                let ordering = compare_values(a.get(column), b.get(column));
                if descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        Some(rows)
    }
}

/// Text form of a scalar value.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(x), Some(y)) => value_text(x).cmp(&value_text(y)),
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
