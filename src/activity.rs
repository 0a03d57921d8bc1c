// Simone MCP Server - Activity Logger
//
// The single write path for activity data. Validates log_activity input,
// derives activity_type through a pluggable policy, and hands a fully
// normalized record to the store for one atomic insert.

use crate::diag;
use crate::error::{Error, Result};
use crate::storage::{ActivityStore, FileTouch, NewActivity};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Derives an activity_type from a tool name when the caller did not
/// supply one. Pluggable policy; must always return a non-empty value.
pub type TypePolicy = fn(tool_name: &str) -> String;

/// Default policy. The upstream tool-name -> category mapping is a product
/// decision that was never pinned down, so everything falls into "general"
/// until it is.
pub fn default_type_policy(_tool_name: &str) -> String {
    "general".to_string()
}

fn default_true() -> bool {
    true
}

/// Accepted fields of one log_activity call.
#[derive(Debug, Clone, Deserialize)]
pub struct LogParams {
    pub activity: String,
    pub tool_name: String,
    #[serde(default)]
    pub activity_type: Option<String>,
    #[serde(default = "default_true")]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: Option<String>,
    #[serde(default)]
    pub files_affected: Vec<FileAffected>,
    #[serde(default)]
    pub issue_number: Option<i64>,
    #[serde(default)]
    pub link: Option<String>,
}

impl LogParams {
    /// Minimal params for programmatic callers; everything else defaults.
    pub fn new(activity: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            activity: activity.into(),
            tool_name: tool_name.into(),
            activity_type: None,
            success: true,
            error: None,
            tags: Vec::new(),
            context: None,
            files_affected: Vec::new(),
            issue_number: None,
            link: None,
        }
    }
}

/// One affected file: a bare path string, or a path with an operation
/// annotation ("created"/"modified"/"deleted" by convention).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FileAffected {
    Path(String),
    Detailed {
        path: String,
        #[serde(default)]
        operation: Option<String>,
    },
}

impl FileAffected {
    fn into_touch(self) -> FileTouch {
        match self {
            FileAffected::Path(path) => FileTouch { path, operation: None },
            FileAffected::Detailed { path, operation } => FileTouch { path, operation },
        }
    }
}

/// Normalized view of what was actually persisted. Callers use this to
/// confirm storage, since derivation may have changed values.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedActivity {
    pub id: i64,
    pub timestamp: String,
    pub activity: String,
    pub activity_type: String,
    pub tool_name: String,
    pub success: bool,
    pub tags: Vec<String>,
    pub files_recorded: usize,
}

/// Validating front door to the activity store. Shares the store by
/// reference — constructed once at startup, injected into the dispatcher.
pub struct ActivityLogger<'a> {
    store: &'a ActivityStore,
    type_policy: TypePolicy,
}

impl<'a> ActivityLogger<'a> {
    pub fn new(store: &'a ActivityStore) -> Self {
        Self { store, type_policy: default_type_policy }
    }

    pub fn with_type_policy(store: &'a ActivityStore, type_policy: TypePolicy) -> Self {
        Self { store, type_policy }
    }

    /// Validate and persist one activity. On validation failure nothing is
    /// written. On storage failure the caller is told the activity was NOT
    /// logged; the failure also goes to the diagnostic log, best-effort.
    pub fn log(&self, params: LogParams) -> Result<LoggedActivity> {
        let activity = params.activity.trim();
        if activity.is_empty() {
            return Err(Error::Validation("activity must be a non-empty string".into()));
        }
        let tool_name = params.tool_name.trim();
        if tool_name.is_empty() {
            return Err(Error::Validation("tool_name must be a non-empty string".into()));
        }
        if let Some(n) = params.issue_number {
            if n <= 0 {
                return Err(Error::Validation(format!(
                    "issue_number must be a positive integer, got {}",
                    n
                )));
            }
        }

        // Soft invariants: warn, store as given.
        if !params.success && params.error.as_deref().map_or(true, |e| e.trim().is_empty()) {
            log::warn!("activity from {} marked failed without an error message", tool_name);
        }
        if params.success && params.error.is_some() {
            log::warn!("activity from {} marked successful but carries an error", tool_name);
        }

        let activity_type = params
            .activity_type
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| (self.type_policy)(tool_name));

        // Tags are a set: drop empties and duplicates, keep first-seen order.
        let mut tags: Vec<String> = Vec::new();
        for tag in params.tags {
            let tag = tag.trim().to_string();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let files: Vec<FileTouch> = params
            .files_affected
            .into_iter()
            .map(FileAffected::into_touch)
            .collect();

        let rec = NewActivity {
            activity: activity.to_string(),
            activity_type,
            tool_name: tool_name.to_string(),
            success: params.success,
            error: params.error,
            context: params.context,
            issue_number: params.issue_number,
            link: params.link,
            tags,
            files,
        };

        let (id, timestamp) = self.store.insert_activity(&rec).map_err(|e| {
            diag::error(&format!("log_activity write failed ({}): {}", rec.tool_name, e));
            e
        })?;

        Ok(LoggedActivity {
            id,
            timestamp,
            activity: rec.activity,
            activity_type: rec.activity_type,
            tool_name: rec.tool_name,
            success: rec.success,
            tags: rec.tags,
            files_recorded: rec.files.len(),
        })
    }
}

/// JSON view of a logged activity for the tool result.
pub fn to_result_json(logged: &LoggedActivity) -> Value {
    // Serializing this struct cannot fail: plain fields, string keys.
    serde_json::to_value(logged).unwrap_or(Value::Null)
}

// ============================================================================
// TESTS
// ============================================================================
