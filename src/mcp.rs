// Simone MCP Server - MCP Transport (JSON-RPC 2.0 over stdio)
//
// Newline-delimited JSON-RPC on stdin/stdout. stdout carries protocol
// frames only; operator logging goes to stderr, durable diagnostics to
// the .simone/logs/ files.
//
// Exposes: log_activity

use crate::activity::{self, ActivityLogger, LogParams};
use crate::diag;
use crate::error::Error;
use crate::registry::{ToolContext, ToolRegistry, ToolSpec};
use crate::storage::ActivityStore;
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};

const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "simone-mcp";
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Send JSON-RPC response
fn send_response(id: &Value, result: Value) {
    let response = json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    });
    write_frame(&response);
}

/// Send JSON-RPC error response
fn send_error(id: &Value, code: i64, message: &str) {
    let response = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    });
    write_frame(&response);
}

fn write_frame(response: &Value) {
    // Serializing a Value cannot produce invalid JSON; a broken stdout
    // pipe is unrecoverable anyway, so writes are fire-and-forget.
    let msg = serde_json::to_string(response).unwrap_or_default();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = out.write_all(msg.as_bytes());
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

/// MCP tool definition helper
fn tool_def(name: &str, description: &str, properties: Value, required: Vec<&str>) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json!({
            "type": "object",
            "properties": properties,
            "required": required,
        }),
    }
}

fn log_activity_spec() -> ToolSpec {
    tool_def(
        "log_activity",
        "Log a structured activity record: what was done, by which tool, with optional tags and affected files. Append-only.",
        json!({
            "activity": {"type": "string", "description": "Description of the work performed"},
            "tool_name": {"type": "string", "description": "Name of the invoking tool"},
            "activity_type": {"type": "string", "description": "Classification; derived from tool_name when omitted"},
            "success": {"type": "boolean", "description": "Whether the activity succeeded", "default": true},
            "error": {"type": "string", "description": "Error text when success is false"},
            "tags": {"type": "array", "items": {"type": "string"}, "description": "Reusable labels"},
            "context": {"type": "string", "description": "Free-text annotation"},
            "files_affected": {
                "type": "array",
                "items": {"anyOf": [
                    {"type": "string"},
                    {"type": "object", "properties": {
                        "path": {"type": "string"},
                        "operation": {"type": "string", "description": "e.g. created, modified, deleted"}
                    }, "required": ["path"]}
                ]},
                "description": "Paths touched by this activity"
            },
            "issue_number": {"type": "integer", "description": "External tracking issue number"},
            "link": {"type": "string", "description": "Related URL"}
        }),
        vec!["activity", "tool_name"],
    )
}

fn handle_log_activity(ctx: &ToolContext<'_>, args: &Value) -> Result<Value, Error> {
    let params: LogParams = serde_json::from_value(args.clone())
        .map_err(|e| Error::Validation(format!("log_activity: {}", e)))?;
    let logged = ctx.logger.log(params)?;
    Ok(activity::to_result_json(&logged))
}

/// Build the tool registry served over this transport.
pub fn build_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(log_activity_spec(), handle_log_activity);
    registry
}

/// Run the stdio server until stdin closes. One request per line, handled
/// in arrival order; every tool failure is a structured result, so the
/// loop itself only ends at EOF.
pub fn run(store: &ActivityStore) {
    log::info!("starting {} v{}", SERVER_NAME, SERVER_VERSION);

    let logger = ActivityLogger::new(store);
    let registry = build_registry();
    let ctx = ToolContext { store, logger: &logger };

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log::warn!("stdin read error: {}", e);
                continue;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let msg: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                log::warn!("JSON parse error: {}", e);
                continue;
            }
        };

        let method = msg["method"].as_str().unwrap_or("");
        let id = &msg["id"];
        let params = &msg["params"];

        log::debug!("received: {}", method);

        match method {
            "initialize" => {
                send_response(id, json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": SERVER_NAME,
                        "version": SERVER_VERSION,
                    }
                }));
            }

            "notifications/initialized" => {
                // No response needed
            }

            "tools/list" => {
                send_response(id, json!({ "tools": registry.list_schemas() }));
            }

            "tools/call" => {
                let name = params["name"].as_str().unwrap_or("");
                let args = params.get("arguments").cloned().unwrap_or(json!({}));

                let result = registry.dispatch(name, &args, &ctx);
                if result.is_error {
                    let text = result.content[0]["text"].as_str().unwrap_or("");
                    let snippet: String = text.chars().take(200).collect();
                    diag::error(&format!("FAIL {} | {}", name, snippet));
                }

                send_response(id, result.to_json());
            }

            "ping" => {
                send_response(id, json!({}));
            }

            _ => {
                if !id.is_null() {
                    send_error(id, -32601, &format!("Unknown method: {}", method));
                }
            }
        }
    }

    log::info!("stdin closed, shutting down");
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> ActivityStore {
        let store = ActivityStore::open_in_memory().unwrap();
        store.ensure_schema().unwrap();
        store
    }

    #[test]
    fn registry_serves_log_activity_schema() {
        let registry = build_registry();
        let schemas = registry.list_schemas();
        assert_eq!(schemas.len(), 1);
        assert_eq!(schemas[0]["name"], "log_activity");
        let required = schemas[0]["inputSchema"]["required"].as_array().unwrap();
        assert_eq!(required, &vec![json!("activity"), json!("tool_name")]);
    }

    #[test]
    fn log_activity_call_persists_and_echoes() {
        let store = fixture();
        let logger = ActivityLogger::new(&store);
        let ctx = ToolContext { store: &store, logger: &logger };
        let registry = build_registry();

        let args = json!({
            "activity": "Fixed bug",
            "tool_name": "editor",
            "tags": ["bugfix", "urgent"],
            "files_affected": ["src/a.ts", "src/b.ts"],
        });
        let result = registry.dispatch("log_activity", &args, &ctx);
        assert!(!result.is_error, "{:?}", result);

        let echoed: Value =
            serde_json::from_str(result.content[0]["text"].as_str().unwrap()).unwrap();
        assert!(echoed["id"].as_i64().unwrap() > 0);
        assert_eq!(echoed["activity_type"], "general");
        assert_eq!(echoed["tags"].as_array().unwrap().len(), 2);
        assert_eq!(echoed["files_recorded"], 2);
        assert_eq!(store.activity_count().unwrap(), 1);
        assert_eq!(store.file_touch_count().unwrap(), 2);
    }

    #[test]
    fn invalid_log_activity_args_are_reported_not_fatal() {
        let store = fixture();
        let logger = ActivityLogger::new(&store);
        let ctx = ToolContext { store: &store, logger: &logger };
        let registry = build_registry();

        let result = registry.dispatch("log_activity", &json!({"activity": ""}), &ctx);
        assert!(result.is_error);
        assert_eq!(store.activity_count().unwrap(), 0);

        // The server keeps serving after a bad call.
        let ok = registry.dispatch(
            "log_activity",
            &json!({"activity": "works", "tool_name": "editor"}),
            &ctx,
        );
        assert!(!ok.is_error);
        assert_eq!(store.activity_count().unwrap(), 1);
    }
}
