// Simone MCP Server - Tool Registry / Dispatcher
//
// Decouples "what tools exist and how they're described" from "how an
// inbound request gets routed". Dispatch is the isolation boundary: an
// unknown name, a handler error, or a handler panic all come back as a
// structured {content, isError} result — a single bad request must never
// terminate the server.

use crate::activity::ActivityLogger;
use crate::diag;
use crate::error::Error;
use crate::storage::ActivityStore;
use serde_json::{json, Value};
use std::panic::{self, AssertUnwindSafe};

/// Shared context handed to every handler: the storage connection and the
/// logger, injected at construction time. No ambient globals.
pub struct ToolContext<'a> {
    pub store: &'a ActivityStore,
    pub logger: &'a ActivityLogger<'a>,
}

/// Handlers receive typed context plus the raw argument object and return
/// a JSON value (string values pass through as the result text).
pub type Handler = fn(&ToolContext<'_>, &Value) -> Result<Value, Error>;

/// Name, description and input schema exposed through tools/list.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

struct RegisteredTool {
    spec: ToolSpec,
    handler: Handler,
}

/// Structured tool result in MCP shape.
#[derive(Debug)]
pub struct ToolResult {
    pub content: Vec<Value>,
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![json!({"type": "text", "text": text.into()})],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![json!({"type": "text", "text": text.into()})],
            is_error: true,
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "content": self.content, "isError": self.is_error })
    }
}

/// Registration-ordered tool table.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate a tool name with a schema and handler. Re-registering an
    /// existing name overwrites the prior entry (last writer wins) and is
    /// logged as a warning, keeping the original position.
    pub fn register(&mut self, spec: ToolSpec, handler: Handler) {
        if let Some(existing) = self.tools.iter_mut().find(|t| t.spec.name == spec.name) {
            log::warn!("tool {} re-registered, replacing prior handler", spec.name);
            existing.spec = spec;
            existing.handler = handler;
        } else {
            self.tools.push(RegisteredTool { spec, handler });
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// All registered tool schemas, in registration order, for discovery.
    pub fn list_schemas(&self) -> Vec<Value> {
        self.tools
            .iter()
            .map(|t| {
                json!({
                    "name": t.spec.name,
                    "description": t.spec.description,
                    "inputSchema": t.spec.input_schema,
                })
            })
            .collect()
    }

    /// Route one tool call. Never panics and never returns a raw error:
    /// every failure mode becomes an isError result.
    pub fn dispatch(&self, name: &str, args: &Value, ctx: &ToolContext<'_>) -> ToolResult {
        let Some(tool) = self.tools.iter().find(|t| t.spec.name == name) else {
            return ToolResult::error(Error::UnknownTool(name.to_string()).to_string());
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| (tool.handler)(ctx, args)));
        match outcome {
            Ok(Ok(value)) => {
                let text = match value {
                    Value::String(s) => s,
                    other => serde_json::to_string_pretty(&other)
                        .unwrap_or_else(|_| other.to_string()),
                };
                ToolResult::text(text)
            }
            Ok(Err(e)) => ToolResult::error(e.to_string()),
            Err(payload) => {
                let err = Error::HandlerPanic(panic_text(payload));
                diag::error(&format!("{} | {}", name, err));
                ToolResult::error(err.to_string())
            }
        }
    }
}

fn panic_text(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::LogParams;

    fn spec(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: format!("test tool {}", name),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    fn ok_handler(_ctx: &ToolContext<'_>, _args: &Value) -> Result<Value, Error> {
        Ok(Value::String("ok".into()))
    }

    fn other_handler(_ctx: &ToolContext<'_>, _args: &Value) -> Result<Value, Error> {
        Ok(Value::String("other".into()))
    }

    fn failing_handler(_ctx: &ToolContext<'_>, _args: &Value) -> Result<Value, Error> {
        Err(Error::Validation("bad args".into()))
    }

    fn panicking_handler(_ctx: &ToolContext<'_>, _args: &Value) -> Result<Value, Error> {
        panic!("handler exploded");
    }

    fn logging_handler(ctx: &ToolContext<'_>, _args: &Value) -> Result<Value, Error> {
        let logged = ctx.logger.log(LogParams::new("from handler", "test"))?;
        Ok(json!({"id": logged.id}))
    }

    struct Fixture {
        store: ActivityStore,
    }

    impl Fixture {
        fn new() -> Self {
            let store = ActivityStore::open_in_memory().unwrap();
            store.ensure_schema().unwrap();
            Self { store }
        }
    }

    #[test]
    fn unknown_tool_is_structured_error_not_panic() {
        let fx = Fixture::new();
        let logger = ActivityLogger::new(&fx.store);
        let ctx = ToolContext { store: &fx.store, logger: &logger };
        let registry = ToolRegistry::new();
        let result = registry.dispatch("nope", &json!({}), &ctx);
        assert!(result.is_error);
        let text = result.content[0]["text"].as_str().unwrap();
        assert!(text.contains("unknown tool"), "got: {}", text);
    }

    #[test]
    fn handler_panic_is_isolated_and_next_dispatch_works() {
        let fx = Fixture::new();
        let logger = ActivityLogger::new(&fx.store);
        let ctx = ToolContext { store: &fx.store, logger: &logger };
        let mut registry = ToolRegistry::new();
        registry.register(spec("boom"), panicking_handler);
        registry.register(spec("fine"), ok_handler);

        let first = registry.dispatch("boom", &json!({}), &ctx);
        assert!(first.is_error);
        assert!(first.content[0]["text"].as_str().unwrap().contains("panicked"));

        let second = registry.dispatch("fine", &json!({}), &ctx);
        assert!(!second.is_error);
        assert_eq!(second.content[0]["text"], "ok");
    }

    #[test]
    fn handler_error_becomes_result() {
        let fx = Fixture::new();
        let logger = ActivityLogger::new(&fx.store);
        let ctx = ToolContext { store: &fx.store, logger: &logger };
        let mut registry = ToolRegistry::new();
        registry.register(spec("fails"), failing_handler);
        let result = registry.dispatch("fails", &json!({}), &ctx);
        assert!(result.is_error);
        assert!(result.content[0]["text"].as_str().unwrap().contains("invalid input"));
    }

    #[test]
    fn reregistration_overwrites_in_place() {
        let fx = Fixture::new();
        let logger = ActivityLogger::new(&fx.store);
        let ctx = ToolContext { store: &fx.store, logger: &logger };
        let mut registry = ToolRegistry::new();
        registry.register(spec("a"), ok_handler);
        registry.register(spec("b"), ok_handler);
        registry.register(spec("a"), other_handler);

        assert_eq!(registry.len(), 2);
        let names: Vec<String> = registry
            .list_schemas()
            .iter()
            .map(|s| s["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a", "b"], "overwrite keeps registration order");
        let result = registry.dispatch("a", &json!({}), &ctx);
        assert_eq!(result.content[0]["text"], "other");
    }

    #[test]
    fn list_schemas_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        for name in ["one", "two", "three"] {
            registry.register(spec(name), ok_handler);
        }
        let schemas = registry.list_schemas();
        let names: Vec<&str> = schemas.iter().map(|s| s["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
    }

    #[test]
    fn handlers_reach_storage_through_context() {
        let fx = Fixture::new();
        let logger = ActivityLogger::new(&fx.store);
        let ctx = ToolContext { store: &fx.store, logger: &logger };
        let mut registry = ToolRegistry::new();
        registry.register(spec("log"), logging_handler);
        let result = registry.dispatch("log", &json!({}), &ctx);
        assert!(!result.is_error);
        assert_eq!(fx.store.activity_count().unwrap(), 1);
    }
}
