// Simone MCP Server - Library Root
//
// All modules exported here for use by the binary and tests.

pub mod activity;
pub mod diag;
pub mod error;
pub mod mcp;
pub mod paths;
pub mod registry;
pub mod storage;
