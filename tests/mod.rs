//! Integration tests for dlnacast
//!
//! Tests are organized by component:
//! - server_test: Streaming server (ranges, HEAD, content swaps)
//! - resolver_test: Local files and remote URL probing
//! - registry_test: Discovery feed and searching indicator
//! - session_test: Cast orchestrator state machine and rehydration
//! - poller_test: Position polling lifetime and drag handling
//! - cli_test: Argument parsing, JSON output, exit codes, control commands

// Note: Each test file is a separate integration test crate
// Tests are run individually by cargo, not via mod.rs
