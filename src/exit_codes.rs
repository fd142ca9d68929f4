//! Exit code constants for the skein CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, config/IO problems)
//! - 2: Load-time validation failure (fragments, graph, placeholders)
//! - 3: Workflow execution failure (retries exhausted)
//! - 4: Agent invocation failure surfaced directly

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, unreadable config, or invalid CLI state.
pub const USER_ERROR: i32 = 1;

/// Load-time validation failure: bad fragment, dangling reference, cycle,
/// or unbound template variable.
pub const VALIDATION_FAILURE: i32 = 2;

/// Workflow execution failure: a step exhausted its retries.
pub const WORKFLOW_FAILURE: i32 = 3;

/// Agent invocation failure reported outside the retry machinery.
pub const AGENT_FAILURE: i32 = 4;
