// Command name constants

pub const COMMAND_DEPOSIT: &str = "deposit";
pub const COMMAND_WITHDRAW: &str = "withdraw";
pub const COMMAND_QUERY: &str = "query";
pub const COMMAND_STATS: &str = "stats";

// Scenario replay
pub const COMMAND_RUN: &str = "run";

pub const DEFAULT_OUTPUT: &str = "output.json";

// Result strings written to the replay output
pub const RESULT_SUCCESS: &str = "success";
pub const RESULT_ERROR: &str = "error";
