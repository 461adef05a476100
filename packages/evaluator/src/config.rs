use serde::{Deserialize, Serialize};

/// Resource limits applied to every rule body run and every callback invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Maximum nesting of function calls
    pub max_call_depth: usize,

    /// Maximum number of evaluated expressions and statements
    pub max_steps: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_call_depth: 64,
            max_steps: 100_000,
        }
    }
}
