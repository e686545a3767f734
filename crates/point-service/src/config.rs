use serde::Deserialize;

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Balance a user starts with when their first `add` creates the account
    pub initial_points: u32,
}

impl EngineConfig {
    pub const fn with_initial_points(initial_points: u32) -> Self {
        Self { initial_points }
    }
}
