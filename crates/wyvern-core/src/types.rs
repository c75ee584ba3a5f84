use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Process-unique identity of a flap. Never reused.
    FlapId
);

string_id!(
    /// Identity of one running workflow instance.
    SoarId
);

/// Execution state of a flap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlapState {
    /// Created, parents not yet confirmed done.
    #[default]
    Wait,
    /// Parents confirmed done, timing not started.
    Started,
    /// Timing window active.
    InProgress,
    /// Last attempt failed with a retryable error.
    ErrorRetry,
    Success,
    Failed,
}

impl FlapState {
    /// Success and Failed are terminal.
    pub fn is_completed(self) -> bool {
        matches!(self, FlapState::Success | FlapState::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FlapState::Wait => "wait",
            FlapState::Started => "started",
            FlapState::InProgress => "in_progress",
            FlapState::ErrorRetry => "error_retry",
            FlapState::Success => "success",
            FlapState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for FlapState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FlapState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "wait" => Ok(FlapState::Wait),
            "started" => Ok(FlapState::Started),
            "in_progress" => Ok(FlapState::InProgress),
            "error_retry" => Ok(FlapState::ErrorRetry),
            "success" => Ok(FlapState::Success),
            "failed" => Ok(FlapState::Failed),
            other => Err(format!("unknown flap state: {}", other)),
        }
    }
}

/// Serializable snapshot of a flap, used for persistence and introspection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlapRecord {
    pub id: FlapId,
    pub conf_name: String,
    #[serde(default)]
    pub prev_ids: Vec<FlapId>,
    #[serde(default)]
    pub next_ids: Vec<FlapId>,
    pub state: FlapState,
    pub start: DateTime<Utc>,
    #[serde(default)]
    pub next_awake_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub attempt_retry_count: u32,
    pub plugin: String,
    #[serde(default)]
    pub plugin_config: serde_json::Value,
}

/// Serializable snapshot of a soar (the flaps are stored separately).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoarRecord {
    pub id: SoarId,
    pub name: String,
    pub root_ids: Vec<FlapId>,
    #[serde(default)]
    pub tick_count: u64,
}
