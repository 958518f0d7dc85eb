use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether the wearer is lifting or resting. Determines the capture rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Execution,
    Rest,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Execution => "execution",
            Phase::Rest => "rest",
        }
    }

    pub fn opposite(&self) -> Phase {
        match self {
            Phase::Execution => Phase::Rest,
            Phase::Rest => Phase::Execution,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
