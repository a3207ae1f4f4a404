use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Execution capability ("agent type"). Each capability owns one dispatch lane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentType {
    Backend,
    Frontend,
    Test,
    Security,
    Infrastructure,
}

impl AgentType {
    pub const ALL: [AgentType; 5] = [
        AgentType::Backend,
        AgentType::Frontend,
        AgentType::Test,
        AgentType::Security,
        AgentType::Infrastructure,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Backend => "backend",
            Self::Frontend => "frontend",
            Self::Test => "test",
            Self::Security => "security",
            Self::Infrastructure => "infrastructure",
        }
    }

    /// Lane name used by the job transport.
    pub fn lane(self) -> String {
        format!("{}-agent", self.as_str())
    }

    /// Nominal worker count for the lane when config does not override it.
    pub fn default_concurrency(self) -> usize {
        match self {
            Self::Backend | Self::Frontend | Self::Test => 3,
            Self::Security | Self::Infrastructure => 2,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "backend" | "backend_engineer" => Ok(Self::Backend),
            "frontend" | "frontend_engineer" => Ok(Self::Frontend),
            "test" | "test_engineer" => Ok(Self::Test),
            "security" | "security_reviewer" => Ok(Self::Security),
            "infrastructure" | "infrastructure_guardian" => Ok(Self::Infrastructure),
            other => Err(CoreError::validation(format!("unknown capability '{other}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_roster_names() {
        assert_eq!("backend_engineer".parse::<AgentType>().unwrap(), AgentType::Backend);
        assert_eq!(" Security ".parse::<AgentType>().unwrap(), AgentType::Security);
        assert!("designer".parse::<AgentType>().is_err());
    }

    #[test]
    fn lanes_are_distinct() {
        let lanes: std::collections::HashSet<String> =
            AgentType::ALL.iter().map(|a| a.lane()).collect();
        assert_eq!(lanes.len(), AgentType::ALL.len());
    }
}
