//! Storage lanes for page artifacts.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three disjoint namespaces a page artifact can live in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum Lane {
    /// Freshly computed output held in memory by one session.
    Raw,
    /// Disposable, rebuildable optimization cache.
    AutoCache,
    /// Authoritative output written only by an explicit save.
    UserSaved,
}

impl Lane {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Raw => "raw",
            Lane::AutoCache => "auto-cache",
            Lane::UserSaved => "user-saved",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lane_serde_names() {
        assert_eq!(serde_json::to_string(&Lane::AutoCache).unwrap(), "\"auto-cache\"");
        assert_eq!(serde_json::to_string(&Lane::UserSaved).unwrap(), "\"user-saved\"");
        let lane: Lane = serde_json::from_str("\"raw\"").unwrap();
        assert_eq!(lane, Lane::Raw);
        assert_eq!(Lane::UserSaved.to_string(), "user-saved");
    }
}
