use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a personal agent can be reached.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentAddress(pub String);

impl AgentAddress {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lookup from a logical agent name to its address.
pub trait AgentRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<AgentAddress>;
    fn names(&self) -> Vec<String>;
}

/// Registry loaded once at startup and read-only afterwards.
#[derive(Clone, Debug, Default)]
pub struct StaticAgentRegistry {
    entries: BTreeMap<String, AgentAddress>,
}

impl StaticAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries<I, N, A>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, A)>,
        N: AsRef<str>,
        A: Into<String>,
    {
        entries.into_iter().fold(Self::new(), |registry, (name, address)| {
            registry.with_agent(name.as_ref(), address)
        })
    }

    pub fn with_agent(mut self, name: &str, address: impl Into<String>) -> Self {
        let key = normalize_agent_name(name);
        if !key.is_empty() {
            self.entries.insert(key, AgentAddress(address.into()));
        }
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl AgentRegistry for StaticAgentRegistry {
    fn resolve(&self, name: &str) -> Option<AgentAddress> {
        self.entries.get(&normalize_agent_name(name)).cloned()
    }

    fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Case-insensitive key without surrounding quotes or a leading `@`.
pub fn normalize_agent_name(name: &str) -> String {
    name.trim()
        .trim_matches(|ch| ch == '\'' || ch == '"')
        .trim_start_matches('@')
        .trim()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{normalize_agent_name, AgentAddress, AgentRegistry, StaticAgentRegistry};

    #[test]
    fn resolves_case_insensitively_and_without_at_sign() {
        let registry = StaticAgentRegistry::from_entries([
            ("Devam", "http://127.0.0.1:8002"),
            ("@parth", "http://127.0.0.1:8003"),
        ]);

        assert_eq!(
            registry.resolve("@DEVAM"),
            Some(AgentAddress("http://127.0.0.1:8002".to_string()))
        );
        assert_eq!(
            registry.resolve("'parth'"),
            Some(AgentAddress("http://127.0.0.1:8003".to_string()))
        );
        assert_eq!(registry.resolve("nobody"), None);
        assert_eq!(registry.names(), vec!["devam".to_string(), "parth".to_string()]);
    }

    #[test]
    fn blank_names_are_not_registered() {
        let registry = StaticAgentRegistry::new().with_agent(" @ ", "http://nowhere");
        assert!(registry.is_empty());
        assert_eq!(normalize_agent_name("  '@Sam'  "), "sam");
    }
}
