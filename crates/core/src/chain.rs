//! Chain kinds: the conversation mode a turn runs under.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainKind {
    /// Plain chat with attached context.
    #[default]
    LlmChain,
    /// Question answering over the vault.
    VaultQa,
    /// Chat with tools and URL fetching.
    CopilotPlus,
    /// Project mode: large fixed context budget.
    Project,
    /// Autonomous agent with tool calling.
    Agent,
}

impl ChainKind {
    /// Whether URLs attached to a turn are fetched and rendered.
    pub fn supports_url_context(&self) -> bool {
        matches!(
            self,
            ChainKind::CopilotPlus | ChainKind::Project | ChainKind::Agent
        )
    }

    /// Project mode uses a fixed compaction threshold instead of the
    /// user-configured one.
    pub fn uses_project_threshold(&self) -> bool {
        matches!(self, ChainKind::Project)
    }
}

impl std::fmt::Display for ChainKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChainKind::LlmChain => "llm_chain",
            ChainKind::VaultQa => "vault_qa",
            ChainKind::CopilotPlus => "copilot_plus",
            ChainKind::Project => "project",
            ChainKind::Agent => "agent",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for ChainKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "llm_chain" | "chat" => Ok(ChainKind::LlmChain),
            "vault_qa" => Ok(ChainKind::VaultQa),
            "copilot_plus" => Ok(ChainKind::CopilotPlus),
            "project" => Ok(ChainKind::Project),
            "agent" => Ok(ChainKind::Agent),
            other => Err(format!(
                "unknown chain kind '{other}' (expected llm_chain, vault_qa, copilot_plus, project or agent)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_support_by_chain() {
        assert!(!ChainKind::LlmChain.supports_url_context());
        assert!(!ChainKind::VaultQa.supports_url_context());
        assert!(ChainKind::CopilotPlus.supports_url_context());
        assert!(ChainKind::Project.supports_url_context());
        assert!(ChainKind::Agent.supports_url_context());
    }

    #[test]
    fn display_matches_serde_name() {
        for chain in [ChainKind::LlmChain, ChainKind::CopilotPlus, ChainKind::Project] {
            let json = serde_json::to_string(&chain).unwrap();
            assert_eq!(json, format!("\"{chain}\""));
        }
    }

    #[test]
    fn parses_cli_spellings() {
        assert_eq!("copilot-plus".parse::<ChainKind>(), Ok(ChainKind::CopilotPlus));
        assert_eq!("Project".parse::<ChainKind>(), Ok(ChainKind::Project));
        assert_eq!("chat".parse::<ChainKind>(), Ok(ChainKind::LlmChain));
        assert!("graph".parse::<ChainKind>().is_err());
    }
}
