//! Agent Card
//!
//! 描述服务身份、能力、技能和支持的 JSON-RPC 方法

use serde::{Deserialize, Serialize};

use super::jsonrpc::methods;

/// A2A 协议版本
pub const PROTOCOL_VERSION: &str = "0.3.0";

/// Agent 能力描述 (Agent Card)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCard {
    pub name: String,
    pub description: String,
    pub url: String,
    pub version: String,
    pub protocol_version: String,
    pub preferred_transport: String,
    pub default_input_modes: Vec<String>,
    pub default_output_modes: Vec<String>,
    pub capabilities: AgentCapabilities,
    pub skills: Vec<AgentSkill>,
    pub signatures: Vec<AgentCardSignature>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentCapabilities {
    pub streaming: bool,
    pub push_notifications: bool,
    pub state_transition_history: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    pub tags: Vec<String>,
    pub examples: Vec<String>,
}

/// 方法签名
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCardSignature {
    pub protected: String,
    pub signature: String,
}

impl AgentCard {
    /// 是否声明了某个方法
    pub fn supports(&self, method: &str) -> bool {
        self.signatures.iter().any(|s| s.signature == method)
    }
}

/// 创建金融问答 Agent 的 Card
pub fn create_agent_card(url: &str) -> AgentCard {
    let skill = AgentSkill {
        id: "expertise".to_string(),
        name: "Financial expertise".to_string(),
        description: "Responds to financial questions".to_string(),
        tags: vec!["finance".to_string(), "purple".to_string()],
        examples: vec![
            "What was Apple's revenue in Q4 2024?".to_string(),
            "Who is the CFO of Microsoft?".to_string(),
        ],
    };

    let signatures = methods::ALL
        .iter()
        .map(|m| AgentCardSignature {
            protected: "false".to_string(),
            signature: m.to_string(),
        })
        .collect();

    AgentCard {
        name: "Finance Purple Agent".to_string(),
        description: "Purple agent for the finance agentic benchmark".to_string(),
        url: url.to_string(),
        version: "0.1.0".to_string(),
        protocol_version: PROTOCOL_VERSION.to_string(),
        preferred_transport: "JSONRPC".to_string(),
        default_input_modes: vec!["text".to_string()],
        default_output_modes: vec!["text".to_string()],
        capabilities: AgentCapabilities {
            streaming: true,
            ..Default::default()
        },
        skills: vec![skill],
        signatures,
    }
}
