//! Agent topology builders — one per mode.
//!
//! A topology is the arrangement of agents that serves a turn: which agent
//! the model loop starts with, which tools it sees, and which client shape
//! drives it. The mode↔shape mapping lives in [`client_shape_for`] and
//! nowhere else, so a future client upgrade moves modes across shapes
//! without touching call sites.

use fm_domain::tool::ToolSpec;
use fm_domain::turn::AgentMode;
use fm_llm::ClientShape;
use fm_tools::ToolCatalog;

use super::prompts;

/// One agent in a topology. `tools` are catalog names; `virtual_tools` are
/// control-flow tools (transfer/delegate) the orchestrator intercepts
/// instead of dispatching to an adapter.
#[derive(Debug, Clone)]
pub struct AgentDef {
    pub name: &'static str,
    pub instructions: &'static str,
    pub tools: Vec<String>,
    pub virtual_tools: Vec<ToolSpec>,
}

/// A built topology: the entry agent plus the client shape that drives it.
/// Specialists for the multi-agent modes are resolved by name at transfer
/// or delegation time via [`specialist`].
#[derive(Debug, Clone)]
pub struct Topology {
    pub mode: AgentMode,
    pub entry: AgentDef,
    pub shape: ClientShape,
}

/// The only place mode and client shape are coupled.
///
/// Single-agent modes ride the Responses shape (server-driven tool
/// events); the multi-agent modes need the Chat shape's scheduling.
pub fn client_shape_for(mode: AgentMode) -> ClientShape {
    match mode {
        AgentMode::SqlOnly | AgentMode::MultiTool => ClientShape::Responses,
        AgentMode::Handoff | AgentMode::Magentic => ClientShape::Chat,
    }
}

/// Build the topology for a mode against the registered catalog.
pub fn build(mode: AgentMode, catalog: &ToolCatalog) -> Topology {
    let entry = match mode {
        AgentMode::SqlOnly => AgentDef {
            name: "sql_agent",
            instructions: prompts::instructions("sql_only"),
            tools: vec!["sql_query".into()],
            virtual_tools: Vec::new(),
        },
        AgentMode::MultiTool => AgentDef {
            name: "analytics_agent",
            instructions: prompts::instructions("multi_tool"),
            // Everything registered: the three core adapters plus any
            // discovered analytics tools.
            tools: catalog.names(),
            virtual_tools: Vec::new(),
        },
        AgentMode::Handoff => AgentDef {
            name: "triage_agent",
            instructions: prompts::instructions("handoff_triage"),
            tools: Vec::new(),
            virtual_tools: SPECIALISTS.iter().map(|s| transfer_spec(s)).collect(),
        },
        AgentMode::Magentic => AgentDef {
            name: "manager_agent",
            instructions: prompts::instructions("magentic_manager"),
            tools: Vec::new(),
            virtual_tools: SPECIALISTS.iter().map(|s| delegate_spec(s)).collect(),
        },
    };

    Topology {
        mode,
        entry,
        shape: client_shape_for(mode),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Specialists
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

const SPECIALISTS: &[&str] = &["sql", "doc", "web"];

/// Resolve a specialist agent by short name (`sql`, `doc`, `web`).
pub fn specialist(short: &str) -> Option<AgentDef> {
    match short {
        "sql" => Some(AgentDef {
            name: "sql_specialist",
            instructions: prompts::instructions("sql_specialist"),
            tools: vec!["sql_query".into()],
            virtual_tools: Vec::new(),
        }),
        "doc" => Some(AgentDef {
            name: "doc_specialist",
            instructions: prompts::instructions("doc_specialist"),
            tools: vec!["doc_search".into()],
            virtual_tools: Vec::new(),
        }),
        "web" => Some(AgentDef {
            name: "web_specialist",
            instructions: prompts::instructions("web_specialist"),
            tools: vec!["web_search".into()],
            virtual_tools: Vec::new(),
        }),
        _ => None,
    }
}

fn transfer_spec(short: &str) -> ToolSpec {
    ToolSpec {
        name: format!("transfer_to_{short}_agent"),
        description: format!("Hand the conversation to the {short} specialist."),
        parameters: serde_json::json!({ "type": "object", "properties": {} }),
    }
}

fn delegate_spec(short: &str) -> ToolSpec {
    ToolSpec {
        name: format!("ask_{short}_specialist"),
        description: format!(
            "Delegate a sub-task to the {short} specialist and get its answer back."
        ),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "task": { "type": "string", "description": "The sub-task to answer" }
            },
            "required": ["task"]
        }),
    }
}

/// `transfer_to_sql_agent` → `sql`. None for non-transfer tools.
pub fn transfer_target(tool_name: &str) -> Option<&str> {
    tool_name
        .strip_prefix("transfer_to_")?
        .strip_suffix("_agent")
}

/// `ask_sql_specialist` → `sql`. None for non-delegate tools.
pub fn delegate_target(tool_name: &str) -> Option<&str> {
    tool_name
        .strip_prefix("ask_")?
        .strip_suffix("_specialist")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_shape_mapping() {
        assert_eq!(
            client_shape_for(AgentMode::SqlOnly),
            ClientShape::Responses
        );
        assert_eq!(
            client_shape_for(AgentMode::MultiTool),
            ClientShape::Responses
        );
        assert_eq!(client_shape_for(AgentMode::Handoff), ClientShape::Chat);
        assert_eq!(client_shape_for(AgentMode::Magentic), ClientShape::Chat);
    }

    #[test]
    fn sql_only_sees_only_sql() {
        let topology = build(AgentMode::SqlOnly, &ToolCatalog::new());
        assert_eq!(topology.entry.tools, vec!["sql_query".to_string()]);
        assert!(topology.entry.virtual_tools.is_empty());
    }

    #[test]
    fn triage_has_only_transfer_tools() {
        let topology = build(AgentMode::Handoff, &ToolCatalog::new());
        assert!(topology.entry.tools.is_empty());
        let names: Vec<&str> = topology
            .entry
            .virtual_tools
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(
            names,
            vec![
                "transfer_to_sql_agent",
                "transfer_to_doc_agent",
                "transfer_to_web_agent"
            ]
        );
    }

    #[test]
    fn manager_has_delegate_tools_with_task_param() {
        let topology = build(AgentMode::Magentic, &ToolCatalog::new());
        for tool in &topology.entry.virtual_tools {
            assert!(tool.name.starts_with("ask_"));
            assert_eq!(tool.parameters["required"][0], "task");
        }
    }

    #[test]
    fn transfer_and_delegate_targets_parse() {
        assert_eq!(transfer_target("transfer_to_sql_agent"), Some("sql"));
        assert_eq!(transfer_target("sql_query"), None);
        assert_eq!(delegate_target("ask_web_specialist"), Some("web"));
        assert_eq!(delegate_target("web_search"), None);
    }

    #[test]
    fn specialists_resolve_with_partitioned_tools() {
        let sql = specialist("sql").unwrap();
        assert_eq!(sql.tools, vec!["sql_query".to_string()]);
        let doc = specialist("doc").unwrap();
        assert_eq!(doc.tools, vec!["doc_search".to_string()]);
        assert!(specialist("unknown").is_none());
    }
}
