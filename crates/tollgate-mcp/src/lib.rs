//! Tollgate MCP Server
//!
//! Exposes the permission gatekeeper to an automation layer over MCP. The
//! automation side calls `check_permission` before it acts and honors the
//! returned decision; operators can edit the recipient lists and read the
//! audit trail through the remaining tools.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rmcp::{
    ErrorData as McpError, ServerHandler,
    model::*,
    schemars::{self, JsonSchema},
    service::{RequestContext, RoleServer},
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tollgate::{AuditFilter, GateError, Gatekeeper};

/// Parameters for `check_permission`
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CheckParams {
    /// Action kind: send_email, file_operation, run_application,
    /// execute_script, or any other name (which requires confirmation).
    pub action: String,

    /// Action details. send_email: {to, subject, body, attachments};
    /// file_operation: {path}; run_application: {application};
    /// execute_script: {script}.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}

/// Parameters for the whitelist and blacklist tools
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ListItemParams {
    /// The identifier to add or remove (usually an email address)
    pub item: String,
}

/// Parameters for `get_audit_log`
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct AuditLogParams {
    /// Only entries for this action kind
    #[serde(default)]
    pub action: Option<String>,

    /// Only entries at or after this RFC 3339 timestamp
    #[serde(default)]
    pub since: Option<String>,

    /// Only entries with this outcome (pending entries never match)
    #[serde(default)]
    pub allowed: Option<bool>,
}

impl AuditLogParams {
    fn into_filter(self) -> Result<AuditFilter, McpError> {
        let since = self
            .since
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| McpError::invalid_params(format!("Invalid 'since': {}", e), None))
            })
            .transpose()?;
        Ok(AuditFilter {
            action: self.action,
            since,
            allowed: self.allowed,
        })
    }
}

/// Parameters for `get_policy` (none)
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EmptyParams {}

/// MCP Server that answers permission checks via a [`Gatekeeper`]
#[derive(Clone)]
pub struct TollgateServer {
    gate: Arc<Gatekeeper>,
}

impl std::fmt::Debug for TollgateServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TollgateServer").finish_non_exhaustive()
    }
}

impl TollgateServer {
    /// Create a server around an existing gatekeeper.
    pub fn new(gate: Gatekeeper) -> Self {
        Self {
            gate: Arc::new(gate),
        }
    }

    /// The gatekeeper answering requests.
    pub fn gatekeeper(&self) -> &Arc<Gatekeeper> {
        &self.gate
    }

    fn check_permission(&self, params: CheckParams) -> Result<CallToolResult, McpError> {
        let details = params
            .details
            .unwrap_or_else(|| serde_json::Value::Object(serde_json::Map::new()));

        match self.gate.check_permission(params.action, details) {
            Ok(decision) => json_result(&decision.to_record()),
            Err(e @ GateError::RateLimitExceeded { .. }) => {
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }

    async fn mutate_list(&self, tool: &str, item: &str) -> Result<CallToolResult, McpError> {
        let result = match tool {
            "add_to_whitelist" => self.gate.add_to_whitelist(item).await,
            "add_to_blacklist" => self.gate.add_to_blacklist(item).await,
            "remove_from_whitelist" => self.gate.remove_from_whitelist(item).await,
            "remove_from_blacklist" => self.gate.remove_from_blacklist(item).await,
            _ => {
                return Err(McpError::invalid_params(
                    format!("Unknown tool: {}", tool),
                    None,
                ));
            }
        };

        // The in-memory change stands even if it could not be saved.
        result.map_err(|e| {
            McpError::internal_error(format!("List updated but not saved: {}", e), None)
        })?;

        let snapshot = self.gate.store().snapshot();
        json_result(&serde_json::json!({
            "whitelist": snapshot.whitelist,
            "blacklist": snapshot.blacklist,
        }))
    }

    fn tools() -> Vec<Tool> {
        vec![
            tool::<CheckParams>(
                "check_permission",
                "Check Permission",
                "Ask whether an automation action may proceed. Returns {allowed, \
                requiresConfirmation, message, reason, code}. When requiresConfirmation is \
                true the action must wait for a human to confirm. Every call is audited and \
                counts against a per-day limit for its action kind.",
            ),
            tool::<ListItemParams>(
                "add_to_whitelist",
                "Add to Whitelist",
                "Add a recipient to the whitelist. While the whitelist is non-empty, only \
                whitelisted recipients may be emailed.",
            ),
            tool::<ListItemParams>(
                "add_to_blacklist",
                "Add to Blacklist",
                "Add a recipient to the blacklist. Blacklisted recipients are always denied.",
            ),
            tool::<ListItemParams>(
                "remove_from_whitelist",
                "Remove from Whitelist",
                "Remove a recipient from the whitelist.",
            ),
            tool::<ListItemParams>(
                "remove_from_blacklist",
                "Remove from Blacklist",
                "Remove a recipient from the blacklist.",
            ),
            tool::<AuditLogParams>(
                "get_audit_log",
                "Get Audit Log",
                "List recorded permission checks, oldest first, optionally filtered by \
                action, start time and outcome.",
            ),
            tool::<EmptyParams>(
                "get_policy",
                "Get Policy",
                "Show the current permission configuration and recipient lists.",
            ),
        ]
    }
}

fn tool<P: JsonSchema>(name: &'static str, title: &'static str, description: &'static str) -> Tool {
    let schema = schemars::schema_for!(P);
    let schema_json = serde_json::to_value(schema).unwrap_or_default();
    let input_schema = match schema_json {
        serde_json::Value::Object(map) => Arc::new(map),
        _ => Arc::new(serde_json::Map::new()),
    };

    Tool {
        name: name.into(),
        title: Some(title.into()),
        description: Some(description.into()),
        input_schema,
        output_schema: None,
        annotations: None,
        icons: None,
        meta: None,
    }
}

fn json_result<T: Serialize>(value: &T) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}

fn parse_params<P: DeserializeOwned>(
    arguments: &Option<serde_json::Map<String, serde_json::Value>>,
) -> Result<P, McpError> {
    let args = arguments.clone().unwrap_or_default();
    serde_json::from_value(serde_json::Value::Object(args))
        .map_err(|e| McpError::invalid_params(format!("Invalid parameters: {}", e), None))
}

impl ServerHandler for TollgateServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Tollgate decides whether desktop automation actions may run. Call \
                'check_permission' before sending email, touching files, launching \
                applications or running scripts, and do not proceed when 'allowed' is false. \
                When 'requiresConfirmation' is true, ask the user first."
                    .into(),
            ),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let name: &str = request.name.as_ref();
        match name {
            "check_permission" => self.check_permission(parse_params(&request.arguments)?),
            "add_to_whitelist" | "add_to_blacklist" | "remove_from_whitelist"
            | "remove_from_blacklist" => {
                let params: ListItemParams = parse_params(&request.arguments)?;
                self.mutate_list(name, &params.item).await
            }
            "get_audit_log" => {
                let params: AuditLogParams = parse_params(&request.arguments)?;
                let entries = self.gate.audit_log(&params.into_filter()?);
                json_result(&entries)
            }
            "get_policy" => json_result(&self.gate.store().snapshot()),
            _ => Err(McpError::invalid_params(
                format!("Unknown tool: {}", request.name),
                None,
            )),
        }
    }
}
