//! Stdio MCP server
//!
//! Reads JSON-RPC requests line-by-line from stdin, dispatches tool calls
//! into the [`AdSense`] facade, and writes responses to stdout. All
//! formatting is thin glue; caching, throttling, and retry live behind
//! the facade.

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, error};

use crate::adsense::AdSense;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION, Tool, rpc_codes};
use crate::upstream::ReportParams;
use crate::{Error, Result};

/// The stdio tool server.
pub struct Server {
    adsense: AdSense,
}

impl Server {
    /// Create a server over a facade.
    #[must_use]
    pub fn new(adsense: AdSense) -> Self {
        Self { adsense }
    }

    /// Serve requests from stdin until EOF.
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut stdout = tokio::io::stdout();
        let mut lines = BufReader::new(stdin).lines();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            if let Some(response) = self.handle_line(&line).await {
                let message = serde_json::to_string(&response)?;
                stdout.write_all(message.as_bytes()).await?;
                stdout.write_all(b"\n").await?;
                stdout.flush().await?;
            }
        }
        debug!("stdin closed, shutting down");
        Ok(())
    }

    /// Handle one raw input line. Returns `None` for notifications.
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcResponse> {
        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "unparseable request");
                return Some(JsonRpcResponse::error(
                    None,
                    rpc_codes::PARSE_ERROR,
                    format!("Parse error: {e}"),
                ));
            }
        };
        self.handle_request(request).await
    }

    /// Handle one request. Notifications (no id) produce no response.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let Some(id) = request.id else {
            debug!(method = %request.method, "notification");
            return None;
        };

        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(
                id,
                json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": { "tools": {} },
                    "serverInfo": {
                        "name": "adsense-mcp",
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            ),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, json!({ "tools": tool_list() })),
            "tools/call" => {
                let params = request.params.unwrap_or_default();
                let name = params.get("name").and_then(Value::as_str).unwrap_or("");
                let arguments = params
                    .get("arguments")
                    .cloned()
                    .unwrap_or_else(|| json!({}));

                match self.call_tool(name, &arguments).await {
                    Ok(result) => JsonRpcResponse::success(
                        id,
                        json!({
                            "content": [{ "type": "text", "text": render(&result) }]
                        }),
                    ),
                    Err(e) => {
                        error!(tool = name, error = %e, "tool call failed");
                        JsonRpcResponse::error(Some(id), e.to_rpc_code(), e.to_string())
                    }
                }
            }
            other => JsonRpcResponse::error(
                Some(id),
                rpc_codes::METHOD_NOT_FOUND,
                format!("Method not found: {other}"),
            ),
        };
        Some(response)
    }

    /// Dispatch a tool call into the facade.
    async fn call_tool(&self, name: &str, args: &Value) -> Result<Value> {
        let account = args.get("accountId").and_then(Value::as_str);

        match name {
            "adsense_list_accounts" => self.adsense.list_accounts().await,
            "adsense_list_sites" => self.adsense.list_sites(account).await,
            "adsense_list_alerts" => self.adsense.list_alerts(account).await,
            "adsense_list_policy_issues" => self.adsense.list_policy_issues(account).await,
            "adsense_list_payments" => self.adsense.list_payments(account).await,
            "adsense_list_ad_clients" => self.adsense.list_ad_clients(account).await,
            "adsense_list_ad_units" => self.adsense.list_ad_units(account).await,
            "adsense_get_ad_code" => {
                let ad_client = args
                    .get("adClientId")
                    .and_then(Value::as_str)
                    .ok_or_else(|| Error::InvalidParams("adClientId is required".to_string()))?;
                self.adsense.get_ad_code(account, ad_client).await
            }
            "adsense_generate_report" => {
                let report = report_params(args)?;
                self.adsense.generate_report(account, report).await
            }
            "adsense_generate_csv_report" => {
                let report = report_params(args)?;
                let csv = self.adsense.generate_csv_report(account, report).await?;
                Ok(Value::String(csv))
            }
            "adsense_earnings_summary" => {
                let summary = self.adsense.earnings_summary(account).await?;
                Ok(serde_json::to_value(summary)?)
            }
            other => Err(Error::InvalidParams(format!("Unknown tool: {other}"))),
        }
    }
}

fn report_params(args: &Value) -> Result<ReportParams> {
    serde_json::from_value(args.clone())
        .map_err(|e| Error::InvalidParams(format!("Invalid report parameters: {e}")))
}

fn render(result: &Value) -> String {
    match result {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

fn account_schema(extra: Value) -> Value {
    let mut properties = json!({
        "accountId": {
            "type": "string",
            "description": "AdSense account (pub-... or accounts/pub-...); defaults to the configured or first account"
        }
    });
    if let (Some(props), Some(extra)) = (properties.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            props.insert(k.clone(), v.clone());
        }
    }
    json!({ "type": "object", "properties": properties })
}

fn tool_list() -> Vec<Tool> {
    let simple = |name: &str, description: &str| Tool {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: account_schema(json!({})),
    };

    let report_schema = account_schema(json!({
        "startDate": {
            "type": "string",
            "description": "YYYY-MM-DD, 'today', or 'yesterday'"
        },
        "endDate": {
            "type": "string",
            "description": "YYYY-MM-DD, 'today', or 'yesterday'"
        },
        "metrics": { "type": "array", "items": { "type": "string" } },
        "dimensions": { "type": "array", "items": { "type": "string" } },
        "limit": { "type": "integer" }
    }));

    vec![
        Tool {
            name: "adsense_list_accounts".to_string(),
            description: "List the AdSense accounts available to the configured credentials"
                .to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        },
        simple("adsense_list_sites", "List sites in an AdSense account"),
        simple("adsense_list_alerts", "List active alerts for an account"),
        simple(
            "adsense_list_policy_issues",
            "List policy issues affecting an account",
        ),
        simple("adsense_list_payments", "List payments for an account"),
        simple("adsense_list_ad_clients", "List ad clients in an account"),
        simple(
            "adsense_list_ad_units",
            "List every ad unit across all ad clients in an account",
        ),
        Tool {
            name: "adsense_get_ad_code".to_string(),
            description: "Get the ad code snippet for an ad client".to_string(),
            input_schema: account_schema(json!({
                "adClientId": { "type": "string", "description": "Ad client id (ca-pub-...)" }
            })),
        },
        Tool {
            name: "adsense_generate_report".to_string(),
            description: "Generate an earnings report over a date range".to_string(),
            input_schema: report_schema.clone(),
        },
        Tool {
            name: "adsense_generate_csv_report".to_string(),
            description: "Generate an earnings report over a date range as CSV".to_string(),
            input_schema: report_schema,
        },
        simple(
            "adsense_earnings_summary",
            "Earnings overview: today, yesterday, last 7 days, month to date, last month",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declares_all_eleven_tools() {
        let tools = tool_list();
        assert_eq!(tools.len(), 11);
        let names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"adsense_list_accounts"));
        assert!(names.contains(&"adsense_generate_csv_report"));
        assert!(names.contains(&"adsense_earnings_summary"));
    }

    #[test]
    fn report_schema_documents_relative_dates() {
        let tools = tool_list();
        let report = tools
            .iter()
            .find(|t| t.name == "adsense_generate_report")
            .unwrap();
        let start = &report.input_schema["properties"]["startDate"]["description"];
        assert!(start.as_str().unwrap().contains("yesterday"));
    }

    #[test]
    fn csv_results_render_verbatim() {
        assert_eq!(render(&Value::String("a,b\n1,2".to_string())), "a,b\n1,2");
    }

    #[test]
    fn report_params_reject_missing_dates() {
        assert!(report_params(&json!({"startDate": "today"})).is_err());
        assert!(report_params(&json!({"startDate": "today", "endDate": "today"})).is_ok());
    }
}
