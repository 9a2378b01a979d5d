//! notify adapter: push messages to the chat and email providers configured
//! in notify's own provider file. Message bodies travel over stdin.

use std::path::PathBuf;
use std::sync::Arc;

use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::CallToolResult;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::instrument;

use super::common::success_result;
use crate::core::process::{CommandRunner, ExternalTool, SuccessPolicy};
use crate::domains::tools::ToolError;
use crate::domains::tools::route::{NoParams, tool_route};

// ============================================================================
// Tool Parameters
// ============================================================================

/// Parameters for `notify-send`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendParams {
    /// Message to send
    pub message: String,

    /// Specific provider ID from config to use
    #[serde(rename = "providerId")]
    pub provider_id: Option<String>,

    /// Enable bulk notification mode
    #[serde(default)]
    pub bulk: bool,

    /// Suppress output
    #[serde(default)]
    pub silent: bool,
}

/// Parameters for `notify-send-bulk`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SendBulkParams {
    /// List of messages to send
    pub messages: Vec<String>,

    /// Specific provider ID to use
    #[serde(rename = "providerId")]
    pub provider_id: Option<String>,

    /// Delay between messages in seconds
    #[serde(default)]
    pub delay: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl Severity {
    fn marker(self) -> &'static str {
        match self {
            Self::Critical => "🔴",
            Self::High => "🟠",
            Self::Medium => "🟡",
            Self::Low => "🔵",
            Self::Info => "⚪",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
            Self::Info => "INFO",
        }
    }
}

/// One finding to report.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct Finding {
    pub severity: Option<Severity>,
    pub title: String,
    pub description: Option<String>,
}

/// Parameters for `notify-scan-results`.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ScanResultsParams {
    /// Name of the security tool (e.g., nuclei, nmap)
    #[serde(rename = "toolName")]
    pub tool_name: String,

    /// Scan target
    pub target: String,

    /// List of findings to report
    pub findings: Vec<Finding>,

    /// Specific provider ID to use
    #[serde(rename = "providerId")]
    pub provider_id: Option<String>,
}

fn provider_args(provider_id: Option<String>) -> Vec<String> {
    provider_id
        .map(|id| vec!["-provider-id".to_string(), id])
        .unwrap_or_default()
}

/// Render findings as a single notification body.
fn scan_report_message(params: &ScanResultsParams) -> String {
    let findings: Vec<String> = params
        .findings
        .iter()
        .map(|f| {
            let (marker, tag) = match f.severity {
                Some(sev) => (sev.marker(), format!("[{}]", sev.label())),
                None => ("📌", String::new()),
            };
            let mut line = format!("{marker} {tag} {}", f.title);
            if let Some(desc) = &f.description {
                line.push_str(&format!("\n   {desc}"));
            }
            line
        })
        .collect();

    format!(
        "🔍 **{} Scan Results**\nTarget: {}\nFindings: {}\n\n{}",
        params.tool_name.to_uppercase(),
        params.target,
        params.findings.len(),
        findings.join("\n\n")
    )
}

// ============================================================================
// Tool Definition
// ============================================================================

pub struct NotifyTools {
    notify: ExternalTool,
}

impl NotifyTools {
    pub const SEND: &'static str = "notify-send";
    pub const SEND_BULK: &'static str = "notify-send-bulk";
    pub const SCAN_RESULTS: &'static str = "notify-scan-results";
    pub const PROVIDERS: &'static str = "notify-providers";

    pub fn new(binary: PathBuf, runner: Arc<CommandRunner>) -> Self {
        Self::with_tool(ExternalTool::new(binary, SuccessPolicy::ExitCodeZero, runner))
    }

    pub fn with_tool(notify: ExternalTool) -> Self {
        Self { notify }
    }

    /// Pipe `input` to notify; an empty stdout becomes `fallback`.
    async fn deliver(
        &self,
        args: Vec<String>,
        input: String,
        fallback: &str,
    ) -> Result<String, ToolError> {
        let spec = self.notify.command(args).stdin(input);
        let output = self.notify.run_spec(spec).await?;
        let text = if output.stdout.trim().is_empty() {
            fallback.to_string()
        } else {
            output.stdout.clone()
        };
        Ok(output.annotate(text))
    }

    #[instrument(skip_all, fields(provider = ?params.provider_id))]
    pub async fn send(self: Arc<Self>, params: SendParams) -> Result<CallToolResult, ToolError> {
        let mut args = provider_args(params.provider_id);
        if params.bulk {
            args.push("-bulk".to_string());
        }
        if params.silent {
            args.push("-silent".to_string());
        }

        let result = self
            .deliver(args, params.message, "Notification sent successfully")
            .await?;
        Ok(success_result(format!("Notification Result:\n{result}")))
    }

    #[instrument(skip_all, fields(count = params.messages.len(), provider = ?params.provider_id))]
    pub async fn send_bulk(
        self: Arc<Self>,
        params: SendBulkParams,
    ) -> Result<CallToolResult, ToolError> {
        let mut args = vec!["-bulk".to_string()];
        args.extend(provider_args(params.provider_id));
        if params.delay > 0 {
            args.extend(["-delay".to_string(), params.delay.to_string()]);
        }

        let count = params.messages.len();
        let result = self
            .deliver(args, params.messages.join("\n"), "Notification sent successfully")
            .await?;
        Ok(success_result(format!(
            "Bulk Notification Result:\nSent {count} messages\n{result}"
        )))
    }

    #[instrument(skip_all, fields(tool = %params.tool_name, target = %params.target))]
    pub async fn scan_results(
        self: Arc<Self>,
        params: ScanResultsParams,
    ) -> Result<CallToolResult, ToolError> {
        let message = scan_report_message(&params);
        let result = self
            .deliver(provider_args(params.provider_id), message, "Success")
            .await?;
        Ok(success_result(format!("Scan results notification sent:\n{result}")))
    }

    pub async fn providers(
        self: Arc<Self>,
        _params: NoParams,
    ) -> Result<CallToolResult, ToolError> {
        Ok(success_result(PROVIDERS_TEXT.to_string()))
    }

    pub fn router<S>(self) -> ToolRouter<S>
    where
        S: Send + Sync + 'static,
    {
        let this = Arc::new(self);
        ToolRouter::new()
            .with_route(tool_route(
                Self::SEND,
                "Send notifications to configured providers (Slack, Discord, Telegram, etc.)",
                this.clone(),
                Self::send,
            ))
            .with_route(tool_route(
                Self::SEND_BULK,
                "Send multiple notifications in bulk",
                this.clone(),
                Self::send_bulk,
            ))
            .with_route(tool_route(
                Self::SCAN_RESULTS,
                "Send security scan results as formatted notifications",
                this.clone(),
                Self::scan_results,
            ))
            .with_route(tool_route(
                Self::PROVIDERS,
                "List available notification providers and their configuration status",
                this,
                Self::providers,
            ))
    }
}

const PROVIDERS_TEXT: &str = r#"Available Notify Providers:

CHAT PLATFORMS:
  - slack         - Slack webhooks/bot
  - discord       - Discord webhooks
  - telegram      - Telegram bot API
  - teams         - Microsoft Teams webhooks
  - pushover      - Pushover notifications
  - gotify        - Gotify server

EMAIL:
  - smtp          - Email via SMTP

CUSTOM:
  - custom        - Custom webhook endpoints

Configure providers in ~/.config/notify/provider-config.yaml

Example config:
  slack:
    - id: "security-alerts"
      slack_webhook_url: "https://hooks.slack.com/services/xxx"
  discord:
    - id: "bug-bounty"
      discord_webhook_url: "https://discord.com/api/webhooks/xxx"
  telegram:
    - id: "personal"
      telegram_api_key: "xxx"
      telegram_chat_id: "xxx""#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::process::testing::{fake_tool, missing_tool};
    use crate::domains::tools::definitions::common::result_text;

    #[tokio::test]
    async fn test_message_goes_over_stdin() {
        let tools = Arc::new(NotifyTools::with_tool(fake_tool(
            r#"echo "args: $*"; cat"#,
            SuccessPolicy::ExitCodeZero,
        )));
        let result = tools
            .send(SendParams {
                message: "scan finished".into(),
                provider_id: Some("security-alerts".into()),
                bulk: false,
                silent: true,
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Notification Result:\nargs: -provider-id security-alerts -silent\nscan finished"
        );
    }

    #[tokio::test]
    async fn test_silent_run_uses_fallback_text() {
        let tools = Arc::new(NotifyTools::with_tool(fake_tool(
            "cat >/dev/null",
            SuccessPolicy::ExitCodeZero,
        )));
        let result = tools
            .send_bulk(SendBulkParams {
                messages: vec!["one".into(), "two".into()],
                provider_id: None,
                delay: 2,
            })
            .await
            .unwrap();
        assert_eq!(
            result_text(&result),
            "Bulk Notification Result:\nSent 2 messages\nNotification sent successfully"
        );
    }

    #[test]
    fn test_scan_report_message_format() {
        let params = ScanResultsParams {
            tool_name: "nuclei".into(),
            target: "example.com".into(),
            findings: vec![
                Finding {
                    severity: Some(Severity::High),
                    title: "Exposed .git".into(),
                    description: Some("/.git/config readable".into()),
                },
                Finding {
                    severity: None,
                    title: "Banner".into(),
                    description: None,
                },
            ],
            provider_id: None,
        };
        assert_eq!(
            scan_report_message(&params),
            "🔍 **NUCLEI Scan Results**\nTarget: example.com\nFindings: 2\n\n\
             🟠 [HIGH] Exposed .git\n   /.git/config readable\n\n📌  Banner"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_an_error() {
        let tools = Arc::new(NotifyTools::with_tool(missing_tool(SuccessPolicy::ExitCodeZero)));
        let err = tools
            .send(SendParams {
                message: "hello".into(),
                provider_id: None,
                bulk: false,
                silent: false,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Exec(_)));
    }
}
