//! REST lookup tools: analyze_dispute and analyze_policy

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::{ToolError, ToolOutput, ToolTrait};

pub const DEFAULT_DISPUTE_BASE_URL: &str = "https://api.sandbox.checkout.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Send a GET and wrap the shaped JSON body as `{status, data}`.
///
/// Non-2xx answers become error outputs; transport failures propagate.
async fn fetch_document(
    request: RequestBuilder,
    shape: impl FnOnce(&mut Value),
) -> Result<ToolOutput, ToolError> {
    let response = request
        .header("Accept", "application/json")
        .timeout(REQUEST_TIMEOUT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Ok(ToolOutput::error(format!(
            "API request failed with status {}: {}",
            status.as_u16(),
            body
        )));
    }

    let mut data = response.json::<Value>().await?;
    shape(&mut data);
    Ok(ToolOutput::success(json!({ "status": "success", "data": data })))
}

/// `{base}/{collection}/{id}` with the id as one encoded path segment
fn resource_url(base: &str, collection: &str, id: &str) -> Result<Url, ToolError> {
    if id.trim().is_empty() {
        return Err(ToolError::InvalidArguments(format!(
            "{} id must not be empty",
            collection
        )));
    }
    let mut url = Url::parse(base)
        .map_err(|e| ToolError::Execution(format!("Invalid base URL {}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ToolError::Execution(format!("Invalid base URL {}", base)))?
        .pop_if_empty()
        .extend([collection, id]);
    Ok(url)
}

/// Minor units to a two-decimal string
fn format_minor_units(amount: &Value) -> Option<String> {
    amount.as_f64().map(|a| format!("{:.2}", a / 100.0))
}

/// Add `formatted_amount` next to every `amount` at the top level and under `payment`
fn add_formatted_amounts(data: &mut Value) {
    if let Some(formatted) = data.get("amount").and_then(format_minor_units) {
        data["formatted_amount"] = json!(formatted);
    }
    if let Some(payment) = data.get_mut("payment").filter(|p| p.is_object()) {
        if let Some(formatted) = payment.get("amount").and_then(format_minor_units) {
            payment["formatted_amount"] = json!(formatted);
        }
    }
}

/// Dispute lookup
pub struct DisputeTool {
    client: Client,
    api_key: String,
    base_url: String,
}

impl DisputeTool {
    pub fn new(api_key: impl Into<String>, base_url: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_DISPUTE_BASE_URL.to_string()),
        }
    }
}

#[derive(Deserialize)]
struct DisputeArgs {
    dispute_id: String,
}

#[async_trait]
impl ToolTrait for DisputeTool {
    fn name(&self) -> &str {
        "analyze_dispute"
    }

    fn description(&self) -> &str {
        "Fetch dispute details from the payments API. Returns category and reason code, amount and currency, status and deadlines, required evidence and payment details. Use this data along with the reference documentation to provide analysis."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "dispute_id": { "type": "string", "description": "The ID of the dispute to analyze" }
            },
            "required": ["dispute_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: DisputeArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        debug!("fetching dispute {}", args.dispute_id);

        let url = resource_url(&self.base_url, "disputes", &args.dispute_id)?;
        let request = self.client.get(url).bearer_auth(&self.api_key);

        fetch_document(request, add_formatted_amounts).await
    }
}

/// Policy lookup
pub struct PolicyTool {
    client: Client,
    api_key: String,
    base_url: String,
    space: Option<String>,
}

impl PolicyTool {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>, space: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: base_url.into(),
            space,
        }
    }
}

#[derive(Deserialize)]
struct PolicyArgs {
    policy_id: String,
}

#[async_trait]
impl ToolTrait for PolicyTool {
    fn name(&self) -> &str {
        "analyze_policy"
    }

    fn description(&self) -> &str {
        "Fetch policy details from the policy management API. Returns policy status, client information, billing history, covered assets, documents and renewals."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "policy_id": { "type": "string", "description": "The ID of the policy to analyze" }
            },
            "required": ["policy_id"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let args: PolicyArgs = serde_json::from_value(args)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        debug!("fetching policy {}", args.policy_id);

        let url = resource_url(&self.base_url, "policies", &args.policy_id)?;
        let mut request = self.client.get(url).bearer_auth(&self.api_key);
        if let Some(space) = &self.space {
            request = request.header("x-space", space);
        }

        fetch_document(request, |_| {}).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_formatted_amounts() {
        let mut data = json!({ "amount": 1050, "payment": { "amount": 99 } });
        add_formatted_amounts(&mut data);
        assert_eq!(data["formatted_amount"], "10.50");
        assert_eq!(data["payment"]["formatted_amount"], "0.99");
    }

    #[test]
    fn test_add_formatted_amounts_without_amounts() {
        let mut data = json!({ "id": "dsp_1", "payment": { "id": "pay_1" } });
        add_formatted_amounts(&mut data);
        assert!(data.get("formatted_amount").is_none());
        assert!(data["payment"].get("formatted_amount").is_none());
    }

    #[test]
    fn test_resource_url_joins_base() {
        let url = resource_url("https://policy.example/v1/", "policies", "pol_1").unwrap();
        assert_eq!(url.as_str(), "https://policy.example/v1/policies/pol_1");

        let url = resource_url("https://policy.example/v1", "policies", "pol_1").unwrap();
        assert_eq!(url.as_str(), "https://policy.example/v1/policies/pol_1");

        let url = resource_url(DEFAULT_DISPUTE_BASE_URL, "disputes", "dsp_1").unwrap();
        assert_eq!(url.as_str(), "https://api.sandbox.checkout.com/disputes/dsp_1");
    }

    #[test]
    fn test_resource_url_encodes_id_as_one_segment() {
        let url = resource_url("https://api.example", "disputes", "../x").unwrap();
        assert_eq!(url.path(), "/disputes/..%2Fx");

        let url = resource_url("https://api.example", "disputes", "a?b#c").unwrap();
        assert_eq!(url.path(), "/disputes/a%3Fb%23c");
        assert!(url.query().is_none());
    }

    #[test]
    fn test_resource_url_rejects_bad_input() {
        assert!(matches!(
            resource_url("https://api.example", "disputes", " "),
            Err(ToolError::InvalidArguments(_))
        ));
        assert!(matches!(
            resource_url("not a url", "disputes", "dsp_1"),
            Err(ToolError::Execution(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_id_is_invalid_arguments() {
        let tool = DisputeTool::new("k", None);
        let result = tool.execute(json!({})).await;
        assert!(matches!(result, Err(ToolError::InvalidArguments(_))));
    }
}
