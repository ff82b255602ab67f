//! Converse HTTP transport
//!
//! Posts `ConverseRequest`s to `{endpoint}/model/{modelId}/converse` with a
//! bearer token and hands back the raw response envelope.

use crate::*;
use reqwest::{Client, Url};

pub const DEFAULT_REGION: &str = "us-east-1";
pub const DEFAULT_MODEL: &str = "us.anthropic.claude-3-5-sonnet-20241022-v2:0";

/// Converse endpoint client
pub struct ConverseProvider {
    client: Client,
    api_key: String,
    endpoint: String,
    default_model: String,
}

impl ConverseProvider {
    pub fn new(
        api_key: impl Into<String>,
        region: Option<String>,
        endpoint: Option<String>,
        default_model: Option<String>,
    ) -> Self {
        let region = region.unwrap_or_else(|| DEFAULT_REGION.to_string());
        let endpoint = endpoint
            .unwrap_or_else(|| format!("https://bedrock-runtime.{}.amazonaws.com", region));

        Self {
            client: Client::new(),
            api_key: api_key.into(),
            endpoint,
            default_model: default_model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Model ids may be ARNs, so each one goes in as a single encoded segment
    fn converse_url(&self, model_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| ProviderError::InvalidEndpoint(format!("{}: {}", self.endpoint, e)))?;
        url.path_segments_mut()
            .map_err(|_| ProviderError::InvalidEndpoint(self.endpoint.clone()))?
            .pop_if_empty()
            .extend(["model", model_id, "converse"]);
        Ok(url)
    }

    /// Request body; the model id travels in the path
    fn build_body(&self, request: &ConverseRequest) -> Result<Value> {
        let mut body = serde_json::to_value(request)?;
        if let Some(obj) = body.as_object_mut() {
            obj.remove("modelId");
        }
        Ok(body)
    }
}

#[async_trait::async_trait]
impl Provider for ConverseProvider {
    async fn converse(&self, request: ConverseRequest) -> Result<Value> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NoApiKey);
        }

        let model_id = if request.model_id.is_empty() {
            self.default_model.clone()
        } else {
            request.model_id.clone()
        };
        let url = self.converse_url(&model_id)?;
        let body = self.build_body(&request)?;

        trace!("converse request to {} ({} messages)", url, request.messages.len());

        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(ProviderError::RateLimited);
            }
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|json| json["message"].as_str().map(str::to_string))
                .unwrap_or(text);
            return Err(ProviderError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_str(&text)?)
    }

    fn default_model(&self) -> String {
        self.default_model.clone()
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_defaults() {
        let provider = ConverseProvider::new("key", None, None, None);
        assert_eq!(
            provider.endpoint(),
            "https://bedrock-runtime.us-east-1.amazonaws.com"
        );
        assert_eq!(provider.default_model(), DEFAULT_MODEL);
        assert!(provider.is_configured());
    }

    #[test]
    fn test_new_with_region() {
        let provider = ConverseProvider::new("key", Some("eu-west-1".to_string()), None, None);
        assert_eq!(
            provider.endpoint(),
            "https://bedrock-runtime.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_endpoint_override_wins_over_region() {
        let provider = ConverseProvider::new(
            "key",
            Some("eu-west-1".to_string()),
            Some("http://localhost:9000".to_string()),
            Some("custom-model".to_string()),
        );
        assert_eq!(provider.endpoint(), "http://localhost:9000");
        assert_eq!(provider.default_model(), "custom-model");
    }

    #[test]
    fn test_is_configured_false_without_key() {
        let provider = ConverseProvider::new("", None, None, None);
        assert!(!provider.is_configured());
    }

    #[test]
    fn test_converse_url_plain_model() {
        let provider =
            ConverseProvider::new("key", None, Some("http://localhost:9000/".to_string()), None);
        let url = provider.converse_url("my-model").unwrap();
        assert_eq!(url.as_str(), "http://localhost:9000/model/my-model/converse");
    }

    #[test]
    fn test_converse_url_encodes_arn_slashes() {
        let provider = ConverseProvider::new("key", None, None, None);
        let url = provider
            .converse_url("arn:aws:bedrock:us-east-1:123:inference-profile/us.model")
            .unwrap();
        assert!(url
            .as_str()
            .ends_with("/model/arn:aws:bedrock:us-east-1:123:inference-profile%2Fus.model/converse"));
    }

    #[test]
    fn test_converse_url_rejects_bad_endpoint() {
        let provider = ConverseProvider::new("key", None, Some("not a url".to_string()), None);
        assert!(matches!(
            provider.converse_url("m"),
            Err(ProviderError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn test_build_body_drops_model_id() {
        let provider = ConverseProvider::new("key", None, None, None);
        let request = ConverseRequest {
            model_id: "m".to_string(),
            system: vec![SystemContent::Text("sys".to_string())],
            messages: vec![Message::user("hi")],
            tool_config: Some(ToolConfig::auto(vec![Tool::new("t", "d", json!({}))])),
            ..Default::default()
        };

        let body = provider.build_body(&request).unwrap();
        assert!(body.get("modelId").is_none());
        assert_eq!(body["system"], json!([{ "text": "sys" }]));
        assert_eq!(body["messages"][0]["content"][0]["text"], "hi");
        assert_eq!(body["toolConfig"]["toolChoice"], json!({ "auto": {} }));
    }

    #[tokio::test]
    async fn test_converse_without_key_fails_fast() {
        let provider = ConverseProvider::new("", None, None, None);
        let result = provider.converse(ConverseRequest::default()).await;
        assert!(matches!(result, Err(ProviderError::NoApiKey)));
    }
}
