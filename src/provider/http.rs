use std::time::Duration;

use log::debug;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::preprocess::{encode_png, png_data_url};
use super::{EmbeddingProvider, ProviderError};

const HEALTH_ENDPOINTS: &[&str] = &["/health", "/v1/health", "/"];
const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    image: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// 通过 HTTP 调用的嵌入服务
///
/// 请求格式：`POST {base_url}/v1/embeddings`，
/// body 为 `{"image": "data:image/png;base64,...", "model": "..."}`，
/// 响应为 `{"embedding": [...]}`
#[derive(Debug, Clone)]
pub struct HttpEmbeddingProvider {
    base_url: String,
    api_key: Option<String>,
    max_dimension: Option<u32>,
    client: Client,
}

impl HttpEmbeddingProvider {
    pub fn new(
        base_url: &str,
        api_key: Option<String>,
        timeout: Duration,
        max_dimension: Option<u32>,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.filter(|key| !key.is_empty()),
            max_dimension,
            client,
        })
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

/// 兼容几种常见的模型列表格式
fn parse_models(data: Value) -> Vec<String> {
    let items = match data {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("models").or_else(|| map.remove("data")) {
            Some(Value::Array(items)) => items,
            _ => return vec![],
        },
        _ => return vec![],
    };
    items
        .into_iter()
        .filter_map(|item| match item {
            Value::String(name) => Some(name),
            Value::Object(map) => {
                map.get("id").or_else(|| map.get("name")).and_then(Value::as_str).map(str::to_owned)
            }
            _ => None,
        })
        .collect()
}

impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn health(&self) -> bool {
        for endpoint in HEALTH_ENDPOINTS {
            let url = format!("{}{}", self.base_url, endpoint);
            match self.client.get(&url).timeout(HEALTH_TIMEOUT).send().await {
                Ok(resp) if resp.status().as_u16() < 500 => return true,
                Ok(resp) => debug!("{} 返回 {}", url, resp.status()),
                Err(e) => debug!("{} 请求失败: {}", url, e),
            }
        }
        false
    }

    async fn embed(&self, image: &[u8], model: &str) -> Result<Vec<f32>, ProviderError> {
        let data = image.to_vec();
        let max_dimension = self.max_dimension;
        let png = tokio::task::spawn_blocking(move || encode_png(&data, max_dimension)).await??;
        let data_url = png_data_url(&png);

        let url = format!("{}/v1/embeddings", self.base_url);
        let resp = self
            .authorize(self.client.post(&url))
            .json(&EmbeddingRequest { image: &data_url, model })
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body });
        }

        let body = resp.bytes().await?;
        let resp: EmbeddingResponse =
            serde_json::from_slice(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;
        if resp.embedding.is_empty() {
            return Err(ProviderError::Decode("嵌入向量为空".to_string()));
        }
        Ok(resp.embedding)
    }

    async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/v1/models", self.base_url);
        let resp = match self.authorize(self.client.get(&url)).send().await {
            Ok(resp) if resp.status().is_success() => resp,
            _ => return vec![],
        };
        match resp.json::<Value>().await {
            Ok(data) => parse_models(data),
            Err(_) => vec![],
        }
    }
}
