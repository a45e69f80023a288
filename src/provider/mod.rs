mod http;
mod mock;
pub mod preprocess;

use std::future::Future;
use std::path::Path;

pub use http::*;
pub use mock::*;

/// 嵌入服务的错误，只影响单张图片
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("请求失败: {0}")]
    Http(reqwest::Error),

    #[error("请求超时")]
    Timeout,

    #[error("接口返回错误 {status}: {body}")]
    Status { status: u16, body: String },

    #[error("响应格式错误: {0}")]
    Decode(String),

    #[error("图片处理失败: {0}")]
    Image(#[from] image::ImageError),

    #[error("无法读取图片: {0}")]
    Io(#[from] std::io::Error),

    #[error("后台任务失败: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { Self::Timeout } else { Self::Http(err) }
    }
}

/// 根据图片内容计算嵌入向量的服务
pub trait EmbeddingProvider: Send + Sync {
    /// 服务是否可用
    fn health(&self) -> impl Future<Output = bool> + Send;

    /// 计算一张图片的嵌入向量
    fn embed(
        &self,
        image: &[u8],
        model: &str,
    ) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send;

    /// 服务支持的模型列表，不支持时返回空
    fn list_models(&self) -> impl Future<Output = Vec<String>> + Send;

    fn embed_file(
        &self,
        path: &Path,
        model: &str,
    ) -> impl Future<Output = Result<Vec<f32>, ProviderError>> + Send {
        async move {
            let data = tokio::fs::read(path).await?;
            self.embed(&data, model).await
        }
    }
}

/// 命令行根据参数选择的嵌入服务
#[derive(Debug, Clone)]
pub enum Provider {
    Http(HttpEmbeddingProvider),
    Mock(MockEmbeddingProvider),
}

impl EmbeddingProvider for Provider {
    async fn health(&self) -> bool {
        match self {
            Self::Http(p) => p.health().await,
            Self::Mock(p) => p.health().await,
        }
    }

    async fn embed(&self, image: &[u8], model: &str) -> Result<Vec<f32>, ProviderError> {
        match self {
            Self::Http(p) => p.embed(image, model).await,
            Self::Mock(p) => p.embed(image, model).await,
        }
    }

    async fn list_models(&self) -> Vec<String> {
        match self {
            Self::Http(p) => p.list_models().await,
            Self::Mock(p) => p.list_models().await,
        }
    }
}
