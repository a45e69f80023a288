use std::path::PathBuf;

use crate::provider::ProviderError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// 配置错误，在运行前就应该失败
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 存储文件无法打开或创建
    #[error("无法打开存储 {}: {source}", path.display())]
    StorageUnavailable {
        path: PathBuf,
        #[source]
        source: sqlx::Error,
    },

    #[error("数据库错误: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// 单个文件无法读取
    #[error("无法读取文件 {}: {source}", path.display())]
    FileAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 图片头无法解析
    #[error("无法解析图片 {}: {source}", path.display())]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// 同一模型的向量维度不一致
    #[error("模型 {model} 的向量维度应为 {expected}，实际为 {actual}")]
    DimensionMismatch { model: String, expected: usize, actual: usize },

    #[error("后台任务失败: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON 错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("配置文件解析失败: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    pub fn file_access(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileAccess { path: path.into(), source }
    }

    /// 是否为只影响单个文件或单次调用的错误
    pub fn is_per_item(&self) -> bool {
        matches!(
            self,
            Self::FileAccess { .. }
                | Self::ImageDecode { .. }
                | Self::Provider(_)
                | Self::DimensionMismatch { .. }
        )
    }
}
