use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use clap::{Parser, Subcommand};
use directories::ProjectDirs;
use serde::Deserialize;

use crate::cli::*;
use crate::error::{Error, Result};
use crate::provider::{HttpEmbeddingProvider, MockEmbeddingProvider, Provider};
use crate::utils::ImageHash;

static CONF_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "", "imarchive")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".imarchive"))
        .to_string_lossy()
        .into_owned()
});

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imarchive", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 数据目录，存放数据库、路径索引与配置文件
    #[arg(short, long, global = true, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
    /// 图片内容哈希算法，同一个归档必须始终使用同一种
    #[arg(short = 'H', long, global = true, default_value = "sha256")]
    pub hash: ImageHash,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 初始化数据目录并生成示例配置
    Init(InitCommand),
    /// 同步监控目录与数据库
    Sync(SyncCommand),
    /// 检查磁盘与数据库之间的一致性，不做任何修改
    Check(CheckCommand),
    /// 重建哈希到路径的索引
    Index(IndexCommand),
    /// 按哈希前缀查找图片
    Find(FindCommand),
    /// 查找与某张图片相似的图片
    Similar(SimilarCommand),
    /// 显示数据库状态与嵌入覆盖率
    Status(StatusCommand),
    /// 列出嵌入服务支持的模型
    Models(ModelsCommand),
    /// 导出模型的全部嵌入及其路径与元数据
    Export(ExportCommand),
}

#[derive(Parser, Debug, Clone)]
pub struct ModelOptions {
    /// 嵌入模型名
    #[arg(short, long, env = "EMBEDDING_MODEL", default_value = "default")]
    pub model: String,
}

#[derive(Parser, Debug, Clone)]
pub struct EmbeddingOptions {
    #[command(flatten)]
    pub model: ModelOptions,
    /// 嵌入服务地址
    #[arg(long, env = "EMBEDDING_API_URL")]
    pub api_url: Option<String>,
    /// 嵌入服务的 API Key
    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
    /// 单次请求超时时间（秒）
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub timeout: u64,
    /// 发送前将图片缩小到该边长以内
    #[arg(long, value_name = "PIXELS", default_value_t = 1024)]
    pub max_dimension: u32,
    /// 同时进行的嵌入请求数量
    #[arg(long, value_name = "N", default_value_t = num_cpus::get())]
    pub concurrency: usize,
    /// 使用不依赖网络的确定性嵌入
    #[arg(long)]
    pub mock: bool,
}

impl EmbeddingOptions {
    pub fn provider(&self) -> Result<Provider> {
        if self.mock {
            return Ok(Provider::Mock(MockEmbeddingProvider::default()));
        }
        let Some(api_url) = self.api_url.as_deref().filter(|url| !url.is_empty()) else {
            return Err(Error::Configuration(
                "未设置嵌入服务地址，请使用 --api-url 或 EMBEDDING_API_URL".to_string(),
            ));
        };
        let provider = HttpEmbeddingProvider::new(
            api_url,
            self.api_key.clone(),
            Duration::from_secs(self.timeout),
            Some(self.max_dimension),
        )?;
        Ok(Provider::Http(provider))
    }
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 图片元数据库
    pub fn metadata_db(&self) -> PathBuf {
        self.path.join("images.db")
    }

    /// 嵌入向量库
    pub fn embedding_db(&self) -> PathBuf {
        self.path.join("embeddings.db")
    }

    /// 哈希到路径的索引快照
    pub fn path_index(&self) -> PathBuf {
        self.path.join("index.json")
    }

    /// 默认的监控配置文件
    pub fn config_file(&self) -> PathBuf {
        self.path.join("config.toml")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

fn default_recursive() -> bool {
    true
}

#[derive(Deserialize)]
struct RawArchiveConfig {
    paths: Option<Vec<PathBuf>>,
    #[serde(default = "default_recursive")]
    recursive: bool,
}

/// 监控配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveConfig {
    /// 需要监控的目录或图片，不能为空
    pub paths: Vec<PathBuf>,
    /// 是否递归扫描子目录
    pub recursive: bool,
}

impl ArchiveConfig {
    pub const SAMPLE: &'static str = r#"# 需要监控的目录，也可以是单独的图片文件
paths = [
    "/path/to/images",
]

# 是否递归扫描子目录
recursive = true
"#;

    pub fn parse(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::Configuration("配置文件为空".to_string()));
        }
        let raw: RawArchiveConfig = toml::from_str(s)?;
        let paths = match raw.paths {
            Some(paths) if !paths.is_empty() => paths,
            Some(_) => return Err(Error::Configuration("paths 不能为空".to_string())),
            None => return Err(Error::Configuration("配置文件中缺少 paths".to_string())),
        };
        Ok(Self { paths, recursive: raw.recursive })
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            let mut message = format!("无法读取配置文件 {}: {}", path.display(), e);
            if let Some(yaml) = Self::yaml_sibling(path) {
                message.push_str(&format!("，配置文件只支持 TOML 格式，请将 {} 转换为 TOML", yaml.display()));
            }
            Error::Configuration(message)
        })?;
        Self::parse(&content)
    }

    /// 同目录下 YAML 格式的旧配置文件
    fn yaml_sibling(path: &Path) -> Option<PathBuf> {
        let dir = path.parent()?;
        ["config.yaml", "config.yml"].into_iter().map(|name| dir.join(name)).find(|p| p.exists())
    }
}
