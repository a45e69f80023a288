use std::collections::HashMap;
use std::path::PathBuf;

use log::debug;
use serde::Serialize;

use crate::config::ConfDir;
use crate::coverage::{self, CoverageReport};
use crate::db::{ImageDB, ImageRecord};
use crate::error::{Error, Result};
use crate::index::{PathIndex, PathIndexSnapshot};
use crate::monitor::{ScanTarget, SyncEngine};
use crate::provider::EmbeddingProvider;
use crate::utils::ImageHash;
use crate::vector::{EmbeddingDB, Neighbor, VectorStore};

pub struct ArchiveBuilder {
    conf_dir: ConfDir,
    hash: Option<ImageHash>,
    read_only: bool,
}

impl ArchiveBuilder {
    pub fn new(conf_dir: ConfDir) -> Self {
        Self { conf_dir, hash: None, read_only: false }
    }

    /// 打开时检查数据库使用的哈希算法
    pub fn hash(mut self, hash: ImageHash) -> Self {
        self.hash = Some(hash);
        self
    }

    /// 只读模式下不会写入哈希算法记录
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub async fn open(self) -> Result<Archive> {
        let db = ImageDB::open(self.conf_dir.metadata_db()).await?;
        let vectors = EmbeddingDB::open(self.conf_dir.embedding_db()).await?;
        let hash = self.hash.unwrap_or_default();
        if self.hash.is_some() {
            db.check_hash_algorithm(hash, !self.read_only).await?;
        }
        let index = PathIndex::new(self.conf_dir.path_index(), hash);
        Ok(Archive { conf_dir: self.conf_dir, db, vectors, index })
    }
}

/// 一条按哈希前缀找到的图片
#[derive(Debug, Clone, Serialize)]
pub struct FoundImage {
    #[serde(flatten)]
    pub record: ImageRecord,
    /// 路径索引中记录的位置
    pub path: Option<PathBuf>,
}

/// 一条相似图片结果
#[derive(Debug, Clone, Serialize)]
pub struct SimilarImage {
    #[serde(flatten)]
    pub neighbor: Neighbor,
    pub path: Option<PathBuf>,
}

/// 导出的一条嵌入，附带路径索引中的位置与元数据
#[derive(Debug, Clone, Serialize)]
pub struct ExportedEmbedding {
    pub hash: String,
    pub filepath: Option<PathBuf>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub size: Option<i64>,
    pub mimetype: Option<String>,
    pub vector: Vec<f32>,
}

/// 某个模型的全部嵌入，用于离线分析
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingExport {
    pub model: String,
    pub count: usize,
    pub points: Vec<ExportedEmbedding>,
}

/// 数据目录下的元数据库、向量库与路径索引
pub struct Archive {
    conf_dir: ConfDir,
    db: ImageDB,
    vectors: EmbeddingDB,
    index: PathIndex,
}

impl Archive {
    pub fn conf_dir(&self) -> &ConfDir {
        &self.conf_dir
    }

    pub fn db(&self) -> &ImageDB {
        &self.db
    }

    pub fn vectors(&self) -> &EmbeddingDB {
        &self.vectors
    }

    pub fn path_index(&self) -> &PathIndex {
        &self.index
    }

    pub fn sync_engine<'a, P: EmbeddingProvider>(
        &'a self,
        target: ScanTarget,
        provider: &'a P,
        model: &str,
    ) -> SyncEngine<'a, EmbeddingDB, P> {
        SyncEngine::new(target, &self.db, &self.vectors, provider, model)
    }

    fn load_snapshot(&self) -> Result<Option<PathIndexSnapshot>> {
        let snapshot = self.index.load()?;
        if snapshot.is_none() {
            debug!("路径索引不存在: {}", self.index.file().display());
        }
        Ok(snapshot)
    }

    /// 按哈希前缀查找图片，同时给出路径索引中的位置
    pub async fn find(&self, prefix: &str) -> Result<Vec<FoundImage>> {
        let snapshot = self.load_snapshot()?;
        let records = self.db.find_by_prefix(prefix).await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let path = snapshot.as_ref().and_then(|s| s.resolve(&record.hash));
                FoundImage { record, path }
            })
            .collect())
    }

    /// 将哈希前缀解析为唯一的完整哈希
    pub async fn resolve_hash(&self, prefix: &str) -> Result<Option<String>> {
        let records = self.db.find_by_prefix(prefix).await?;
        match records.len() {
            0 => Ok(None),
            1 => Ok(records.into_iter().next().map(|record| record.hash)),
            n => Err(Error::Configuration(format!("哈希前缀 {} 匹配到 {} 张图片", prefix, n))),
        }
    }

    /// 查找与 hash 最相似的 k 张图片，不包括自身
    pub async fn similar(&self, model: &str, hash: &str, k: usize) -> Result<Vec<SimilarImage>> {
        let snapshot = self.load_snapshot()?;
        let neighbors = self.vectors.search_by_hash(model, hash, k).await?;
        let mut result = Vec::with_capacity(neighbors.len());
        for neighbor in neighbors {
            let path = match snapshot.as_ref().and_then(|s| s.resolve(&neighbor.hash)) {
                Some(path) => Some(path),
                // 路径索引中没有时退回到嵌入里记录的路径
                None => self.vectors.get_entry(model, &neighbor.hash).await?.and_then(|entry| {
                    entry.metadata.get("filepath").and_then(|v| v.as_str()).map(PathBuf::from)
                }),
            };
            result.push(SimilarImage { neighbor, path });
        }
        Ok(result)
    }

    /// 导出模型的全部向量，按哈希排序
    pub async fn export(&self, model: &str) -> Result<EmbeddingExport> {
        let snapshot = self.load_snapshot()?;
        let mut records = self
            .db
            .list_all()
            .await?
            .into_iter()
            .map(|record| (record.hash.clone(), record))
            .collect::<HashMap<_, _>>();

        let mut vectors = self.vectors.get_all(model).await?.into_iter().collect::<Vec<_>>();
        vectors.sort_by(|a, b| a.0.cmp(&b.0));

        let points = vectors
            .into_iter()
            .map(|(hash, vector)| {
                let filepath = snapshot.as_ref().and_then(|s| s.resolve(&hash));
                let record = records.remove(&hash);
                ExportedEmbedding {
                    filepath,
                    width: record.as_ref().map(|r| r.width),
                    height: record.as_ref().map(|r| r.height),
                    size: record.as_ref().map(|r| r.size),
                    mimetype: record.map(|r| r.mimetype),
                    hash,
                    vector,
                }
            })
            .collect::<Vec<_>>();
        debug!("导出模型 {} 的 {} 条嵌入", model, points.len());

        Ok(EmbeddingExport { model: model.to_owned(), count: points.len(), points })
    }

    /// 统计所有模型的嵌入覆盖率
    pub async fn coverage(&self) -> Result<CoverageReport> {
        let snapshot = self.load_snapshot()?;
        let models = self.vectors.list_models().await?;
        coverage::analyze(&self.db, &self.vectors, snapshot.as_ref(), &models).await
    }
}
