mod report;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use futures::StreamExt;
use indicatif::ProgressBar;
use log::{debug, info, warn};
use serde_json::json;

pub use report::*;

use crate::db::{ImageDB, ImageRecord};
use crate::error::{Error, Result};
use crate::index::scan_directory;
use crate::provider::{EmbeddingProvider, ProviderError};
use crate::utils::{ImageHash, short_hash};
use crate::vector::{EmbeddingMetadata, VectorStore};

/// 需要监控的路径
#[derive(Debug, Clone)]
pub struct ScanTarget {
    pub paths: Vec<PathBuf>,
    pub recursive: bool,
    pub hash: ImageHash,
}

impl ScanTarget {
    pub fn new(paths: Vec<PathBuf>, recursive: bool, hash: ImageHash) -> Self {
        Self { paths, recursive, hash }
    }

    /// 扫描所有路径并合并结果，路径均为绝对路径
    ///
    /// 不存在的路径只会打印警告
    pub fn scan_blocking(&self, pb: &ProgressBar) -> Result<BTreeMap<String, PathBuf>> {
        let mut images = BTreeMap::<String, PathBuf>::new();
        for path in &self.paths {
            if !path.exists() {
                warn!("监控路径不存在: {}", path.display());
                continue;
            }
            pb.reset();
            pb.set_message(path.display().to_string());
            let scanned = match scan_directory(path, self.recursive, false, self.hash, pb) {
                Ok(scanned) => scanned,
                Err(e) if e.is_per_item() => {
                    warn!("跳过监控路径: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            for (hash, path) in scanned {
                let path = PathBuf::from(path);
                match images.get(&hash) {
                    Some(existing) if *existing <= path => {}
                    _ => {
                        images.insert(hash, path);
                    }
                }
            }
        }
        info!("扫描完成，共 {} 张图片", images.len());
        Ok(images)
    }

    pub async fn scan(&self, pb: &ProgressBar) -> Result<BTreeMap<String, PathBuf>> {
        let target = self.clone();
        let pb = pb.clone();
        tokio::task::spawn_blocking(move || target.scan_blocking(&pb)).await?
    }
}

/// 对比已经扫描好的磁盘图片与两个数据库
async fn diff<V: VectorStore>(
    disk_images: &BTreeMap<String, PathBuf>,
    db: &ImageDB,
    vectors: &V,
    model: &str,
) -> Result<ConsistencyReport> {
    let db_hashes = db.hashes().await?;
    let embedding_hashes = vectors.hashes(model).await?;

    let images_not_in_db = disk_images
        .iter()
        .filter(|(hash, _)| !db_hashes.contains(*hash))
        .map(|(hash, path)| (hash.clone(), path.clone()))
        .collect();

    let mut images_missing_from_disk =
        db_hashes.iter().filter(|hash| !disk_images.contains_key(*hash)).cloned().collect::<Vec<_>>();
    let mut missing_embeddings = db_hashes.difference(&embedding_hashes).cloned().collect::<Vec<_>>();
    let mut orphan_embeddings = embedding_hashes.difference(&db_hashes).cloned().collect::<Vec<_>>();
    images_missing_from_disk.sort();
    missing_embeddings.sort();
    orphan_embeddings.sort();

    Ok(ConsistencyReport {
        images_not_in_db,
        images_missing_from_disk,
        missing_embeddings,
        orphan_embeddings,
    })
}

/// 只读的一致性检查，不会修改任何存储，也不需要嵌入服务
pub async fn check<V: VectorStore>(
    target: &ScanTarget,
    db: &ImageDB,
    vectors: &V,
    model: &str,
) -> Result<ConsistencyReport> {
    let disk_images = target.scan(&ProgressBar::hidden()).await?;
    diff(&disk_images, db, vectors, model).await
}

enum Processed {
    Added { record: ImageRecord, embedding: std::result::Result<Vec<f32>, ProviderError> },
    Failed(Error),
}

/// 同步磁盘、元数据库与向量库
pub struct SyncEngine<'a, V, P> {
    target: ScanTarget,
    db: &'a ImageDB,
    vectors: &'a V,
    provider: &'a P,
    model: String,
    concurrency: usize,
    pb: ProgressBar,
}

impl<'a, V: VectorStore, P: EmbeddingProvider> SyncEngine<'a, V, P> {
    pub fn new(
        target: ScanTarget,
        db: &'a ImageDB,
        vectors: &'a V,
        provider: &'a P,
        model: impl Into<String>,
    ) -> Self {
        Self {
            target,
            db,
            vectors,
            provider,
            model: model.into(),
            concurrency: num_cpus::get(),
            pb: ProgressBar::hidden(),
        }
    }

    /// 同时调用嵌入服务的最大数量
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.pb = pb;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn check(&self) -> Result<ConsistencyReport> {
        check(&self.target, self.db, self.vectors, &self.model).await
    }

    fn embedding_metadata(path: &Path, dimensions: usize) -> EmbeddingMetadata {
        let mut metadata = EmbeddingMetadata::new();
        metadata.insert("filepath".to_string(), json!(path.to_string_lossy()));
        metadata.insert("dimensions".to_string(), json!(dimensions));
        metadata
    }

    /// 写入一条嵌入，单张图片的错误记入报告
    async fn store_embedding(
        &self,
        hash: &str,
        path: &Path,
        embedding: std::result::Result<Vec<f32>, ProviderError>,
        report: &mut SyncReport,
    ) -> Result<()> {
        let vector = match embedding {
            Ok(vector) => vector,
            Err(e) => {
                warn!("计算嵌入失败 {}: {}", path.display(), e);
                report.errors.push(format!("Embedding error for {}...: {}", short_hash(hash, 12), e));
                return Ok(());
            }
        };
        let metadata = Self::embedding_metadata(path, vector.len());
        match self.vectors.upsert(&self.model, hash, &vector, &metadata).await {
            Ok(()) => {
                report.embeddings_computed.push(hash.to_owned());
                Ok(())
            }
            Err(e) if e.is_per_item() => {
                warn!("写入嵌入失败 {}: {}", path.display(), e);
                report.errors.push(format!("Embedding error for {}...: {}", short_hash(hash, 12), e));
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 删除元数据与嵌入，嵌入删除失败不影响其他图片
    async fn remove_images(&self, hashes: &[String], report: &mut SyncReport) -> Result<()> {
        for hash in hashes {
            self.db.delete(hash).await?;
            if let Err(e) = self.vectors.delete(&self.model, hash).await {
                warn!("删除嵌入失败 {}: {}", hash, e);
                report.errors.push(format!("Failed to delete embedding {}...: {}", short_hash(hash, 12), e));
            }
            report.removed_images.push(hash.clone());
        }
        info!("已删除 {} 张图片", hashes.len());
        Ok(())
    }

    /// 提取元数据并计算嵌入，各图片之间并发执行，写入按顺序进行
    async fn add_images(&self, new_images: &[(String, PathBuf)], report: &mut SyncReport) -> Result<()> {
        self.pb.set_length(new_images.len() as u64);
        self.pb.set_position(0);
        self.pb.set_message("添加图片");

        let mut results = futures::stream::iter(new_images.iter().cloned())
            .map(|(hash, path)| async move {
                let record = {
                    let path = path.clone();
                    let hash = hash.clone();
                    tokio::task::spawn_blocking(move || ImageRecord::from_file(&path, hash)).await
                };
                let processed = match record {
                    Ok(Ok(record)) => {
                        let embedding = self.provider.embed_file(&path, &self.model).await;
                        Processed::Added { record, embedding }
                    }
                    Ok(Err(e)) => Processed::Failed(e),
                    Err(e) => Processed::Failed(e.into()),
                };
                (hash, path, processed)
            })
            .buffer_unordered(self.concurrency);

        while let Some((hash, path, processed)) = results.next().await {
            self.pb.inc(1);
            match processed {
                Processed::Added { record, embedding } => {
                    self.db.upsert(&record).await?;
                    report.new_images.push(hash.clone());
                    self.store_embedding(&hash, &path, embedding, report).await?;
                }
                Processed::Failed(e) => {
                    warn!("处理图片失败: {}", e);
                    report.errors.push(format!("Error processing {}: {}", path.display(), e));
                }
            }
        }
        Ok(())
    }

    /// 为元数据库中已有但缺少嵌入的图片补算嵌入
    async fn fill_embeddings(&self, missing: &[(String, PathBuf)], report: &mut SyncReport) -> Result<()> {
        let mut results = futures::stream::iter(missing.iter().cloned())
            .map(|(hash, path)| async move {
                let embedding = self.provider.embed_file(&path, &self.model).await;
                (hash, path, embedding)
            })
            .buffer_unordered(self.concurrency);
        while let Some((hash, path, embedding)) = results.next().await {
            self.store_embedding(&hash, &path, embedding, report).await?;
        }
        Ok(())
    }

    /// 执行一次完整同步
    ///
    /// `confirm` 在需要删除图片且未设置 auto_confirm 时被调用，返回 false 则跳过删除。
    /// dry_run 时不修改任何存储，报告中记录将要发生的变更。
    /// 添加完成后仍缺少嵌入的图片会重新扫描磁盘来定位文件。
    pub async fn sync<F>(&self, dry_run: bool, auto_confirm: bool, confirm: F) -> Result<SyncReport>
    where
        F: FnOnce(&[String]) -> bool + Send,
    {
        let mut report = SyncReport::default();

        let disk_images = self.target.scan(&self.pb).await?;
        let db_hashes = self.db.hashes().await?;

        let new_images = disk_images
            .iter()
            .filter(|(hash, _)| !db_hashes.contains(*hash))
            .map(|(hash, path)| (hash.clone(), path.clone()))
            .collect::<Vec<_>>();
        let mut removed = db_hashes
            .iter()
            .filter(|hash| !disk_images.contains_key(*hash))
            .cloned()
            .collect::<Vec<_>>();
        removed.sort();
        info!("新增 {} 张图片，{} 张图片已从磁盘移除", new_images.len(), removed.len());

        if !removed.is_empty() {
            if dry_run {
                report.removed_images = removed;
            } else if auto_confirm || confirm(&removed) {
                self.remove_images(&removed, &mut report).await?;
            } else {
                info!("删除未被确认，跳过 {} 张图片", removed.len());
                report.unconfirmed_removals = removed;
            }
        }

        if dry_run {
            for (hash, _) in &new_images {
                report.new_images.push(hash.clone());
                report.embeddings_computed.push(hash.clone());
            }
        } else {
            self.add_images(&new_images, &mut report).await?;
        }

        // 本轮已经尝试过的图片不再重复计算
        let attempted = new_images.iter().map(|(hash, _)| hash).collect::<HashSet<_>>();
        let consistency = diff(&disk_images, self.db, self.vectors, &self.model).await?;

        let pending = consistency
            .missing_embeddings
            .iter()
            .filter(|hash| !attempted.contains(hash))
            .collect::<Vec<_>>();
        let mut missing = vec![];
        if !pending.is_empty() {
            // 添加过程中文件可能被移动或新增，重新扫描定位
            let located = self.target.scan(&self.pb).await?;
            for hash in pending {
                match located.get(hash) {
                    Some(path) => missing.push((hash.clone(), path.clone())),
                    None => debug!("缺少嵌入但磁盘上找不到: {}", hash),
                }
            }
        }
        if dry_run {
            report.embeddings_computed.extend(missing.into_iter().map(|(hash, _)| hash));
        } else {
            self.fill_embeddings(&missing, &mut report).await?;
        }

        for hash in consistency.orphan_embeddings {
            if dry_run {
                report.orphan_embeddings_removed.push(hash);
                continue;
            }
            match self.vectors.delete(&self.model, &hash).await {
                Ok(_) => report.orphan_embeddings_removed.push(hash),
                Err(e) => {
                    warn!("删除孤立嵌入失败 {}: {}", hash, e);
                    report.errors.push(format!("Failed to delete embedding {}...: {}", short_hash(&hash, 12), e));
                }
            }
        }

        self.pb.finish_and_clear();
        report.sort();
        Ok(report)
    }
}
