use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::utils::short_hash;

/// 列表输出时最多展示的条目数
pub const PREVIEW_LIMIT: usize = 10;

/// 一次同步的结果，所有列表都已排序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub new_images: Vec<String>,
    pub removed_images: Vec<String>,
    pub embeddings_computed: Vec<String>,
    pub orphan_embeddings_removed: Vec<String>,
    /// 需要删除但没有得到确认的图片
    pub unconfirmed_removals: Vec<String>,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn is_empty(&self) -> bool {
        self.new_images.is_empty()
            && self.removed_images.is_empty()
            && self.embeddings_computed.is_empty()
            && self.orphan_embeddings_removed.is_empty()
            && self.unconfirmed_removals.is_empty()
            && self.errors.is_empty()
    }

    pub(crate) fn sort(&mut self) {
        self.new_images.sort();
        self.removed_images.sort();
        self.embeddings_computed.sort();
        self.orphan_embeddings_removed.sort();
        self.unconfirmed_removals.sort();
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![];
        if !self.new_images.is_empty() {
            lines.push(format!("New images added: {}", self.new_images.len()));
        }
        if !self.removed_images.is_empty() {
            lines.push(format!("Images removed: {}", self.removed_images.len()));
        }
        if !self.embeddings_computed.is_empty() {
            lines.push(format!("Embeddings computed: {}", self.embeddings_computed.len()));
        }
        if !self.orphan_embeddings_removed.is_empty() {
            lines.push(format!("Orphan embeddings removed: {}", self.orphan_embeddings_removed.len()));
        }
        if !self.unconfirmed_removals.is_empty() {
            lines.push(format!("Removals not confirmed: {}", self.unconfirmed_removals.len()));
        }
        if !self.errors.is_empty() {
            lines.push(format!("Errors: {}", self.errors.len()));
        }
        if lines.is_empty() {
            lines.push("No changes".to_string());
        }
        f.write_str(&lines.join("\n"))
    }
}

/// 磁盘、元数据库、向量库三者之间的差异
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    /// 磁盘上存在但元数据库中没有
    pub images_not_in_db: BTreeMap<String, PathBuf>,
    /// 元数据库中存在但磁盘上找不到
    pub images_missing_from_disk: Vec<String>,
    /// 元数据库中存在但没有嵌入
    pub missing_embeddings: Vec<String>,
    /// 有嵌入但元数据库中没有
    pub orphan_embeddings: Vec<String>,
}

impl ConsistencyReport {
    pub fn has_issues(&self) -> bool {
        !self.images_not_in_db.is_empty()
            || !self.images_missing_from_disk.is_empty()
            || !self.missing_embeddings.is_empty()
            || !self.orphan_embeddings.is_empty()
    }
}

impl fmt::Display for ConsistencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines = vec![];
        if !self.images_not_in_db.is_empty() {
            lines.push(format!("Images on disk not in hash DB: {}", self.images_not_in_db.len()));
        }
        if !self.images_missing_from_disk.is_empty() {
            lines.push(format!(
                "Images in hash DB missing from disk: {}",
                self.images_missing_from_disk.len()
            ));
        }
        if !self.missing_embeddings.is_empty() {
            lines.push(format!(
                "Images in hash DB without embeddings: {}",
                self.missing_embeddings.len()
            ));
        }
        if !self.orphan_embeddings.is_empty() {
            lines.push(format!(
                "Embeddings without corresponding hash DB entry: {}",
                self.orphan_embeddings.len()
            ));
        }
        if lines.is_empty() {
            lines.push("All databases are consistent".to_string());
        }
        f.write_str(&lines.join("\n"))
    }
}

/// 列出前 limit 个哈希，超出部分只显示数量
pub fn preview_hashes<'a>(hashes: impl IntoIterator<Item = &'a String>, limit: usize) -> String {
    let hashes = hashes.into_iter().collect::<Vec<_>>();
    let mut lines = hashes
        .iter()
        .take(limit)
        .map(|hash| format!("  {}...", short_hash(hash, 16)))
        .collect::<Vec<_>>();
    if hashes.len() > limit {
        lines.push(format!("  ... and {} more", hashes.len() - limit));
    }
    lines.join("\n")
}
