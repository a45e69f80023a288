mod sqlite;

use std::collections::{HashMap, HashSet};
use std::future::Future;

use serde::Serialize;
use serde_json::{Map, Value};
pub use sqlite::*;

use crate::error::{Error, Result};

/// 嵌入向量的附加信息，如来源路径和维度
pub type EmbeddingMetadata = Map<String, Value>;

/// 一次近邻查询的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Neighbor {
    pub hash: String,
    /// 平方欧氏距离，越小越相似
    pub distance: f32,
}

/// 同时带有余弦相似度的近邻结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredNeighbor {
    pub hash: String,
    pub distance: f32,
    pub cosine: f32,
}

/// 一条完整的嵌入记录
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingEntry {
    pub hash: String,
    pub vector: Vec<f32>,
    pub metadata: EmbeddingMetadata,
}

/// 模型对应的向量集合
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Collection {
    pub id: i64,
    /// 经过 [`collection_name`] 处理后的集合名
    pub name: String,
    /// 原始模型标识
    pub model: String,
    /// 集合中向量的维度，首次写入前为空
    pub dimension: Option<u32>,
}

/// 将模型标识映射为集合名
///
/// 只保留 `[A-Za-z0-9._-]`，其余字符替换为 `_`，同样的输入总是得到同样的输出
pub fn collection_name(model: &str) -> Result<String> {
    if model.trim().is_empty() {
        return Err(Error::Configuration("模型名不能为空".to_string()));
    }
    Ok(model
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '_' })
        .collect())
}

/// 按模型划分集合的向量存储
///
/// 所有操作都以 model 作为命名空间；读取不存在的模型时返回空结果，不会隐式创建集合
pub trait VectorStore: Send + Sync {
    /// 获取或创建模型对应的集合，重复调用是幂等的
    fn get_or_create(&self, model: &str) -> impl Future<Output = Result<Collection>> + Send;

    /// 写入一条嵌入，同一哈希已存在时整体替换
    fn upsert(
        &self,
        model: &str,
        hash: &str,
        vector: &[f32],
        metadata: &EmbeddingMetadata,
    ) -> impl Future<Output = Result<()>> + Send;

    fn get(&self, model: &str, hash: &str) -> impl Future<Output = Result<Option<Vec<f32>>>> + Send;

    fn get_entry(
        &self,
        model: &str,
        hash: &str,
    ) -> impl Future<Output = Result<Option<EmbeddingEntry>>> + Send;

    /// 返回最多 k 个最近邻，按距离升序，不排除任何结果
    fn query(
        &self,
        model: &str,
        vector: &[f32],
        k: usize,
    ) -> impl Future<Output = Result<Vec<Neighbor>>> + Send;

    /// 与 query 相同，额外计算余弦相似度
    fn query_with_cosine(
        &self,
        model: &str,
        vector: &[f32],
        k: usize,
    ) -> impl Future<Output = Result<Vec<ScoredNeighbor>>> + Send;

    /// 删除一条嵌入，返回其是否存在
    fn delete(&self, model: &str, hash: &str) -> impl Future<Output = Result<bool>> + Send;

    /// 列出所有创建过的模型
    fn list_models(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    fn count(&self, model: &str) -> impl Future<Output = Result<u64>> + Send;

    /// 一次性导出模型的全部向量
    fn get_all(&self, model: &str) -> impl Future<Output = Result<HashMap<String, Vec<f32>>>> + Send;

    /// 最多列出 limit 个哈希
    fn list_hashes(&self, model: &str, limit: usize) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// 模型下的全部哈希
    fn hashes(&self, model: &str) -> impl Future<Output = Result<HashSet<String>>> + Send;

    /// 以已存储的向量为查询，返回除自身以外的 k 个最近邻
    ///
    /// 哈希没有对应向量时返回空列表
    fn search_by_hash(
        &self,
        model: &str,
        query_hash: &str,
        k: usize,
    ) -> impl Future<Output = Result<Vec<Neighbor>>> + Send {
        async move {
            let Some(vector) = self.get(model, query_hash).await? else {
                return Ok(vec![]);
            };
            let mut neighbors = self.query(model, &vector, k.saturating_add(1)).await?;
            neighbors.retain(|n| n.hash != query_hash);
            neighbors.truncate(k);
            Ok(neighbors)
        }
    }
}
