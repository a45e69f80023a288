use std::collections::{HashMap, HashSet};
use std::path::Path;

use bytemuck::{cast_slice, pod_collect_to_vec};
use log::debug;
use sqlx::migrate::Migrator;
use sqlx::{Executor, Sqlite};

use super::*;
use crate::db::{Database, init_db};
use crate::distance::{cosine, knn_l2};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/embedding");

/// 基于 SQLite 的向量存储，查询时对整个集合做精确的暴力搜索
#[derive(Clone)]
pub struct EmbeddingDB {
    pool: Database,
}

#[derive(sqlx::FromRow)]
struct EmbeddingRow {
    hash: String,
    vector: Vec<u8>,
}

#[derive(sqlx::FromRow)]
struct EmbeddingEntryRow {
    hash: String,
    vector: Vec<u8>,
    metadata: String,
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    // BLOB 不保证 4 字节对齐，需要复制
    pod_collect_to_vec(bytes)
}

async fn find_collection<'c, E>(executor: E, model: &str) -> Result<Option<Collection>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let name = collection_name(model)?;
    Ok(sqlx::query_as::<_, Collection>(
        "SELECT id, name, model, dimension FROM collection WHERE name = ? AND model = ?",
    )
    .bind(name)
    .bind(model)
    .fetch_optional(executor)
    .await?)
}

impl EmbeddingDB {
    pub async fn open(filename: impl AsRef<Path>) -> Result<Self> {
        let pool = init_db(filename, &MIGRATOR).await?;
        Ok(Self { pool })
    }

    /// 读取集合内的全部向量，按哈希排序
    async fn load_vectors(&self, collection: &Collection) -> Result<(Vec<String>, Vec<Vec<f32>>)> {
        let rows = sqlx::query_as::<_, EmbeddingRow>(
            "SELECT hash, vector FROM embedding WHERE collection_id = ? ORDER BY hash",
        )
        .bind(collection.id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|row| (row.hash, decode_vector(&row.vector))).unzip())
    }

    async fn knn(
        &self,
        model: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<(String, Vec<f32>, f32)>> {
        let Some(collection) = find_collection(&self.pool, model).await? else {
            return Ok(vec![]);
        };
        if let Some(dimension) = collection.dimension {
            if dimension as usize != vector.len() {
                return Err(Error::DimensionMismatch {
                    model: model.to_owned(),
                    expected: dimension as usize,
                    actual: vector.len(),
                });
            }
        }

        let (hashes, vectors) = self.load_vectors(&collection).await?;
        let k = k.min(vectors.len());
        debug!("在 {} 个向量中搜索 {} 个最近邻", vectors.len(), k);

        let query = vector.to_vec();
        let (nearest, mut vectors) = tokio::task::spawn_blocking(move || {
            let nearest = knn_l2(&query, &vectors, k);
            (nearest, vectors)
        })
        .await?;

        Ok(nearest
            .into_iter()
            .map(|(idx, distance)| (hashes[idx].clone(), std::mem::take(&mut vectors[idx]), distance))
            .collect())
    }
}

impl VectorStore for EmbeddingDB {
    async fn get_or_create(&self, model: &str) -> Result<Collection> {
        let name = collection_name(model)?;
        sqlx::query("INSERT INTO collection (name, model) VALUES (?, ?) ON CONFLICT (name) DO NOTHING")
            .bind(&name)
            .bind(model)
            .execute(&self.pool)
            .await?;

        let collection = sqlx::query_as::<_, Collection>(
            "SELECT id, name, model, dimension FROM collection WHERE name = ?",
        )
        .bind(&name)
        .fetch_one(&self.pool)
        .await?;
        // 不同模型名映射到同一集合名时拒绝，避免维度混用
        if collection.model != model {
            return Err(Error::Configuration(format!(
                "模型 {} 与已有模型 {} 的集合名冲突: {}",
                model, collection.model, collection.name
            )));
        }
        Ok(collection)
    }

    async fn upsert(
        &self,
        model: &str,
        hash: &str,
        vector: &[f32],
        metadata: &EmbeddingMetadata,
    ) -> Result<()> {
        let collection = self.get_or_create(model).await?;
        let metadata = serde_json::to_string(metadata)?;

        let mut tx = self.pool.begin().await?;
        match collection.dimension {
            Some(dimension) if dimension as usize != vector.len() => {
                return Err(Error::DimensionMismatch {
                    model: model.to_owned(),
                    expected: dimension as usize,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => {
                let dimension = vector.len() as u32;
                sqlx::query("UPDATE collection SET dimension = ? WHERE id = ? AND dimension IS NULL")
                    .bind(dimension)
                    .bind(collection.id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        sqlx::query(
            r#"
            INSERT INTO embedding (collection_id, hash, vector, metadata)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (collection_id, hash) DO UPDATE SET
                vector = excluded.vector,
                metadata = excluded.metadata
            "#,
        )
        .bind(collection.id)
        .bind(hash)
        .bind(cast_slice::<f32, u8>(vector))
        .bind(metadata)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, model: &str, hash: &str) -> Result<Option<Vec<f32>>> {
        Ok(self.get_entry(model, hash).await?.map(|entry| entry.vector))
    }

    async fn get_entry(&self, model: &str, hash: &str) -> Result<Option<EmbeddingEntry>> {
        let Some(collection) = find_collection(&self.pool, model).await? else {
            return Ok(None);
        };
        let row = sqlx::query_as::<_, EmbeddingEntryRow>(
            "SELECT hash, vector, metadata FROM embedding WHERE collection_id = ? AND hash = ?",
        )
        .bind(collection.id)
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(EmbeddingEntry {
                hash: row.hash,
                vector: decode_vector(&row.vector),
                metadata: serde_json::from_str(&row.metadata)?,
            })),
            None => Ok(None),
        }
    }

    async fn query(&self, model: &str, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        Ok(self
            .knn(model, vector, k)
            .await?
            .into_iter()
            .map(|(hash, _, distance)| Neighbor { hash, distance })
            .collect())
    }

    async fn query_with_cosine(
        &self,
        model: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredNeighbor>> {
        Ok(self
            .knn(model, vector, k)
            .await?
            .into_iter()
            .map(|(hash, v, distance)| ScoredNeighbor { hash, distance, cosine: cosine(vector, &v) })
            .collect())
    }

    async fn delete(&self, model: &str, hash: &str) -> Result<bool> {
        let Some(collection) = find_collection(&self.pool, model).await? else {
            return Ok(false);
        };
        let result = sqlx::query("DELETE FROM embedding WHERE collection_id = ? AND hash = ?")
            .bind(collection.id)
            .bind(hash)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        Ok(sqlx::query_scalar::<_, String>("SELECT model FROM collection ORDER BY name")
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count(&self, model: &str) -> Result<u64> {
        let Some(collection) = find_collection(&self.pool, model).await? else {
            return Ok(0);
        };
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM embedding WHERE collection_id = ?")
                .bind(collection.id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count as u64)
    }

    async fn get_all(&self, model: &str) -> Result<HashMap<String, Vec<f32>>> {
        let Some(collection) = find_collection(&self.pool, model).await? else {
            return Ok(HashMap::new());
        };
        let (hashes, vectors) = self.load_vectors(&collection).await?;
        Ok(hashes.into_iter().zip(vectors).collect())
    }

    async fn list_hashes(&self, model: &str, limit: usize) -> Result<Vec<String>> {
        let Some(collection) = find_collection(&self.pool, model).await? else {
            return Ok(vec![]);
        };
        Ok(sqlx::query_scalar::<_, String>(
            "SELECT hash FROM embedding WHERE collection_id = ? ORDER BY hash LIMIT ?",
        )
        .bind(collection.id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn hashes(&self, model: &str) -> Result<HashSet<String>> {
        let Some(collection) = find_collection(&self.pool, model).await? else {
            return Ok(HashSet::new());
        };
        Ok(sqlx::query_scalar::<_, String>("SELECT hash FROM embedding WHERE collection_id = ?")
            .bind(collection.id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect())
    }
}
