use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::db::ImageDB;
use crate::error::Result;
use crate::index::PathIndexSnapshot;
use crate::vector::VectorStore;

/// 单个模型的嵌入覆盖情况
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModelCoverage {
    pub model: String,
    pub embeddings: u64,
    /// 有元数据但没有嵌入
    pub missing_embeddings: Vec<String>,
    /// 有嵌入但没有元数据
    pub orphan_embeddings: Vec<String>,
    /// 有嵌入但不在路径索引中，没有路径索引时为空
    pub not_in_index: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub images: u64,
    /// 路径索引中的图片数，没有路径索引时为 None
    pub indexed: Option<usize>,
    /// 有元数据但不在路径索引中
    pub metadata_not_in_index: Vec<String>,
    pub models: Vec<ModelCoverage>,
}

fn sorted_difference(a: &HashSet<String>, b: &HashSet<String>) -> Vec<String> {
    let mut diff = a.difference(b).cloned().collect::<Vec<_>>();
    diff.sort();
    diff
}

/// 统计元数据库、向量库与路径索引之间的覆盖率
pub async fn analyze<V: VectorStore>(
    db: &ImageDB,
    vectors: &V,
    snapshot: Option<&PathIndexSnapshot>,
    models: &[String],
) -> Result<CoverageReport> {
    let metadata_hashes = db.hashes().await?;
    let index_hashes =
        snapshot.map(|snapshot| snapshot.images.keys().cloned().collect::<HashSet<_>>());

    let mut report = CoverageReport {
        images: metadata_hashes.len() as u64,
        indexed: index_hashes.as_ref().map(HashSet::len),
        ..Default::default()
    };
    if let Some(index_hashes) = &index_hashes {
        report.metadata_not_in_index = sorted_difference(&metadata_hashes, index_hashes);
    }

    for model in models {
        let embedding_hashes = vectors.get_all(model).await?.into_keys().collect::<HashSet<_>>();
        report.models.push(ModelCoverage {
            model: model.clone(),
            embeddings: embedding_hashes.len() as u64,
            missing_embeddings: sorted_difference(&metadata_hashes, &embedding_hashes),
            orphan_embeddings: sorted_difference(&embedding_hashes, &metadata_hashes),
            not_in_index: index_hashes
                .as_ref()
                .map(|index_hashes| sorted_difference(&embedding_hashes, index_hashes))
                .unwrap_or_default(),
        });
    }
    Ok(report)
}

impl fmt::Display for CoverageReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Images in metadata DB: {}", self.images)?;
        match self.indexed {
            Some(indexed) => {
                writeln!(f, "Images in path index: {}", indexed)?;
                writeln!(f, "Not in path index: {}", self.metadata_not_in_index.len())?;
            }
            None => writeln!(f, "Path index not found")?,
        }
        for model in &self.models {
            let percent = match self.images {
                0 => 100.0,
                n => (n as usize - model.missing_embeddings.len()) as f64 / n as f64 * 100.0,
            };
            write!(
                f,
                "Model '{}': {} embeddings ({:.1}% coverage), {} missing, {} orphan",
                model.model,
                model.embeddings,
                percent,
                model.missing_embeddings.len(),
                model.orphan_embeddings.len()
            )?;
            if self.indexed.is_some() {
                write!(f, ", {} not in index", model.not_in_index.len())?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
