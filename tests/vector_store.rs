use imarchive::Error;
use imarchive::vector::{EmbeddingDB, EmbeddingMetadata, VectorStore};
use rstest::*;
use serde_json::json;
use tempfile::TempDir;

const MODEL: &str = "clip/vit-b";

#[fixture]
fn temp_dir() -> TempDir {
    TempDir::new().unwrap()
}

fn metadata(filepath: &str) -> EmbeddingMetadata {
    let mut metadata = EmbeddingMetadata::new();
    metadata.insert("filepath".to_string(), json!(filepath));
    metadata
}

async fn populated(temp_dir: &TempDir) -> EmbeddingDB {
    let db = EmbeddingDB::open(temp_dir.path().join("embeddings.db")).await.unwrap();
    let vectors = [("h1", [0.0, 0.0]), ("h2", [1.0, 0.0]), ("h3", [0.0, 2.0]), ("h4", [3.0, 3.0])];
    for (hash, vector) in vectors {
        db.upsert(MODEL, hash, &vector, &metadata(hash)).await.unwrap();
    }
    db
}

#[rstest]
#[tokio::test]
async fn query_ascending(temp_dir: TempDir) {
    let db = populated(&temp_dir).await;

    let result = db.query(MODEL, &[0.0, 0.0], 3).await.unwrap();
    let hashes = result.iter().map(|n| n.hash.as_str()).collect::<Vec<_>>();
    assert_eq!(hashes, ["h1", "h2", "h3"]);
    assert_eq!(result[0].distance, 0.0);
    assert!(result.windows(2).all(|w| w[0].distance <= w[1].distance));

    assert_eq!(db.query(MODEL, &[0.0, 0.0], 10).await.unwrap().len(), 4);
    assert!(db.query(MODEL, &[0.0, 0.0], 0).await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn search_by_hash_excludes_self(temp_dir: TempDir) {
    let db = populated(&temp_dir).await;

    let result = db.search_by_hash(MODEL, "h1", 2).await.unwrap();
    assert_eq!(result.iter().map(|n| n.hash.as_str()).collect::<Vec<_>>(), ["h2", "h3"]);

    let all = db.search_by_hash(MODEL, "h4", 10).await.unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|n| n.hash != "h4"));

    assert!(db.search_by_hash(MODEL, "missing", 3).await.unwrap().is_empty());
}

#[rstest]
#[tokio::test]
async fn huge_k_returns_everything(temp_dir: TempDir) {
    let db = populated(&temp_dir).await;

    assert_eq!(db.query(MODEL, &[0.0, 0.0], 1 << 40).await.unwrap().len(), 4);
    assert_eq!(db.query(MODEL, &[0.0, 0.0], usize::MAX).await.unwrap().len(), 4);

    let result = db.search_by_hash(MODEL, "h1", usize::MAX).await.unwrap();
    assert_eq!(result.iter().map(|n| n.hash.as_str()).collect::<Vec<_>>(), ["h2", "h3", "h4"]);
}

#[rstest]
#[tokio::test]
async fn search_by_hash_with_duplicate_vector(temp_dir: TempDir) {
    let db = populated(&temp_dir).await;
    // 与 h2 完全相同的向量，h2 仍然不能出现在自己的结果中
    db.upsert(MODEL, "h0", &[1.0, 0.0], &metadata("h0")).await.unwrap();

    let result = db.search_by_hash(MODEL, "h2", 1).await.unwrap();
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].hash, "h0");
}

#[rstest]
#[tokio::test]
async fn upsert_replaces(temp_dir: TempDir) {
    let db = populated(&temp_dir).await;
    db.upsert(MODEL, "h1", &[9.0, 9.0], &metadata("new.png")).await.unwrap();

    let entry = db.get_entry(MODEL, "h1").await.unwrap().unwrap();
    assert_eq!(entry.vector, vec![9.0, 9.0]);
    assert_eq!(entry.metadata["filepath"], "new.png");
    assert_eq!(db.count(MODEL).await.unwrap(), 4);
}

#[rstest]
#[tokio::test]
async fn dimension_mismatch(temp_dir: TempDir) {
    let db = populated(&temp_dir).await;

    let err = db.upsert(MODEL, "h5", &[1.0, 2.0, 3.0], &metadata("x")).await.unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 2, actual: 3, .. }));
    assert!(matches!(db.query(MODEL, &[1.0], 1).await, Err(Error::DimensionMismatch { .. })));

    // 其他模型可以使用不同维度
    db.upsert("other", "h5", &[1.0, 2.0, 3.0], &metadata("x")).await.unwrap();
}

#[rstest]
#[tokio::test]
async fn models_are_isolated(temp_dir: TempDir) {
    let db = populated(&temp_dir).await;
    db.upsert("other", "h1", &[5.0], &metadata("x")).await.unwrap();

    assert_eq!(db.list_models().await.unwrap(), vec![MODEL.to_string(), "other".to_string()]);
    assert_eq!(db.count("other").await.unwrap(), 1);
    assert_eq!(db.get(MODEL, "h1").await.unwrap(), Some(vec![0.0, 0.0]));
    assert_eq!(db.get("other", "h1").await.unwrap(), Some(vec![5.0]));
}

#[rstest]
#[tokio::test]
async fn reads_do_not_create_collections(temp_dir: TempDir) {
    let db = EmbeddingDB::open(temp_dir.path().join("embeddings.db")).await.unwrap();

    assert_eq!(db.count("nothing").await.unwrap(), 0);
    assert!(db.get_all("nothing").await.unwrap().is_empty());
    assert!(db.query("nothing", &[1.0], 3).await.unwrap().is_empty());
    assert!(!db.delete("nothing", "h").await.unwrap());
    assert!(db.list_models().await.unwrap().is_empty());

    let collection = db.get_or_create("nothing").await.unwrap();
    assert_eq!(db.get_or_create("nothing").await.unwrap(), collection);
    assert_eq!(collection.dimension, None);
}

#[rstest]
#[tokio::test]
async fn colliding_model_names(temp_dir: TempDir) {
    let db = EmbeddingDB::open(temp_dir.path().join("embeddings.db")).await.unwrap();
    db.get_or_create("a/b").await.unwrap();

    let err = db.get_or_create("a:b").await.unwrap_err();
    assert!(matches!(err, Error::Configuration(_)));
    assert_eq!(db.count("a:b").await.unwrap(), 0);
}

#[rstest]
#[tokio::test]
async fn bulk_reads(temp_dir: TempDir) {
    let db = populated(&temp_dir).await;

    let all = db.get_all(MODEL).await.unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all["h3"], vec![0.0, 2.0]);

    assert_eq!(db.list_hashes(MODEL, 2).await.unwrap(), vec!["h1", "h2"]);
    assert_eq!(db.hashes(MODEL).await.unwrap().len(), 4);

    assert!(db.delete(MODEL, "h1").await.unwrap());
    assert!(!db.delete(MODEL, "h1").await.unwrap());
    assert_eq!(db.count(MODEL).await.unwrap(), 3);
}

#[rstest]
#[tokio::test]
async fn query_with_cosine(temp_dir: TempDir) {
    let db = populated(&temp_dir).await;

    let result = db.query_with_cosine(MODEL, &[1.0, 0.0], 2).await.unwrap();
    assert_eq!(result[0].hash, "h2");
    assert!((result[0].cosine - 1.0).abs() < 1e-6);
    // h1 为零向量
    assert_eq!(result[1].hash, "h1");
    assert_eq!(result[1].cosine, 0.0);
}
