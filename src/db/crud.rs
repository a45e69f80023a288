use chrono::Utc;
use sqlx::{Executor, Result, Sqlite};

use super::ImageRecord;

/// 插入图片记录，哈希已存在时整体替换
///
/// ingested_at 为空时使用当前时间；已有记录的 ingested_at 不会被覆盖
pub async fn upsert_image<'c, E>(executor: E, record: &ImageRecord) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    let ingested_at = record.ingested_at.unwrap_or_else(Utc::now);
    sqlx::query(
        r#"
        INSERT INTO image (hash, width, height, size, mimetype, created_at, ingested_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (hash) DO UPDATE SET
            width = excluded.width,
            height = excluded.height,
            size = excluded.size,
            mimetype = excluded.mimetype,
            created_at = excluded.created_at,
            ingested_at = COALESCE(image.ingested_at, excluded.ingested_at)
        "#,
    )
    .bind(&record.hash)
    .bind(record.width)
    .bind(record.height)
    .bind(record.size)
    .bind(&record.mimetype)
    .bind(record.created_at)
    .bind(ingested_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// 按完整哈希查找图片记录
pub async fn get_image<'c, E>(executor: E, hash: &str) -> Result<Option<ImageRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ImageRecord>(
        "SELECT hash, width, height, size, mimetype, created_at, ingested_at FROM image WHERE hash = ?",
    )
    .bind(hash)
    .fetch_optional(executor)
    .await
}

/// 查找哈希以 prefix 开头的所有记录，空前缀返回全部
pub async fn find_images_by_prefix<'c, E>(executor: E, prefix: &str) -> Result<Vec<ImageRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    // 不使用 LIKE，避免前缀中的 % 和 _ 被当作通配符
    sqlx::query_as::<_, ImageRecord>(
        r#"
        SELECT hash, width, height, size, mimetype, created_at, ingested_at
        FROM image
        WHERE substr(hash, 1, length(?1)) = ?1
        ORDER BY hash
        "#,
    )
    .bind(prefix)
    .fetch_all(executor)
    .await
}

pub async fn list_images<'c, E>(executor: E) -> Result<Vec<ImageRecord>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_as::<_, ImageRecord>(
        "SELECT hash, width, height, size, mimetype, created_at, ingested_at FROM image ORDER BY hash",
    )
    .fetch_all(executor)
    .await
}

/// 只取哈希列，用于集合比较
pub async fn list_image_hashes<'c, E>(executor: E) -> Result<Vec<String>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar::<_, String>("SELECT hash FROM image ORDER BY hash").fetch_all(executor).await
}

/// 删除图片记录，返回记录是否存在
pub async fn delete_image<'c, E>(executor: E, hash: &str) -> Result<bool>
where
    E: Executor<'c, Database = Sqlite>,
{
    let result = sqlx::query("DELETE FROM image WHERE hash = ?").bind(hash).execute(executor).await?;
    Ok(result.rows_affected() > 0)
}

pub async fn count_images<'c, E>(executor: E) -> Result<i64>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM image").fetch_one(executor).await
}

pub async fn get_meta<'c, E>(executor: E, key: &str) -> Result<Option<String>>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query_scalar::<_, String>("SELECT value FROM meta WHERE key = ?")
        .bind(key)
        .fetch_optional(executor)
        .await
}

pub async fn set_meta<'c, E>(executor: E, key: &str, value: &str) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO meta (key, value) VALUES (?, ?) ON CONFLICT (key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value)
    .execute(executor)
    .await?;
    Ok(())
}
