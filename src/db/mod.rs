use std::collections::HashSet;
use std::path::Path;

use log::{info, warn};
use sqlx::migrate::Migrator;
use sqlx::{SqlitePool, sqlite::*};

pub mod crud;
pub mod model;

pub use model::*;

use crate::error::{Error, Result};
use crate::utils::ImageHash;

pub type Database = SqlitePool;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations/metadata");

/// 记录哈希算法的 meta 键
const META_HASH: &str = "hash";

/// 打开（必要时创建）一个 SQLite 数据库并执行迁移
///
/// 文件或目录无法创建时返回 StorageUnavailable
pub async fn init_db(filename: impl AsRef<Path>, migrator: &Migrator) -> Result<Database> {
    let filename = filename.as_ref();
    info!("初始化数据库连接: {}", filename.display());

    let unavailable = |source| Error::StorageUnavailable { path: filename.to_path_buf(), source };

    if let Some(parent) = filename.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| unavailable(sqlx::Error::Io(e)))?;
    }

    let options = SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .filename(filename)
        .create_if_missing(true);

    let pool = SqlitePool::connect_with(options).await.map_err(unavailable)?;

    info!("检查数据库迁移");
    migrator.run(&pool).await?;

    Ok(pool)
}

/// 图片元数据存储，以内容哈希为主键
#[derive(Clone)]
pub struct ImageDB {
    pool: Database,
}

impl ImageDB {
    pub async fn open(filename: impl AsRef<Path>) -> Result<Self> {
        let pool = init_db(filename, &MIGRATOR).await?;
        Ok(Self { pool })
    }

    /// 检查数据库使用的哈希算法，首次使用且 persist 为 true 时写入
    pub async fn check_hash_algorithm(&self, hash: ImageHash, persist: bool) -> Result<()> {
        match crud::get_meta(&self.pool, META_HASH).await? {
            Some(stored) => {
                let stored = stored.parse::<ImageHash>()?;
                if stored != hash {
                    return Err(Error::Configuration(format!(
                        "哈希算法不一致：数据库使用 {stored}，当前为 {hash}"
                    )));
                }
            }
            None if persist => {
                if self.count().await? > 0 {
                    warn!("数据库中已有图片但未记录哈希算法，假定为 {}", hash);
                }
                crud::set_meta(&self.pool, META_HASH, hash.name()).await?;
            }
            None => {}
        }
        Ok(())
    }

    pub async fn upsert(&self, record: &ImageRecord) -> Result<()> {
        crud::upsert_image(&self.pool, record).await?;
        Ok(())
    }

    pub async fn get(&self, hash: &str) -> Result<Option<ImageRecord>> {
        Ok(crud::get_image(&self.pool, hash).await?)
    }

    pub async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ImageRecord>> {
        Ok(crud::find_images_by_prefix(&self.pool, prefix).await?)
    }

    pub async fn list_all(&self) -> Result<Vec<ImageRecord>> {
        Ok(crud::list_images(&self.pool).await?)
    }

    pub async fn hashes(&self) -> Result<HashSet<String>> {
        Ok(crud::list_image_hashes(&self.pool).await?.into_iter().collect())
    }

    pub async fn delete(&self, hash: &str) -> Result<bool> {
        Ok(crud::delete_image(&self.pool, hash).await?)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(crud::count_images(&self.pool).await? as u64)
    }
}
