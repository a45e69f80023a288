use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::{file_created_at, guess_mimetype};

/// 图片记录，每份不同的图片内容对应一条
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageRecord {
    /// 图片内容哈希，主键
    pub hash: String,
    /// 宽度（像素）
    pub width: u32,
    /// 高度（像素）
    pub height: u32,
    /// 原始文件字节数
    pub size: i64,
    /// 根据文件名猜测的 MIME 类型
    pub mimetype: String,
    /// 文件在磁盘上的创建时间（或修改时间）
    pub created_at: Option<DateTime<Utc>>,
    /// 首次入库时间，插入后不再改变
    pub ingested_at: Option<DateTime<Utc>>,
}

impl ImageRecord {
    /// 从文件中提取元数据，哈希由调用方预先计算
    ///
    /// 只读取图片头来获取尺寸，不会解码整张图片
    pub fn from_file(path: impl AsRef<Path>, hash: impl Into<String>) -> Result<Self> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(|e| Error::file_access(path, e))?;
        let (width, height) = image::image_dimensions(path)
            .map_err(|source| Error::ImageDecode { path: path.to_path_buf(), source })?;

        Ok(Self {
            hash: hash.into(),
            width,
            height,
            size: metadata.len() as i64,
            mimetype: guess_mimetype(path).to_owned(),
            created_at: file_created_at(&metadata),
            ingested_at: None,
        })
    }
}
