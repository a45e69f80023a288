use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use indicatif::{ParallelProgressIterator, ProgressBar};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::utils::{ImageHash, is_image};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct SnapshotMeta {
    base_path: Option<String>,
    relative: bool,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    #[serde(rename = "_meta")]
    meta: SnapshotMeta,
    images: BTreeMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotRepr {
    Versioned(SnapshotFile),
    /// 旧格式：没有 `_meta`，整个文件就是 hash -> 绝对路径
    Legacy(BTreeMap<String, String>),
}

/// 某一时刻哈希到路径的映射，可以随时从文件系统重建
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathIndexSnapshot {
    pub images: BTreeMap<String, String>,
    /// 仅在 relative 为 true 时存在
    pub base_path: Option<String>,
    pub relative: bool,
}

impl PathIndexSnapshot {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    fn resolve_path(&self, path: &str) -> PathBuf {
        match (&self.base_path, self.relative) {
            (Some(base), true) if !Path::new(path).is_absolute() => Path::new(base).join(path),
            _ => PathBuf::from(path),
        }
    }

    /// 获取哈希对应的文件路径，相对路径会拼接 base_path
    pub fn resolve(&self, hash: &str) -> Option<PathBuf> {
        self.images.get(hash).map(|path| self.resolve_path(path))
    }

    /// 所有以 prefix 开头的哈希及其路径，按哈希排序
    pub fn find_by_prefix(&self, prefix: &str) -> Vec<(String, PathBuf)> {
        self.images
            .range(prefix.to_owned()..)
            .take_while(|(hash, _)| hash.starts_with(prefix))
            .map(|(hash, path)| (hash.clone(), self.resolve_path(path)))
            .collect()
    }

    pub fn from_reader(reader: impl std::io::Read) -> Result<Self> {
        Ok(match serde_json::from_reader(reader)? {
            SnapshotRepr::Versioned(file) => Self {
                images: file.images,
                base_path: file.meta.base_path,
                relative: file.meta.relative,
            },
            SnapshotRepr::Legacy(images) => Self { images, base_path: None, relative: false },
        })
    }

    /// 先写入临时文件再重命名，读者不会看到写了一半的快照
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp_file = path.as_os_str().to_owned();
        tmp_file.push(".tmp");
        let tmp_file = PathBuf::from(tmp_file);

        let file = SnapshotFile {
            meta: SnapshotMeta { base_path: self.base_path.clone(), relative: self.relative },
            images: self.images.clone(),
        };
        let mut writer = BufWriter::new(File::create(&tmp_file)?);
        serde_json::to_writer_pretty(&mut writer, &file)?;
        writer.flush()?;
        writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        std::fs::rename(&tmp_file, path)?;
        Ok(())
    }
}

/// 扫描目录下的所有图片并计算哈希
///
/// 无法读取的文件会被跳过；同一哈希出现在多个路径时保留字典序最小的路径。
/// `root` 也可以直接是一张图片，此时总是记录其绝对路径。
pub fn scan_directory(
    root: impl AsRef<Path>,
    recursive: bool,
    relative: bool,
    hash: ImageHash,
    pb: &ProgressBar,
) -> Result<BTreeMap<String, String>> {
    let root = std::path::absolute(root.as_ref()).map_err(|e| Error::file_access(root.as_ref(), e))?;
    let metadata = std::fs::metadata(&root).map_err(|e| Error::file_access(&root, e))?;

    let single_file = metadata.is_file();
    let files = if single_file {
        if is_image(&root) { vec![root.clone()] } else { vec![] }
    } else {
        let mut walker = WalkDir::new(&root).sort_by_file_name();
        if !recursive {
            walker = walker.max_depth(1);
        }
        walker
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("无法访问: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>()
    };
    debug!("{} 下共有 {} 张图片", root.display(), files.len());

    pb.set_length(files.len() as u64);
    let hashed = files
        .into_par_iter()
        .progress_with(pb.clone())
        .filter_map(|path| match hash.hash_file(&path) {
            Ok(hash) => Some((hash, path)),
            Err(e) => {
                warn!("跳过无法读取的文件: {}", e);
                None
            }
        })
        .collect::<Vec<_>>();

    let mut images = BTreeMap::new();
    for (hash, path) in hashed {
        let path = match path.strip_prefix(&root) {
            Ok(rel) if relative && !single_file => rel.to_string_lossy().into_owned(),
            _ => path.to_string_lossy().into_owned(),
        };
        match images.entry(hash) {
            Entry::Vacant(entry) => {
                entry.insert(path);
            }
            Entry::Occupied(mut entry) => {
                debug!("重复图片: {} 与 {}", entry.get(), path);
                if path < *entry.get() {
                    entry.insert(path);
                }
            }
        }
    }
    Ok(images)
}

/// 持久化在磁盘上的路径索引
#[derive(Debug, Clone)]
pub struct PathIndex {
    file: PathBuf,
    hash: ImageHash,
}

impl PathIndex {
    pub fn new(file: impl Into<PathBuf>, hash: ImageHash) -> Self {
        Self { file: file.into(), hash }
    }

    pub fn file(&self) -> &Path {
        &self.file
    }

    pub fn scan_directory(
        &self,
        root: impl AsRef<Path>,
        recursive: bool,
        relative: bool,
        pb: &ProgressBar,
    ) -> Result<BTreeMap<String, String>> {
        scan_directory(root, recursive, relative, self.hash, pb)
    }

    /// 重新扫描并整体替换磁盘上的快照
    pub fn build_and_persist(
        &self,
        root: impl AsRef<Path>,
        recursive: bool,
        relative: bool,
        pb: &ProgressBar,
    ) -> Result<PathIndexSnapshot> {
        let root = root.as_ref();
        let images = self.scan_directory(root, recursive, relative, pb)?;
        let base_path = match relative {
            true => Some(
                std::path::absolute(root)
                    .map_err(|e| Error::file_access(root, e))?
                    .to_string_lossy()
                    .into_owned(),
            ),
            false => None,
        };
        let snapshot = PathIndexSnapshot { images, base_path, relative };
        snapshot.save(&self.file)?;
        info!("路径索引已保存到 {}，共 {} 张图片", self.file.display(), snapshot.len());
        Ok(snapshot)
    }

    /// 读取快照，文件不存在时返回 None
    pub fn load(&self) -> Result<Option<PathIndexSnapshot>> {
        match File::open(&self.file) {
            Ok(file) => Ok(Some(PathIndexSnapshot::from_reader(BufReader::new(file))?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::file_access(&self.file, e)),
        }
    }
}
