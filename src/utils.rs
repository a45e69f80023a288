use std::fmt;
use std::fs::{File, Metadata};
use std::io::{self, Read, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use indicatif::ProgressStyle;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// 流式计算哈希时每次读取的字节数
const CHUNK_SIZE: usize = 8192;

/// 支持的图片后缀名（小写）
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];

/// 图片内容哈希算法
///
/// 哈希值是三个存储之间唯一的主键，同一个归档必须始终使用同一种算法
#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ImageHash {
    /// SHA-256
    #[default]
    Sha256,
    /// BLAKE3
    Blake3,
}

enum Hasher {
    Sha256(Sha256),
    Blake3(Box<blake3::Hasher>),
}

impl Hasher {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finalize(self) -> String {
        match self {
            Self::Sha256(h) => format!("{:x}", h.finalize()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

impl ImageHash {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Blake3 => "blake3",
        }
    }

    fn hasher(&self) -> Hasher {
        match self {
            Self::Sha256 => Hasher::Sha256(Sha256::new()),
            Self::Blake3 => Hasher::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    /// 分块读取并计算哈希，返回十六进制字符串
    pub fn hash_reader<R: Read>(&self, mut reader: R) -> io::Result<String> {
        let mut hasher = self.hasher();
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            hasher.update(&buf[..n]);
        }
        Ok(hasher.finalize())
    }

    pub fn hash_bytes(&self, data: &[u8]) -> String {
        let mut hasher = self.hasher();
        hasher.update(data);
        hasher.finalize()
    }

    pub fn hash_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| Error::file_access(path, e))?;
        self.hash_reader(file).map_err(|e| Error::file_access(path, e))
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ImageHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sha256" => Ok(Self::Sha256),
            "blake3" => Ok(Self::Blake3),
            _ => Err(Error::Configuration(format!("未知的哈希算法: {s}"))),
        }
    }
}

/// 根据后缀名判断是否为图片
pub fn is_image(path: impl AsRef<Path>) -> bool {
    path.as_ref()
        .extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// 根据文件名猜测 MIME 类型
pub fn guess_mimetype(path: impl AsRef<Path>) -> &'static str {
    let ext = path
        .as_ref()
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => "application/octet-stream",
    }
}

/// 文件创建时间，不支持时退回到修改时间
pub fn file_created_at(metadata: &Metadata) -> Option<DateTime<Utc>> {
    metadata.created().or_else(|_| metadata.modified()).ok().map(DateTime::<Utc>::from)
}

/// 截断哈希用于显示
pub fn short_hash(hash: &str, len: usize) -> &str {
    hash.get(..len).unwrap_or(hash)
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .expect("invalid progress template")
        .progress_chars("#>-")
}

pub fn read_line(prompt: &str) -> io::Result<String> {
    print!("{}", prompt);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    Ok(line.trim().to_owned())
}

/// 询问用户是否继续，空输入视为否
pub fn confirm(prompt: &str) -> io::Result<bool> {
    loop {
        match read_line(prompt)?.to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "n" | "no" | "" => return Ok(false),
            _ => println!("请输入 y 或 n"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            ImageHash::Sha256.hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        // 跨越多个块
        let data = (0..CHUNK_SIZE * 3 + 17).map(|i| (i % 251) as u8).collect::<Vec<_>>();
        for hash in [ImageHash::Sha256, ImageHash::Blake3] {
            let streamed = hash.hash_reader(Cursor::new(&data)).unwrap();
            assert_eq!(streamed, hash.hash_bytes(&data));
            assert_eq!(streamed.len(), 64);
        }
    }

    #[test]
    fn test_algorithms_differ() {
        assert_ne!(ImageHash::Sha256.hash_bytes(b"x"), ImageHash::Blake3.hash_bytes(b"x"));
    }

    #[test]
    fn test_hash_name_roundtrip() {
        for hash in [ImageHash::Sha256, ImageHash::Blake3] {
            assert_eq!(hash.name().parse::<ImageHash>().unwrap(), hash);
        }
        assert!("md5".parse::<ImageHash>().is_err());
    }

    #[test]
    fn test_is_image() {
        assert!(is_image("a/b/c.PNG"));
        assert!(is_image("photo.jpeg"));
        assert!(!is_image("notes.txt"));
        assert!(!is_image("no_extension"));
    }

    #[test]
    fn test_guess_mimetype() {
        assert_eq!(guess_mimetype("x.JPG"), "image/jpeg");
        assert_eq!(guess_mimetype("x.tif"), "image/tiff");
        assert_eq!(guess_mimetype("x.raw"), "application/octet-stream");
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("abcdef", 3), "abc");
        assert_eq!(short_hash("ab", 16), "ab");
    }
}
