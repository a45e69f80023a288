#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use imarchive::utils::ImageHash;

/// 生成一张纯色小图，seed 不同则内容不同
pub fn write_png(dir: impl AsRef<Path>, name: &str, seed: u8) -> PathBuf {
    let path = dir.as_ref().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = RgbImage::from_fn(4, 3, |x, y| Rgb([seed, x as u8 * 10, y as u8 * 10]));
    img.save(&path).unwrap();
    path
}

pub fn sha256(path: impl AsRef<Path>) -> String {
    ImageHash::Sha256.hash_file(path).unwrap()
}
