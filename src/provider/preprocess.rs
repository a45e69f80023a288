use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat, ImageResult};

/// 发送给嵌入服务的图片最大边长
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;

/// 等比缩小图片，使宽高都不超过 max_dimension，不会放大
pub fn downscale(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max_dimension && height <= max_dimension {
        return img;
    }
    let scale = f64::min(
        max_dimension as f64 / width as f64,
        max_dimension as f64 / height as f64,
    );
    let new_width = ((width as f64 * scale) as u32).max(1);
    let new_height = ((height as f64 * scale) as u32).max(1);
    img.resize_exact(new_width, new_height, FilterType::Lanczos3)
}

/// 解码任意支持格式的图片，按需缩小后重新编码为 PNG
pub fn encode_png(data: &[u8], max_dimension: Option<u32>) -> ImageResult<Vec<u8>> {
    let mut img = image::load_from_memory(data)?;
    if let Some(max_dimension) = max_dimension {
        img = downscale(img, max_dimension);
    }
    // 带透明通道的图片统一转为 RGB
    if img.color().has_alpha() {
        img = DynamicImage::ImageRgb8(img.to_rgb8());
    }
    let mut buf = Cursor::new(Vec::new());
    img.write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", STANDARD.encode(png))
}
