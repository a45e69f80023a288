use sha2::{Digest, Sha256};

use super::{EmbeddingProvider, ProviderError};

pub const MOCK_DIMENSION: usize = 512;

/// 不依赖网络的确定性嵌入，用于测试和离线演示
///
/// 相同的图片字节总是得到相同的单位向量
#[derive(Debug, Clone)]
pub struct MockEmbeddingProvider {
    dimension: usize,
}

impl Default for MockEmbeddingProvider {
    fn default() -> Self {
        Self::new(MOCK_DIMENSION)
    }
}

impl MockEmbeddingProvider {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 用 SHA-256 链生成伪随机分量并归一化
    pub fn vector_for(&self, data: &[u8]) -> Vec<f32> {
        let seed = Sha256::digest(data);
        let mut vector = Vec::with_capacity(self.dimension);
        let mut counter = 0u32;
        while vector.len() < self.dimension {
            let mut hasher = Sha256::new();
            hasher.update(seed);
            hasher.update(counter.to_le_bytes());
            for byte in hasher.finalize() {
                if vector.len() == self.dimension {
                    break;
                }
                vector.push(byte as f32 / 255.0 - 0.5);
            }
            counter += 1;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|x| *x /= norm);
        }
        vector
    }
}

impl EmbeddingProvider for MockEmbeddingProvider {
    async fn health(&self) -> bool {
        true
    }

    async fn embed(&self, image: &[u8], _model: &str) -> Result<Vec<f32>, ProviderError> {
        Ok(self.vector_for(image))
    }

    async fn list_models(&self) -> Vec<String> {
        vec!["mock-512".to_string(), "mock-768".to_string(), "mock-1024".to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_deterministic() {
        let provider = MockEmbeddingProvider::default();
        assert_eq!(provider.vector_for(b"hello"), provider.vector_for(b"hello"));
        assert_ne!(provider.vector_for(b"hello"), provider.vector_for(b"world"));
    }

    #[test]
    fn test_mock_unit_length() {
        let provider = MockEmbeddingProvider::new(100);
        let v = provider.vector_for(b"image");
        assert_eq!(v.len(), 100);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn test_mock_embed() {
        let provider = MockEmbeddingProvider::new(8);
        assert!(provider.health().await);
        assert_eq!(provider.embed(b"x", "any").await.unwrap().len(), 8);
        assert!(!provider.list_models().await.is_empty());
    }
}
