use std::cmp::Ordering;

use rayon::prelude::*;

/// 平方欧氏距离
#[inline(always)]
pub fn l2_sqr(va: &[f32], vb: &[f32]) -> f32 {
    va.iter()
        .zip(vb)
        .map(|(a, b)| {
            let d = a - b;
            d * d
        })
        .sum()
}

/// 余弦相似度，任意一方模长为 0 时返回 0
pub fn cosine(va: &[f32], vb: &[f32]) -> f32 {
    let dot: f32 = va.iter().zip(vb).map(|(a, b)| a * b).sum();
    let na = va.iter().map(|a| a * a).sum::<f32>().sqrt();
    let nb = vb.iter().map(|b| b * b).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
}

/// 有界的最近邻集合，内部始终按 (距离, 下标) 升序排列
#[derive(Debug, Clone)]
pub struct TopK {
    k: usize,
    items: Vec<(f32, usize)>,
}

fn cmp_item(a: &(f32, usize), b: &(f32, usize)) -> Ordering {
    a.0.total_cmp(&b.0).then(a.1.cmp(&b.1))
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self { k, items: Vec::new() }
    }

    pub fn push(&mut self, idx: usize, distance: f32) {
        if self.k == 0 {
            return;
        }
        let item = (distance, idx);
        if self.items.len() == self.k {
            // 比当前最远的还远，直接丢弃
            if let Some(last) = self.items.last() {
                if cmp_item(&item, last) != Ordering::Less {
                    return;
                }
            }
        }
        let pos = self.items.partition_point(|x| cmp_item(x, &item) == Ordering::Less);
        self.items.insert(pos, item);
        self.items.truncate(self.k);
    }

    pub fn merge(mut self, other: TopK) -> Self {
        for (distance, idx) in other.items {
            self.push(idx, distance);
        }
        self
    }

    /// 返回 (下标, 距离)，按距离升序
    pub fn into_sorted(self) -> Vec<(usize, f32)> {
        self.items.into_iter().map(|(d, i)| (i, d)).collect()
    }
}

/// 在 vb 中查找距离 va 最近的 k 个向量，返回 (下标, 距离)
///
/// 距离相同时下标较小者优先，维度与 va 不一致的向量会被跳过
pub fn knn_l2<V>(va: &[f32], vb: &[V], k: usize) -> Vec<(usize, f32)>
where
    V: AsRef<[f32]> + Sync,
{
    let k = k.min(vb.len());
    vb.par_iter()
        .enumerate()
        .fold(
            || TopK::new(k),
            |mut acc, (i, v)| {
                let v = v.as_ref();
                if v.len() == va.len() {
                    acc.push(i, l2_sqr(va, v));
                }
                acc
            },
        )
        .reduce(|| TopK::new(k), TopK::merge)
        .into_sorted()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_identical() {
        assert_eq!(l2_sqr(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn test_l2_squared() {
        assert_eq!(l2_sqr(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }

    #[test]
    fn test_cosine() {
        assert!((cosine(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
    }

    #[test]
    fn test_knn_sorted() {
        let va = [0.0f32, 0.0];
        // 距离分别为 4, 0, 1
        let vb = vec![vec![2.0f32, 0.0], vec![0.0, 0.0], vec![0.0, 1.0]];
        let result = knn_l2(&va, &vb, 3);
        let ids = result.iter().map(|(i, _)| *i).collect::<Vec<_>>();
        assert_eq!(ids, &[1, 2, 0]);
        assert_eq!(result[0].1, 0.0);
    }

    #[test]
    fn test_knn_k_limit() {
        let va = [0.0f32];
        let vb = (0..100).map(|i| vec![i as f32]).collect::<Vec<_>>();
        let result = knn_l2(&va, &vb, 5);
        assert_eq!(result.iter().map(|(i, _)| *i).collect::<Vec<_>>(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_knn_fewer_than_k() {
        let va = [0.0f32];
        let vb = vec![vec![1.0f32], vec![2.0]];
        assert_eq!(knn_l2(&va, &vb, 10).len(), 2);
    }

    #[test]
    fn test_knn_ties_prefer_lower_index() {
        let va = [0.0f32];
        let vb = vec![vec![1.0f32], vec![-1.0], vec![1.0]];
        let ids = knn_l2(&va, &vb, 2).into_iter().map(|(i, _)| i).collect::<Vec<_>>();
        assert_eq!(ids, &[0, 1]);
    }

    #[test]
    fn test_knn_skips_wrong_dimension() {
        let va = [0.0f32, 0.0];
        let vb = vec![vec![0.0f32], vec![1.0, 1.0]];
        assert_eq!(knn_l2(&va, &vb, 2), vec![(1, 2.0)]);
    }

    #[test]
    fn test_knn_huge_k() {
        let va = [0.0f32];
        let vb = vec![vec![2.0f32], vec![1.0]];
        assert_eq!(knn_l2(&va, &vb, usize::MAX), vec![(1, 1.0), (0, 4.0)]);
        assert_eq!(knn_l2(&va, &vb, 1 << 40).len(), 2);
    }

    #[test]
    fn test_knn_zero_k() {
        assert!(knn_l2(&[0.0f32], &[vec![0.0f32]], 0).is_empty());
    }
}
