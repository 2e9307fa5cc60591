//! 降采样计划
//!
//! 给定帧几何与缩放因子，计算步长与输出样本数，并按扫描顺序给出源像素下标。

use contracts::GridShape;

/// 降采样计划 (纯数据，可缓存)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimationPlan {
    /// 源帧宽度
    pub width: u32,
    /// 源帧高度
    pub height: u32,
    /// 步长 (>= 1)
    pub stride: u32,
    /// 每行采样列数 `floor(width / stride)`
    pub columns: u32,
    /// 采样行数 `floor(height / stride)`
    pub rows: u32,
    /// 样本总数 `columns * rows`
    pub sample_count: usize,
}

/// 归一化缩放因子：<= 0 视为 1
#[inline]
pub fn normalize_factor(scale_down_factor: i32) -> u32 {
    if scale_down_factor <= 0 {
        1
    } else {
        scale_down_factor as u32
    }
}

/// 计算降采样计划
///
/// 宽高 <= 0 时得到空计划 (样本数 0)，调用方负责在此之前拒绝。
pub fn plan(width: i32, height: i32, scale_down_factor: i32) -> DecimationPlan {
    let width = width.max(0) as u32;
    let height = height.max(0) as u32;
    let stride = normalize_factor(scale_down_factor);
    let columns = width / stride;
    let rows = height / stride;

    DecimationPlan {
        width,
        height,
        stride,
        columns,
        rows,
        sample_count: columns as usize * rows as usize,
    }
}

impl DecimationPlan {
    pub fn grid(&self) -> GridShape {
        GridShape::new(self.columns, self.rows)
    }

    /// 按扫描顺序 (行优先，行内 x 递增) 产生源像素下标 `x + y * width`
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        let width = self.width as usize;
        let stride = self.stride as usize;
        let columns = self.columns as usize;
        (0..self.rows as usize).flat_map(move |row| {
            let y = row * stride;
            (0..columns).map(move |col| col * stride + y * width)
        })
    }

    /// 几何是否相同 (用于复用已缓存的计划)
    pub fn matches(&self, width: i32, height: i32, scale_down_factor: i32) -> bool {
        width > 0
            && height > 0
            && self.width == width as u32
            && self.height == height as u32
            && self.stride == normalize_factor(scale_down_factor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinect_vga_factor_ten() {
        let p = plan(640, 480, 10);
        assert_eq!(p.stride, 10);
        assert_eq!((p.columns, p.rows), (64, 48));
        assert_eq!(p.sample_count, 3072);
    }

    #[test]
    fn non_positive_factor_normalizes_to_one() {
        for factor in [0, -1, -100] {
            let p = plan(640, 480, factor);
            assert_eq!(p.stride, 1);
            assert_eq!(p.sample_count, 307_200);
        }
    }

    #[test]
    fn scan_order_two_by_two_factor_two() {
        let p = plan(4, 2, 1);
        let idx: Vec<usize> = p.indices().collect();
        assert_eq!(idx, vec![0, 1, 2, 3, 4, 5, 6, 7]);

        let p = plan(4, 4, 2);
        let idx: Vec<usize> = p.indices().collect();
        assert_eq!(idx, vec![0, 2, 8, 10]);
    }

    #[test]
    fn non_divisible_geometry_walks_floor_counts() {
        let p = plan(5, 3, 2);
        assert_eq!((p.columns, p.rows), (2, 1));
        assert_eq!(p.sample_count, 2);
        let idx: Vec<usize> = p.indices().collect();
        assert_eq!(idx.len(), p.sample_count);
        assert_eq!(idx, vec![0, 2]);
    }

    #[test]
    fn factor_larger_than_frame_yields_no_samples() {
        let p = plan(4, 2, 8);
        assert_eq!(p.sample_count, 0);
        assert_eq!(p.indices().count(), 0);
        assert!(p.grid().is_empty());
    }

    #[test]
    fn matches_same_geometry() {
        let p = plan(640, 480, 0);
        assert!(p.matches(640, 480, 1));
        assert!(p.matches(640, 480, -5));
        assert!(!p.matches(320, 240, 1));
    }
}
