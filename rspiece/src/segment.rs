//! 片段定义
//!
//! 片段描述虚拟流中一段连续字节及其物理位置：
//! ```text
//! ┌────────────┬──────────────────────────────────────┐
//! │ length     │ source                               │
//! │ u64        │ Backing { offset } | Cache { i, off }│
//! └────────────┴──────────────────────────────────────┘
//! ```
//! 片段创建后不可变，拆分/合并都产生新值。

/// 片段字节的物理来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SegmentSource {
    /// 源存储中的偏移
    Backing { offset: u64 },
    /// 第 `index` 个缓存中的偏移
    Cache { index: usize, offset: u64 },
}

impl SegmentSource {
    /// 来源内的起始偏移
    pub fn offset(&self) -> u64 {
        match *self {
            SegmentSource::Backing { offset } => offset,
            SegmentSource::Cache { offset, .. } => offset,
        }
    }

    /// 缓存编号，源存储返回 None
    pub fn cache_index(&self) -> Option<usize> {
        match *self {
            SegmentSource::Backing { .. } => None,
            SegmentSource::Cache { index, .. } => Some(index),
        }
    }

    /// 同一物理介质上向后偏移 `delta` 的位置
    fn advanced(&self, delta: u64) -> Self {
        match *self {
            SegmentSource::Backing { offset } => SegmentSource::Backing {
                offset: offset + delta,
            },
            SegmentSource::Cache { index, offset } => SegmentSource::Cache {
                index,
                offset: offset + delta,
            },
        }
    }
}

/// 虚拟流中的一段连续字节
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Segment {
    pub length: u64,
    pub source: SegmentSource,
}

impl Segment {
    /// 位于源存储的片段
    pub fn backing(offset: u64, length: u64) -> Self {
        Self {
            length,
            source: SegmentSource::Backing { offset },
        }
    }

    /// 位于缓存的片段
    pub fn cached(index: usize, offset: u64, length: u64) -> Self {
        Self {
            length,
            source: SegmentSource::Cache { index, offset },
        }
    }

    pub fn offset(&self) -> u64 {
        self.source.offset()
    }

    /// 来源内的结束偏移（不含）
    pub fn end_offset(&self) -> u64 {
        self.source.offset() + self.length
    }

    pub fn cache_index(&self) -> Option<usize> {
        self.source.cache_index()
    }

    pub fn is_backing(&self) -> bool {
        matches!(self.source, SegmentSource::Backing { .. })
    }

    /// 在片段内偏移 `at` 处拆成左右两段
    ///
    /// 调用方保证 `0 < at < length`，右段紧接左段的物理位置。
    pub fn split(&self, at: u64) -> (Segment, Segment) {
        debug_assert!(at > 0 && at < self.length, "split at {} of {}", at, self.length);
        let left = Segment {
            length: at,
            source: self.source,
        };
        let right = Segment {
            length: self.length - at,
            source: self.source.advanced(at),
        };
        (left, right)
    }

    /// 与紧随其后的片段合并
    ///
    /// 只有来源相同且物理上首尾相接才能合并。
    pub fn merge(&self, next: &Segment) -> Option<Segment> {
        if self.cache_index() != next.cache_index() || next.offset() != self.end_offset() {
            return None;
        }
        Some(Segment {
            length: self.length + next.length,
            source: self.source,
        })
    }
}
