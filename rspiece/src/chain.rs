//! 片段链
//!
//! 有序的片段双向链表，节点存放在一个数组中，用 `NodeId` 下标互相引用，
//! 释放的槽位会被复用。链上所有片段长度之和恒等于虚拟流长度：
//! ```text
//!  head                                                  tail
//!   ↓                                                      ↓
//! ┌──────────┐   ┌──────────┐   ┌──────────┐   ┌──────────┐
//! │ Backing  │ ⇄ │ Cache 0  │ ⇄ │ Backing  │ ⇄ │ Cache 1  │
//! │ 0..3     │   │ 0..3     │   │ 3..6     │   │ 0..2     │
//! └──────────┘   └──────────┘   └──────────┘   └──────────┘
//! 虚拟位置: 0      3              6              9       11
//! ```
//! 定位是从头线性扫描，片段数靠合并保持在较小规模。

use std::iter;

use crate::error::{EditError, Result};
use crate::segment::Segment;

/// 链节点下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug, Clone)]
struct Node {
    segment: Segment,
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

/// 定位结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub node: NodeId,
    /// 片段起点在虚拟流中的位置
    pub start: u64,
    /// 目标位置相对片段起点的偏移
    pub offset: u64,
    pub segment: Segment,
}

impl Location {
    /// 目标位置在虚拟流中的绝对位置
    pub fn position(&self) -> u64 {
        self.start + self.offset
    }
}

/// 片段链
#[derive(Debug, Default)]
pub struct SegmentChain {
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: Option<NodeId>,
    tail: Option<NodeId>,
    count: usize,
    length: u64,
}

impl SegmentChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以单个源存储片段覆盖 `[0, length)` 的链
    pub fn with_length(length: u64) -> Self {
        let mut chain = Self::new();
        chain.reset(length);
        chain
    }

    /// 丢弃所有片段，恢复为覆盖整个源存储的平凡状态
    pub fn reset(&mut self, length: u64) {
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
        self.count = 0;
        self.length = length;
        if length > 0 {
            self.insert_between(None, None, Segment::backing(0, length));
        }
    }

    /// 虚拟流长度
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn segment_count(&self) -> usize {
        self.count
    }

    /// 是否为单个从 0 开始的源存储片段（或空链）
    pub fn is_trivial(&self) -> bool {
        match (self.count, self.first()) {
            (0, _) => true,
            (1, Some(seg)) => seg.is_backing() && seg.offset() == 0,
            _ => false,
        }
    }

    pub fn first(&self) -> Option<Segment> {
        self.head.map(|id| self.nodes[id.0].segment)
    }

    pub fn last(&self) -> Option<Segment> {
        self.tail.map(|id| self.nodes[id.0].segment)
    }

    pub fn segment(&self, id: NodeId) -> Segment {
        self.nodes[id.0].segment
    }

    pub fn next(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].next
    }

    pub fn prev(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].prev
    }

    /// 从头到尾遍历片段
    pub fn iter(&self) -> impl Iterator<Item = &Segment> + '_ {
        iter::successors(self.head, move |id| self.nodes[id.0].next)
            .map(move |id| &self.nodes[id.0].segment)
    }

    /// 从尾到头遍历片段
    pub fn iter_rev(&self) -> impl Iterator<Item = &Segment> + '_ {
        iter::successors(self.tail, move |id| self.nodes[id.0].prev)
            .map(move |id| &self.nodes[id.0].segment)
    }

    /// 当前片段列表的拷贝
    pub fn segments(&self) -> Vec<Segment> {
        self.iter().copied().collect()
    }

    // ------------------------------------------------------------------
    // 定位
    // ------------------------------------------------------------------

    /// 找到包含 `position` 的片段
    ///
    /// `position >= len()` 或链为空时返回 None。
    pub fn locate(&self, position: u64) -> Option<Location> {
        if position >= self.length {
            return None;
        }

        let mut start = 0u64;
        let mut cursor = self.head;
        while let Some(id) = cursor {
            let segment = self.nodes[id.0].segment;
            if position < start + segment.length {
                return Some(Location {
                    node: id,
                    start,
                    offset: position - start,
                    segment,
                });
            }
            start += segment.length;
            cursor = self.nodes[id.0].next;
        }
        None
    }

    /// 定位半开区间 `[start, end)` 两端所在的片段
    ///
    /// 结束位置落在片段边界时取前一个片段（offset 等于其长度）；
    /// `end >= len()` 时结束端为尾片段的末尾。
    pub fn locate_range(&self, start: u64, end: u64) -> Option<(Location, Location)> {
        let first = self.locate(start)?;

        if end >= self.length {
            let tail = self.tail?;
            let segment = self.nodes[tail.0].segment;
            let last = Location {
                node: tail,
                start: self.length - segment.length,
                offset: segment.length,
                segment,
            };
            return Some((first, last));
        }

        let mut pos = first.start;
        let mut cursor = Some(first.node);
        while let Some(id) = cursor {
            let segment = self.nodes[id.0].segment;
            if end <= pos + segment.length {
                let last = Location {
                    node: id,
                    start: pos,
                    offset: end - pos,
                    segment,
                };
                return Some((first, last));
            }
            pos += segment.length;
            cursor = self.nodes[id.0].next;
        }
        None
    }

    // ------------------------------------------------------------------
    // 修改
    // ------------------------------------------------------------------

    /// 在虚拟位置 `position` 插入片段，返回插入（或合并后）的节点
    pub fn insert(&mut self, position: u64, segment: Segment) -> Result<NodeId> {
        if position > self.length {
            return Err(EditError::Inconsistent(format!(
                "insert at {} beyond length {}",
                position, self.length
            )));
        }
        if segment.length == 0 {
            return Err(EditError::Inconsistent(
                "zero-length segment inserted".to_string(),
            ));
        }

        let id = match self.locate(position) {
            // 追加到末尾（含空链）
            None => self.insert_between(self.tail, None, segment),
            Some(loc) if loc.offset == 0 => {
                let prev = self.nodes[loc.node.0].prev;
                self.insert_between(prev, Some(loc.node), segment)
            }
            Some(loc) => {
                let (left, right) = loc.segment.split(loc.offset);
                self.nodes[loc.node.0].segment = right;
                let prev = self.nodes[loc.node.0].prev;
                let left_id = self.insert_between(prev, Some(loc.node), left);
                self.insert_between(Some(left_id), Some(loc.node), segment)
            }
        };

        self.length += segment.length;
        Ok(self.merge_around(id))
    }

    /// 删除 `[start, start + length)`，返回实际删除的字节数
    ///
    /// 区间越过末尾时只删除到末尾；起点无法定位属于内部错误。
    pub fn remove(&mut self, start: u64, length: u64) -> Result<u64> {
        if length == 0 {
            return Ok(0);
        }

        let end = start.saturating_add(length);
        let (first, last) = self.locate_range(start, end).ok_or_else(|| {
            EditError::Inconsistent(format!(
                "cannot resolve range {}..{} (length {})",
                start, end, self.length
            ))
        })?;

        // 两端保留下来的部分
        let left = (first.offset > 0).then(|| first.segment.split(first.offset).0);
        let right = (last.offset > 0 && last.offset < last.segment.length)
            .then(|| last.segment.split(last.offset).1);

        let before = self.nodes[first.node.0].prev;
        let after = self.nodes[last.node.0].next;

        let mut removed = 0u64;
        let mut cursor = Some(first.node);
        while let Some(id) = cursor {
            removed += self.nodes[id.0].segment.length;
            cursor = self.nodes[id.0].next;
            self.unlink(id);
            if id == last.node {
                break;
            }
        }

        let mut seam_left = before;
        if let Some(left) = left {
            removed -= left.length;
            seam_left = Some(self.insert_between(before, after, left));
        }
        let mut seam_right = after;
        if let Some(right) = right {
            removed -= right.length;
            seam_right = Some(self.insert_between(seam_left, after, right));
        }

        self.length -= removed;

        // 删除后两侧可能物理相接
        if let (Some(a), Some(b)) = (seam_left, seam_right) {
            self.try_merge(a, b);
        }

        Ok(removed)
    }

    /// 用 `segment` 替换 `[position, position + length)`
    pub fn overwrite(&mut self, position: u64, length: u64, segment: Segment) -> Result<NodeId> {
        if position != self.length {
            self.remove(position, length)?;
        }
        self.insert(position, segment)
    }

    /// 若 `b` 紧跟 `a` 且二者物理相接，则合并为 `a` 并移除 `b`
    pub fn try_merge(&mut self, a: NodeId, b: NodeId) -> bool {
        if self.nodes[a.0].next != Some(b) {
            return false;
        }
        match self.nodes[a.0].segment.merge(&self.nodes[b.0].segment) {
            Some(merged) => {
                self.nodes[a.0].segment = merged;
                self.unlink(b);
                true
            }
            None => false,
        }
    }

    fn merge_around(&mut self, id: NodeId) -> NodeId {
        let mut id = id;
        if let Some(prev) = self.nodes[id.0].prev {
            if self.try_merge(prev, id) {
                id = prev;
            }
        }
        if let Some(next) = self.nodes[id.0].next {
            self.try_merge(id, next);
        }
        id
    }

    // ------------------------------------------------------------------
    // 节点管理
    // ------------------------------------------------------------------

    fn alloc(&mut self, segment: Segment) -> NodeId {
        let node = Node {
            segment,
            prev: None,
            next: None,
        };
        match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = node;
                NodeId(slot)
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// 分配新节点并链接在 `prev` 与 `next` 之间（二者必须相邻）
    fn insert_between(
        &mut self,
        prev: Option<NodeId>,
        next: Option<NodeId>,
        segment: Segment,
    ) -> NodeId {
        let id = self.alloc(segment);
        self.nodes[id.0].prev = prev;
        self.nodes[id.0].next = next;
        match prev {
            Some(p) => self.nodes[p.0].next = Some(id),
            None => self.head = Some(id),
        }
        match next {
            Some(n) => self.nodes[n.0].prev = Some(id),
            None => self.tail = Some(id),
        }
        self.count += 1;
        id
    }

    fn unlink(&mut self, id: NodeId) {
        let prev = self.nodes[id.0].prev;
        let next = self.nodes[id.0].next;
        match prev {
            Some(p) => self.nodes[p.0].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n.0].prev = prev,
            None => self.tail = prev,
        }
        self.nodes[id.0].prev = None;
        self.nodes[id.0].next = None;
        self.free.push(id.0);
        self.count -= 1;
    }
}
