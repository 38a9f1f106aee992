//! 编辑流
//!
//! `EditStream` 把源存储包装成可以在任意位置插入、删除、覆盖的字节流。
//! 编辑只修改片段链，新字节按放置策略写入源存储或缓存；
//! 只有 `flush` 才把片段链对应的内容真正搬进源存储：
//! ```text
//!            编辑                         flush
//! ┌────────┐ ─────→ ┌──────────────┐ ─────────────→ ┌────────┐
//! │ 源存储 │        │ 片段链 + 缓存 │  前移/后移/缓存  │ 源存储 │
//! └────────┘        └──────────────┘     三遍搬移     └────────┘
//! ```

use std::io::{self, SeekFrom};

use tracing::{debug, trace};

use crate::cache::CachingMethod;
use crate::chain::SegmentChain;
use crate::constants::STAGING_BUFFER_SIZE;
use crate::error::{EditError, Result};
use crate::pool::CachePool;
use crate::segment::{Segment, SegmentSource};
use crate::store::{self, BackingStore};

/// 编辑流配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    /// 缓存介质
    pub caching: CachingMethod,
    /// 单个缓存的大小上限（字节）
    pub max_cache_size: u64,
    /// 插入/删除时让游标跟随其后的内容移动
    pub follow_cursor: bool,
}

impl StreamConfig {
    pub fn new(caching: CachingMethod, max_cache_size: u64) -> Self {
        Self {
            caching,
            max_cache_size,
            follow_cursor: false,
        }
    }

    pub fn in_memory(max_cache_size: u64) -> Self {
        Self::new(CachingMethod::InMemory, max_cache_size)
    }

    pub fn temp_file(max_cache_size: u64) -> Self {
        Self::new(CachingMethod::TempFile, max_cache_size)
    }

    pub fn with_follow_cursor(mut self, follow_cursor: bool) -> Self {
        self.follow_cursor = follow_cursor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_cache_size == 0 {
            return Err(EditError::InvalidConfig(
                "max_cache_size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 落盘状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// 源存储内容与虚拟内容一致，没有待搬移的片段
    Clean,
    /// 有尚未落盘的编辑
    Dirty,
    /// 正在落盘，或上一次落盘中途失败
    Reconciling,
}

/// 可编辑字节流
#[derive(Debug)]
pub struct EditStream<S: BackingStore> {
    source: S,
    chain: SegmentChain,
    pool: CachePool,
    position: u64,
    follow_cursor: bool,
    reconciling: bool,
}

impl<S: BackingStore> EditStream<S> {
    /// 在源存储上打开编辑流
    ///
    /// 源存储必须能读、写、定位、调整大小，否则返回配置错误。
    /// 初始游标为源存储当前位置（不超过其长度）。
    pub fn open(mut source: S, config: StreamConfig) -> Result<Self> {
        config.validate()?;
        let position = store::probe(&mut source)?;
        let length = source.len()?;

        debug!(
            "rspiece: open stream, length={}, caching={}, max_cache_size={}",
            length, config.caching, config.max_cache_size
        );

        Ok(Self {
            source,
            chain: SegmentChain::with_length(length),
            pool: CachePool::new(config.caching, config.max_cache_size),
            position: position.min(length),
            follow_cursor: config.follow_cursor,
            reconciling: false,
        })
    }

    // ------------------------------------------------------------------
    // 访问器
    // ------------------------------------------------------------------

    /// 虚拟长度
    pub fn length(&self) -> u64 {
        self.chain.len()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// 设置游标，返回夹紧后的位置
    pub fn set_position(&mut self, position: u64) -> u64 {
        self.seek(SeekFrom::Start(position))
    }

    pub fn caching_method(&self) -> CachingMethod {
        self.pool.method()
    }

    pub fn max_cache_size(&self) -> u64 {
        self.pool.max_size()
    }

    pub fn follow_cursor(&self) -> bool {
        self.follow_cursor
    }

    pub fn segment_count(&self) -> usize {
        self.chain.segment_count()
    }

    /// 当前片段表
    pub fn segments(&self) -> Vec<Segment> {
        self.chain.segments()
    }

    /// 已创建的缓存数
    pub fn cache_count(&self) -> usize {
        self.pool.count()
    }

    pub fn get_ref(&self) -> &S {
        &self.source
    }

    pub fn state(&self) -> Result<FlushState> {
        if self.reconciling {
            return Ok(FlushState::Reconciling);
        }
        let clean = self.pool.is_empty()
            && self.chain.is_trivial()
            && self.chain.len() == self.source.len()?;
        Ok(if clean {
            FlushState::Clean
        } else {
            FlushState::Dirty
        })
    }

    /// 长度由编辑决定，这里只记录调用
    pub fn set_length(&mut self, value: u64) {
        debug!(
            "rspiece: set_length({}) ignored, length is {}",
            value,
            self.chain.len()
        );
    }

    fn check_position(&self, position: u64) -> Result<()> {
        if position > self.chain.len() {
            return Err(EditError::OutOfRange {
                position,
                length: self.chain.len(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 读
    // ------------------------------------------------------------------

    /// 从游标处读取，游标前进实际读取的字节数
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let n = self.read_at(self.position, buf)?;
        self.position += n as u64;
        Ok(n)
    }

    /// 从 `position` 读取，不移动游标；到末尾时读到的字节数少于 `buf.len()`
    pub fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<usize> {
        self.check_position(position)?;

        let mut done = 0usize;
        let mut cursor = self.chain.locate(position).map(|loc| (loc.node, loc.offset));
        while let Some((node, offset)) = cursor {
            if done == buf.len() {
                break;
            }
            let segment = self.chain.segment(node);
            let n = (segment.length - offset).min((buf.len() - done) as u64) as usize;
            self.read_segment(segment, offset, &mut buf[done..done + n])?;
            done += n;
            cursor = self.chain.next(node).map(|next| (next, 0));
        }
        Ok(done)
    }

    /// 读出全部虚拟内容
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let length = usize::try_from(self.chain.len()).map_err(|_| {
            EditError::Io(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "stream too large to read into memory",
            ))
        })?;
        let mut data = vec![0u8; length];
        let n = self.read_at(0, &mut data)?;
        data.truncate(n);
        Ok(data)
    }

    fn read_segment(&mut self, segment: Segment, offset: u64, buf: &mut [u8]) -> Result<()> {
        let at = segment.offset() + offset;
        match segment.source {
            SegmentSource::Backing { .. } => self.source.read_exact_at(at, buf)?,
            SegmentSource::Cache { index, .. } => self.pool.read_exact_at(index, at, buf)?,
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 写
    // ------------------------------------------------------------------

    /// 从 `position` 开始覆盖写入，越过末尾的部分使流变长
    pub fn write_at(&mut self, position: u64, data: &[u8]) -> Result<()> {
        self.check_position(position)?;
        if data.is_empty() {
            return Ok(());
        }

        let segment = self.place_write(position, data)?;
        self.chain.overwrite(position, segment.length, segment)?;
        trace!(
            "rspiece: write {} bytes at {} -> {:?}",
            data.len(),
            position,
            segment.source
        );
        Ok(())
    }

    /// 在游标处覆盖写入，游标前进
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        self.write_at(self.position, data)?;
        self.position += data.len() as u64;
        Ok(())
    }

    /// 在 `position` 插入，其后的内容整体后移
    pub fn insert_at(&mut self, position: u64, data: &[u8]) -> Result<()> {
        self.check_position(position)?;
        if data.is_empty() {
            return Ok(());
        }

        if position == self.chain.len() {
            self.write_at(position, data)?;
        } else {
            let segment = self.pool.append(data)?;
            self.chain.insert(position, segment)?;
            trace!(
                "rspiece: insert {} bytes at {} -> {:?}",
                data.len(),
                position,
                segment.source
            );
        }

        if self.follow_cursor && self.position > position {
            self.position += data.len() as u64;
        }
        Ok(())
    }

    /// 在游标处插入，游标移到插入内容之后
    pub fn insert(&mut self, data: &[u8]) -> Result<()> {
        let position = self.position;
        self.insert_at(position, data)?;
        self.position = position + data.len() as u64;
        Ok(())
    }

    /// 追加到末尾，不影响游标
    pub fn append(&mut self, data: &[u8]) -> Result<()> {
        self.write_at(self.chain.len(), data)
    }

    // ------------------------------------------------------------------
    // 删除
    // ------------------------------------------------------------------

    /// 删除从 `position` 开始的 `count` 个字节，返回实际删除数
    pub fn remove_at(&mut self, position: u64, count: u64) -> Result<u64> {
        self.check_position(position)?;
        if self.chain.is_empty() {
            return Ok(0);
        }
        let count = count.min(self.chain.len() - position);
        if count == 0 {
            return Ok(0);
        }

        let removed = self.chain.remove(position, count)?;
        trace!("rspiece: removed {} bytes at {}", removed, position);

        if self.position > position {
            self.position = if !self.follow_cursor {
                self.position.min(self.chain.len())
            } else if self.position < position + removed {
                position
            } else {
                self.position - removed
            };
        }
        Ok(removed)
    }

    /// 从游标处删除
    pub fn remove(&mut self, count: u64) -> Result<u64> {
        self.remove_at(self.position, count)
    }

    /// 移动游标，结果夹紧到 `[0, length]`
    pub fn seek(&mut self, pos: SeekFrom) -> u64 {
        let length = i128::from(self.chain.len());
        let target = match pos {
            SeekFrom::Start(offset) => i128::from(offset),
            SeekFrom::Current(delta) => i128::from(self.position) + i128::from(delta),
            SeekFrom::End(delta) => length + i128::from(delta),
        };
        self.position = target.clamp(0, length) as u64;
        self.position
    }

    // ------------------------------------------------------------------
    // 放置策略
    // ------------------------------------------------------------------

    /// 为写入 `[position, position + data.len())` 选择物理位置并写入，返回描述它的片段
    fn place_write(&mut self, position: u64, data: &[u8]) -> Result<Segment> {
        let count = data.len() as u64;

        // 空链：直接写源存储
        if self.chain.is_empty() {
            self.source.write_all_at(position, data)?;
            return Ok(Segment::backing(position, count));
        }

        let target = match self.chain.locate(position) {
            // 末尾：最后一个片段恰好结束在其来源末尾时原地延伸
            None => match self.chain.last() {
                Some(last) => {
                    let end = last.end_offset();
                    let extendable = end == self.source_len(last.cache_index())?
                        && self.pool.can_write(last.cache_index(), end, count);
                    extendable.then_some((last.cache_index(), end))
                }
                None => None,
            },
            // 片段内部：写入不越过片段，或片段结束在来源末尾时原地覆盖
            Some(loc) => {
                let segment = loc.segment;
                let index = segment.cache_index();
                let at = segment.offset() + loc.offset;
                let fits = loc.offset + count <= segment.length
                    || segment.end_offset() == self.source_len(index)?;
                (fits && self.pool.can_write(index, at, count)).then_some((index, at))
            }
        };

        match target {
            Some((index, offset)) => {
                self.write_in_place(index, offset, data)?;
                Ok(match index {
                    None => Segment::backing(offset, count),
                    Some(index) => Segment::cached(index, offset, count),
                })
            }
            None => Ok(self.pool.append(data)?),
        }
    }

    fn source_len(&self, cache: Option<usize>) -> Result<u64> {
        Ok(match cache {
            None => self.source.len()?,
            Some(index) => self.pool.cache_len(index),
        })
    }

    fn write_in_place(&mut self, cache: Option<usize>, offset: u64, data: &[u8]) -> Result<()> {
        match cache {
            None => self.source.write_all_at(offset, data)?,
            Some(index) => self.pool.write_at(index, offset, data)?,
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 落盘
    // ------------------------------------------------------------------

    /// 把虚拟内容写回源存储，然后丢弃全部缓存
    ///
    /// 源存储片段在物理上保持递增且互不重叠，按目标位置分两遍搬移：
    /// 前移的从头到尾、逐块从前往后复制；后移的从尾到头、逐块从后往前复制。
    /// 之后再把缓存片段写到各自的目标位置。中途失败时状态保持 `Reconciling`。
    pub fn flush(&mut self) -> Result<()> {
        self.reconciling = true;

        let length = self.chain.len();
        let mut plan = Vec::with_capacity(self.chain.segment_count());
        let mut target = 0u64;
        for segment in self.chain.iter() {
            plan.push((target, *segment));
            target += segment.length;
        }
        debug!(
            "rspiece: flush {} segments, {} bytes, {} caches",
            plan.len(),
            length,
            self.pool.count()
        );

        if self.source.len()? < length {
            self.source.set_len(length)?;
        }

        // 前移：从头到尾
        for &(target, segment) in plan
            .iter()
            .filter(|(target, segment)| segment.is_backing() && *target < segment.offset())
        {
            self.copy_within(segment.offset(), target, segment.length)?;
        }

        // 后移：从尾到头
        for &(target, segment) in plan
            .iter()
            .rev()
            .filter(|(target, segment)| segment.is_backing() && *target > segment.offset())
        {
            self.copy_within(segment.offset(), target, segment.length)?;
        }

        for &(target, segment) in plan.iter().filter(|(_, segment)| !segment.is_backing()) {
            self.copy_from_cache(segment, target)?;
        }

        if self.source.len()? > length {
            self.source.set_len(length)?;
        }
        self.pool.clear()?;
        io::Write::flush(&mut self.source)?;

        self.chain.reset(length);
        self.position = self.position.min(length);
        self.reconciling = false;
        debug!("rspiece: flush done, length={}", length);
        Ok(())
    }

    /// 源存储内搬移，方向决定分块顺序，保证重叠区间不被提前覆盖
    fn copy_within(&mut self, from: u64, to: u64, length: u64) -> Result<()> {
        trace!("rspiece: move {} bytes {} -> {}", length, from, to);
        let mut buf = vec![0u8; STAGING_BUFFER_SIZE];
        let mut done = 0u64;
        while done < length {
            let n = (length - done).min(STAGING_BUFFER_SIZE as u64);
            let offset = if to > from { length - done - n } else { done };
            let chunk = &mut buf[..n as usize];
            self.source.read_exact_at(from + offset, chunk)?;
            self.source.write_all_at(to + offset, chunk)?;
            done += n;
        }
        Ok(())
    }

    fn copy_from_cache(&mut self, segment: Segment, target: u64) -> Result<()> {
        let index = segment.cache_index().ok_or_else(|| {
            EditError::Inconsistent(format!("{:?} is not a cache segment", segment))
        })?;
        trace!(
            "rspiece: copy {} bytes from cache #{} -> {}",
            segment.length,
            index,
            target
        );

        let mut buf = vec![0u8; STAGING_BUFFER_SIZE];
        let mut done = 0u64;
        while done < segment.length {
            let n = (segment.length - done).min(STAGING_BUFFER_SIZE as u64);
            let chunk = &mut buf[..n as usize];
            self.pool
                .read_exact_at(index, segment.offset() + done, chunk)?;
            self.source.write_all_at(target + done, chunk)?;
            done += n;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // 释放
    // ------------------------------------------------------------------

    /// 释放缓存并交还源存储，未落盘的编辑被丢弃
    pub fn into_inner(mut self) -> Result<S> {
        self.pool.clear()?;
        Ok(self.source)
    }

    /// 释放缓存并关闭（借用的源存储保持打开）
    pub fn close(self) -> Result<()> {
        self.into_inner().map(drop)
    }
}
