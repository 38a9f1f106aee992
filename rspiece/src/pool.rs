//! 缓存池
//!
//! 按需创建缓存，最后一个缓存为"当前"缓存。写入会使当前缓存达到上限时，
//! 新建一个缓存接替；旧缓存仍然可读，也可以在上限内原地覆盖。

use std::io;

use tracing::{debug, warn};

use crate::cache::{Cache, CachingMethod, MemoryCache, TempFileCache};
use crate::segment::Segment;

/// 缓存池
pub struct CachePool {
    method: CachingMethod,
    max_size: u64,
    caches: Vec<Box<dyn Cache>>,
}

impl CachePool {
    pub fn new(method: CachingMethod, max_size: u64) -> Self {
        Self {
            method,
            max_size,
            caches: Vec::new(),
        }
    }

    pub fn method(&self) -> CachingMethod {
        self.method
    }

    /// 单个缓存的大小上限
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// 已创建的缓存数
    pub fn count(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// 第 `index` 个缓存的长度
    pub fn cache_len(&self, index: usize) -> u64 {
        self.caches[index].len()
    }

    /// 判断在 `offset` 处写入 `length` 字节是否仍在上限内
    ///
    /// `cache` 为 None 表示源存储，不受限制。
    pub fn can_write(&self, cache: Option<usize>, offset: u64, length: u64) -> bool {
        match cache {
            None => true,
            Some(_) => offset + length < self.max_size,
        }
    }

    /// 追加到当前缓存（放不下则新建），返回描述新字节的片段
    pub fn append(&mut self, data: &[u8]) -> io::Result<Segment> {
        let length = data.len() as u64;
        let current = self.caches.last().map(|cache| (cache.index(), cache.len()));
        let index = match current {
            Some((index, len)) if self.can_write(Some(index), len, length) => index,
            _ => self.create()?,
        };
        let offset = self.caches[index].append(data)?;
        Ok(Segment::cached(index, offset, length))
    }

    /// 在第 `index` 个缓存的 `offset` 处原地覆盖
    pub fn write_at(&mut self, index: usize, offset: u64, data: &[u8]) -> io::Result<()> {
        self.caches[index].write_at(offset, data)
    }

    /// 从第 `index` 个缓存读满 `buf`
    pub fn read_exact_at(&mut self, index: usize, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let n = self.caches[index].read_at(offset, buf)?;
        if n < buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "cache #{} short read at {}: {} of {} bytes",
                    index,
                    offset,
                    n,
                    buf.len()
                ),
            ));
        }
        Ok(())
    }

    /// 释放全部缓存，返回遇到的第一个错误
    pub fn clear(&mut self) -> io::Result<()> {
        let mut result = Ok(());
        for cache in self.caches.drain(..) {
            let index = cache.index();
            if let Err(e) = cache.release() {
                debug!("rspiece: release cache #{} failed: {}", index, e);
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    fn create(&mut self) -> io::Result<usize> {
        let index = self.caches.len();
        let cache: Box<dyn Cache> = match self.method {
            CachingMethod::InMemory => Box::new(MemoryCache::new(index)),
            CachingMethod::TempFile => Box::new(TempFileCache::new(index)?),
        };
        debug!("rspiece: new {} cache #{}", self.method, index);
        self.caches.push(cache);
        Ok(index)
    }
}

impl std::fmt::Debug for CachePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachePool")
            .field("method", &self.method)
            .field("max_size", &self.max_size)
            .field("caches", &self.caches.len())
            .finish()
    }
}

impl Drop for CachePool {
    fn drop(&mut self) {
        if let Err(e) = self.clear() {
            warn!("rspiece: failed to release caches: {}", e);
        }
    }
}
