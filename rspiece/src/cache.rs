//! 缓存
//!
//! 编辑写入的新字节先落在缓存里，flush 时再搬进源存储。
//! 缓存只追加、不收缩，已有字节的位置不会移动；允许原地覆盖已写入的字节，
//! 也允许从末尾连续延伸。

use std::io::{self, Read, Seek, SeekFrom, Write};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::constants::TEMP_FILE_PREFIX;

/// 缓存介质
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachingMethod {
    /// 内存缓冲
    InMemory,
    /// 临时文件，释放时删除
    TempFile,
}

impl std::fmt::Display for CachingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CachingMethod::InMemory => write!(f, "in-memory"),
            CachingMethod::TempFile => write!(f, "temp-file"),
        }
    }
}

/// 缓存接口
pub trait Cache {
    /// 在缓存池中的编号
    fn index(&self) -> usize;

    /// 当前长度
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 从 `offset` 读取，返回实际读取的字节数（到末尾为止）
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// 追加到末尾，返回写入起点
    fn append(&mut self, data: &[u8]) -> io::Result<u64>;

    /// 在 `offset` 处覆盖写入，`offset` 不能超过当前长度
    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// 释放底层资源
    fn release(self: Box<Self>) -> io::Result<()>;
}

fn check_offset(offset: u64, len: u64) -> io::Result<()> {
    if offset > len {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("cache write at {} leaves a gap (length {})", offset, len),
        ));
    }
    Ok(())
}

/// 内存缓存
#[derive(Debug)]
pub struct MemoryCache {
    index: usize,
    data: Vec<u8>,
}

impl MemoryCache {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            data: Vec::new(),
        }
    }
}

impl Cache for MemoryCache {
    fn index(&self) -> usize {
        self.index
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn append(&mut self, data: &[u8]) -> io::Result<u64> {
        let offset = self.len();
        self.data.extend_from_slice(data);
        Ok(offset)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        check_offset(offset, self.len())?;
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        Ok(())
    }
}

/// 临时文件缓存
///
/// 文件由 `NamedTempFile` 持有，`release` 或 drop 时删除。
#[derive(Debug)]
pub struct TempFileCache {
    index: usize,
    file: NamedTempFile,
    len: u64,
}

impl TempFileCache {
    pub fn new(index: usize) -> io::Result<Self> {
        let file = tempfile::Builder::new()
            .prefix(TEMP_FILE_PREFIX)
            .tempfile()?;
        debug!("rspiece: temp cache #{} at {}", index, file.path().display());
        Ok(Self {
            index,
            file,
            len: 0,
        })
    }

    /// 临时文件路径
    pub fn path(&self) -> &std::path::Path {
        self.file.path()
    }
}

impl Cache for TempFileCache {
    fn index(&self) -> usize {
        self.index
    }

    fn len(&self) -> u64 {
        self.len
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        if offset >= self.len {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(self.len - offset) as usize;
        let file = self.file.as_file_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(&mut buf[..n])?;
        Ok(n)
    }

    fn append(&mut self, data: &[u8]) -> io::Result<u64> {
        let offset = self.len;
        let file = self.file.as_file_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.len += data.len() as u64;
        Ok(offset)
    }

    fn write_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        check_offset(offset, self.len)?;
        let file = self.file.as_file_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.len = self.len.max(offset + data.len() as u64);
        Ok(())
    }

    fn release(self: Box<Self>) -> io::Result<()> {
        debug!("rspiece: removing temp cache #{}", self.index);
        self.file.close()
    }
}
