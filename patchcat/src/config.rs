//! 运行配置
//!
//! 命令行参数给出默认值，编辑脚本头部可以覆盖缓存相关设置。

use clap::ValueEnum;
use rspiece::{CachingMethod, StreamConfig};
use serde::Deserialize;

pub const DEFAULT_MAX_CACHE_SIZE: u64 = 4 * 1024 * 1024; // 4 MB

/// 缓存介质（命令行/脚本中的写法）
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheKind {
    /// 内存缓存
    Memory,
    /// 临时文件缓存
    TempFile,
}

impl From<CacheKind> for CachingMethod {
    fn from(kind: CacheKind) -> Self {
        match kind {
            CacheKind::Memory => CachingMethod::InMemory,
            CacheKind::TempFile => CachingMethod::TempFile,
        }
    }
}

/// 编辑脚本头部
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptHeader {
    #[serde(default)]
    pub cache: Option<CacheKind>,
    #[serde(default)]
    pub max_cache_size: Option<u64>,
    #[serde(default)]
    pub follow_cursor: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub cache: CacheKind,
    pub max_cache_size: u64,
    pub follow_cursor: bool,
}

impl Settings {
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(self.cache.into(), self.max_cache_size)
            .with_follow_cursor(self.follow_cursor)
    }

    /// 用脚本头部中出现的字段覆盖当前设置
    pub fn apply_header(&mut self, header: &ScriptHeader) {
        if let Some(cache) = header.cache {
            self.cache = cache;
        }
        if let Some(max_cache_size) = header.max_cache_size {
            self.max_cache_size = max_cache_size;
        }
        if let Some(follow_cursor) = header.follow_cursor {
            self.follow_cursor = follow_cursor;
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cache: CacheKind::Memory,
            max_cache_size: DEFAULT_MAX_CACHE_SIZE,
            follow_cursor: false,
        }
    }
}
