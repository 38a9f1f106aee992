//! rspiece - 可随机编辑的字节流视图
//!
//! 特性：
//! - 片段表：编辑只记录对源存储或缓存的引用，不搬动原始数据
//! - 任意位置插入、删除、覆盖、追加
//! - 有界缓存池：内存缓存或临时文件缓存，超过上限自动滚动到新缓存
//! - 显式落盘：flush 时两遍搬移，原地重写源存储
//!
//! ```rust
//! use std::io::Cursor;
//! use rspiece::{EditStream, StreamConfig};
//!
//! let store = Cursor::new(vec![0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
//! let mut stream = EditStream::open(store, StreamConfig::in_memory(1024 * 1024)).unwrap();
//!
//! stream.insert_at(3, &[0x12, 0x34, 0x56]).unwrap();
//! stream.remove_at(1, 2).unwrap();
//! stream.flush().unwrap();
//!
//! let store = stream.into_inner().unwrap();
//! assert_eq!(store.into_inner(), vec![0xAA, 0x12, 0x34, 0x56, 0xDD, 0xEE, 0xFF]);
//! ```

mod adapter;
pub mod cache;
pub mod chain;
pub mod constants;
pub mod error;
pub mod pool;
pub mod segment;
pub mod store;
pub mod stream;

#[cfg(test)]
mod tests;

pub use cache::{Cache, CachingMethod, MemoryCache, TempFileCache};
pub use chain::{Location, NodeId, SegmentChain};
pub use error::{EditError, Result};
pub use pool::CachePool;
pub use segment::{Segment, SegmentSource};
pub use store::BackingStore;
pub use stream::{EditStream, FlushState, StreamConfig};
