//! 常量定义

/// 落盘搬移时的中转缓冲大小
pub const STAGING_BUFFER_SIZE: usize = 4096;

/// 临时文件缓存的文件名前缀
pub const TEMP_FILE_PREFIX: &str = "rspiece-cache-";

/// 探测源存储读写能力时写入的字节
pub const PROBE_BYTE: u8 = 0x5A;
