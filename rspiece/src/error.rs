//! 错误类型

use std::io;
use thiserror::Error;

/// 编辑流错误
#[derive(Error, Debug)]
pub enum EditError {
    /// 源存储类型不被支持（例如把另一个 EditStream 当作源）
    #[error("unsupported backing store: {0}")]
    UnsupportedStore(String),
    /// 源存储未通过读/写/定位/调整大小的能力探测
    #[error("backing store cannot {capability}: {source}")]
    Capability {
        capability: &'static str,
        source: io::Error,
    },
    /// 配置参数无效
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// 位置超出当前虚拟长度
    #[error("position {position} out of range (length {length})")]
    OutOfRange { position: u64, length: u64 },
    /// 片段链内部不一致，属于程序缺陷
    #[error("segment chain inconsistent: {0}")]
    Inconsistent(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl EditError {
    /// 是否为构造阶段的配置错误
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            EditError::UnsupportedStore(_)
                | EditError::Capability { .. }
                | EditError::InvalidConfig(_)
        )
    }
}

impl From<EditError> for io::Error {
    fn from(err: EditError) -> Self {
        match err {
            EditError::Io(e) => e,
            EditError::OutOfRange { .. } => io::Error::new(io::ErrorKind::InvalidInput, err),
            EditError::UnsupportedStore(_) | EditError::InvalidConfig(_) => {
                io::Error::new(io::ErrorKind::Unsupported, err)
            }
            other => io::Error::new(io::ErrorKind::Other, other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EditError>;
