//! 源存储接口
//!
//! 源存储是可读、可写、可定位、可调整大小的字节存储，例如文件。
//! 以 `&mut S` 传入即为借用：流关闭时不会释放调用方的存储。

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

use crate::constants::PROBE_BYTE;
use crate::error::{EditError, Result};

/// 源存储
pub trait BackingStore: Read + Write + Seek {
    /// 物理长度
    fn len(&self) -> io::Result<u64>;

    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// 调整物理长度（扩展部分补零）
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    /// 是否本身就是编辑流
    fn is_edit_stream(&self) -> bool {
        false
    }

    /// 在绝对偏移处读满 `buf`
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.read_exact(buf)
    }

    /// 在绝对偏移处写入全部数据
    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(data)
    }
}

impl BackingStore for File {
    fn len(&self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

impl BackingStore for Cursor<Vec<u8>> {
    fn len(&self) -> io::Result<u64> {
        Ok(self.get_ref().len() as u64)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("length {} does not fit in memory", len),
            )
        })?;
        self.get_mut().resize(len, 0);
        Ok(())
    }
}

impl<S: BackingStore + ?Sized> BackingStore for &mut S {
    fn len(&self) -> io::Result<u64> {
        (**self).len()
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        (**self).set_len(len)
    }

    fn is_edit_stream(&self) -> bool {
        (**self).is_edit_stream()
    }
}

fn capability(name: &'static str) -> impl FnOnce(io::Error) -> EditError {
    move |source| EditError::Capability {
        capability: name,
        source,
    }
}

/// 探测源存储是否具备读、写、定位、调整大小的能力
///
/// 先扩展一个字节、写入并读回，再缩回原长度。
/// 返回探测前的读写位置，探测结束后存储的位置也恢复到这里。
pub(crate) fn probe<S: BackingStore + ?Sized>(store: &mut S) -> Result<u64> {
    if store.is_edit_stream() {
        return Err(EditError::UnsupportedStore(
            "an edit stream cannot back another edit stream".to_string(),
        ));
    }

    let position = store.stream_position().map_err(capability("seek"))?;
    let len = store.len().map_err(capability("report length"))?;
    store
        .seek(SeekFrom::Start(len))
        .map_err(capability("seek"))?;
    store.set_len(len + 1).map_err(capability("resize"))?;

    let checked = probe_byte(store, len);
    let restored = store.set_len(len).map_err(capability("resize"));
    checked?;
    restored?;

    store
        .seek(SeekFrom::Start(position))
        .map_err(capability("seek"))?;
    Ok(position)
}

fn probe_byte<S: BackingStore + ?Sized>(store: &mut S, offset: u64) -> Result<()> {
    store
        .write_all_at(offset, &[PROBE_BYTE])
        .map_err(capability("write"))?;

    let mut byte = [0u8; 1];
    store
        .read_exact_at(offset, &mut byte)
        .map_err(capability("read"))?;
    if byte[0] != PROBE_BYTE {
        return Err(EditError::Capability {
            capability: "read back",
            source: io::Error::new(io::ErrorKind::InvalidData, "probe byte mismatch"),
        });
    }
    Ok(())
}
