//! std::io 适配
//!
//! 让 `EditStream` 可以直接交给 `io::copy`、`BufReader` 等通用代码使用。
//! `Write::flush` 对应完整的落盘。

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::store::BackingStore;
use crate::stream::EditStream;

impl<S: BackingStore> Read for EditStream<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(EditStream::read(self, buf)?)
    }
}

impl<S: BackingStore> Write for EditStream<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        EditStream::write(self, buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(EditStream::flush(self)?)
    }
}

impl<S: BackingStore> Seek for EditStream<S> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        Ok(EditStream::seek(self, pos))
    }
}

// 只用于在构造时识别并拒绝
impl<S: BackingStore> BackingStore for EditStream<S> {
    fn len(&self) -> io::Result<u64> {
        Ok(self.length())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.set_length(len);
        Ok(())
    }

    fn is_edit_stream(&self) -> bool {
        true
    }
}
