//! 内容输出：原始字节、十六进制转储、片段表、CRC32

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use anyhow::{Context, Result};
use rspiece::{Segment, SegmentSource};
use tracing::debug;

/// 每行字节数
const ROW: usize = 16;

/// 十六进制转储，`base` 为第一个字节的偏移
pub fn hex_dump(base: u64, data: &[u8]) -> Vec<String> {
    data.chunks(ROW)
        .enumerate()
        .map(|(row, chunk)| {
            let hex: Vec<String> = chunk.iter().map(|b| format!("{:02x}", b)).collect();
            let ascii: String = chunk
                .iter()
                .map(|&b| {
                    if b.is_ascii_graphic() || b == b' ' {
                        b as char
                    } else {
                        '.'
                    }
                })
                .collect();
            format!(
                "{:08x}  {:<width$}  |{}|",
                base + (row * ROW) as u64,
                hex.join(" "),
                ascii,
                width = ROW * 3 - 1
            )
        })
        .collect()
}

/// 片段表，每行一个片段
pub fn segment_table(segments: &[Segment]) -> Vec<String> {
    let mut lines = vec![format!("{:>4} {:>12} {:>10}  source", "#", "position", "length")];
    let mut position = 0u64;
    for (index, segment) in segments.iter().enumerate() {
        let source = match segment.source {
            SegmentSource::Backing { offset } => format!("file @{}", offset),
            SegmentSource::Cache { index, offset } => format!("cache#{} @{}", index, offset),
        };
        lines.push(format!(
            "{:>4} {:>12} {:>10}  {}",
            index, position, segment.length, source
        ));
        position += segment.length;
    }
    lines
}

pub fn log_segments(segments: &[Segment]) {
    for line in segment_table(segments) {
        debug!("patchcat: {}", line);
    }
}

/// 文件内容的 CRC32
pub fn file_crc32(path: &Path) -> Result<u32> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut hasher = crc32fast::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize())
}

/// 输出文件 `[offset, offset + len)` 的内容
pub fn run_cat(path: &Path, offset: u64, len: Option<u64>, as_hex: bool) -> Result<()> {
    let mut file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    file.seek(SeekFrom::Start(offset))?;

    let mut data = Vec::new();
    file.take(len.unwrap_or(u64::MAX)).read_to_end(&mut data)?;
    debug!("patchcat: read {} bytes at {}", data.len(), offset);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if as_hex {
        for line in hex_dump(offset, &data) {
            writeln!(out, "{}", line)?;
        }
    } else {
        out.write_all(&data)?;
    }
    out.flush()?;
    Ok(())
}
