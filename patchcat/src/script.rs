//! 编辑脚本
//!
//! JSON 格式，例如：
//! ```json
//! {
//!   "settings": { "cache": "temp-file", "max_cache_size": 65536 },
//!   "edits": [
//!     { "op": "insert", "at": 3, "data": { "hex": "12 34 56" } },
//!     { "op": "remove", "at": 1, "count": 2 },
//!     { "op": "seek", "to": 0 },
//!     { "op": "write", "data": { "text": "hi" } },
//!     { "op": "append", "data": { "hex": "0x0a" } }
//!   ]
//! }
//! ```
//! `insert`/`write`/`remove` 省略 `at` 时在游标处操作。

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rspiece::{BackingStore, EditStream};
use serde::Deserialize;
use tracing::debug;

use crate::config::ScriptHeader;

/// 数据载荷：十六进制或 UTF-8 文本
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Payload {
    Hex(String),
    Text(String),
}

impl Payload {
    /// 十六进制允许 `0x` 前缀和空白分隔
    pub fn bytes(&self) -> Result<Vec<u8>> {
        match self {
            Payload::Text(text) => Ok(text.as_bytes().to_vec()),
            Payload::Hex(text) => {
                let trimmed = text.trim();
                let digits: String = trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                    .unwrap_or(trimmed)
                    .chars()
                    .filter(|c| !c.is_whitespace())
                    .collect();
                hex::decode(&digits).with_context(|| format!("invalid hex payload {:?}", text))
            }
        }
    }
}

/// 单条编辑
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Edit {
    Insert {
        #[serde(default)]
        at: Option<u64>,
        data: Payload,
    },
    Write {
        #[serde(default)]
        at: Option<u64>,
        data: Payload,
    },
    Append {
        data: Payload,
    },
    Remove {
        #[serde(default)]
        at: Option<u64>,
        count: u64,
    },
    Seek {
        to: u64,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditScript {
    #[serde(default)]
    pub settings: Option<ScriptHeader>,
    pub edits: Vec<Edit>,
}

impl EditScript {
    pub fn parse(text: &str) -> Result<Self> {
        serde_json::from_str(text).context("parse edit script")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("read script {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("load script {}", path.display()))
    }

    /// 依次执行全部编辑，返回执行的条数
    pub fn apply<S: BackingStore>(&self, stream: &mut EditStream<S>) -> Result<usize> {
        for (index, edit) in self.edits.iter().enumerate() {
            apply_edit(stream, edit).with_context(|| format!("edit #{} {:?}", index, edit))?;
            debug!(
                "patchcat: edit #{} done, length={}, position={}",
                index,
                stream.length(),
                stream.position()
            );
        }
        Ok(self.edits.len())
    }
}

fn apply_edit<S: BackingStore>(stream: &mut EditStream<S>, edit: &Edit) -> Result<()> {
    match edit {
        Edit::Insert { at: Some(at), data } => stream.insert_at(*at, &data.bytes()?)?,
        Edit::Insert { at: None, data } => stream.insert(&data.bytes()?)?,
        Edit::Write { at: Some(at), data } => stream.write_at(*at, &data.bytes()?)?,
        Edit::Write { at: None, data } => stream.write(&data.bytes()?)?,
        Edit::Append { data } => stream.append(&data.bytes()?)?,
        Edit::Remove { at, count } => {
            let removed = match at {
                Some(at) => stream.remove_at(*at, *count)?,
                None => stream.remove(*count)?,
            };
            debug!("patchcat: removed {} of {} bytes", removed, count);
        }
        Edit::Seek { to } => {
            stream.set_position(*to);
        }
    }
    Ok(())
}
