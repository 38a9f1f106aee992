//! patchcat - 文件原地编辑工具
//!
//! 通过 rspiece 编辑流在文件任意位置插入、删除、覆盖字节，最后一次性写回：
//! - cat: 查看内容（原始或十六进制）
//! - insert / write / append / remove: 单次编辑
//! - apply: 执行 JSON 编辑脚本

mod config;
mod dump;
mod script;

use std::fs::{self, File, OpenOptions};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rspiece::{BackingStore, EditStream};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use crate::config::{CacheKind, Settings, DEFAULT_MAX_CACHE_SIZE};
use crate::script::{EditScript, Payload};

#[derive(Parser)]
#[command(name = "patchcat")]
#[command(about = "Insert, remove and overwrite bytes in a file, then write it back in place")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// 缓存介质
    #[arg(long, global = true, value_enum, default_value = "memory")]
    cache: CacheKind,

    /// 单个缓存上限（字节）
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_CACHE_SIZE)]
    max_cache_size: u64,

    /// 插入/删除时游标跟随内容移动
    #[arg(long, global = true)]
    follow_cursor: bool,

    /// 详细输出
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// 输出文件内容
    Cat {
        file: PathBuf,

        /// 起始偏移
        #[arg(long, default_value_t = 0)]
        offset: u64,

        /// 最多输出的字节数
        #[arg(long)]
        len: Option<u64>,

        /// 十六进制转储
        #[arg(long)]
        hex: bool,
    },

    /// 在指定位置插入
    Insert {
        file: PathBuf,

        #[arg(long)]
        at: u64,

        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// 从指定位置覆盖写入（越过末尾的部分追加）
    Write {
        file: PathBuf,

        #[arg(long)]
        at: u64,

        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// 追加到末尾
    Append {
        file: PathBuf,

        #[command(flatten)]
        payload: PayloadArgs,
    },

    /// 删除一段字节
    Remove {
        file: PathBuf,

        #[arg(long)]
        at: u64,

        #[arg(long)]
        count: u64,
    },

    /// 执行 JSON 编辑脚本
    Apply {
        file: PathBuf,

        /// 脚本路径
        #[arg(short, long)]
        script: PathBuf,

        /// 只在内存副本上执行，不修改文件
        #[arg(long)]
        dry_run: bool,

        /// 落盘后校验文件 CRC32
        #[arg(long)]
        verify: bool,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct PayloadArgs {
    /// 十六进制数据，如 "de ad be ef"
    #[arg(long)]
    hex: Option<String>,

    /// UTF-8 文本
    #[arg(long)]
    text: Option<String>,
}

impl PayloadArgs {
    fn bytes(&self) -> Result<Vec<u8>> {
        let payload = match (&self.hex, &self.text) {
            (Some(hex), _) => Payload::Hex(hex.clone()),
            (None, Some(text)) => Payload::Text(text.clone()),
            (None, None) => bail!("either --hex or --text is required"),
        };
        payload.bytes()
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // 设置日志，stdout 留给内容输出
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = Settings {
        cache: cli.cache,
        max_cache_size: cli.max_cache_size,
        follow_cursor: cli.follow_cursor,
    };

    match cli.command {
        Commands::Cat {
            file,
            offset,
            len,
            hex,
        } => dump::run_cat(&file, offset, len, hex),
        Commands::Insert { file, at, payload } => {
            let data = payload.bytes()?;
            edit_file(&file, &settings, |stream| stream.insert_at(at, &data))
        }
        Commands::Write { file, at, payload } => {
            let data = payload.bytes()?;
            edit_file(&file, &settings, |stream| stream.write_at(at, &data))
        }
        Commands::Append { file, payload } => {
            let data = payload.bytes()?;
            edit_file(&file, &settings, |stream| stream.append(&data))
        }
        Commands::Remove { file, at, count } => edit_file(&file, &settings, |stream| {
            let removed = stream.remove_at(at, count)?;
            info!("patchcat: removed {} bytes at {}", removed, at);
            Ok(())
        }),
        Commands::Apply {
            file,
            script,
            dry_run,
            verify,
        } => run_apply(&file, &script, settings, dry_run, verify),
    }
}

fn open_rw(path: &Path) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("open {} for editing", path.display()))
}

fn open_stream<S: BackingStore>(store: S, settings: &Settings, path: &Path) -> Result<EditStream<S>> {
    let stream = EditStream::open(store, settings.stream_config())
        .with_context(|| format!("open edit stream on {}", path.display()))?;
    info!(
        "patchcat: {} ({} bytes, cache={}, max_cache_size={})",
        path.display(),
        stream.length(),
        stream.caching_method(),
        stream.max_cache_size()
    );
    Ok(stream)
}

/// 单次编辑：打开、编辑、落盘、关闭
fn edit_file<F>(path: &Path, settings: &Settings, edit: F) -> Result<()>
where
    F: FnOnce(&mut EditStream<File>) -> rspiece::Result<()>,
{
    let mut stream = open_stream(open_rw(path)?, settings, path)?;
    let before = stream.length();

    edit(&mut stream)?;
    dump::log_segments(&stream.segments());

    stream
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    info!(
        "patchcat: {} {} -> {} bytes",
        path.display(),
        before,
        stream.length()
    );
    stream.close()?;
    Ok(())
}

fn run_apply(
    path: &Path,
    script_path: &Path,
    mut settings: Settings,
    dry_run: bool,
    verify: bool,
) -> Result<()> {
    let script = EditScript::load(script_path)?;
    if let Some(header) = &script.settings {
        settings.apply_header(header);
    }
    info!(
        "patchcat: {} edits from {}",
        script.edits.len(),
        script_path.display()
    );

    if dry_run {
        let data = fs::read(path).with_context(|| format!("read {}", path.display()))?;
        let mut stream = open_stream(Cursor::new(data), &settings, path)?;
        script.apply(&mut stream)?;
        print_segments(&stream);

        let content = stream.read_all()?;
        println!(
            "dry run: {} bytes, crc32 {:08x}",
            content.len(),
            crc32fast::hash(&content)
        );
        stream.close()?;
        return Ok(());
    }

    let mut stream = open_stream(open_rw(path)?, &settings, path)?;
    script.apply(&mut stream)?;
    print_segments(&stream);

    let expected = if verify {
        Some(crc32fast::hash(&stream.read_all()?))
    } else {
        None
    };

    stream
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;
    let length = stream.length();
    stream.close()?;
    info!("patchcat: wrote {} bytes to {}", length, path.display());

    if let Some(expected) = expected {
        let actual = dump::file_crc32(path)?;
        if actual != expected {
            bail!(
                "verify failed: expected crc32 {:08x}, file has {:08x}",
                expected,
                actual
            );
        }
        info!("patchcat: verified crc32 {:08x}", actual);
    }
    Ok(())
}

fn print_segments<S: BackingStore>(stream: &EditStream<S>) {
    for line in dump::segment_table(&stream.segments()) {
        println!("{}", line);
    }
}
