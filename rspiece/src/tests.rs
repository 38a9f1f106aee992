//! 单元测试模块
//!
//! 编辑流的场景测试：插入/删除/覆盖、缓存滚动、落盘、源存储类型与配置错误

use crate::error::EditError;
use crate::segment::Segment;
use crate::store::BackingStore;
use crate::stream::{EditStream, FlushState, StreamConfig};
use std::fs::{self, OpenOptions};
use std::io::{Cursor, SeekFrom};

fn open_cursor(data: &[u8], config: StreamConfig) -> EditStream<Cursor<Vec<u8>>> {
    EditStream::open(Cursor::new(data.to_vec()), config).unwrap()
}

/// 片段长度之和等于流长度，且相邻片段不可合并
fn check_chain<S: BackingStore>(stream: &EditStream<S>) {
    let segments = stream.segments();
    let sum: u64 = segments.iter().map(|s| s.length).sum();
    assert_eq!(sum, stream.length(), "片段长度之和应等于流长度");
    assert!(segments.iter().all(|s| s.length > 0), "不应出现空片段");
    for pair in segments.windows(2) {
        assert_eq!(pair[0].merge(&pair[1]), None, "相邻片段未合并: {:?}", pair);
    }
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + i / 251) as u8).collect()
}

/// 简单线性同余随机数，保证测试可复现
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        if n == 0 {
            0
        } else {
            self.next() % n
        }
    }

    fn bytes(&mut self, max: u64) -> Vec<u8> {
        let len = 1 + self.below(max);
        (0..len).map(|_| self.next() as u8).collect()
    }
}

// ----------------------------------------------------------------------
// 基本场景
// ----------------------------------------------------------------------

#[test]
fn test_write_into_empty_store() {
    let mut stream = open_cursor(&[], StreamConfig::in_memory(1024));

    stream.write(&[0xAA, 0xBB, 0xCC]).unwrap();

    assert_eq!(stream.length(), 3);
    assert_eq!(stream.position(), 3);
    let mut buf = [0u8; 3];
    assert_eq!(stream.read_at(0, &mut buf).unwrap(), 3);
    assert_eq!(buf, [0xAA, 0xBB, 0xCC]);
}

#[test]
fn test_insert_remove_flush_sequence() {
    let original = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
    let mut stream = open_cursor(&original, StreamConfig::in_memory(1024));

    stream.insert_at(3, &[0x12, 0x34, 0x56]).unwrap();
    assert_eq!(stream.length(), 9);
    assert_eq!(
        stream.read_all().unwrap(),
        vec![0xAA, 0xBB, 0xCC, 0x12, 0x34, 0x56, 0xDD, 0xEE, 0xFF]
    );
    // 源存储在落盘前保持不变
    assert_eq!(stream.get_ref().get_ref(), &original.to_vec());

    assert_eq!(stream.remove_at(1, 2).unwrap(), 2);
    assert_eq!(stream.length(), 7);
    let before = stream.read_all().unwrap();
    assert_eq!(before, vec![0xAA, 0x12, 0x34, 0x56, 0xDD, 0xEE, 0xFF]);
    check_chain(&stream);

    stream.flush().unwrap();
    assert_eq!(stream.read_all().unwrap(), before);
    assert_eq!(BackingStore::len(stream.get_ref()).unwrap(), 7);
    assert_eq!(stream.get_ref().get_ref(), &before);
    assert_eq!(stream.segments(), vec![Segment::backing(0, 7)]);
    assert_eq!(stream.cache_count(), 0);
}

#[test]
fn test_flush_state_transitions() {
    let mut stream = open_cursor(b"0123456789", StreamConfig::in_memory(1024));
    assert_eq!(stream.state().unwrap(), FlushState::Clean);

    stream.insert_at(5, b"--").unwrap();
    assert_eq!(stream.state().unwrap(), FlushState::Dirty);

    stream.flush().unwrap();
    assert_eq!(stream.state().unwrap(), FlushState::Clean);
    assert_eq!(stream.get_ref().get_ref(), b"01234--56789");
}

// ----------------------------------------------------------------------
// 性质
// ----------------------------------------------------------------------

#[test]
fn test_write_then_read_round_trip() {
    let mut stream = open_cursor(&pattern(64), StreamConfig::in_memory(1024));

    let writes: [(u64, &[u8]); 3] = [(0, b"head"), (30, b"middle"), (60, b"tail-overflow")];
    for (position, data) in writes {
        stream.write_at(position, data).unwrap();
        let mut buf = vec![0u8; data.len()];
        assert_eq!(stream.read_at(position, &mut buf).unwrap(), data.len());
        assert_eq!(buf, data);
        check_chain(&stream);
    }
    assert_eq!(stream.length(), 73);
}

#[test]
fn test_insert_then_remove_restores_content() {
    let original = pattern(100);
    let mut stream = open_cursor(&original, StreamConfig::in_memory(1024));

    stream.insert_at(40, b"temporary").unwrap();
    assert_eq!(stream.segment_count(), 3);
    stream.remove_at(40, 9).unwrap();

    assert_eq!(stream.read_all().unwrap(), original);
    // 删除后两段源存储片段重新合并
    assert_eq!(stream.segments(), vec![Segment::backing(0, 100)]);
}

#[test]
fn test_flush_is_idempotent() {
    let mut stream = open_cursor(&pattern(50), StreamConfig::in_memory(16));
    stream.insert_at(10, b"abc").unwrap();
    stream.remove_at(30, 7).unwrap();
    stream.append(b"end").unwrap();

    let expected = stream.read_all().unwrap();
    stream.flush().unwrap();
    let first = stream.get_ref().get_ref().clone();
    stream.flush().unwrap();

    assert_eq!(first, expected);
    assert_eq!(stream.get_ref().get_ref(), &expected);
    assert_eq!(stream.read_all().unwrap(), expected);
}

// ----------------------------------------------------------------------
// 边界
// ----------------------------------------------------------------------

#[test]
fn test_seek_clamps() {
    let mut stream = open_cursor(b"abcdefghij", StreamConfig::in_memory(64));

    assert_eq!(stream.seek(SeekFrom::End(-2)), 8);
    assert_eq!(stream.seek(SeekFrom::End(5)), 10);
    assert_eq!(stream.seek(SeekFrom::Current(-100)), 0);
    assert_eq!(stream.seek(SeekFrom::Current(4)), 4);
    assert_eq!(stream.seek(SeekFrom::Start(1000)), 10);
    assert_eq!(stream.set_position(3), 3);

    let mut buf = [0u8; 4];
    assert_eq!(stream.read(&mut buf).unwrap(), 4);
    assert_eq!(&buf, b"defg");
    assert_eq!(stream.position(), 7);
}

#[test]
fn test_read_boundaries() {
    let mut stream = open_cursor(b"abcdef", StreamConfig::in_memory(64));

    let mut buf = [0u8; 8];
    // 末尾读到 0 字节
    assert_eq!(stream.read_at(6, &mut buf).unwrap(), 0);
    // 跨过末尾只读到剩余部分
    assert_eq!(stream.read_at(4, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"ef");

    let err = stream.read_at(7, &mut buf).unwrap_err();
    assert!(matches!(err, EditError::OutOfRange { position: 7, length: 6 }));
}

#[test]
fn test_remove_boundaries() {
    let mut stream = open_cursor(b"abcdef", StreamConfig::in_memory(64));

    assert_eq!(stream.remove_at(2, 0).unwrap(), 0);
    assert_eq!(stream.remove_at(6, 3).unwrap(), 0);
    assert_eq!(stream.remove_at(4, 100).unwrap(), 2);
    assert_eq!(stream.read_all().unwrap(), b"abcd");

    assert_eq!(stream.remove_at(0, 4).unwrap(), 4);
    assert_eq!(stream.length(), 0);
    // 空链上删除是空操作
    assert_eq!(stream.remove_at(0, 1).unwrap(), 0);
    check_chain(&stream);
}

#[test]
fn test_out_of_range_leaves_stream_untouched() {
    let mut stream = open_cursor(b"abcdef", StreamConfig::in_memory(64));
    stream.insert_at(2, b"xyz").unwrap();
    let segments = stream.segments();

    assert!(matches!(
        stream.write_at(10, b"!"),
        Err(EditError::OutOfRange { position: 10, length: 9 })
    ));
    assert!(stream.insert_at(10, b"!").is_err());
    assert!(stream.remove_at(10, 1).is_err());

    assert_eq!(stream.segments(), segments);
    assert_eq!(stream.read_all().unwrap(), b"abxyzcdef");
}

#[test]
fn test_empty_edits_are_noops() {
    let mut stream = open_cursor(b"abc", StreamConfig::in_memory(64));
    stream.write_at(1, &[]).unwrap();
    stream.insert_at(1, &[]).unwrap();
    stream.append(&[]).unwrap();
    assert_eq!(stream.segments(), vec![Segment::backing(0, 3)]);
    assert_eq!(stream.cache_count(), 0);
}

#[test]
fn test_set_length_is_declarative() {
    let mut stream = open_cursor(b"abc", StreamConfig::in_memory(64));
    stream.set_length(100);
    stream.set_length(0);
    assert_eq!(stream.length(), 3);
}

// ----------------------------------------------------------------------
// 游标跟随
// ----------------------------------------------------------------------

#[test]
fn test_follow_cursor_insert_and_remove() {
    let config = StreamConfig::in_memory(64).with_follow_cursor(true);
    let mut stream = open_cursor(b"0123456789", config);
    assert!(stream.follow_cursor());

    stream.set_position(5);
    stream.insert_at(2, b"abc").unwrap();
    assert_eq!(stream.position(), 8);
    // 游标处仍是原来的字节
    let mut byte = [0u8; 1];
    stream.read_at(stream.position(), &mut byte).unwrap();
    assert_eq!(&byte, b"5");

    // 删除区间在游标之前：左移
    stream.remove_at(1, 2).unwrap();
    assert_eq!(stream.position(), 6);

    // 游标落在删除区间内：停在删除起点
    stream.remove_at(3, 4).unwrap();
    assert_eq!(stream.position(), 3);
}

#[test]
fn test_cursor_without_follow() {
    let mut stream = open_cursor(b"0123456789", StreamConfig::in_memory(64));
    stream.set_position(5);
    stream.insert_at(2, b"abc").unwrap();
    assert_eq!(stream.position(), 5);

    stream.set_position(13);
    stream.remove_at(0, 6).unwrap();
    // 只夹紧到新长度
    assert_eq!(stream.position(), 7);
}

#[test]
fn test_insert_at_cursor_moves_past_data() {
    let mut stream = open_cursor(b"abef", StreamConfig::in_memory(64));
    stream.set_position(2);
    stream.insert(b"cd").unwrap();
    assert_eq!(stream.position(), 4);
    stream.remove(1).unwrap();
    assert_eq!(stream.position(), 4);
    assert_eq!(stream.read_all().unwrap(), b"abcdf");
}

// ----------------------------------------------------------------------
// 缓存
// ----------------------------------------------------------------------

#[test]
fn test_cache_rollover() {
    let mut stream = open_cursor(&pattern(20), StreamConfig::in_memory(8));
    let mut model = pattern(20);

    for i in 0..10u8 {
        let data = [i; 3];
        let at = (i as usize * 2) % model.len();
        stream.insert_at(at as u64, &data).unwrap();
        model.splice(at..at, data);
    }

    println!("缓存数: {}, 片段数: {}", stream.cache_count(), stream.segment_count());
    assert!(stream.cache_count() > 1, "超过上限应滚动到新缓存");
    assert_eq!(stream.read_all().unwrap(), model);
    check_chain(&stream);

    stream.flush().unwrap();
    assert_eq!(stream.get_ref().get_ref(), &model);
    assert_eq!(stream.cache_count(), 0);
}

#[test]
fn test_temp_file_caching() {
    let mut stream = open_cursor(&pattern(40), StreamConfig::temp_file(16));
    let mut model = pattern(40);

    stream.insert_at(0, b"prefix-").unwrap();
    model.splice(0..0, b"prefix-".iter().copied());
    stream.insert_at(20, b"in-the-middle-and-long").unwrap();
    model.splice(20..20, b"in-the-middle-and-long".iter().copied());

    assert_eq!(stream.caching_method(), crate::CachingMethod::TempFile);
    assert_eq!(stream.max_cache_size(), 16);
    assert!(stream.cache_count() >= 2);
    assert_eq!(stream.read_all().unwrap(), model);

    stream.flush().unwrap();
    assert_eq!(stream.get_ref().get_ref(), &model);
    assert_eq!(stream.cache_count(), 0);
}

#[test]
fn test_into_inner_discards_cached_edits() {
    let mut stream = open_cursor(b"abcdef", StreamConfig::in_memory(64));
    stream.insert_at(3, b"XYZ").unwrap();
    let store = stream.into_inner().unwrap();
    assert_eq!(store.into_inner(), b"abcdef");
}

// ----------------------------------------------------------------------
// 落盘搬移
// ----------------------------------------------------------------------

#[test]
fn test_flush_moves_backing_forward_across_chunks() {
    // 在开头插入，后面整个源存储片段后移，搬移区间大幅重叠
    let original = pattern(20_000);
    let mut stream = open_cursor(&original, StreamConfig::in_memory(1024));
    stream.insert_at(0, b"0123456789").unwrap();

    let mut expected = b"0123456789".to_vec();
    expected.extend_from_slice(&original);

    stream.flush().unwrap();
    assert_eq!(stream.get_ref().get_ref(), &expected);
}

#[test]
fn test_flush_moves_backing_backward_across_chunks() {
    let original = pattern(20_000);
    let mut stream = open_cursor(&original, StreamConfig::in_memory(1024));
    stream.remove_at(0, 10).unwrap();
    stream.insert_at(9_000, b"mid").unwrap();
    stream.remove_at(15_000, 100).unwrap();

    let mut expected = original[10..].to_vec();
    expected.splice(9_000..9_000, b"mid".iter().copied());
    expected.drain(15_000..15_100);

    let before = stream.read_all().unwrap();
    assert_eq!(before, expected);

    stream.flush().unwrap();
    assert_eq!(stream.get_ref().get_ref(), &expected);
}

#[test]
fn test_flush_after_removing_everything() {
    let mut stream = open_cursor(b"abcdef", StreamConfig::in_memory(64));
    stream.remove_at(0, 6).unwrap();
    stream.flush().unwrap();
    assert!(stream.get_ref().get_ref().is_empty());

    // 空链后写入直接落在源存储开头
    let mut stream = open_cursor(b"abcdef", StreamConfig::in_memory(64));
    stream.remove_at(0, 6).unwrap();
    stream.write(b"xy").unwrap();
    assert_eq!(stream.read_all().unwrap(), b"xy");
    stream.flush().unwrap();
    assert_eq!(stream.get_ref().get_ref(), b"xy");
}

#[test]
fn test_random_edits_match_model() {
    let mut rng = Lcg(0x5eed_1234);
    let initial = pattern(300);
    let mut model = initial.clone();
    let mut stream = open_cursor(&initial, StreamConfig::in_memory(32));

    for round in 0..600 {
        let len = model.len() as u64;
        match rng.below(10) {
            0..=2 => {
                let at = rng.below(len + 1);
                let data = rng.bytes(24);
                stream.insert_at(at, &data).unwrap();
                let at = at as usize;
                model.splice(at..at, data);
            }
            3..=5 => {
                let at = rng.below(len + 1);
                let count = rng.below(40);
                let removed = stream.remove_at(at, count).unwrap();
                let end = (at + count).min(len) as usize;
                assert_eq!(removed, end as u64 - at);
                model.drain(at as usize..end);
            }
            6..=7 => {
                let at = rng.below(len + 1) as usize;
                let data = rng.bytes(24);
                stream.write_at(at as u64, &data).unwrap();
                for (i, byte) in data.into_iter().enumerate() {
                    match model.get_mut(at + i) {
                        Some(slot) => *slot = byte,
                        None => model.push(byte),
                    }
                }
            }
            8 => {
                let data = rng.bytes(16);
                stream.append(&data).unwrap();
                model.extend_from_slice(&data);
            }
            _ => {
                stream.flush().unwrap();
                assert_eq!(stream.get_ref().get_ref(), &model, "第 {} 轮落盘内容不一致", round);
                assert_eq!(stream.state().unwrap(), FlushState::Clean);
            }
        }

        assert_eq!(stream.length(), model.len() as u64);
        check_chain(&stream);
        if round % 25 == 0 {
            assert_eq!(stream.read_all().unwrap(), model, "第 {} 轮内容不一致", round);
        }
    }

    stream.flush().unwrap();
    assert_eq!(stream.get_ref().get_ref(), &model);
}

// ----------------------------------------------------------------------
// 源存储与配置
// ----------------------------------------------------------------------

#[test]
fn test_file_backed_flush() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data.bin");
    fs::write(&path, b"The quick brown fox").unwrap();

    {
        let file = OpenOptions::new().read(true).write(true).open(&path).unwrap();
        let mut stream = EditStream::open(file, StreamConfig::temp_file(4096)).unwrap();
        assert_eq!(stream.length(), 19);

        stream.remove_at(4, 6).unwrap();
        stream.insert_at(4, b"slow ").unwrap();
        stream.append(b" jumps").unwrap();
        stream.flush().unwrap();
        stream.close().unwrap();
    }

    let content = fs::read(&path).unwrap();
    println!("{}", String::from_utf8_lossy(&content));
    assert_eq!(content, b"The slow brown fox jumps");
}

#[test]
fn test_borrowed_store_stays_open() {
    let mut store = Cursor::new(b"abcdef".to_vec());
    store.set_position(4);

    {
        let mut stream = EditStream::open(&mut store, StreamConfig::in_memory(64)).unwrap();
        assert_eq!(stream.position(), 4);
        stream.insert(b"++").unwrap();
        stream.flush().unwrap();
        stream.close().unwrap();
    }

    assert_eq!(store.get_ref(), b"abcd++ef");
    store.set_position(0);
    assert_eq!(BackingStore::len(&store).unwrap(), 8);
}

#[test]
fn test_initial_position_is_clamped() {
    let mut store = Cursor::new(b"abc".to_vec());
    store.set_position(10);
    let stream = EditStream::open(store, StreamConfig::in_memory(64)).unwrap();
    assert_eq!(stream.position(), 3);
}

#[test]
fn test_zero_cache_size_rejected() {
    let err = EditStream::open(Cursor::new(Vec::new()), StreamConfig::in_memory(0)).unwrap_err();
    assert!(matches!(err, EditError::InvalidConfig(_)));
    assert!(err.is_config());
}

#[test]
fn test_read_only_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("readonly.bin");
    fs::write(&path, b"data").unwrap();

    let file = OpenOptions::new().read(true).open(&path).unwrap();
    let err = EditStream::open(file, StreamConfig::in_memory(64)).unwrap_err();
    println!("{}", err);
    assert!(matches!(err, EditError::Capability { .. }));
    assert_eq!(fs::read(&path).unwrap(), b"data");
}
