//! AOF replay
//!
//! Feeds every record of the AOF back through a caller-supplied function to
//! reconstruct the database state at startup.

use super::{AofError, AofReader};
use crate::protocol::{RespError, RespValue};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Number of complete records handed to the apply function
    pub records: u64,
    /// Byte length of the prefix made of complete records
    pub valid_len: u64,
    /// Whether the file ended partway through a record
    pub truncated: bool,
}

/// Replay the AOF at `path` into `apply`
///
/// A missing file replays nothing. A partial record at the very end is the
/// normal shape of a crash mid-append: replay stops there, logs a warning
/// and reports `truncated`. A corrupt record is returned as an error, and so
/// is a record whose declared length runs over the start of a later record.
pub async fn replay<P, F>(path: P, mut apply: F) -> Result<ReplayStats, AofError>
where
    P: AsRef<Path>,
    F: FnMut(RespValue),
{
    let path = path.as_ref();
    if !path.exists() {
        debug!("No AOF at {:?}, nothing to replay", path);
        return Ok(ReplayStats::default());
    }

    info!("Loading AOF from {:?}", path);
    let mut reader = AofReader::open(path).await?;
    let mut stats = ReplayStats::default();

    loop {
        match reader.next_record().await {
            Ok(Some(record)) => {
                apply(record);
                stats.records += 1;
            }
            Ok(None) => break,
            Err(AofError::Truncated { offset }) => {
                // A crash leaves at most one partial record; a later record
                // start means a damaged length, not a torn append.
                let tail = read_tail(path, offset)?;
                if let Some(next) = find_record_start(&tail) {
                    return Err(AofError::Corrupt {
                        offset,
                        source: RespError::InvalidProtocol(format!(
                            "record length runs past the record at offset {}",
                            offset + next as u64
                        )),
                    });
                }

                warn!(
                    "AOF ends with a partial record at offset {}, ignoring the tail",
                    offset
                );
                stats.truncated = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }

    stats.valid_len = reader.valid_len();
    info!("Replayed {} AOF records", stats.records);
    Ok(stats)
}

/// Cut the file back to `len` bytes, dropping a partial trailing record so
/// that new appends start on a record boundary
///
/// The dropped bytes are first copied to `tail_path(path, len)`.
pub fn truncate_to<P: AsRef<Path>>(path: P, len: u64) -> io::Result<PathBuf> {
    let path = path.as_ref();
    let saved = tail_path(path, len);

    let tail = read_tail(path, len)?;
    fs::write(&saved, &tail)?;
    File::open(&saved)?.sync_all()?;

    let file = OpenOptions::new().write(true).open(path)?;
    file.set_len(len)?;
    file.sync_all()?;

    warn!(
        "Truncated AOF {:?} to {} bytes, dropped {} bytes saved to {:?}",
        path,
        len,
        tail.len(),
        saved
    );
    Ok(saved)
}

/// Where `truncate_to` keeps the bytes it cuts off at `len`
pub fn tail_path<P: AsRef<Path>>(path: P, len: u64) -> PathBuf {
    let mut name = OsString::from(path.as_ref().as_os_str());
    name.push(format!(".tail-{}", len));
    PathBuf::from(name)
}

fn read_tail(path: &Path, offset: u64) -> io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;
    Ok(tail)
}

/// Offset of the first `*<digits>\r\n$` after the start of `tail`
fn find_record_start(tail: &[u8]) -> Option<usize> {
    (1..tail.len()).find(|&i| {
        if tail[i] != b'*' {
            return false;
        }
        let digits = tail[i + 1..]
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        digits > 0 && tail[i + 1 + digits..].starts_with(b"\r\n$")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("oxikv-replay-{}-{}.aof", name, std::process::id()))
    }

    const SET_RECORD: &[u8] = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$1\r\nv\r\n";

    #[tokio::test]
    async fn test_replay_multiple_records() {
        let path = temp_path("multi");
        let mut data = SET_RECORD.to_vec();
        data.extend_from_slice(b"*4\r\n$4\r\nHSET\r\n$1\r\nh\r\n$1\r\nf\r\n$1\r\nv\r\n");
        fs::write(&path, &data).unwrap();

        let mut seen = Vec::new();
        let stats = replay(&path, |record| seen.push(record)).await.unwrap();

        assert_eq!(stats.records, 2);
        assert_eq!(stats.valid_len, data.len() as u64);
        assert!(!stats.truncated);
        assert_eq!(seen[0], RespValue::command(["SET", "k", "v"]));
        assert_eq!(seen[1], RespValue::command(["HSET", "h", "f", "v"]));

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_missing_file_replays_nothing() {
        let path = temp_path("missing");
        let _ = fs::remove_file(&path);

        let stats = replay(&path, |_| panic!("no records expected")).await.unwrap();
        assert_eq!(stats, ReplayStats::default());
    }

    #[tokio::test]
    async fn test_truncated_tail_stops_replay() {
        let path = temp_path("truncated");
        let mut data = SET_RECORD.to_vec();
        data.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$5\r\nval");
        fs::write(&path, &data).unwrap();

        let mut count = 0;
        let stats = replay(&path, |_| count += 1).await.unwrap();

        assert_eq!(count, 1);
        assert!(stats.truncated);
        assert_eq!(stats.valid_len, SET_RECORD.len() as u64);

        let saved = truncate_to(&path, stats.valid_len).unwrap();
        assert_eq!(saved, tail_path(&path, stats.valid_len));
        assert_eq!(fs::read(&path).unwrap(), SET_RECORD);
        assert_eq!(fs::read(&saved).unwrap(), &data[SET_RECORD.len()..]);

        fs::remove_file(&path).unwrap();
        fs::remove_file(&saved).unwrap();
    }

    #[tokio::test]
    async fn test_damaged_length_before_good_records_is_corrupt() {
        let path = temp_path("damaged-length");
        let mut data = SET_RECORD.to_vec();
        data.extend_from_slice(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$900\r\n1\r\n");
        for key in ["b", "c", "d"] {
            let record = format!("*3\r\n$3\r\nSET\r\n$1\r\n{}\r\n$1\r\n1\r\n", key);
            data.extend_from_slice(record.as_bytes());
        }
        fs::write(&path, &data).unwrap();

        let mut count = 0;
        let result = replay(&path, |_| count += 1).await;

        assert_eq!(count, 1);
        match result {
            Err(AofError::Corrupt { offset, .. }) => assert_eq!(offset, SET_RECORD.len() as u64),
            other => panic!("expected corrupt record error, got {:?}", other),
        }
        assert_eq!(fs::read(&path).unwrap(), data);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_find_record_start() {
        assert_eq!(find_record_start(b"*3\r\n$3\r\nSET"), None);
        assert_eq!(find_record_start(b"*3\r\n$5\r\nab*cd"), None);
        assert_eq!(find_record_start(b"*3\r\n$900\r\nx\r\n*12\r\n$3"), Some(13));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let path = temp_path("corrupt");
        let mut data = SET_RECORD.to_vec();
        data.extend_from_slice(b"!garbage\r\n");
        data.extend_from_slice(SET_RECORD);
        fs::write(&path, &data).unwrap();

        let mut count = 0;
        let result = replay(&path, |_| count += 1).await;

        assert_eq!(count, 1);
        match result {
            Err(AofError::Corrupt { offset, .. }) => assert_eq!(offset, SET_RECORD.len() as u64),
            other => panic!("expected corrupt record error, got {:?}", other),
        }

        fs::remove_file(&path).unwrap();
    }
}
