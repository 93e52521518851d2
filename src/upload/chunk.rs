//! Byte-range reads from local files

use bytes::Bytes;
use std::io::SeekFrom;
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Read up to `length` bytes starting at byte offset `start`.
///
/// Returns exactly the bytes present; a short result only happens at
/// end-of-file. The file handle is opened per call and released on every
/// exit path, so consecutive reads never hold state between parts.
pub async fn read_chunk(path: &Path, start: u64, length: u64) -> std::io::Result<Bytes> {
    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(start)).await?;

    let mut buf = vec![0u8; length as usize];
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);

    Ok(Bytes::from(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn fixture(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_read_full_range() {
        let file = fixture(b"0123456789");
        let chunk = read_chunk(file.path(), 0, 10).await.unwrap();
        assert_eq!(&chunk[..], b"0123456789");
    }

    #[tokio::test]
    async fn test_read_middle_range() {
        let file = fixture(b"0123456789");
        let chunk = read_chunk(file.path(), 3, 4).await.unwrap();
        assert_eq!(&chunk[..], b"3456");
    }

    #[tokio::test]
    async fn test_short_read_at_eof() {
        let file = fixture(b"0123456789");
        let chunk = read_chunk(file.path(), 8, 5).await.unwrap();
        assert_eq!(&chunk[..], b"89");
    }

    #[tokio::test]
    async fn test_reads_are_independent() {
        let file = fixture(b"abcdef");
        let first = read_chunk(file.path(), 0, 3).await.unwrap();
        let second = read_chunk(file.path(), 3, 3).await.unwrap();
        assert_eq!(&first[..], b"abc");
        assert_eq!(&second[..], b"def");
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let err = read_chunk(Path::new("/nonexistent/chunk.bin"), 0, 1).await;
        assert!(err.is_err());
    }
}
