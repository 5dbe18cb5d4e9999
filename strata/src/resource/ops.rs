//! Default copy machinery shared by backends.
//!
//! Backends without a native way to copy or move content fall back to these:
//! open an input stream, open an output stream, copy raw bytes through a
//! fixed-size buffer, then (for moves) delete the source.

use std::io::{Read, Write};

use super::Resource;
use crate::error::{ResourceError, ResourceResult};

/// Buffer size for stream copies (64KB).
const BUFFER_SIZE: usize = 64 * 1024;

/// Copy the content of `src` into `dst`, returning the number of bytes copied.
pub fn copy_via_streams<S, D>(src: &S, dst: &D) -> ResourceResult<u64>
where
    S: Resource + ?Sized,
    D: Resource + ?Sized,
{
    let mut reader = src.open_read()?;
    let mut writer = dst.open_write()?;
    let mut buffer = vec![0u8; BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| ResourceError::io(src.uri().as_str(), e))?;

        if bytes_read == 0 {
            break;
        }

        writer
            .write_all(&buffer[..bytes_read])
            .map_err(|e| ResourceError::io(dst.uri().as_str(), e))?;

        copied += bytes_read as u64;
    }

    writer
        .flush()
        .map_err(|e| ResourceError::io(dst.uri().as_str(), e))?;

    Ok(copied)
}

/// Move `src` to `dst` by copying the bytes and deleting the source.
pub fn move_via_copy<S, D>(src: &S, dst: &D) -> ResourceResult<()>
where
    S: Resource + ?Sized,
    D: Resource + ?Sized,
{
    let copied = copy_via_streams(src, dst)?;
    src.delete()?;
    tracing::debug!(
        from = %src.uri(),
        to = %dst.uri(),
        bytes = copied,
        "Moved resource via stream copy"
    );
    Ok(())
}

/// Read the full content of a resource.
pub fn read_to_vec<R: Resource + ?Sized>(resource: &R) -> ResourceResult<Vec<u8>> {
    let mut reader = resource.open_read()?;
    let mut data = Vec::new();
    reader
        .read_to_end(&mut data)
        .map_err(|e| ResourceError::io(resource.uri().as_str(), e))?;
    Ok(data)
}

/// Read the full content of a resource as UTF-8 text.
pub fn read_to_string<R: Resource + ?Sized>(resource: &R) -> ResourceResult<String> {
    let mut reader = resource.open_read()?;
    let mut text = String::new();
    reader
        .read_to_string(&mut text)
        .map_err(|e| ResourceError::io(resource.uri().as_str(), e))?;
    Ok(text)
}

/// Replace the content of a resource with `data`.
pub fn write_bytes<R: Resource + ?Sized>(resource: &R, data: &[u8]) -> ResourceResult<()> {
    let mut writer = resource.open_write()?;
    writer
        .write_all(data)
        .and_then(|()| writer.flush())
        .map_err(|e| ResourceError::io(resource.uri().as_str(), e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileResource;
    use tempfile::TempDir;

    #[test]
    fn test_copy_via_streams() {
        let temp = TempDir::new().unwrap();
        let src = FileResource::new(temp.path().join("src.bin")).unwrap();
        let dst = FileResource::new(temp.path().join("dst.bin")).unwrap();

        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        write_bytes(&src, &payload).unwrap();

        let copied = copy_via_streams(&src, &dst).unwrap();
        assert_eq!(copied, payload.len() as u64);
        assert_eq!(read_to_vec(&dst).unwrap(), payload);
        assert!(src.exists());
    }

    #[test]
    fn test_move_via_copy_deletes_source() {
        let temp = TempDir::new().unwrap();
        let src = FileResource::new(temp.path().join("a.txt")).unwrap();
        let dst = FileResource::new(temp.path().join("b.txt")).unwrap();
        write_bytes(&src, b"moving").unwrap();

        move_via_copy(&src, &dst).unwrap();

        assert!(!src.exists());
        assert_eq!(read_to_string(&dst).unwrap(), "moving");
    }

    #[test]
    fn test_read_missing_is_not_found() {
        let temp = TempDir::new().unwrap();
        let missing = FileResource::new(temp.path().join("missing.txt")).unwrap();

        let err = read_to_vec(&missing).unwrap_err();
        assert!(err.is_not_found());
    }
}
