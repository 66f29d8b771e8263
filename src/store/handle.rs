//! Store file handle, plain or encrypted.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use crate::crypto::EncryptedFile;

/// The handle every ordinary read and write goes through
///
/// Selected once at open time. Either way the raw file stays reachable
/// through `raw` for read-only privileged access.
pub(crate) enum StoreFile {
    Plain(File),
    Encrypted(EncryptedFile),
}

impl StoreFile {
    pub fn read_exact_at(&self, buf: &mut [u8], pos: u64) -> io::Result<()> {
        match self {
            StoreFile::Plain(file) => file.read_exact_at(buf, pos),
            StoreFile::Encrypted(file) => file.read_exact_at(buf, pos),
        }
    }

    /// Read up to `buf.len()` bytes at `pos`, stopping early at end of file
    ///
    /// Returns the number of bytes read.
    pub fn read_up_to(&self, buf: &mut [u8], pos: u64) -> io::Result<usize> {
        match self {
            StoreFile::Plain(file) => {
                let mut filled = 0;
                while filled < buf.len() {
                    match file.read_at(&mut buf[filled..], pos + filled as u64) {
                        Ok(0) => break,
                        Ok(n) => filled += n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    }
                }
                Ok(filled)
            }
            StoreFile::Encrypted(file) => {
                let available = file.len().saturating_sub(pos);
                let n = (buf.len() as u64).min(available) as usize;
                if n == 0 {
                    return Ok(0);
                }
                file.read_exact_at(&mut buf[..n], pos)?;
                Ok(n)
            }
        }
    }

    pub fn write_all_at(&mut self, buf: &[u8], pos: u64) -> io::Result<()> {
        match self {
            StoreFile::Plain(file) => file.write_all_at(buf, pos),
            StoreFile::Encrypted(file) => file.write_all_at(buf, pos),
        }
    }

    pub fn set_len(&mut self, size: u64) -> io::Result<()> {
        match self {
            StoreFile::Plain(file) => file.set_len(size),
            StoreFile::Encrypted(file) => file.set_len(size),
        }
    }

    /// Flush data and metadata to stable storage
    pub fn sync_all(&self) -> io::Result<()> {
        match self {
            StoreFile::Plain(file) => file.sync_all(),
            StoreFile::Encrypted(file) => file.sync_all(),
        }
    }

    /// Logical length as seen by the store
    pub fn len(&self) -> io::Result<u64> {
        match self {
            StoreFile::Plain(file) => Ok(file.metadata()?.len()),
            StoreFile::Encrypted(file) => Ok(file.len()),
        }
    }

    pub fn raw(&self) -> &File {
        match self {
            StoreFile::Plain(file) => file,
            StoreFile::Encrypted(file) => file.raw(),
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, StoreFile::Encrypted(_))
    }
}
