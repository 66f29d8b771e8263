//! Encrypted File
//!
//! Wraps the raw file handle and translates logical offsets into encrypted
//! physical blocks.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use super::key::{derive_key, generate_salt, SALT_LEN};
use super::xts::XtsCipher;

/// Size of the plaintext header in front of the encrypted data
pub const ENCRYPTION_HEADER_SIZE: u64 = 4096;

/// Unit of encryption; every physical write covers whole blocks
pub const CIPHER_BLOCK_SIZE: u64 = 4096;

/// Largest logical length whose last block still lies below the OS file
/// size limit (`i64::MAX`)
pub const MAX_LOGICAL_LEN: u64 =
    (i64::MAX as u64 - ENCRYPTION_HEADER_SIZE) / CIPHER_BLOCK_SIZE * CIPHER_BLOCK_SIZE;

// =============================================================================
// Header Layout
// =============================================================================

const MAGIC: &[u8; 8] = b"ATLASENC";
const FORMAT_VERSION: u32 = 1;

const VERSION_POS: usize = 8;
const SALT_POS: usize = 12;
const LENGTH_POS: usize = SALT_POS + SALT_LEN;
const CRC_POS: usize = LENGTH_POS + 8;

/// Transparent cipher pass-through over a raw file handle
///
/// Reads and writes use logical offsets. The logical length is kept in the
/// header so it survives reopening even when it is not block aligned.
pub struct EncryptedFile {
    /// Physical file holding header and ciphertext
    file: File,
    cipher: XtsCipher,
    salt: [u8; SALT_LEN],
    /// Logical (plaintext) length
    len: u64,
}

impl EncryptedFile {
    /// Wrap `file`, reading its encryption header or writing a fresh one
    ///
    /// An empty file gets a new random salt, but only when `writable`.
    pub fn open(file: File, password: &[u8], iterations: u32, writable: bool) -> io::Result<Self> {
        let physical_len = file.metadata()?.len();

        let (salt, len, fresh) = if physical_len == 0 {
            if !writable {
                return Err(invalid_data("file has no encryption header".to_string()));
            }
            (generate_salt(), 0, true)
        } else {
            let (salt, len) = read_header(&file)?;
            (salt, len, false)
        };

        let key = derive_key(password, &salt, iterations);
        let encrypted = Self {
            file,
            cipher: XtsCipher::new(key.as_bytes()),
            salt,
            len,
        };

        if fresh {
            encrypted.write_header()?;
        }

        Ok(encrypted)
    }

    /// Logical length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The underlying file, still encrypted
    pub fn raw(&self) -> &File {
        &self.file
    }

    /// Fill `buf` from logical offset `pos`
    pub fn read_exact_at(&self, buf: &mut [u8], pos: u64) -> io::Result<()> {
        let end = logical_end(pos, buf.len())?;
        if end > self.len {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "read of {} bytes at {} runs past end of file ({} bytes)",
                    buf.len(),
                    pos,
                    self.len
                ),
            ));
        }

        let mut block = vec![0u8; CIPHER_BLOCK_SIZE as usize];
        let mut done = 0;
        while done < buf.len() {
            let logical = pos + done as u64;
            let index = logical / CIPHER_BLOCK_SIZE;
            let offset = (logical % CIPHER_BLOCK_SIZE) as usize;
            let n = (block.len() - offset).min(buf.len() - done);

            self.read_block(index, &mut block)?;
            buf[done..done + n].copy_from_slice(&block[offset..offset + n]);
            done += n;
        }
        Ok(())
    }

    /// Write all of `buf` at logical offset `pos`
    ///
    /// Partial blocks are read, patched, and re-encrypted. A range ending
    /// past `MAX_LOGICAL_LEN` is rejected before anything is written.
    pub fn write_all_at(&mut self, buf: &[u8], pos: u64) -> io::Result<()> {
        let end = logical_end(pos, buf.len())?;

        let mut block = vec![0u8; CIPHER_BLOCK_SIZE as usize];
        let mut done = 0;
        while done < buf.len() {
            let logical = pos + done as u64;
            let index = logical / CIPHER_BLOCK_SIZE;
            let offset = (logical % CIPHER_BLOCK_SIZE) as usize;
            let n = (block.len() - offset).min(buf.len() - done);

            if n == block.len() {
                block.copy_from_slice(&buf[done..done + n]);
            } else {
                self.read_block(index, &mut block)?;
                block[offset..offset + n].copy_from_slice(&buf[done..done + n]);
            }
            self.write_block(index, &mut block)?;
            done += n;
        }

        if end > self.len {
            self.len = end;
            self.write_header()?;
        }
        Ok(())
    }

    /// Resize to exactly `size` logical bytes
    pub fn set_len(&mut self, size: u64) -> io::Result<()> {
        if size > MAX_LOGICAL_LEN {
            return Err(out_of_range(format!(
                "length {} exceeds the encrypted file limit of {} bytes",
                size, MAX_LOGICAL_LEN
            )));
        }
        let blocks = size.div_ceil(CIPHER_BLOCK_SIZE);
        let physical_len = block_position(blocks)?;

        // Zero the cut-off tail so a later extension reads zeros there.
        let tail = (size % CIPHER_BLOCK_SIZE) as usize;
        if tail != 0 && size < self.len {
            let index = size / CIPHER_BLOCK_SIZE;
            let mut block = vec![0u8; CIPHER_BLOCK_SIZE as usize];
            self.read_block(index, &mut block)?;
            block[tail..].fill(0);
            self.write_block(index, &mut block)?;
        }

        self.file.set_len(physical_len)?;
        self.len = size;
        self.write_header()
    }

    pub fn sync_all(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Decrypt logical block `index` into `block`
    ///
    /// Blocks past the physical end, or never written (all zeros on disk),
    /// read as zeros.
    fn read_block(&self, index: u64, block: &mut [u8]) -> io::Result<()> {
        let physical = block_position(index)?;
        let mut filled = 0;
        while filled < block.len() {
            match self.file.read_at(&mut block[filled..], physical + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        block[filled..].fill(0);

        if block.iter().any(|&b| b != 0) {
            self.cipher.decrypt_sector(index, block);
        }
        Ok(())
    }

    /// Encrypt `block` in place and write it as logical block `index`
    fn write_block(&self, index: u64, block: &mut [u8]) -> io::Result<()> {
        let physical = block_position(index)?;
        self.cipher.encrypt_sector(index, block);
        self.file.write_all_at(block, physical)
    }

    fn write_header(&self) -> io::Result<()> {
        let mut header = vec![0u8; ENCRYPTION_HEADER_SIZE as usize];
        header[..MAGIC.len()].copy_from_slice(MAGIC);
        header[VERSION_POS..SALT_POS].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        header[SALT_POS..LENGTH_POS].copy_from_slice(&self.salt);
        header[LENGTH_POS..CRC_POS].copy_from_slice(&self.len.to_le_bytes());
        let crc = crc32fast::hash(&header[..CRC_POS]);
        header[CRC_POS..CRC_POS + 4].copy_from_slice(&crc.to_le_bytes());

        self.file.write_all_at(&header, 0)
    }
}

/// Physical offset of logical block `index`
fn block_position(index: u64) -> io::Result<u64> {
    index
        .checked_mul(CIPHER_BLOCK_SIZE)
        .and_then(|offset| offset.checked_add(ENCRYPTION_HEADER_SIZE))
        .ok_or_else(|| out_of_range(format!("block index {} is out of range", index)))
}

/// End of the logical range `[pos, pos + len)`, bounded by `MAX_LOGICAL_LEN`
fn logical_end(pos: u64, len: usize) -> io::Result<u64> {
    match pos.checked_add(len as u64) {
        Some(end) if end <= MAX_LOGICAL_LEN => Ok(end),
        _ => Err(out_of_range(format!(
            "range of {} bytes at {} exceeds the encrypted file limit of {} bytes",
            len, pos, MAX_LOGICAL_LEN
        ))),
    }
}

/// Parse and validate the header; returns (salt, logical length)
fn read_header(file: &File) -> io::Result<([u8; SALT_LEN], u64)> {
    let mut header = [0u8; CRC_POS + 4];
    file.read_exact_at(&mut header, 0)?;

    if &header[..MAGIC.len()] != MAGIC {
        return Err(invalid_data(format!(
            "invalid encryption header magic: {:?}",
            &header[..MAGIC.len()]
        )));
    }

    let version = u32::from_le_bytes(header[VERSION_POS..SALT_POS].try_into().unwrap());
    if version != FORMAT_VERSION {
        return Err(invalid_data(format!(
            "unsupported encryption format version: {}",
            version
        )));
    }

    let stored_crc = u32::from_le_bytes(header[CRC_POS..CRC_POS + 4].try_into().unwrap());
    let computed_crc = crc32fast::hash(&header[..CRC_POS]);
    if stored_crc != computed_crc {
        return Err(invalid_data(format!(
            "encryption header checksum mismatch: stored {:#010x}, computed {:#010x}",
            stored_crc, computed_crc
        )));
    }

    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&header[SALT_POS..LENGTH_POS]);
    let len = u64::from_le_bytes(header[LENGTH_POS..CRC_POS].try_into().unwrap());
    if len > MAX_LOGICAL_LEN {
        return Err(invalid_data(format!(
            "encryption header length {} is out of range",
            len
        )));
    }

    Ok((salt, len))
}

fn invalid_data(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

fn out_of_range(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message)
}
