//! AES-128 in XTS mode over whole sectors.
//!
//! Sector lengths are always a multiple of the AES block size, so
//! ciphertext stealing is never needed. The tweak is the sector index as a
//! little-endian 128-bit integer.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::KeyInit;
use aes::Aes128;
use xts_mode::{get_tweak_default, Xts128};

use super::key::KEY_LEN;

pub(crate) struct XtsCipher {
    inner: Xts128<Aes128>,
}

impl XtsCipher {
    /// First half of the key encrypts data, second half encrypts tweaks
    pub fn new(key: &[u8; KEY_LEN]) -> Self {
        let (data_key, tweak_key) = key.split_at(KEY_LEN / 2);
        let data = Aes128::new(GenericArray::from_slice(data_key));
        let tweak = Aes128::new(GenericArray::from_slice(tweak_key));
        Self {
            inner: Xts128::new(data, tweak),
        }
    }

    pub fn encrypt_sector(&self, sector: u64, buf: &mut [u8]) {
        self.inner
            .encrypt_sector(buf, get_tweak_default(u128::from(sector)));
    }

    pub fn decrypt_sector(&self, sector: u64, buf: &mut [u8]) {
        self.inner
            .decrypt_sector(buf, get_tweak_default(u128::from(sector)));
    }
}
