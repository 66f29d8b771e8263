//! Key derivation

use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Bytes of derived key material: data key followed by tweak key
pub const KEY_LEN: usize = 32;

/// Bytes of random salt stored in the encryption header
pub const SALT_LEN: usize = 16;

/// Cipher-ready key material, wiped from memory on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Stretch caller-supplied key bytes into cipher key material
pub fn derive_key(password: &[u8], salt: &[u8], iterations: u32) -> DerivedKey {
    let mut key = DerivedKey([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key.0);
    key
}

/// Fresh random salt for a new encrypted file
pub fn generate_salt() -> [u8; SALT_LEN] {
    let mut salt = [0u8; SALT_LEN];
    rand::thread_rng().fill_bytes(&mut salt);
    salt
}
