use crate::{Direction, Error, Result};
use aes::{Aes128, Aes192, Aes256};
use ctr::cipher::{KeyIvInit, StreamCipher};

type Ctr128Be<C> = ctr::Ctr128BE<C>;

enum Cipher {
    Aes128(Box<Ctr128Be<Aes128>>),
    Aes192(Box<Ctr128Be<Aes192>>),
    Aes256(Box<Ctr128Be<Aes256>>),
}

/// AES in CTR mode, 128/192/256-bit keys, 128-bit big-endian counter IV.
///
/// CTR keystream generation is symmetric, so [`AesCtr::encrypt`] and
/// [`AesCtr::decrypt`] are the same operation; [`set_direction`](Self::set_direction)
/// exists purely so callers don't need to special-case this mode against
/// [`AesGcm`](crate::AesGcm), which does distinguish.
pub struct AesCtr {
    key: Vec<u8>,
    direction: Direction,
    cipher: Cipher,
}

impl AesCtr {
    pub fn new(key: &[u8], iv: &[u8; 16], direction: Direction) -> Result<Self> {
        let cipher = Self::build(key, iv)?;
        Ok(Self {
            key: key.to_vec(),
            direction,
            cipher,
        })
    }

    fn build(key: &[u8], iv: &[u8; 16]) -> Result<Cipher> {
        Ok(match key.len() {
            16 => Cipher::Aes128(Box::new(
                Ctr128Be::<Aes128>::new_from_slices(key, iv)
                    .map_err(|_| Error::InvalidKeyLength(key.len()))?,
            )),
            24 => Cipher::Aes192(Box::new(
                Ctr128Be::<Aes192>::new_from_slices(key, iv)
                    .map_err(|_| Error::InvalidKeyLength(key.len()))?,
            )),
            32 => Cipher::Aes256(Box::new(
                Ctr128Be::<Aes256>::new_from_slices(key, iv)
                    .map_err(|_| Error::InvalidKeyLength(key.len()))?,
            )),
            n => return Err(Error::InvalidKeyLength(n)),
        })
    }

    /// Reset the keystream position with a new IV, keeping the key schedule.
    pub fn set_iv(&mut self, iv: &[u8; 16]) -> Result<()> {
        self.cipher = Self::build(&self.key, iv)?;
        Ok(())
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn apply_keystream(&mut self, buf: &mut [u8]) {
        match &mut self.cipher {
            Cipher::Aes128(c) => c.apply_keystream(buf),
            Cipher::Aes192(c) => c.apply_keystream(buf),
            Cipher::Aes256(c) => c.apply_keystream(buf),
        }
    }

    pub fn encrypt(&mut self, out: &mut [u8], input: &[u8]) -> Result<()> {
        let n = input.len();
        out[..n].copy_from_slice(input);
        self.apply_keystream(&mut out[..n]);
        Ok(())
    }

    pub fn decrypt(&mut self, out: &mut [u8], input: &[u8]) -> Result<()> {
        // CTR mode: decryption is the same XOR as encryption.
        self.encrypt(out, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_128() {
        let key = [0x42; 16];
        let iv = [0x24; 16];

        let mut enc = AesCtr::new(&key, &iv, Direction::Encrypt).unwrap();
        let mut dec = AesCtr::new(&key, &iv, Direction::Decrypt).unwrap();

        let plaintext = b"the quick brown fox jumps over the lazy dog...!";
        let mut ciphertext = vec![0u8; plaintext.len()];
        enc.encrypt(&mut ciphertext, plaintext).unwrap();
        assert_ne!(&ciphertext[..], &plaintext[..]);

        let mut decrypted = vec![0u8; plaintext.len()];
        dec.decrypt(&mut decrypted, &ciphertext).unwrap();
        assert_eq!(&decrypted[..], &plaintext[..]);
    }

    #[test]
    fn set_iv_resets_keystream_without_new_key() {
        let key = [0x11; 32];
        let iv = [0x01; 16];

        let mut a = AesCtr::new(&key, &iv, Direction::Encrypt).unwrap();
        let mut b = AesCtr::new(&key, &iv, Direction::Encrypt).unwrap();

        let data = b"resetting the IV must reproduce the same keystream";
        let mut out_a = vec![0u8; data.len()];
        a.encrypt(&mut out_a, data).unwrap();

        // Advance `a` with a throwaway block, then reset.
        let mut scratch = vec![0u8; 16];
        a.encrypt(&mut scratch, &[0u8; 16]).unwrap();
        a.set_iv(&iv).unwrap();

        let mut out_a2 = vec![0u8; data.len()];
        a.encrypt(&mut out_a2, data).unwrap();

        let mut out_b = vec![0u8; data.len()];
        b.encrypt(&mut out_b, data).unwrap();

        assert_eq!(out_a2, out_b);
    }

    #[test]
    fn rejects_bad_key_length() {
        let iv = [0u8; 16];
        assert!(AesCtr::new(&[0u8; 20], &iv, Direction::Encrypt).is_err());
    }
}
