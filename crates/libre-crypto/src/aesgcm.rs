use crate::{constant_time_eq, Direction, Error, Result};
use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit, KeyIvInit, StreamCipher};
use aes::{Aes128, Aes192, Aes256};
use ghash::{
    universal_hash::{KeyInit as UhKeyInit, UniversalHash},
    GHash,
};

const TAG_LEN: usize = 16;

enum Block {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl Block {
    fn new(key: &[u8]) -> Result<Self> {
        Ok(match key.len() {
            16 => Block::Aes128(Aes128::new_from_slice(key).map_err(|_| Error::InvalidKeyLength(key.len()))?),
            24 => Block::Aes192(Aes192::new_from_slice(key).map_err(|_| Error::InvalidKeyLength(key.len()))?),
            32 => Block::Aes256(Aes256::new_from_slice(key).map_err(|_| Error::InvalidKeyLength(key.len()))?),
            n => return Err(Error::InvalidKeyLength(n)),
        })
    }

    fn encrypt_block(&self, block: &mut [u8; 16]) {
        let ga = GenericArray::from_mut_slice(block);
        match self {
            Block::Aes128(c) => c.encrypt_block(ga),
            Block::Aes192(c) => c.encrypt_block(ga),
            Block::Aes256(c) => c.encrypt_block(ga),
        }
    }
}

fn apply_ctr32be(key: &[u8], j0_plus_one: &[u8; 16], buf: &mut [u8]) -> Result<()> {
    match key.len() {
        16 => ctr::Ctr32BE::<Aes128>::new_from_slices(key, j0_plus_one)
            .map_err(|_| Error::InvalidKeyLength(key.len()))?
            .apply_keystream(buf),
        24 => ctr::Ctr32BE::<Aes192>::new_from_slices(key, j0_plus_one)
            .map_err(|_| Error::InvalidKeyLength(key.len()))?
            .apply_keystream(buf),
        32 => ctr::Ctr32BE::<Aes256>::new_from_slices(key, j0_plus_one)
            .map_err(|_| Error::InvalidKeyLength(key.len()))?
            .apply_keystream(buf),
        n => return Err(Error::InvalidKeyLength(n)),
    }
    Ok(())
}

/// AES-GCM with the update/finalize split OpenSSL's EVP interface exposes:
/// [`encrypt`](Self::encrypt) and [`decrypt`](Self::decrypt) run the CTR
/// transform and leave the computed tag sitting in `self`; the caller reads
/// it with [`get_auth_tag`](Self::get_auth_tag) or checks an incoming one with
/// [`authenticate`](Self::authenticate) as a separate step. This is why the
/// crate builds GCM from `aes` + `ctr` + `ghash` rather than reaching for the
/// higher-level `aes-gcm` crate, whose `Aead` trait only offers atomic
/// encrypt-and-tag / decrypt-and-verify calls.
///
/// Only 96-bit (12-byte) nonces are supported; this is the nonce length used
/// throughout SRTP and DTLS, and the only one the protocol engines built on
/// top of this crate ever construct.
pub struct AesGcm {
    key: Vec<u8>,
    cipher: Block,
    direction: Direction,
    pending_tag: Option<[u8; TAG_LEN]>,
}

impl AesGcm {
    pub fn new(key: &[u8], direction: Direction) -> Result<Self> {
        Ok(Self {
            key: key.to_vec(),
            cipher: Block::new(key)?,
            direction,
            pending_tag: None,
        })
    }

    pub fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn j0(&self, iv: &[u8]) -> Result<[u8; 16]> {
        if iv.len() != 12 {
            return Err(Error::InvalidIvLength(iv.len()));
        }
        let mut j0 = [0u8; 16];
        j0[..12].copy_from_slice(iv);
        j0[15] = 1;
        Ok(j0)
    }

    fn h_key(&self) -> [u8; 16] {
        let mut h = [0u8; 16];
        self.cipher.encrypt_block(&mut h);
        h
    }

    fn ghash_tag(&self, j0: &[u8; 16], aad: &[u8], ciphertext: &[u8]) -> [u8; TAG_LEN] {
        let h = self.h_key();
        let mut ghash = GHash::new(GenericArray::from_slice(&h));

        ghash.update_padded(aad);
        ghash.update_padded(ciphertext);

        let mut len_block = [0u8; 16];
        len_block[0..8].copy_from_slice(&((aad.len() as u64) * 8).to_be_bytes());
        len_block[8..16].copy_from_slice(&((ciphertext.len() as u64) * 8).to_be_bytes());
        ghash.update(&[GenericArray::clone_from_slice(&len_block)]);

        let s = ghash.finalize();

        let mut ek_j0 = *j0;
        self.cipher.encrypt_block(&mut ek_j0);

        let mut tag = [0u8; TAG_LEN];
        for i in 0..TAG_LEN {
            tag[i] = ek_j0[i] ^ s[i];
        }
        tag
    }

    fn increment(block: &[u8; 16]) -> [u8; 16] {
        let mut out = *block;
        let counter = u32::from_be_bytes([out[12], out[13], out[14], out[15]]).wrapping_add(1);
        out[12..16].copy_from_slice(&counter.to_be_bytes());
        out
    }

    /// Encrypt `input` into `out` (same length) and compute the auth tag for
    /// retrieval via [`get_auth_tag`](Self::get_auth_tag).
    pub fn encrypt(&mut self, iv: &[u8], aad: &[u8], out: &mut [u8], input: &[u8]) -> Result<()> {
        let j0 = self.j0(iv)?;
        let j0_plus_one = Self::increment(&j0);

        let n = input.len();
        out[..n].copy_from_slice(input);
        apply_ctr32be(&self.key, &j0_plus_one, &mut out[..n])?;

        self.pending_tag = Some(self.ghash_tag(&j0, aad, &out[..n]));
        Ok(())
    }

    /// Returns the tag computed by the most recent [`encrypt`](Self::encrypt) call.
    pub fn get_auth_tag(&self) -> Result<[u8; TAG_LEN]> {
        self.pending_tag.ok_or(Error::NotSupported)
    }

    /// Decrypt `input` into `out` without verifying the tag. The expected tag
    /// is computed and cached so a later [`authenticate`](Self::authenticate)
    /// call can check it, mirroring callers that stream decrypted payload out
    /// before the trailing tag has even arrived.
    pub fn decrypt(&mut self, iv: &[u8], aad: &[u8], out: &mut [u8], input: &[u8]) -> Result<()> {
        let j0 = self.j0(iv)?;
        let j0_plus_one = Self::increment(&j0);

        self.pending_tag = Some(self.ghash_tag(&j0, aad, input));

        let n = input.len();
        out[..n].copy_from_slice(input);
        apply_ctr32be(&self.key, &j0_plus_one, &mut out[..n])?;
        Ok(())
    }

    /// Verify `tag` against the value computed by the most recent
    /// [`decrypt`](Self::decrypt) call.
    pub fn authenticate(&self, tag: &[u8]) -> Result<()> {
        let expected = self.pending_tag.ok_or(Error::NotSupported)?;
        if constant_time_eq(&expected, tag) {
            Ok(())
        } else {
            Err(Error::AuthFailed)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // NIST SP 800-38D test case 2: 128-bit key, all-zero plaintext/key.
    #[test]
    fn nist_case_2_roundtrip_and_tag() {
        let key = [0u8; 16];
        let iv = [0u8; 12];
        let plaintext = [0u8; 16];

        let mut enc = AesGcm::new(&key, Direction::Encrypt).unwrap();
        let mut ciphertext = [0u8; 16];
        enc.encrypt(&iv, &[], &mut ciphertext, &plaintext).unwrap();
        let tag = enc.get_auth_tag().unwrap();

        assert_eq!(
            hex::encode(ciphertext),
            "0388dace60b6a392f328c2b971b2fe78"
        );
        assert_eq!(hex::encode(tag), "ab6e47d42cec13bdf53a67b21257bddf");

        let mut dec = AesGcm::new(&key, Direction::Decrypt).unwrap();
        let mut recovered = [0u8; 16];
        dec.decrypt(&iv, &[], &mut recovered, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
        dec.authenticate(&tag).unwrap();
    }

    #[test]
    fn tampered_tag_fails_authentication() {
        let key = [0x5a; 32];
        let iv = [0x11; 12];
        let plaintext = b"a message that needs both secrecy and integrity";

        let mut enc = AesGcm::new(&key, Direction::Encrypt).unwrap();
        let mut ciphertext = vec![0u8; plaintext.len()];
        enc.encrypt(&iv, b"header", &mut ciphertext, plaintext).unwrap();
        let mut tag = enc.get_auth_tag().unwrap();
        tag[0] ^= 0xff;

        let mut dec = AesGcm::new(&key, Direction::Decrypt).unwrap();
        let mut recovered = vec![0u8; plaintext.len()];
        dec.decrypt(&iv, b"header", &mut recovered, &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
        assert!(dec.authenticate(&tag).is_err());
    }

    #[test]
    fn rejects_non_96_bit_nonce() {
        let mut gcm = AesGcm::new(&[0u8; 16], Direction::Encrypt).unwrap();
        let mut out = [0u8; 16];
        assert!(gcm.encrypt(&[0u8; 8], &[], &mut out, &[0u8; 16]).is_err());
    }
}
