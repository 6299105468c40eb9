//! Password algorithms for the standard security handler (§4.F): key
//! derivation and password authentication for revisions 2-4 (Algorithms 2-7,
//! ISO 32000-1) and revisions 5-6 (Algorithms 2.A/2.B, ISO 32000-2).

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use aes::{Aes128, Aes256};
use md5::{Digest as _, Md5};
use rand::Rng as _;
use sha2::{Sha256, Sha384, Sha512};

use super::rc4::Rc4;
use crate::encodings;
use crate::error::DecryptionError;
use crate::{Document, Error};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

/// Padding bytes appended to a password shorter than 32 bytes (revision ≤ 4,
/// Algorithm 2 step (a)).
const PAD_BYTES: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08, 0x2E, 0x2E, 0x00,
    0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// The `/Encrypt` dictionary's key-derivation parameters, read once and held
/// independently of the `Document` they came from so the (possibly several)
/// candidate passwords can be tried against them without re-parsing.
#[derive(Clone, Debug)]
pub struct PasswordAlgorithm {
    pub version: i64,
    pub revision: i64,
    pub length: Option<usize>,
    pub encrypt_metadata: bool,
    pub permissions: i64,
    pub owner_value: Vec<u8>,
    pub user_value: Vec<u8>,
    pub owner_encrypted: Vec<u8>,
    pub user_encrypted: Vec<u8>,
    /// `/Perms`: present only for R=6, a 16-byte value that lets a reader
    /// check the file key is right without walking the whole O/U dance.
    pub permission_encrypted: Vec<u8>,
}

impl TryFrom<&Document> for PasswordAlgorithm {
    type Error = Error;

    fn try_from(doc: &Document) -> Result<Self, Self::Error> {
        let encrypted = doc.get_encrypted().map_err(|_| DecryptionError::MissingEncryptDictionary)?;

        let version = encrypted
            .get(b"V")
            .map_err(|_| DecryptionError::MissingVersion)?
            .as_i64()
            .map_err(|_| DecryptionError::InvalidType)?;
        let revision = encrypted
            .get(b"R")
            .map_err(|_| DecryptionError::MissingRevision)?
            .as_i64()
            .map_err(|_| DecryptionError::InvalidType)?;
        let length = match encrypted.get(b"Length") {
            Ok(obj) => Some(obj.as_i64().map_err(|_| DecryptionError::InvalidType)? as usize),
            Err(_) => None,
        };
        let encrypt_metadata = encrypted
            .get(b"EncryptMetadata")
            .and_then(|o| o.as_bool())
            .unwrap_or(true);
        let permissions = encrypted
            .get(b"P")
            .map_err(|_| DecryptionError::MissingPermissions)?
            .as_i64()
            .map_err(|_| DecryptionError::InvalidType)?;
        let owner_value = encrypted
            .get(b"O")
            .map_err(|_| DecryptionError::MissingOwnerPassword)?
            .as_str()
            .map_err(|_| DecryptionError::InvalidType)?
            .to_vec();
        let user_value = encrypted
            .get(b"U")
            .map_err(|_| DecryptionError::MissingUserPassword)?
            .as_str()
            .map_err(|_| DecryptionError::InvalidType)?
            .to_vec();
        let owner_encrypted = encrypted
            .get(b"OE")
            .and_then(|o| o.as_str())
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        let user_encrypted = encrypted
            .get(b"UE")
            .and_then(|o| o.as_str())
            .map(<[u8]>::to_vec)
            .unwrap_or_default();
        let permission_encrypted = encrypted
            .get(b"Perms")
            .and_then(|o| o.as_str())
            .map(<[u8]>::to_vec)
            .unwrap_or_default();

        Ok(Self {
            version,
            revision,
            length,
            encrypt_metadata,
            permissions,
            owner_value,
            user_value,
            owner_encrypted,
            user_encrypted,
            permission_encrypted,
        })
    }
}

impl PasswordAlgorithm {
    fn file_id(doc: &Document) -> Result<Vec<u8>, DecryptionError> {
        doc.trailer
            .get(b"ID")
            .map_err(|_| DecryptionError::MissingFileID)?
            .as_array()
            .map_err(|_| DecryptionError::InvalidType)?
            .first()
            .ok_or(DecryptionError::MissingFileID)?
            .as_str()
            .map_err(|_| DecryptionError::InvalidType)
            .map(<[u8]>::to_vec)
    }

    /// Revision ≤ 4 (Algorithm 2 step (a)): passwords are PDFDocEncoding, not
    /// UTF-8/SASLprep.
    fn sanitize_password_r4(password: &str) -> Vec<u8> {
        encodings::string_to_bytes(&encodings::PDF_DOC_ENCODING, password)
    }

    /// Revision 5/6 (Algorithm 2.A step (a)): SASLprep-normalize, then
    /// truncate to 127 bytes.
    fn sanitize_password_r56(password: &str) -> Result<Vec<u8>, DecryptionError> {
        let normalized = stringprep::saslprep(password)?;
        let mut bytes = normalized.as_bytes().to_vec();
        bytes.truncate(127);
        Ok(bytes)
    }

    fn key_length_bytes(&self) -> Result<usize, DecryptionError> {
        if self.revision >= 3 {
            self.length.map(|bits| bits / 8).ok_or(DecryptionError::MissingKeyLength)
        } else {
            Ok(5)
        }
    }

    /// Algorithm 2 (revision ≤ 4): the file encryption key from a candidate
    /// password.
    fn compute_file_encryption_key_r4(&self, doc: &Document, password: &[u8]) -> Result<Vec<u8>, DecryptionError> {
        let len = password.len().min(32);

        let mut hasher = Md5::new();
        hasher.update(&password[..len]);
        hasher.update(&PAD_BYTES[len..]);
        hasher.update(&self.owner_value);
        hasher.update((self.permissions as u32).to_le_bytes());
        hasher.update(Self::file_id(doc)?);
        if self.revision >= 4 && !self.encrypt_metadata {
            hasher.update(b"\xff\xff\xff\xff");
        }
        let mut hash = hasher.finalize();

        let n = self.key_length_bytes()?;
        if n > 16 {
            return Err(DecryptionError::InvalidKeyLength);
        }
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = Md5::digest(&hash[..n]);
            }
        }

        Ok(hash[..n].to_vec())
    }

    /// Algorithm 4 (revision 2): the encryption dictionary's U-entry value
    /// from a file encryption key.
    fn hashed_user_password_r2(file_key: &[u8]) -> Vec<u8> {
        Rc4::new(file_key).encrypt(PAD_BYTES)
    }

    /// Algorithm 5 (revision 3/4): same, with the 19 XOR-key RC4 rounds.
    fn hashed_user_password_r3_r4(file_key: &[u8], file_id: &[u8]) -> Vec<u8> {
        let mut hasher = Md5::new();
        hasher.update(PAD_BYTES);
        hasher.update(file_id);
        let hash = hasher.finalize();

        let mut result = Rc4::new(file_key).encrypt(hash);
        for i in 1..=19u8 {
            let key: Vec<u8> = file_key.iter().map(|b| b ^ i).collect();
            result = Rc4::new(&key).encrypt(&result);
        }
        result.resize(32, 0);
        let mut rng = rand::rng();
        rng.fill(&mut result[16..]);
        result
    }

    /// Algorithm 6 (revision ≤ 4): does `password` authenticate as the user
    /// password?
    fn authenticate_user_password_r4(&self, doc: &Document, password: &[u8]) -> Result<(), DecryptionError> {
        let file_key = self.compute_file_encryption_key_r4(doc, password)?;
        let candidate = match self.revision {
            2 => Self::hashed_user_password_r2(&file_key),
            3 | 4 => Self::hashed_user_password_r3_r4(&file_key, &Self::file_id(doc)?),
            r => return Err(DecryptionError::UnsupportedRevision(r)),
        };
        let compare_len = if self.revision >= 3 { 16 } else { candidate.len() };
        if candidate[..compare_len] != self.user_value[..compare_len.min(self.user_value.len())] {
            return Err(DecryptionError::IncorrectPassword);
        }
        Ok(())
    }

    /// Algorithm 7 (revision ≤ 4): does `password` authenticate as the owner
    /// password? Recovers the user password from the O entry and defers to
    /// Algorithm 6.
    fn authenticate_owner_password_r4(&self, doc: &Document, password: &[u8]) -> Result<(), DecryptionError> {
        let len = password.len().min(32);
        let mut hasher = Md5::new();
        hasher.update(&password[..len]);
        hasher.update(&PAD_BYTES[len..]);
        let mut hash = hasher.finalize();
        if self.revision >= 3 {
            for _ in 0..50 {
                hash = Md5::digest(hash);
            }
        }

        let n = self.key_length_bytes()?;
        if n > 16 {
            return Err(DecryptionError::InvalidKeyLength);
        }

        let mut result = self.owner_value.clone();
        if self.revision >= 3 {
            for i in (1..=19u8).rev() {
                let key: Vec<u8> = hash[..n].iter().map(|b| b ^ i).collect();
                result = Rc4::new(&key).decrypt(&result);
            }
        }
        result = Rc4::new(&hash[..n]).decrypt(&result);

        self.authenticate_user_password_r4(doc, &result)
    }

    /// Algorithm 2.B (revision 5/6): the iterated hash used both to
    /// authenticate a candidate password and to derive the key that
    /// unwraps the file encryption key.
    fn compute_hash_rev56(
        password: &[u8],
        salt: &[u8],
        user_value: Option<&[u8]>,
        revision: i64,
    ) -> Result<[u8; 32], DecryptionError> {
        let mut k: Vec<u8> = {
            let mut input = Vec::new();
            input.extend_from_slice(password);
            input.extend_from_slice(salt);
            if let Some(u) = user_value {
                input.extend_from_slice(u);
            }
            Sha256::digest(&input).to_vec()
        };

        if revision == 5 {
            let mut out = [0u8; 32];
            out.copy_from_slice(&k[..32]);
            return Ok(out);
        }

        let mut round: u32 = 0;
        loop {
            let mut k1 = Vec::with_capacity((password.len() + k.len() + user_value.map_or(0, <[u8]>::len)) * 64);
            for _ in 0..64 {
                k1.extend_from_slice(password);
                k1.extend_from_slice(&k);
                if let Some(u) = user_value {
                    k1.extend_from_slice(u);
                }
            }

            let e = {
                let cipher = Aes128CbcEnc::new(k[..16].into(), k[16..32].into());
                let mut buf = k1.clone();
                buf.resize(k1.len() + 16, 0);
                let n = cipher
                    .encrypt_padded_mut::<Pkcs7>(&mut buf, k1.len())
                    .map_err(|_| DecryptionError::Padding)?
                    .len();
                buf.truncate(n.min(k1.len() + 16));
                buf.truncate(k1.len());
                buf
            };

            let modulus = {
                let mut acc: u32 = 0;
                for &b in &e[..16] {
                    acc = acc.wrapping_mul(256).wrapping_add(b as u32);
                }
                acc % 3
            };
            k = match modulus {
                0 => Sha256::digest(&e).to_vec(),
                1 => Sha384::digest(&e).to_vec(),
                _ => Sha512::digest(&e).to_vec(),
            };

            round += 1;
            if round > 63 {
                let last_byte = *e.last().expect("e is non-empty") as u32;
                if last_byte <= round - 32 {
                    break;
                }
            }
        }

        let mut out = [0u8; 32];
        out.copy_from_slice(&k[..32]);
        Ok(out)
    }

    /// Algorithm 2.A (revision 5/6): tries `password` as owner, then as
    /// user, returning the unwrapped file encryption key and whether it was
    /// the owner password that matched.
    fn compute_file_encryption_key_r56(&self, password: &[u8]) -> Result<(Vec<u8>, bool), DecryptionError> {
        let string_len = if self.revision <= 4 { 32 } else { 48 };
        let owner = self.owner_value.get(..string_len).ok_or(DecryptionError::InvalidType)?;
        let (owner_hash, owner_tail) = owner.split_at(32);
        let (owner_validation_salt, owner_key_salt) = owner_tail.split_at(8);

        let user = self.user_value.get(..string_len).ok_or(DecryptionError::InvalidType)?;
        let (user_hash, user_tail) = user.split_at(32);
        let (user_validation_salt, user_key_salt) = user_tail.split_at(8);

        if Self::compute_hash_rev56(password, owner_validation_salt, Some(user), self.revision)?.as_slice() == owner_hash {
            let intermediate = Self::compute_hash_rev56(password, owner_key_salt, Some(user), self.revision)?;
            if self.owner_encrypted.len() != 32 {
                return Err(DecryptionError::InvalidType);
            }
            return Ok((decrypt_aes256_cbc_no_padding(&intermediate, &self.owner_encrypted)?, true));
        }

        if Self::compute_hash_rev56(password, user_validation_salt, None, self.revision)?.as_slice() == user_hash {
            let intermediate = Self::compute_hash_rev56(password, user_key_salt, None, self.revision)?;
            if self.user_encrypted.len() != 32 {
                return Err(DecryptionError::InvalidType);
            }
            return Ok((decrypt_aes256_cbc_no_padding(&intermediate, &self.user_encrypted)?, false));
        }

        Err(DecryptionError::IncorrectPassword)
    }

    /// Algorithm 1.A, step (f) (revision 6 only): decrypts `/Perms` with the
    /// recovered file key as a cross-check that the key is right. Logs on
    /// mismatch rather than failing outright — this is a consistency check,
    /// not the password check itself.
    fn verify_permissions(&self, file_key: &[u8]) {
        use aes::cipher::block_padding::NoPadding;

        if self.revision != 6 || self.permission_encrypted.len() != 16 {
            return;
        }

        let mut buf = self.permission_encrypted.clone();
        let decrypted = ecb::Decryptor::<Aes256>::new(file_key.into())
            .decrypt_padded_mut::<NoPadding>(&mut buf)
            .ok();

        let Some(perms) = decrypted else {
            log::warn!("/Perms could not be decrypted under the recovered file key");
            return;
        };
        if perms.len() < 12 || &perms[9..12] != b"adb" {
            log::warn!("/Perms does not carry the expected 'adb' marker; file key may be wrong");
            return;
        }
        let p = i32::from_le_bytes(perms[0..4].try_into().expect("4 bytes"));
        if p as i64 != self.permissions {
            log::warn!("/Perms-encoded P ({p}) disagrees with the Encrypt dictionary's /P ({})", self.permissions);
        }
        let metadata_flag = match perms[8] {
            b'T' => true,
            b'F' => false,
            other => {
                log::warn!("/Perms byte 8 is {other:#x}, neither 'T' nor 'F'");
                return;
            }
        };
        if metadata_flag != self.encrypt_metadata {
            log::warn!("/Perms EncryptMetadata flag disagrees with the Encrypt dictionary's /EncryptMetadata");
        }
    }

    /// Computes the file encryption key for `password`, dispatching on
    /// revision. For revision ≤ 4 this also implicitly authenticates the
    /// user password (Algorithm 2 does not fail on a wrong password by
    /// itself; callers that need to know should use
    /// [`Self::authenticate_user_password`]).
    pub fn compute_file_encryption_key(&self, doc: &Document, password: &str) -> Result<Vec<u8>, DecryptionError> {
        match self.revision {
            2..=4 => self.compute_file_encryption_key_r4(doc, &Self::sanitize_password_r4(password)),
            5 | 6 => {
                let (key, _is_owner) = self.compute_file_encryption_key_r56(&Self::sanitize_password_r56(password)?)?;
                self.verify_permissions(&key);
                Ok(key)
            }
            r => Err(DecryptionError::UnsupportedRevision(r)),
        }
    }

    /// Authenticates `password` as either the user or owner password.
    pub fn authenticate_user_password(&self, doc: &Document, password: &str) -> Result<(), DecryptionError> {
        match self.revision {
            2..=4 => {
                let sanitized = Self::sanitize_password_r4(password);
                self.authenticate_user_password_r4(doc, &sanitized)
                    .or_else(|_| self.authenticate_owner_password_r4(doc, &sanitized))
            }
            5 | 6 => {
                let sanitized = Self::sanitize_password_r56(password)?;
                self.compute_file_encryption_key_r56(&sanitized).map(|_| ())
            }
            r => Err(DecryptionError::UnsupportedRevision(r)),
        }
    }

    /// The access-rights check (§4.F): does `password` authenticate at all,
    /// and if so, as the owner (unrestricted) or the user (restricted to
    /// the bits in `/P`)?
    pub fn check_access_rights(&self, doc: &Document, password: &str) -> (bool, super::Permissions) {
        match self.revision {
            2..=4 => {
                let sanitized = Self::sanitize_password_r4(password);
                if self.authenticate_owner_password_r4(doc, &sanitized).is_ok() {
                    return (true, super::Permissions::all());
                }
                match self.authenticate_user_password_r4(doc, &sanitized) {
                    Ok(()) => (true, super::Permissions::from_p(self.permissions)),
                    Err(_) => (false, super::Permissions::empty()),
                }
            }
            5 | 6 => {
                let Ok(sanitized) = Self::sanitize_password_r56(password) else {
                    return (false, super::Permissions::empty());
                };
                match self.compute_file_encryption_key_r56(&sanitized) {
                    Ok((_, true)) => (true, super::Permissions::all()),
                    Ok((_, false)) => (true, super::Permissions::from_p(self.permissions)),
                    Err(_) => (false, super::Permissions::empty()),
                }
            }
            _ => (false, super::Permissions::empty()),
        }
    }
}

fn decrypt_aes256_cbc_no_padding(key: &[u8], data: &[u8]) -> Result<Vec<u8>, DecryptionError> {
    use aes::cipher::block_padding::NoPadding;
    let zero_iv = [0u8; 16];
    let mut buf = data.to_vec();
    Aes256CbcDec::new(key.into(), &zero_iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .map_err(|_| DecryptionError::Padding)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_password_r4_uses_pdf_doc_encoding() {
        assert_eq!(PasswordAlgorithm::sanitize_password_r4("abc"), b"abc".to_vec());
    }

    #[test]
    fn sanitize_password_r56_truncates_to_127_bytes() {
        let long = "a".repeat(200);
        let sanitized = PasswordAlgorithm::sanitize_password_r56(&long).unwrap();
        assert_eq!(sanitized.len(), 127);
    }

    #[test]
    fn hashed_user_password_r2_is_deterministic() {
        let key = b"abcde";
        assert_eq!(
            PasswordAlgorithm::hashed_user_password_r2(key),
            PasswordAlgorithm::hashed_user_password_r2(key)
        );
    }
}
