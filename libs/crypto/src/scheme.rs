//! Built in password storage schemes.
//!
//! Each scheme produces the text that follows its `{TAG}`; the registry is the
//! only place that adds or strips the tag.

use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, PasswordHash, PasswordVerifier, Version};
use base64::engine::general_purpose;
use base64::engine::GeneralPurpose;
use base64::{alphabet, Engine};
use md5::{Digest, Md5};
use openssl::hash::{Hasher, MessageDigest};
use openssl::pkcs5::pbkdf2_hmac;
use rand::Rng;
use tracing::{error, warn};

use crate::crypt::CryptAdapter;
use crate::crypt_md5::CRYPT_HASH64;
use crate::CryptoError;

pub const SCHEME_SSHA: &str = "{SSHA}";
pub const SCHEME_SHA: &str = "{SHA}";
pub const SCHEME_SMD5: &str = "{SMD5}";
pub const SCHEME_MD5: &str = "{MD5}";
pub const SCHEME_SSHA256: &str = "{SSHA256}";
pub const SCHEME_SSHA512: &str = "{SSHA512}";
pub const SCHEME_CRYPT: &str = "{CRYPT}";
pub const SCHEME_PBKDF2: &str = "{PBKDF2}";
pub const SCHEME_PBKDF2_SHA1: &str = "{PBKDF2-SHA1}";
pub const SCHEME_PBKDF2_SHA256: &str = "{PBKDF2-SHA256}";
pub const SCHEME_PBKDF2_SHA512: &str = "{PBKDF2-SHA512}";
pub const SCHEME_ARGON2: &str = "{ARGON2}";

const SMALL_SALT_LEN: usize = 4;
const SHA2_SALT_LEN: usize = 8;

const PBKDF2_DEFAULT_COST: usize = 10000;
// Stored values above this are refused rather than derived.
const PBKDF2_MAX_COST: u32 = 10_000_000;
const PBKDF2_SALT_LEN: usize = 16;

const ARGON2_SALT_LEN: usize = 16;

const CRYPT_SALT_ENTROPY: usize = 32;
pub const DEFAULT_CRYPT_SALT_FORMAT: &str = "$1$%.8s";

/// A named way of storing a password.
pub trait PasswordScheme: Send + Sync {
    /// The bracketed tag, e.g. `{SSHA}`.
    fn name(&self) -> &'static str;

    /// Hash a cleartext, returning the text that follows the tag.
    fn hash(&self, cleartext: &[u8]) -> Result<String, CryptoError>;

    /// Check a cleartext against the text that followed the tag.
    fn verify(&self, encoded: &str, cleartext: &[u8]) -> Result<bool, CryptoError>;
}

/// Compare digests without an early exit on the first difference.
pub(crate) fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && openssl::memcmp::eq(a, b)
}

fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| rng.gen()).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DigestKind {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl DigestKind {
    fn len(self) -> usize {
        match self {
            DigestKind::Md5 => 16,
            DigestKind::Sha1 => 20,
            DigestKind::Sha256 => 32,
            DigestKind::Sha512 => 64,
        }
    }

    fn message_digest(self) -> MessageDigest {
        match self {
            DigestKind::Md5 => MessageDigest::md5(),
            DigestKind::Sha1 => MessageDigest::sha1(),
            DigestKind::Sha256 => MessageDigest::sha256(),
            DigestKind::Sha512 => MessageDigest::sha512(),
        }
    }

    /// MD5 is computed without openssl, which may refuse legacy digests.
    fn digest(self, parts: &[&[u8]]) -> Result<Vec<u8>, CryptoError> {
        if self == DigestKind::Md5 {
            let mut h = Md5::new();
            for p in parts {
                h.update(p);
            }
            return Ok(h.finalize().to_vec());
        }

        let mut h = Hasher::new(self.message_digest()).map_err(|e| {
            error!(?e, "unable to initialise digest");
            CryptoError::PrimitiveFailed(None)
        })?;
        for p in parts {
            h.update(p).map_err(|e| {
                error!(?e, "unable to update digest");
                CryptoError::PrimitiveFailed(None)
            })?;
        }
        h.finish().map(|d| d.to_vec()).map_err(|e| {
            error!(?e, "unable to finish digest");
            CryptoError::PrimitiveFailed(None)
        })
    }
}

/// `{SHA}` / `{MD5}`: base64 of the bare digest.
pub(crate) struct PlainDigest {
    pub(crate) name: &'static str,
    pub(crate) kind: DigestKind,
}

impl PasswordScheme for PlainDigest {
    fn name(&self) -> &'static str {
        self.name
    }

    fn hash(&self, cleartext: &[u8]) -> Result<String, CryptoError> {
        let d = self.kind.digest(&[cleartext])?;
        Ok(general_purpose::STANDARD.encode(d))
    }

    fn verify(&self, encoded: &str, cleartext: &[u8]) -> Result<bool, CryptoError> {
        let stored = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidEncoding)?;
        if stored.len() != self.kind.len() {
            return Err(CryptoError::InvalidEncoding);
        }
        let d = self.kind.digest(&[cleartext])?;
        Ok(ct_eq(&d, &stored))
    }
}

/// `{SSHA}`, `{SMD5}`, `{SSHA256}`, `{SSHA512}`: base64 of digest(pw ‖ salt) ‖ salt.
pub(crate) struct SaltedDigest {
    pub(crate) name: &'static str,
    pub(crate) kind: DigestKind,
    pub(crate) salt_len: usize,
}

impl SaltedDigest {
    pub(crate) fn ssha() -> Self {
        SaltedDigest {
            name: SCHEME_SSHA,
            kind: DigestKind::Sha1,
            salt_len: SMALL_SALT_LEN,
        }
    }

    pub(crate) fn smd5() -> Self {
        SaltedDigest {
            name: SCHEME_SMD5,
            kind: DigestKind::Md5,
            salt_len: SMALL_SALT_LEN,
        }
    }

    pub(crate) fn ssha256() -> Self {
        SaltedDigest {
            name: SCHEME_SSHA256,
            kind: DigestKind::Sha256,
            salt_len: SHA2_SALT_LEN,
        }
    }

    pub(crate) fn ssha512() -> Self {
        SaltedDigest {
            name: SCHEME_SSHA512,
            kind: DigestKind::Sha512,
            salt_len: SHA2_SALT_LEN,
        }
    }
}

impl PasswordScheme for SaltedDigest {
    fn name(&self) -> &'static str {
        self.name
    }

    fn hash(&self, cleartext: &[u8]) -> Result<String, CryptoError> {
        let salt = random_bytes(self.salt_len);
        let mut out = self.kind.digest(&[cleartext, salt.as_slice()])?;
        out.extend_from_slice(&salt);
        Ok(general_purpose::STANDARD.encode(out))
    }

    fn verify(&self, encoded: &str, cleartext: &[u8]) -> Result<bool, CryptoError> {
        let stored = general_purpose::STANDARD
            .decode(encoded)
            .map_err(|_| CryptoError::InvalidEncoding)?;
        // At least one byte of salt must follow the digest.
        if stored.len() <= self.kind.len() {
            return Err(CryptoError::InvalidEncoding);
        }
        let (digest, salt) = stored.split_at(self.kind.len());
        let d = self.kind.digest(&[cleartext, salt])?;
        Ok(ct_eq(&d, digest))
    }
}

/// Substitute `salt` into a printf style format. Only `%s` and `%.Ns` are
/// understood, and only the first occurrence is replaced.
pub(crate) fn apply_salt_format(format: &str, salt: &str) -> String {
    let Some(start) = format.find('%') else {
        return format.to_string();
    };
    let rest = &format[start + 1..];

    let (precision, consumed) = if let Some(p) = rest.strip_prefix('.') {
        let digits: String = p.chars().take_while(|c| c.is_ascii_digit()).collect();
        if !p[digits.len()..].starts_with('s') {
            return format.to_string();
        }
        (digits.parse::<usize>().ok(), 1 + digits.len() + 1)
    } else if rest.starts_with('s') {
        (None, 1)
    } else {
        return format.to_string();
    };

    let salt = match precision {
        Some(n) => &salt[..n.min(salt.len())],
        None => salt,
    };

    format!("{}{}{}", &format[..start], salt, &rest[consumed..])
}

/// `{CRYPT}`: the output of `crypt(3)` style functions, serialised through the
/// [`CryptAdapter`].
pub(crate) struct CryptScheme {
    pub(crate) adapter: CryptAdapter,
    pub(crate) salt_format: String,
}

impl PasswordScheme for CryptScheme {
    fn name(&self) -> &'static str {
        SCHEME_CRYPT
    }

    fn hash(&self, cleartext: &[u8]) -> Result<String, CryptoError> {
        let salt: String = random_bytes(CRYPT_SALT_ENTROPY)
            .into_iter()
            .map(|b| CRYPT_HASH64[(b & 0x3f) as usize] as char)
            .collect();
        let setting = apply_salt_format(&self.salt_format, &salt);
        self.adapter.crypt(cleartext, &setting)
    }

    fn verify(&self, encoded: &str, cleartext: &[u8]) -> Result<bool, CryptoError> {
        if encoded.len() < 2 {
            return Err(CryptoError::InvalidEncoding);
        }
        // crypt(3) rejects keys that carry a NUL.
        if cleartext.contains(&0) {
            return Ok(false);
        }
        let check = self.adapter.crypt(cleartext, encoded)?;
        Ok(ct_eq(check.as_bytes(), encoded.as_bytes()))
    }
}

/// OpenLDAP's "adapted base64": standard alphabet, `.` for `+`, no padding.
fn b64_to_ab64(data: &[u8]) -> String {
    general_purpose::STANDARD_NO_PAD
        .encode(data)
        .replace('+', ".")
}

fn ab64_decode(ab64: &str) -> Result<Vec<u8>, CryptoError> {
    let mut s = ab64.replace('.', "+");
    match s.len() & 3 {
        2 => s.push_str("=="),
        3 => s.push('='),
        // One is invalid, base64 will reject it.
        _ => {}
    }
    let config = general_purpose::GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true);
    GeneralPurpose::new(&alphabet::STANDARD, config)
        .decode(s)
        .map_err(|e| {
            warn!(?e, "Invalid ab64 in pbkdf2 value");
            CryptoError::InvalidEncoding
        })
}

/// `{PBKDF2*}` in the OpenLDAP `cost$salt$hash` layout.
pub(crate) struct Pbkdf2Scheme {
    pub(crate) name: &'static str,
    pub(crate) kind: DigestKind,
}

impl Pbkdf2Scheme {
    fn derive(
        &self,
        cleartext: &[u8],
        salt: &[u8],
        cost: usize,
        key: &mut [u8],
    ) -> Result<(), CryptoError> {
        pbkdf2_hmac(cleartext, salt, cost, self.kind.message_digest(), key).map_err(|e| {
            error!(?e, scheme = %self.name, "pbkdf2 derivation failed");
            CryptoError::PrimitiveFailed(None)
        })
    }
}

impl PasswordScheme for Pbkdf2Scheme {
    fn name(&self) -> &'static str {
        self.name
    }

    fn hash(&self, cleartext: &[u8]) -> Result<String, CryptoError> {
        let salt = random_bytes(PBKDF2_SALT_LEN);
        let mut key = vec![0u8; self.kind.len()];
        self.derive(cleartext, &salt, PBKDF2_DEFAULT_COST, &mut key)?;
        Ok(format!(
            "{}${}${}",
            PBKDF2_DEFAULT_COST,
            b64_to_ab64(&salt),
            b64_to_ab64(&key)
        ))
    }

    fn verify(&self, encoded: &str, cleartext: &[u8]) -> Result<bool, CryptoError> {
        let parts: Vec<&str> = encoded.split('$').collect();
        let [cost, salt, hash] = parts.as_slice() else {
            warn!(scheme = %self.name, "pbkdf2 value has an invalid number of elements");
            return Err(CryptoError::InvalidEncoding);
        };
        let cost = match cost.parse::<u32>() {
            Ok(c) if c > 0 && c <= PBKDF2_MAX_COST => c as usize,
            _ => {
                warn!(scheme = %self.name, %cost, "pbkdf2 value has an invalid cost");
                return Err(CryptoError::InvalidEncoding);
            }
        };
        let salt = ab64_decode(salt)?;
        let stored = ab64_decode(hash)?;
        if stored.is_empty() {
            return Err(CryptoError::InvalidEncoding);
        }

        // Imported values may carry a shorter key than we would produce.
        let mut check = vec![0u8; stored.len()];
        self.derive(cleartext, &salt, cost, &mut check)?;
        Ok(ct_eq(&check, &stored))
    }
}

/// `{ARGON2}` carrying a PHC string. Only argon2id is produced or accepted.
pub(crate) struct Argon2Scheme;

impl PasswordScheme for Argon2Scheme {
    fn name(&self) -> &'static str {
        SCHEME_ARGON2
    }

    fn hash(&self, cleartext: &[u8]) -> Result<String, CryptoError> {
        let salt = SaltString::encode_b64(&random_bytes(ARGON2_SALT_LEN)).map_err(|e| {
            error!(?e, "unable to encode argon2 salt");
            CryptoError::Random
        })?;
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, Params::default());
        argon
            .hash_password(cleartext, &salt)
            .map(|h| h.to_string())
            .map_err(|e| {
                error!(err = ?e, "unable to perform argon2id hash");
                CryptoError::PrimitiveFailed(None)
            })
    }

    fn verify(&self, encoded: &str, cleartext: &[u8]) -> Result<bool, CryptoError> {
        let phc = PasswordHash::new(encoded).map_err(|e| {
            error!(?e, "Invalid argon2 phc string");
            CryptoError::InvalidEncoding
        })?;
        if phc.algorithm.as_str() != "argon2id" {
            error!(alg = %phc.algorithm.as_str(), "Only argon2id is supported");
            return Err(CryptoError::InvalidEncoding);
        }
        // Parameters come from the phc string, not from this instance.
        Ok(Argon2::default().verify_password(cleartext, &phc).is_ok())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_salt_format() {
        assert_eq!(apply_salt_format("$1$%.8s", "abcdefghijkl"), "$1$abcdefgh");
        assert_eq!(apply_salt_format("$1$%s$", "abc"), "$1$abc$");
        assert_eq!(apply_salt_format("%.2s", "abcdef"), "ab");
        assert_eq!(apply_salt_format("$1$%.20s", "abc"), "$1$abc");
        assert_eq!(apply_salt_format("no-format", "abc"), "no-format");
        assert_eq!(apply_salt_format("%d", "abc"), "%d");
    }

    #[test]
    fn test_salted_digest_rejects_short_value() {
        let ssha = SaltedDigest::ssha();
        // Exactly a SHA-1 digest with no salt.
        let bare = general_purpose::STANDARD.encode([0u8; 20]);
        assert_eq!(
            ssha.verify(&bare, b"secret"),
            Err(CryptoError::InvalidEncoding)
        );
    }

    #[test]
    fn test_ab64_roundtrip_through_pbkdf2() {
        let s = Pbkdf2Scheme {
            name: SCHEME_PBKDF2_SHA512,
            kind: DigestKind::Sha512,
        };
        let enc = s.hash(b"password").unwrap();
        assert!(enc.starts_with("10000$"));
        assert!(!enc.contains('+'));
        assert!(s.verify(&enc, b"password").unwrap());
        assert!(!s.verify(&enc, b"Password").unwrap());
        assert_eq!(
            s.verify("10000$abc", b"password"),
            Err(CryptoError::InvalidEncoding)
        );
    }

    #[test]
    fn test_pbkdf2_cost_bounds() {
        let s = Pbkdf2Scheme {
            name: SCHEME_PBKDF2,
            kind: DigestKind::Sha1,
        };
        for cost in ["0", "-1", "3000000000", "10000001", "99999999999999999999", "1e4"] {
            let enc = format!("{}$c2FsdHNhbHRzYWx0$aGFzaGhhc2hoYXNoaGFzaA", cost);
            assert_eq!(
                s.verify(&enc, b"pw"),
                Err(CryptoError::InvalidEncoding),
                "cost {}",
                cost
            );
        }
        // Through the registry an unusable value simply does not match.
        assert!(!crate::HashSchemeRegistry::new().verify(
            b"{PBKDF2}3000000000$c2FsdHNhbHRzYWx0$aGFzaGhhc2hoYXNoaGFzaA",
            b"pw"
        ));
    }

    #[test]
    fn test_crypt_scheme_respects_salt_format() {
        let s = CryptScheme {
            adapter: CryptAdapter::default(),
            salt_format: "$1$%.4s".to_string(),
        };
        let enc = s.hash(b"password").unwrap();
        // $1$ + 4 salt chars + $ + 22 hash chars
        assert_eq!(enc.len(), 3 + 4 + 1 + 22);
        assert!(s.verify(&enc, b"password").unwrap());
        assert!(!s.verify(&enc, b"password\0").unwrap());
    }
}
