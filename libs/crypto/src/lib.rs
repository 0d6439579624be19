//! Password hashing for the password modify operation.
//!
//! The [`HashSchemeRegistry`] holds every scheme this server understands, plus
//! the ordered list of schemes written for new passwords. Verification looks
//! the scheme up by the `{TAG}` at the front of the stored value.

#![deny(warnings)]
#![warn(unused_extern_crates)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]

#[macro_use]
extern crate lazy_static;

use std::fmt;
use std::sync::Arc;

use openssl::hash::MessageDigest;
use thiserror::Error;
use tracing::{debug, error, trace};

mod crypt;
mod crypt_md5;
mod generate;
mod scheme;

pub use crate::crypt::{passwd_init, CryptAdapter, CryptPrimitive, Md5Crypt};
pub use crate::generate::{generate_password, DistinctAlpha, GENERATED_PASSWORD_LEN};
pub use crate::scheme::*;

use crate::scheme::{
    Argon2Scheme, CryptScheme, DigestKind, Pbkdf2Scheme, PlainDigest, SaltedDigest,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("unknown password scheme")]
    UnknownScheme,
    /// The primitive produced nothing usable, optionally with its own reason.
    #[error("password hash primitive failed")]
    PrimitiveFailed(Option<String>),
    #[error("invalid stored password encoding")]
    InvalidEncoding,
    #[error("random source failure")]
    Random,
}

impl CryptoError {
    /// Text supplied by the primitive itself, if any.
    pub fn diagnostic(&self) -> Option<&str> {
        match self {
            CryptoError::PrimitiveFailed(Some(text)) => Some(text.as_str()),
            _ => None,
        }
    }
}

lazy_static! {
    static ref DEFAULT_SCHEME: &'static str = {
        if openssl::hash::hash(MessageDigest::sha1(), b"").is_ok() {
            SCHEME_SSHA
        } else {
            SCHEME_SMD5
        }
    };
}

/// Split `{TAG}rest` into its tag and payload.
fn split_scheme(encoded: &str) -> Option<(&str, &str)> {
    if !encoded.starts_with('{') {
        return None;
    }
    let end = encoded.find('}')?;
    Some(encoded.split_at(end + 1))
}

#[derive(Clone)]
pub struct HashSchemeRegistry {
    schemes: Vec<Arc<dyn PasswordScheme>>,
    active: Vec<Arc<dyn PasswordScheme>>,
}

impl fmt::Debug for HashSchemeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("HashSchemeRegistry")
            .field(
                "schemes",
                &self.schemes.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("active", &self.active_schemes())
            .finish()
    }
}

impl Default for HashSchemeRegistry {
    fn default() -> Self {
        HashSchemeRegistry::new()
    }
}

impl HashSchemeRegistry {
    /// The built in schemes, with `{CRYPT}` backed by md5-crypt.
    pub fn new() -> Self {
        Self::with_crypt(CryptAdapter::default(), DEFAULT_CRYPT_SALT_FORMAT)
    }

    pub fn with_crypt(adapter: CryptAdapter, salt_format: &str) -> Self {
        let schemes: Vec<Arc<dyn PasswordScheme>> = vec![
            Arc::new(SaltedDigest::ssha()),
            Arc::new(PlainDigest {
                name: SCHEME_SHA,
                kind: DigestKind::Sha1,
            }),
            Arc::new(SaltedDigest::smd5()),
            Arc::new(PlainDigest {
                name: SCHEME_MD5,
                kind: DigestKind::Md5,
            }),
            Arc::new(SaltedDigest::ssha256()),
            Arc::new(SaltedDigest::ssha512()),
            Arc::new(CryptScheme {
                adapter,
                salt_format: salt_format.to_string(),
            }),
            Arc::new(Pbkdf2Scheme {
                name: SCHEME_PBKDF2,
                kind: DigestKind::Sha1,
            }),
            Arc::new(Pbkdf2Scheme {
                name: SCHEME_PBKDF2_SHA1,
                kind: DigestKind::Sha1,
            }),
            Arc::new(Pbkdf2Scheme {
                name: SCHEME_PBKDF2_SHA256,
                kind: DigestKind::Sha256,
            }),
            Arc::new(Pbkdf2Scheme {
                name: SCHEME_PBKDF2_SHA512,
                kind: DigestKind::Sha512,
            }),
            Arc::new(Argon2Scheme),
        ];

        HashSchemeRegistry {
            schemes,
            active: Vec::new(),
        }
    }

    /// Add a scheme, replacing any existing scheme with the same tag.
    pub fn register(&mut self, scheme: Arc<dyn PasswordScheme>) {
        let name = scheme.name();
        self.schemes.retain(|s| !s.name().eq_ignore_ascii_case(name));
        self.active
            .iter_mut()
            .filter(|s| s.name().eq_ignore_ascii_case(name))
            .for_each(|s| *s = scheme.clone());
        self.schemes.push(scheme);
    }

    /// Set the ordered list of schemes written for new passwords. An empty
    /// list selects the built in default.
    pub fn set_active<S: AsRef<str>>(&mut self, names: &[S]) -> Result<(), CryptoError> {
        let active = names
            .iter()
            .map(|n| {
                let n: &str = n.as_ref();
                self.find(n).cloned().ok_or_else(|| {
                    error!(scheme = %n, "password hash scheme not supported");
                    CryptoError::UnknownScheme
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.active = active;
        Ok(())
    }

    /// Scheme lookup by tag, ignoring case.
    pub fn find(&self, name: &str) -> Option<&Arc<dyn PasswordScheme>> {
        self.schemes
            .iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn supported_schemes(&self) -> Vec<&'static str> {
        self.schemes.iter().map(|s| s.name()).collect()
    }

    /// `{SSHA}` when openssl can digest SHA-1, otherwise `{SMD5}`.
    pub fn default_scheme() -> &'static str {
        *DEFAULT_SCHEME
    }

    /// The schemes a new password is written with, in order.
    pub fn active_schemes(&self) -> Vec<&'static str> {
        if self.active.is_empty() {
            vec![Self::default_scheme()]
        } else {
            self.active.iter().map(|s| s.name()).collect()
        }
    }

    /// Hash with a named scheme, returning the tagged value.
    pub fn hash(&self, cleartext: &[u8], scheme: &str) -> Result<String, CryptoError> {
        let s = self.find(scheme).ok_or(CryptoError::UnknownScheme)?;
        s.hash(cleartext).map(|v| {
            trace!(scheme = %s.name(), "hashed password");
            format!("{}{}", s.name(), v)
        })
    }

    /// Hash with the first active scheme.
    pub fn hash_default(&self, cleartext: &[u8]) -> Result<String, CryptoError> {
        match self.active.first() {
            Some(s) => self.hash(cleartext, s.name()),
            None => self.hash(cleartext, Self::default_scheme()),
        }
    }

    /// Hash once per active scheme. Any failure fails the whole set.
    pub fn hash_all(&self, cleartext: &[u8]) -> Result<Vec<String>, CryptoError> {
        self.active_schemes()
            .into_iter()
            .map(|name| {
                self.hash(cleartext, name).map_err(|e| {
                    error!(scheme = %name, ?e, "password hash failed");
                    e
                })
            })
            .collect()
    }

    /// Check a cleartext against one stored value. Unknown tags, untagged
    /// values and undecodable payloads never match.
    pub fn verify(&self, encoded: &[u8], cleartext: &[u8]) -> bool {
        let Ok(encoded) = std::str::from_utf8(encoded) else {
            debug!("stored password is not valid utf8");
            return false;
        };
        let Some((tag, payload)) = split_scheme(encoded) else {
            debug!("stored password has no scheme tag");
            return false;
        };
        let Some(s) = self.find(tag) else {
            debug!(%tag, "stored password scheme not supported");
            return false;
        };
        match s.verify(payload, cleartext) {
            Ok(r) => r,
            Err(e) => {
                debug!(scheme = %s.name(), ?e, "stored password could not be checked");
                false
            }
        }
    }
}
