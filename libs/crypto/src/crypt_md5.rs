//! The FreeBSD/glibc `$1$` md5-crypt construction.

use md5::{Digest, Md5};
use std::cmp::min;

pub(crate) const MD5_MAGIC: &str = "$1$";
/// Only the first 8 salt characters are significant.
const MD5_SALT_MAX: usize = 8;
const MD5_ROUNDS: usize = 1000;
const MD5_TRANSPOSE: &[u8] = b"\x0c\x06\x00\x0d\x07\x01\x0e\x08\x02\x0f\x09\x03\x05\x0a\x04\x0b";

pub(crate) const CRYPT_HASH64: &[u8] =
    b"./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

fn hash64_encode(bs: &[u8]) -> String {
    let ngroups = bs.len().div_ceil(3);
    let mut out = String::with_capacity(ngroups * 4);
    for chunk in bs.chunks(3) {
        let mut enc = 0u32;
        for i in 0..3 {
            let b = chunk.get(i).copied().unwrap_or(0) as u32;
            enc >>= 8;
            enc |= b << 16;
        }
        for _ in 0..4 {
            out.push(CRYPT_HASH64[(enc & 0x3F) as usize] as char);
            enc >>= 6;
        }
    }
    let trim = match bs.len() % 3 {
        1 => 2,
        2 => 1,
        _ => 0,
    };
    out.truncate(out.len() - trim);
    out
}

/// Extract the salt from a `$1$salt$...` or `$1$salt` setting string.
fn md5_salt(setting: &str) -> Option<&str> {
    let rest = setting.strip_prefix(MD5_MAGIC)?;
    let salt = rest.split('$').next().unwrap_or(rest);
    let end = salt
        .char_indices()
        .nth(MD5_SALT_MAX)
        .map(|(i, _)| i)
        .unwrap_or(salt.len());
    let salt = &salt[..end];
    if salt.bytes().all(|b| CRYPT_HASH64.contains(&b)) {
        Some(salt)
    } else {
        None
    }
}

fn md5_digest(pass: &[u8], salt: &[u8]) -> [u8; 16] {
    let mut alt = Md5::new();
    alt.update(pass);
    alt.update(salt);
    alt.update(pass);
    let alt = alt.finalize();

    let mut ctx = Md5::new();
    ctx.update(pass);
    ctx.update(MD5_MAGIC.as_bytes());
    ctx.update(salt);

    let mut plen = pass.len();
    while plen > 0 {
        let n = min(plen, 16);
        ctx.update(&alt[..n]);
        plen -= n;
    }

    let mut plen = pass.len();
    while plen > 0 {
        if plen & 1 == 0 {
            ctx.update(&pass[..1]);
        } else {
            ctx.update([0u8]);
        }
        plen >>= 1;
    }

    let mut fin = ctx.finalize();

    for r in 0..MD5_ROUNDS {
        let mut round = Md5::new();
        if r % 2 == 1 {
            round.update(pass);
        } else {
            round.update(fin);
        }
        if r % 3 > 0 {
            round.update(salt);
        }
        if r % 7 > 0 {
            round.update(pass);
        }
        if r % 2 == 0 {
            round.update(pass);
        } else {
            round.update(fin);
        }
        fin = round.finalize();
    }

    let mut out = [0u8; 16];
    for (o, &ti) in out.iter_mut().zip(MD5_TRANSPOSE.iter()) {
        *o = fin[ti as usize];
    }
    out
}

/// Run md5-crypt. Returns `None` when the setting is not a `$1$` setting or the
/// salt contains characters outside the crypt alphabet. An empty key with the
/// empty password still produces a value, as crypt(3) does.
pub(crate) fn md5_crypt(key: &[u8], setting: &str) -> Option<String> {
    let salt = md5_salt(setting)?;
    let digest = md5_digest(key, salt.as_bytes());
    Some(format!("{}{}${}", MD5_MAGIC, salt, hash64_encode(&digest)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_crypt_known_vector() {
        // openssl passwd -1 -salt saltsalt password
        assert_eq!(
            md5_crypt(b"password", "$1$saltsalt$").as_deref(),
            Some("$1$saltsalt$qjXMvbEw8oaL.CzflDtaK/")
        );
        // A full value is a valid setting for itself.
        assert_eq!(
            md5_crypt(b"password", "$1$saltsalt$qjXMvbEw8oaL.CzflDtaK/").as_deref(),
            Some("$1$saltsalt$qjXMvbEw8oaL.CzflDtaK/")
        );
    }

    #[test]
    fn test_md5_crypt_salt_truncated() {
        let a = md5_crypt(b"password", "$1$saltsaltextra");
        let b = md5_crypt(b"password", "$1$saltsalt");
        assert!(a.is_some());
        assert_eq!(a, b);
    }

    #[test]
    fn test_md5_crypt_bad_setting() {
        assert!(md5_crypt(b"password", "ab").is_none());
        assert!(md5_crypt(b"password", "$5$rounds=5000$x").is_none());
        assert!(md5_crypt(b"password", "$1$sa:t$").is_none());
    }
}
