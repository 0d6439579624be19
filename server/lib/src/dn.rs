//! Distinguished name normalisation.
//!
//! A [`Dn`] only ever holds the normalised form: attribute types and values are
//! lower cased, insignificant spaces are removed and escapes are rewritten in a
//! single canonical style. Two names that refer to the same entry compare
//! equal. The empty name is the root.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DnError {
    #[error("distinguished name is not valid utf8")]
    InvalidUtf8,
    #[error("invalid distinguished name component: {0}")]
    InvalidComponent(String),
    #[error("invalid attribute type: {0}")]
    InvalidAttribute(String),
    #[error("distinguished name component missing value for attribute {0}")]
    MissingValue(String),
    #[error("distinguished name contains an unterminated escape sequence")]
    UnterminatedEscape,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Dn {
    norm: String,
}

impl Dn {
    pub fn root() -> Self {
        Dn::default()
    }

    /// Normalise raw octets, such as the identity field of a request.
    pub fn normalize(raw: &[u8]) -> Result<Self, DnError> {
        let s = std::str::from_utf8(raw).map_err(|_| DnError::InvalidUtf8)?;
        Self::parse(s)
    }

    pub fn parse(input: &str) -> Result<Self, DnError> {
        let raw = input.trim();
        if raw.is_empty() {
            return Ok(Dn::root());
        }

        let mut rdns = Vec::new();
        for component in split_escaped(raw, ',')? {
            let mut avas = Vec::new();
            for part in split_escaped(&component, '+')? {
                let (attr, value) = split_attribute_value(&part)?;
                avas.push(format!("{}={}", attr, escape(&value)));
            }
            // Multi valued RDNs compare independent of order.
            avas.sort();
            rdns.push(avas.join("+"));
        }

        Ok(Dn {
            norm: rdns.join(","),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.norm
    }

    pub fn is_root(&self) -> bool {
        self.norm.is_empty()
    }

    /// True when `self` is `other` or one of its ancestors. The root is a suffix
    /// of every name.
    pub fn is_suffix_of(&self, other: &Dn) -> bool {
        if self.is_root() || self.norm == other.norm {
            return true;
        }
        other
            .norm
            .strip_suffix(self.norm.as_str())
            .is_some_and(|head| head.ends_with(',') && !head.ends_with("\\,"))
    }

    /// Number of RDNs, zero for the root.
    pub fn depth(&self) -> usize {
        if self.is_root() {
            0
        } else {
            split_escaped(&self.norm, ',').map(|v| v.len()).unwrap_or(0)
        }
    }

    /// Case insensitive substring test against the normalised form.
    pub fn contains(&self, needle: &str) -> bool {
        self.norm.contains(&needle.to_lowercase())
    }
}

impl fmt::Display for Dn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.norm)
    }
}

impl FromStr for Dn {
    type Err = DnError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Dn {
    type Error = DnError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Dn> for String {
    fn from(value: Dn) -> Self {
        value.norm
    }
}

/// Split on an unescaped delimiter. Escapes are kept so the pieces can be split
/// again.
fn split_escaped(input: &str, delimiter: char) -> Result<Vec<String>, DnError> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut escape = false;

    for ch in input.chars() {
        if escape {
            current.push(ch);
            escape = false;
            continue;
        }
        if ch == '\\' {
            current.push(ch);
            escape = true;
            continue;
        }
        if ch == delimiter {
            parts.push(std::mem::take(&mut current));
            continue;
        }
        current.push(ch);
    }

    if escape {
        return Err(DnError::UnterminatedEscape);
    }
    parts.push(current);

    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err(DnError::InvalidComponent(input.to_string()));
    }
    Ok(parts)
}

fn split_attribute_value(component: &str) -> Result<(String, String), DnError> {
    let (attr, value) = component
        .split_once('=')
        .ok_or_else(|| DnError::InvalidComponent(component.to_string()))?;

    let attr = attr.trim();
    let valid_attr = attr
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphanumeric())
        && attr
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
    if !valid_attr {
        return Err(DnError::InvalidAttribute(attr.to_string()));
    }

    let value = unescape(trim_value(value))?;
    if value.is_empty() {
        return Err(DnError::MissingValue(attr.to_string()));
    }

    Ok((attr.to_ascii_lowercase(), value.to_lowercase()))
}

/// Trim unescaped surrounding spaces. A trailing `\ ` is significant.
fn trim_value(value: &str) -> &str {
    let value = value.trim_start();
    let mut end = value.len();
    while end > 0 && value[..end].ends_with(' ') {
        let before = &value[..end - 1];
        let slashes = before.chars().rev().take_while(|c| *c == '\\').count();
        if slashes % 2 == 1 {
            break;
        }
        end -= 1;
    }
    &value[..end]
}

fn unescape(value: &str) -> Result<String, DnError> {
    let mut bytes = Vec::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let next = chars.next().ok_or(DnError::UnterminatedEscape)?;
        let hex_pair = next
            .to_digit(16)
            .and_then(|hi| chars.peek().and_then(|c| c.to_digit(16)).map(|lo| (hi, lo)));
        match hex_pair {
            Some((hi, lo)) => {
                chars.next();
                bytes.push((hi * 16 + lo) as u8);
            }
            None => {
                let mut buf = [0u8; 4];
                bytes.extend_from_slice(next.encode_utf8(&mut buf).as_bytes());
            }
        }
    }

    String::from_utf8(bytes).map_err(|_| DnError::InvalidUtf8)
}

fn escape(value: &str) -> String {
    let count = value.chars().count();
    let mut escaped = String::with_capacity(value.len());

    for (idx, ch) in value.chars().enumerate() {
        let needs_escape = matches!(ch, ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=')
            || (idx == 0 && (ch == ' ' || ch == '#'))
            || (idx + 1 == count && ch == ' ');
        if needs_escape {
            escaped.push('\\');
        }
        escaped.push(ch);
    }

    escaped
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_dn_normalise() {
        let a = Dn::parse("UID=Alice, ou=People,dc=Example ,dc=COM").unwrap();
        assert_eq!(a.as_str(), "uid=alice,ou=people,dc=example,dc=com");
        assert_eq!(a.depth(), 4);

        let b = Dn::normalize(b"uid=alice,ou=people,dc=example,dc=com").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_dn_root_and_suffix() {
        let root = Dn::normalize(b"").unwrap();
        assert!(root.is_root());
        assert_eq!(root, Dn::root());

        let base = Dn::parse("dc=example,dc=com").unwrap();
        let user = Dn::parse("uid=bob,dc=example,dc=com").unwrap();
        let other = Dn::parse("uid=bob,dc=xexample,dc=com").unwrap();
        assert!(root.is_suffix_of(&user));
        assert!(base.is_suffix_of(&user));
        assert!(base.is_suffix_of(&base));
        assert!(!base.is_suffix_of(&other));
        assert!(!user.is_suffix_of(&base));
    }

    #[test]
    fn test_dn_escapes() {
        let a = Dn::parse("cn=Smith\\, John,dc=example").unwrap();
        assert_eq!(a.as_str(), "cn=smith\\, john,dc=example");
        assert_eq!(a.depth(), 2);

        let hex = Dn::parse("cn=Smith\\2c John,dc=example").unwrap();
        assert_eq!(a, hex);

        let multi = Dn::parse("uid=a+cn=b,dc=example").unwrap();
        let swapped = Dn::parse("cn=B+uid=A,dc=example").unwrap();
        assert_eq!(multi, swapped);
    }

    #[test]
    fn test_dn_invalid() {
        assert!(matches!(
            Dn::parse("not a dn"),
            Err(DnError::InvalidComponent(_))
        ));
        assert!(matches!(
            Dn::parse("uid=,dc=example"),
            Err(DnError::MissingValue(_))
        ));
        assert!(matches!(
            Dn::parse("u id=x"),
            Err(DnError::InvalidAttribute(_))
        ));
        assert!(matches!(
            Dn::parse("uid=x,,dc=example"),
            Err(DnError::InvalidComponent(_))
        ));
        assert_eq!(Dn::parse("uid=x\\"), Err(DnError::UnterminatedEscape));
        assert_eq!(Dn::normalize(&[0xff, 0x3d]), Err(DnError::InvalidUtf8));
    }

    #[test]
    fn test_dn_contains() {
        let a = Dn::parse("CN=Computer01,CN=Computers,dc=example").unwrap();
        assert!(a.contains("cn=computer"));
        assert!(!Dn::parse("uid=alice").unwrap().contains("cn=computer"));
    }
}
