//! Checking an offered password against the values stored on an entry.

use std::fmt;

use crate::prelude::*;

/// The stored values of a credential attribute, in their persisted order. Each
/// value is a scheme tagged encoding such as `{SSHA}...`.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct StoredCredential {
    values: Vec<Vec<u8>>,
}

impl fmt::Debug for StoredCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Hashes are still sensitive, only show how many there are.
        f.debug_struct("StoredCredential")
            .field("values", &self.values.len())
            .finish()
    }
}

impl StoredCredential {
    pub fn new(values: Vec<Vec<u8>>) -> Self {
        StoredCredential { values }
    }

    pub fn values(&self) -> &[Vec<u8>] {
        &self.values
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for StoredCredential {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        StoredCredential::new(
            iter.into_iter()
                .map(|s| s.as_ref().as_bytes().to_vec())
                .collect(),
        )
    }
}

/// Why an old password was refused. Only ever logged, the caller sees a single
/// generic reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    MissingAttribute,
    NoAccessibleValue,
    Mismatch,
    Backend(BackendError),
}

pub struct CredentialVerifier<'a> {
    registry: &'a HashSchemeRegistry,
}

impl<'a> CredentialVerifier<'a> {
    pub fn new(registry: &'a HashSchemeRegistry) -> Self {
        CredentialVerifier { registry }
    }

    /// Succeeds on the first accessible value the offered password matches.
    /// Values the access check refuses are skipped, not counted as mismatches.
    pub fn verify(
        &self,
        offered: &[u8],
        stored: &StoredCredential,
        access_check: Option<&dyn Fn(&[u8]) -> bool>,
    ) -> Result<(), VerifyError> {
        let mut accessible = 0usize;

        for value in stored.values() {
            if let Some(allowed) = access_check {
                if !allowed(value) {
                    trace!("credential value skipped, access denied");
                    continue;
                }
            }
            accessible += 1;

            if self.registry.verify(value, offered) {
                return Ok(());
            }
        }

        if accessible == 0 {
            Err(VerifyError::NoAccessibleValue)
        } else {
            Err(VerifyError::Mismatch)
        }
    }

    pub fn check(
        &self,
        offered: &[u8],
        stored: &StoredCredential,
        access_check: Option<&dyn Fn(&[u8]) -> bool>,
    ) -> bool {
        self.verify(offered, stored, access_check).is_ok()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn two_ssha(reg: &HashSchemeRegistry) -> StoredCredential {
        let x = reg.hash(b"first-secret", "{SSHA}").unwrap();
        let y = reg.hash(b"second-secret", "{SSHA}").unwrap();
        [x, y].into_iter().collect()
    }

    #[test]
    fn test_verify_skips_denied_values() {
        sketching::test_init();
        let reg = HashSchemeRegistry::new();
        let stored = two_ssha(&reg);
        let first = stored.values()[0].clone();
        let deny_first: &dyn Fn(&[u8]) -> bool = &move |v| v != first.as_slice();

        let v = CredentialVerifier::new(&reg);
        assert!(v.check(b"second-secret", &stored, Some(deny_first)));
        assert_eq!(
            v.verify(b"first-secret", &stored, Some(deny_first)),
            Err(VerifyError::Mismatch)
        );
        // Without a check both match.
        assert!(v.check(b"first-secret", &stored, None));
        assert!(v.check(b"second-secret", &stored, None));
    }

    #[test]
    fn test_verify_nothing_accessible() {
        let reg = HashSchemeRegistry::new();
        let stored = two_ssha(&reg);
        let deny_all: &dyn Fn(&[u8]) -> bool = &|_| false;

        let v = CredentialVerifier::new(&reg);
        assert_eq!(
            v.verify(b"first-secret", &stored, Some(deny_all)),
            Err(VerifyError::NoAccessibleValue)
        );
        assert_eq!(
            v.verify(b"first-secret", &StoredCredential::default(), None),
            Err(VerifyError::NoAccessibleValue)
        );
    }

    #[test]
    fn test_verify_unknown_scheme_is_mismatch() {
        let reg = HashSchemeRegistry::new();
        let stored: StoredCredential = ["{CLEARTEXT}secret", "secret"].into_iter().collect();
        let v = CredentialVerifier::new(&reg);
        assert_eq!(
            v.verify(b"secret", &stored, None),
            Err(VerifyError::Mismatch)
        );
    }
}
