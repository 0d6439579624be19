//! The access control collaborator. Rule evaluation is entirely up to the
//! implementor; this crate only asks questions.

use crate::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessPurpose {
    /// Compare a credential value during authentication.
    Auth,
    Read,
    Write,
}

pub trait AccessControls: Send + Sync {
    /// May `op` use `value` of `attr` on `target` for `purpose`.
    fn access_allowed(
        &self,
        op: &Operation,
        target: &Dn,
        attr: &str,
        value: Option<&[u8]>,
        purpose: AccessPurpose,
    ) -> bool;

    /// Server wide restrictions for an operation such as read only mode or a
    /// required security strength. Any error is final.
    fn check_restrictions(&self, _op: &Operation, _oid: &str) -> Result<(), PasswdModifyError> {
        Ok(())
    }

    /// Referral objects covering `target`. Any error is final.
    fn check_referrals(&self, _op: &Operation, _target: &Dn) -> Result<(), PasswdModifyError> {
        Ok(())
    }
}
