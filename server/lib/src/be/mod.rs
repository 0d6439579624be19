//! Storage backends and routing an identity to the backend that holds it.
//!
//! The server mounts one or more [`Backend`]s, each under a suffix. A request
//! for an identity is routed to the backend with the longest matching suffix.
//! Backends may be glued together into one logical subtree, in which case the
//! operation level hooks see the glue while the write goes to the real
//! subordinate backend.

use std::fmt;

use async_trait::async_trait;

use crate::prelude::*;

pub mod referral;

pub use self::referral::referral_rewrite;

/// The outcome of a backend's native extended operation handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtendedOpResult {
    /// The backend performed the change itself.
    Handled,
    /// The backend refused, relayed to the caller as is.
    Rejected(BackendError),
    /// No handler for this operation.
    NotSupported,
    /// The backend looked at the request, proceed with default handling.
    Continue,
}

/// What a backend's extended operation handler is given. The new password is
/// always present, generated by the server if the caller supplied none.
#[derive(Debug)]
pub struct ExtendedRequest<'a> {
    pub oid: &'static str,
    pub target: &'a Dn,
    pub old_password: Option<&'a [u8]>,
    pub new_password: &'a [u8],
    pub generated: bool,
}

#[async_trait]
pub trait Backend: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn suffix(&self) -> &Dn;

    /// Presents several backends as one subtree.
    fn is_glue(&self) -> bool {
        false
    }

    /// Mounted beneath a glue backend.
    fn is_subordinate(&self) -> bool {
        false
    }

    /// A read only replica that must refer writes to its provider.
    fn is_single_shadow(&self) -> bool {
        false
    }

    fn update_refs(&self) -> &[String] {
        &[]
    }

    /// The identity replication runs as. Writes by this identity are never
    /// referred.
    fn update_dn(&self) -> Option<&Dn> {
        None
    }

    fn supports_modify(&self) -> bool {
        true
    }

    fn supports_extended(&self) -> bool {
        false
    }

    async fn extended(&self, _op: &Operation, _req: &ExtendedRequest<'_>) -> ExtendedOpResult {
        ExtendedOpResult::NotSupported
    }

    async fn fetch_attribute(
        &self,
        op: &Operation,
        ndn: &Dn,
        attr: &str,
    ) -> Result<Option<StoredCredential>, BackendError>;

    /// Apply `mods` to `ndn`. Ownership of the list passes to the backend.
    async fn modify(&self, op: &Operation, ndn: &Dn, mods: ModifyList) -> Result<(), BackendError>;
}

/// Where a password change is going to be applied.
#[derive(Debug, Clone)]
pub enum BackendTarget {
    Local {
        target: Dn,
        /// The logical backend, the glue if there is one.
        be: Arc<dyn Backend>,
        /// The backend that actually holds the entry.
        real: Arc<dyn Backend>,
    },
    /// Nothing local holds the identity.
    NoBackend { target: Dn },
}

impl BackendTarget {
    pub fn target(&self) -> &Dn {
        match self {
            BackendTarget::Local { target, .. } | BackendTarget::NoBackend { target } => target,
        }
    }
}

#[derive(Clone, Default)]
pub struct BackendSet {
    backends: Vec<Arc<dyn Backend>>,
}

impl fmt::Debug for BackendSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.backends.iter().map(|be| be.name()))
            .finish()
    }
}

impl BackendSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, be: Arc<dyn Backend>) {
        self.backends.push(be);
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// The backend with the longest suffix holding `ndn`. With `no_subs`
    /// subordinate backends are passed over so a glued subtree resolves to its
    /// glue. The first registered wins a tie.
    pub fn select_backend(&self, ndn: &Dn, no_subs: bool) -> Option<Arc<dyn Backend>> {
        self.backends
            .iter()
            .rev()
            .filter(|be| !(no_subs && be.is_subordinate()))
            .filter(|be| be.suffix().is_suffix_of(ndn))
            .max_by_key(|be| be.suffix().depth())
            .cloned()
    }

    /// Work out the target identity and the backend holding it. Without an
    /// explicit identity the target is the bound caller, and the backend the
    /// one the caller authenticated against. An empty identity counts as
    /// absent.
    pub fn resolve(
        &self,
        identity: Option<&[u8]>,
        op: &Operation,
    ) -> Result<BackendTarget, PasswdModifyError> {
        let (target, be) = match identity.filter(|id| !id.is_empty()) {
            Some(raw) => {
                let target = Dn::normalize(raw).map_err(|e| {
                    request_info!(err = %e, "{}: passwd_extop: invalid DN", op.log_prefix());
                    PasswdModifyError::InvalidDn
                })?;
                let be = self.select_backend(&target, true);
                (target, be)
            }
            None => (
                op.ndn.clone().unwrap_or_default(),
                op.conn.authz_backend(),
            ),
        };

        let Some(be) = be else {
            return Ok(BackendTarget::NoBackend { target });
        };

        if target.is_root() {
            return Err(PasswdModifyError::Unwilling(MSG_ROOT_ENTRY.to_string()));
        }

        let real = if be.is_glue() {
            self.select_backend(&target, false).unwrap_or_else(|| {
                debug!(backend = %be.name(), "no subordinate for target, using glue");
                be.clone()
            })
        } else {
            be.clone()
        };

        Ok(BackendTarget::Local { target, be, real })
    }
}

/// An operation performed by the backend's replication identity.
pub fn be_isupdate(be: &dyn Backend, op: &Operation) -> bool {
    match (be.update_dn(), op.ndn.as_ref()) {
        (Some(update_dn), Some(ndn)) => update_dn == ndn,
        _ => false,
    }
}

/// A shadow backend may not be written to locally. Refer the caller to the
/// backend's update references, or the server's default referral.
pub fn check_update_referral(
    be: &dyn Backend,
    op: &Operation,
    default_referral: &[String],
) -> Result<(), PasswdModifyError> {
    if !be.is_single_shadow() || be_isupdate(be, op) {
        return Ok(());
    }

    let refs = if be.update_refs().is_empty() {
        default_referral
    } else {
        be.update_refs()
    };

    if refs.is_empty() {
        return Err(PasswdModifyError::Unwilling(
            MSG_SHADOW_NO_REFERRAL.to_string(),
        ));
    }

    let mut rewritten = referral_rewrite(refs);
    if rewritten.is_empty() {
        rewritten = refs.to_vec();
    }
    Err(PasswdModifyError::ReferralRequired(ReferralSet::new(
        rewritten,
    )))
}
