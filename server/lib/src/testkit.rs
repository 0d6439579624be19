//! In memory collaborators for exercising password modify without a real
//! directory.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::idm::SaslSetPass;
use crate::prelude::*;

/// A modification as seen by a [`MemoryBackend`], with the operation state it
/// was applied under.
#[derive(Debug, Clone)]
pub struct AppliedModify {
    pub target: Dn,
    pub mods: ModifyList,
    pub tag: OpTag,
    pub origin: ModifyOrigin,
}

#[derive(Debug)]
pub struct MemoryBackend {
    name: String,
    suffix: Dn,
    glue: bool,
    subordinate: bool,
    shadow: bool,
    update_refs: Vec<String>,
    update_dn: Option<Dn>,
    modify: bool,
    extended: Option<ExtendedOpResult>,
    fail_modify: Option<BackendError>,
    // target -> attr -> values
    entries: Mutex<BTreeMap<Dn, BTreeMap<String, Vec<Vec<u8>>>>>,
    applied: Mutex<Vec<AppliedModify>>,
    extended_calls: AtomicUsize,
}

impl MemoryBackend {
    #[allow(clippy::expect_used)]
    pub fn new(name: &str, suffix: &str) -> Self {
        MemoryBackend {
            name: name.to_string(),
            suffix: Dn::parse(suffix).expect("invalid test suffix"),
            glue: false,
            subordinate: false,
            shadow: false,
            update_refs: Vec::new(),
            update_dn: None,
            modify: true,
            extended: None,
            fail_modify: None,
            entries: Mutex::new(BTreeMap::new()),
            applied: Mutex::new(Vec::new()),
            extended_calls: AtomicUsize::new(0),
        }
    }

    pub fn glue(mut self) -> Self {
        self.glue = true;
        self
    }

    pub fn subordinate(mut self) -> Self {
        self.subordinate = true;
        self
    }

    pub fn shadow(mut self, refs: &[&str]) -> Self {
        self.shadow = true;
        self.update_refs = refs.iter().map(|s| s.to_string()).collect();
        self
    }

    #[allow(clippy::expect_used)]
    pub fn update_dn(mut self, dn: &str) -> Self {
        self.update_dn = Some(Dn::parse(dn).expect("invalid test update dn"));
        self
    }

    pub fn without_modify(mut self) -> Self {
        self.modify = false;
        self
    }

    pub fn with_extended(mut self, result: ExtendedOpResult) -> Self {
        self.extended = Some(result);
        self
    }

    pub fn fail_modify(mut self, err: BackendError) -> Self {
        self.fail_modify = Some(err);
        self
    }

    /// Add an entry with these stored password values.
    #[allow(clippy::expect_used)]
    pub fn with_entry(self, dn: &str, passwords: &[&str]) -> Self {
        let dn = Dn::parse(dn).expect("invalid test entry dn");
        let mut attrs = BTreeMap::new();
        if !passwords.is_empty() {
            attrs.insert(
                ATTR_USERPASSWORD.to_lowercase(),
                passwords.iter().map(|p| p.as_bytes().to_vec()).collect(),
            );
        }
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(dn, attrs);
        self
    }

    /// The current values of the password attribute of `dn`.
    #[allow(clippy::expect_used)]
    pub fn passwords(&self, dn: &str) -> Vec<Vec<u8>> {
        let dn = Dn::parse(dn).expect("invalid test entry dn");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&dn)
            .and_then(|attrs| attrs.get(&ATTR_USERPASSWORD.to_lowercase()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn applied(&self) -> Vec<AppliedModify> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn extended_calls(&self) -> usize {
        self.extended_calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn suffix(&self) -> &Dn {
        &self.suffix
    }

    fn is_glue(&self) -> bool {
        self.glue
    }

    fn is_subordinate(&self) -> bool {
        self.subordinate
    }

    fn is_single_shadow(&self) -> bool {
        self.shadow
    }

    fn update_refs(&self) -> &[String] {
        &self.update_refs
    }

    fn update_dn(&self) -> Option<&Dn> {
        self.update_dn.as_ref()
    }

    fn supports_modify(&self) -> bool {
        self.modify
    }

    fn supports_extended(&self) -> bool {
        self.extended.is_some()
    }

    async fn extended(&self, _op: &Operation, _req: &ExtendedRequest<'_>) -> ExtendedOpResult {
        self.extended_calls.fetch_add(1, Ordering::Relaxed);
        self.extended
            .clone()
            .unwrap_or(ExtendedOpResult::NotSupported)
    }

    async fn fetch_attribute(
        &self,
        _op: &Operation,
        ndn: &Dn,
        attr: &str,
    ) -> Result<Option<StoredCredential>, BackendError> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get(ndn)
            .ok_or_else(|| BackendError::code(ResultCode::Other))?;
        Ok(entry
            .get(&attr.to_lowercase())
            .map(|values| StoredCredential::new(values.clone())))
    }

    async fn modify(&self, op: &Operation, ndn: &Dn, mods: ModifyList) -> Result<(), BackendError> {
        self.applied
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(AppliedModify {
                target: ndn.clone(),
                mods: mods.clone(),
                tag: op.tag,
                origin: op.origin,
            });

        if let Some(err) = &self.fail_modify {
            return Err(err.clone());
        }

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .get_mut(ndn)
            .ok_or_else(|| BackendError::new(ResultCode::Other, "no such entry"))?;
        for m in mods.iter() {
            let Modify::Replace(attr, values) = m;
            entry.insert(attr.to_lowercase(), values.clone());
        }
        Ok(())
    }
}

/// Access controls with fixed answers.
#[derive(Debug, Default)]
pub struct StaticAccessControls {
    /// Stored values that may not be used for authentication.
    pub deny_values: Vec<Vec<u8>>,
    pub restriction: Option<PasswdModifyError>,
    pub referral: Option<PasswdModifyError>,
}

impl AccessControls for StaticAccessControls {
    fn access_allowed(
        &self,
        _op: &Operation,
        _target: &Dn,
        _attr: &str,
        value: Option<&[u8]>,
        _purpose: AccessPurpose,
    ) -> bool {
        match value {
            Some(v) => !self.deny_values.iter().any(|d| d.as_slice() == v),
            None => true,
        }
    }

    fn check_restrictions(&self, _op: &Operation, _oid: &str) -> Result<(), PasswdModifyError> {
        match &self.restriction {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    fn check_referrals(&self, _op: &Operation, _target: &Dn) -> Result<(), PasswdModifyError> {
        match &self.referral {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

/// A policy that always gives the same answer and counts what it saw.
#[derive(Debug, Default)]
pub struct StaticPolicy {
    pub reject: Option<PasswdModifyError>,
    checked: Mutex<Vec<PolicyContext>>,
    recorded: AtomicUsize,
}

impl StaticPolicy {
    pub fn rejecting(err: PasswdModifyError) -> Self {
        StaticPolicy {
            reject: Some(err),
            ..Default::default()
        }
    }

    pub fn checked(&self) -> Vec<PolicyContext> {
        self.checked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn recorded(&self) -> usize {
        self.recorded.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PasswordPolicy for StaticPolicy {
    async fn check(
        &self,
        ctx: &PolicyContext,
        _new_password: &[u8],
    ) -> Result<(), PasswdModifyError> {
        self.checked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ctx.clone());
        match &self.reject {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn record(&self, _ctx: &PolicyContext, _new_password: &[u8]) {
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }
}

/// Accepts every change and reports a fixed response value.
#[derive(Debug, Default)]
pub struct StaticSaslSetPass {
    pub rspdata: Option<Vec<u8>>,
    calls: AtomicUsize,
}

impl StaticSaslSetPass {
    pub fn returning(rspdata: Option<Vec<u8>>) -> Self {
        StaticSaslSetPass {
            rspdata,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl SaslSetPass for StaticSaslSetPass {
    async fn setpass(
        &self,
        _op: &Operation,
        _new_password: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, PasswdModifyError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.rspdata.clone())
    }
}

/// An operation on a fresh connection, bound as `ndn` when given.
#[allow(clippy::expect_used)]
pub fn test_operation(ndn: Option<&str>, authz_backend: Option<Arc<dyn Backend>>) -> Operation {
    let conn = Connection::new(1);
    conn.set_authz_backend(authz_backend);
    let ndn = ndn.map(|s| Dn::parse(s).expect("invalid test bind dn"));
    Operation::new(Arc::new(conn), 1, ndn)
}
