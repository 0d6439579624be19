//! Site password policy.
//!
//! The orchestrator consults a [`PasswordPolicy`] once the target is resolved
//! and any old password verified, and informs it after a change is stored.
//! [`NoPolicy`] accepts everything. [`AccountPolicy`] carries the directory
//! account rules: disabled accounts, administrators, account owners, self
//! change permission, password quality and history.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::prelude::*;

/// What the policy is told about a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyContext {
    /// The bound identity, `None` when anonymous.
    pub actor: Option<Dn>,
    pub target: Dn,
    /// The actor is changing their own password. An anonymous caller that
    /// proved the old password counts as this.
    pub self_change: bool,
    pub trusted_transport: bool,
}

#[async_trait]
pub trait PasswordPolicy: Send + Sync {
    async fn check(&self, ctx: &PolicyContext, new_password: &[u8])
        -> Result<(), PasswdModifyError>;

    /// Called once the new password has been stored.
    async fn record(&self, _ctx: &PolicyContext, _new_password: &[u8]) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoPolicy;

#[async_trait]
impl PasswordPolicy for NoPolicy {
    async fn check(
        &self,
        _ctx: &PolicyContext,
        _new_password: &[u8],
    ) -> Result<(), PasswdModifyError> {
        Ok(())
    }
}

pub struct AccountPolicy {
    admins: BTreeSet<Dn>,
    // target -> the identities that own it
    owners: BTreeMap<Dn, BTreeSet<Dn>>,
    disabled: BTreeSet<Dn>,
    allow_self_change: bool,
    min_length: usize,
    min_classes: usize,
    history_depth: usize,
    registry: HashSchemeRegistry,
    history: Mutex<BTreeMap<Dn, VecDeque<String>>>,
}

impl Default for AccountPolicy {
    fn default() -> Self {
        AccountPolicy {
            admins: BTreeSet::new(),
            owners: BTreeMap::new(),
            disabled: BTreeSet::new(),
            allow_self_change: true,
            min_length: DEFAULT_PW_MIN_LENGTH,
            min_classes: DEFAULT_PW_MIN_CLASSES,
            history_depth: DEFAULT_PW_HISTORY_DEPTH,
            registry: HashSchemeRegistry::new(),
            history: Mutex::new(BTreeMap::new()),
        }
    }
}

impl AccountPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_admin(mut self, admin: Dn) -> Self {
        self.admins.insert(admin);
        self
    }

    pub fn with_owner(mut self, owner: Dn, target: Dn) -> Self {
        self.owners.entry(target).or_default().insert(owner);
        self
    }

    pub fn with_disabled(mut self, target: Dn) -> Self {
        self.disabled.insert(target);
        self
    }

    pub fn deny_self_change(mut self) -> Self {
        self.allow_self_change = false;
        self
    }

    pub fn with_quality(mut self, min_length: usize, min_classes: usize) -> Self {
        self.min_length = min_length;
        self.min_classes = min_classes;
        self
    }

    pub fn with_history(mut self, depth: usize) -> Self {
        self.history_depth = depth;
        self
    }

    fn is_admin(&self, actor: Option<&Dn>) -> bool {
        actor.is_some_and(|a| self.admins.contains(a))
    }

    fn is_owner(&self, actor: Option<&Dn>, target: &Dn) -> bool {
        match (actor, self.owners.get(target)) {
            (Some(a), Some(owners)) => owners.contains(a),
            _ => false,
        }
    }

    fn check_quality(&self, new_password: &[u8]) -> bool {
        let pw = String::from_utf8_lossy(new_password);
        if pw.chars().count() < self.min_length {
            return false;
        }

        let (mut lower, mut upper, mut digit, mut other) = (false, false, false, false);
        for c in pw.chars() {
            if c.is_lowercase() {
                lower = true;
            } else if c.is_uppercase() {
                upper = true;
            } else if c.is_numeric() {
                digit = true;
            } else {
                other = true;
            }
        }
        let classes = [lower, upper, digit, other].iter().filter(|c| **c).count();
        classes >= self.min_classes
    }
}

#[async_trait]
impl PasswordPolicy for AccountPolicy {
    async fn check(
        &self,
        ctx: &PolicyContext,
        new_password: &[u8],
    ) -> Result<(), PasswdModifyError> {
        if self.disabled.contains(&ctx.target) {
            return Err(PasswdModifyError::Authz(MSG_USER_DISABLED.to_string()));
        }

        let actor = ctx.actor.as_ref();
        let is_admin = self.is_admin(actor);
        let is_owner = self.is_owner(actor, &ctx.target);

        if ctx.self_change {
            if !self.allow_self_change {
                return Err(PasswdModifyError::Authz(MSG_POLICY_VIOLATION.to_string()));
            }
        } else if !is_admin && !is_owner {
            return Err(PasswdModifyError::Authz(MSG_PERMISSION_DENIED.to_string()));
        }

        let is_computer = ctx.target.contains(COMPUTER_RDN_MARKER);
        if ctx.trusted_transport || is_admin || is_owner || is_computer {
            trace!("password quality and history checks skipped");
            return Ok(());
        }

        if !self.check_quality(new_password) {
            return Err(PasswdModifyError::Unwilling(MSG_QUALITY_FAILED.to_string()));
        }

        if self.history_depth > 0 {
            let history = self.history.lock().await;
            let reused = history.get(&ctx.target).is_some_and(|prev| {
                prev.iter()
                    .any(|h| self.registry.verify(h.as_bytes(), new_password))
            });
            if reused {
                return Err(PasswdModifyError::Unwilling(MSG_HISTORY_FAILED.to_string()));
            }
        }

        Ok(())
    }

    async fn record(&self, ctx: &PolicyContext, new_password: &[u8]) {
        if self.history_depth == 0 {
            return;
        }

        let hashed = match self.registry.hash(new_password, PW_HISTORY_SCHEME) {
            Ok(h) => h,
            Err(e) => {
                admin_error!(?e, "unable to record password history");
                return;
            }
        };

        let mut history = self.history.lock().await;
        let prev = history.entry(ctx.target.clone()).or_default();
        prev.push_front(hashed);
        prev.truncate(self.history_depth);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn dn(s: &str) -> Dn {
        Dn::parse(s).unwrap()
    }

    fn ctx(actor: Option<&str>, target: &str) -> PolicyContext {
        let actor = actor.map(dn);
        let target = dn(target);
        PolicyContext {
            self_change: actor.as_ref() == Some(&target),
            actor,
            target,
            trusted_transport: false,
        }
    }

    #[tokio::test]
    async fn test_no_policy_accepts() {
        assert!(NoPolicy
            .check(&ctx(Some("uid=a"), "uid=b"), b"x")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_account_policy_permissions() {
        sketching::test_init();
        let policy = AccountPolicy::new()
            .with_admin(dn("uid=admin"))
            .with_owner(dn("uid=carol"), dn("uid=bob"))
            .with_disabled(dn("uid=dave"));

        assert_eq!(
            policy.check(&ctx(Some("uid=alice"), "uid=bob"), b"Passw0rd!").await,
            Err(PasswdModifyError::Authz(MSG_PERMISSION_DENIED.to_string()))
        );
        assert!(policy
            .check(&ctx(Some("uid=carol"), "uid=bob"), b"x")
            .await
            .is_ok());
        assert!(policy
            .check(&ctx(Some("uid=admin"), "uid=bob"), b"x")
            .await
            .is_ok());
        assert_eq!(
            policy.check(&ctx(Some("uid=admin"), "uid=dave"), b"x").await,
            Err(PasswdModifyError::Authz(MSG_USER_DISABLED.to_string()))
        );

        let strict = AccountPolicy::new().deny_self_change();
        assert_eq!(
            strict.check(&ctx(Some("uid=bob"), "uid=bob"), b"Passw0rd!").await,
            Err(PasswdModifyError::Authz(MSG_POLICY_VIOLATION.to_string()))
        );
    }

    #[tokio::test]
    async fn test_account_policy_quality() {
        let policy = AccountPolicy::new().with_quality(8, 3);
        let me = ctx(Some("uid=bob"), "uid=bob");

        assert_eq!(
            policy.check(&me, b"short").await,
            Err(PasswdModifyError::Unwilling(MSG_QUALITY_FAILED.to_string()))
        );
        assert_eq!(
            policy.check(&me, b"alllowercase").await,
            Err(PasswdModifyError::Unwilling(MSG_QUALITY_FAILED.to_string()))
        );
        assert!(policy.check(&me, b"Mixed1case").await.is_ok());

        // Machine accounts are exempt.
        let computer = ctx(
            Some("cn=host1,cn=computers,dc=example"),
            "cn=host1,cn=computers,dc=example",
        );
        assert!(policy.check(&computer, b"x").await.is_ok());

        let mut trusted = me.clone();
        trusted.trusted_transport = true;
        assert!(policy.check(&trusted, b"x").await.is_ok());
    }

    #[tokio::test]
    async fn test_account_policy_history() {
        let policy = AccountPolicy::new().with_history(2);
        let me = ctx(Some("uid=bob"), "uid=bob");

        assert!(policy.check(&me, b"Password1").await.is_ok());
        policy.record(&me, b"Password1").await;
        policy.record(&me, b"Password2").await;
        assert_eq!(
            policy.check(&me, b"Password1").await,
            Err(PasswdModifyError::Unwilling(MSG_HISTORY_FAILED.to_string()))
        );

        // Pushed out of the history window.
        policy.record(&me, b"Password3").await;
        assert!(policy.check(&me, b"Password1").await.is_ok());
        assert!(policy.check(&me, b"Password3").await.is_err());

        // History is per target.
        let other = ctx(Some("uid=eve"), "uid=eve");
        assert!(policy.check(&other, b"Password3").await.is_ok());
    }
}
