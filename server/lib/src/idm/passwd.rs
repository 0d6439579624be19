//! The password modify extended operation.

use std::mem;

use async_trait::async_trait;
use pwmod_lib_crypto::generate_password;
use pwmod_proto::{encode_response, PasswdModifyRequest};

use crate::be::{check_update_referral, BackendTarget};
use crate::config::ConfigError;
use crate::policy::NoPolicy;
use crate::prelude::*;

/// Changes the password of a caller that has no local backend, for example an
/// identity held by an external SASL authentication database.
#[async_trait]
pub trait SaslSetPass: Send + Sync {
    /// Returns the response value to send, if any.
    async fn setpass(
        &self,
        op: &Operation,
        new_password: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, PasswdModifyError>;
}

pub struct PasswdModifyServer {
    config: ServerConfig,
    backends: BackendSet,
    registry: HashSchemeRegistry,
    access: Arc<dyn AccessControls>,
    policy: Arc<dyn PasswordPolicy>,
    sasl: Option<Arc<dyn SaslSetPass>>,
}

impl PasswdModifyServer {
    pub fn new(
        config: ServerConfig,
        backends: BackendSet,
        access: Arc<dyn AccessControls>,
    ) -> Result<Self, ConfigError> {
        let registry = config.hash_registry()?;
        admin_info!(
            schemes = ?registry.active_schemes(),
            backends = %backends.len(),
            "password modify ready"
        );
        Ok(PasswdModifyServer {
            config,
            backends,
            registry,
            access,
            policy: Arc::new(NoPolicy),
            sasl: None,
        })
    }

    pub fn with_policy(mut self, policy: Arc<dyn PasswordPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sasl(mut self, sasl: Arc<dyn SaslSetPass>) -> Self {
        self.sasl = Some(sasl);
        self
    }

    pub fn registry(&self) -> &HashSchemeRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Process one password modify request. `reqdata` is the request value,
    /// `None` when the client sent none. The operation's target is only set
    /// for the duration of the call.
    #[instrument(level = "debug", skip_all)]
    pub async fn passwd_extop(
        &self,
        op: &mut Operation,
        reqdata: Option<&[u8]>,
    ) -> PasswdModifyReply {
        let prev_req_ndn = op.req_ndn.take();
        let res = self.do_passwd_modify(op, reqdata).await;
        op.req_ndn = prev_req_ndn;

        match res {
            Ok(rspdata) => {
                request_info!(
                    generated = %rspdata.is_some(),
                    "{}: password modify succeeded",
                    op.log_prefix()
                );
                PasswdModifyReply::success(rspdata)
            }
            Err(e) => {
                match &e {
                    PasswdModifyError::Hashing(_)
                    | PasswdModifyError::Other(_)
                    | PasswdModifyError::Storage(_)
                    | PasswdModifyError::BackendUnavailable(_) => {
                        request_error!(err = %e, "{}: password modify failed", op.log_prefix())
                    }
                    _ => request_warn!(err = %e, "{}: password modify refused", op.log_prefix()),
                }
                e.into()
            }
        }
    }

    async fn do_passwd_modify(
        &self,
        op: &mut Operation,
        reqdata: Option<&[u8]>,
    ) -> Result<Option<Vec<u8>>, PasswdModifyError> {
        let req = PasswdModifyRequest::decode(reqdata, self.config.allow()).map_err(|e| {
            security_error!(err = %e, "{} PASSMOD", op.log_prefix());
            e
        })?;

        // An empty identity names the caller, as an absent one does.
        let identity = req.identity.filter(|id| !id.is_empty());
        let old_flag = if req.old_password.is_some() { " old" } else { "" };
        let new_flag = if req.new_password.is_some() { " new" } else { "" };
        match identity {
            Some(id) => request_info!(
                "{} PASSMOD id=\"{}\"{}{}",
                op.log_prefix(),
                String::from_utf8_lossy(id),
                old_flag,
                new_flag
            ),
            None => request_info!("{} PASSMOD{}{}", op.log_prefix(), old_flag, new_flag),
        }

        if !op.is_authenticated()
            && (self.config.require_authentication
                || identity.is_none()
                || req.old_password.is_none())
        {
            return Err(PasswdModifyError::AuthRequired);
        }

        let (target, be, real) = match self.backends.resolve(identity, op)? {
            BackendTarget::Local { target, be, real } => (target, be, real),
            BackendTarget::NoBackend { target } => {
                op.req_ndn = Some(target);
                if req.old_password.is_some() {
                    security_info!(
                        "{}: no backend holds the target, old password cannot be checked",
                        op.log_prefix()
                    );
                    return Err(PasswdModifyError::Verification);
                }
                return match &self.sasl {
                    Some(sasl) => sasl.setpass(op, req.new_password).await,
                    None => Err(PasswdModifyError::BackendUnavailable(
                        MSG_NO_AUTHZ_BACKEND.to_string(),
                    )),
                };
            }
        };
        op.req_ndn = Some(target.clone());
        trace!(backend = %be.name(), real = %real.name(), target = %target, "resolved");

        self.access
            .check_restrictions(op, OID_EXOP_MODIFY_PASSWD)?;
        self.access.check_referrals(op, &target)?;
        check_update_referral(real.as_ref(), op, &self.config.default_referral)?;

        let generated = match req.new_password {
            Some(_) => None,
            None => {
                let pw = generate_password();
                if pw.is_empty() {
                    return Err(PasswdModifyError::Other(
                        MSG_GENERATION_FAILED.to_string(),
                    ));
                }
                Some(pw)
            }
        };
        let (new_password, rspdata) = match (req.new_password, generated.as_deref()) {
            (Some(pw), _) => (pw, None),
            (None, Some(pw)) => {
                let rsp = encode_response(pw.as_bytes())
                    .map_err(|e| PasswdModifyError::Other(e.to_string()))?;
                (pw.as_bytes(), Some(rsp))
            }
            (None, None) => {
                return Err(PasswdModifyError::Other(
                    MSG_GENERATION_FAILED.to_string(),
                ))
            }
        };

        // The logical backend gets first refusal.
        if be.supports_extended() {
            let ereq = ExtendedRequest {
                oid: OID_EXOP_MODIFY_PASSWD,
                target: &target,
                old_password: req.old_password,
                new_password,
                generated: generated.is_some(),
            };
            match be.extended(op, &ereq).await {
                ExtendedOpResult::Handled => {
                    debug!(backend = %be.name(), "password change handled by backend");
                    return Ok(rspdata);
                }
                ExtendedOpResult::Rejected(BackendError { code, text }) => {
                    return Err(PasswdModifyError::Rejected { code, text })
                }
                ExtendedOpResult::NotSupported | ExtendedOpResult::Continue => {}
            }
        }

        if !real.supports_modify() {
            return Err(PasswdModifyError::Unwilling(MSG_NOT_SUPPORTED.to_string()));
        }

        let mut self_change = op.ndn.as_ref() == Some(&target);
        if let Some(old) = req.old_password {
            let stored = real.fetch_attribute(op, &target, ATTR_USERPASSWORD).await;
            if let Err(reason) = self.verify_old_password(op, &target, old, stored) {
                security_info!(
                    ?reason,
                    target = %target,
                    "{}: old password verification failed",
                    op.log_prefix()
                );
                return Err(PasswdModifyError::Verification);
            }
            if !op.is_authenticated() {
                self_change = true;
            }
        }

        let ctx = PolicyContext {
            actor: op.ndn.clone(),
            target: target.clone(),
            self_change,
            trusted_transport: op.conn.trusted_transport,
        };
        self.policy.check(&ctx, new_password).await?;

        let values = self.registry.hash_all(new_password).map_err(|e| {
            PasswdModifyError::Hashing(e.diagnostic().unwrap_or(MSG_HASH_FAILED).to_string())
        })?;
        let mods = ModifyList::new_replace(
            ATTR_USERPASSWORD,
            values.into_iter().map(String::into_bytes).collect(),
        );

        let prev_tag = mem::replace(&mut op.tag, OpTag::Modify);
        let prev_origin = mem::replace(&mut op.origin, ModifyOrigin::PasswdModify);
        let res = real.modify(op, &target, mods).await;
        op.tag = prev_tag;
        op.origin = prev_origin;
        res?;

        self.policy.record(&ctx, new_password).await;
        security_info!(target = %target, "{}: password changed", op.log_prefix());

        Ok(rspdata)
    }

    fn verify_old_password(
        &self,
        op: &Operation,
        target: &Dn,
        old: &[u8],
        stored: Result<Option<StoredCredential>, BackendError>,
    ) -> Result<(), VerifyError> {
        let stored = stored
            .map_err(VerifyError::Backend)?
            .ok_or(VerifyError::MissingAttribute)?;

        let access: &dyn Fn(&[u8]) -> bool = &|value| {
            self.access.access_allowed(
                op,
                target,
                ATTR_USERPASSWORD,
                Some(value),
                AccessPurpose::Auth,
            )
        };
        CredentialVerifier::new(&self.registry).verify(old, &stored, Some(access))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::testkit::*;

    #[tokio::test]
    async fn test_passwd_decode_failures() {
        sketching::test_init();
        let server = PasswdModifyServer::new(
            ServerConfig::default(),
            BackendSet::new(),
            Arc::new(StaticAccessControls::default()),
        )
        .unwrap();
        let mut op = test_operation(Some("uid=alice,dc=example"), None);

        let reply = server.passwd_extop(&mut op, Some(b"".as_slice())).await;
        assert_eq!(reply.code, ResultCode::ProtocolError);
        assert_eq!(reply.text.as_deref(), Some(MSG_EMPTY_REQUEST));

        // new tag before old tag
        let out_of_order: &[u8] = &[0x30, 0x06, 0x82, 0x01, b'a', 0x81, 0x01, b'b'];
        let reply = server.passwd_extop(&mut op, Some(out_of_order)).await;
        assert_eq!(reply.code, ResultCode::ProtocolError);
        assert_eq!(reply.text.as_deref(), Some(MSG_DECODING_ERROR));
        assert!(reply.rspdata.is_none());
    }

    #[tokio::test]
    async fn test_passwd_disallowed_fields() {
        let config = ServerConfig {
            allow_target_identity: false,
            ..Default::default()
        };
        let server = PasswdModifyServer::new(
            config,
            BackendSet::new(),
            Arc::new(StaticAccessControls::default()),
        )
        .unwrap();
        let mut op = test_operation(Some("uid=alice,dc=example"), None);

        let req = PasswdModifyRequest {
            identity: Some(b"uid=bob,dc=example".as_slice()),
            ..Default::default()
        };
        let reply = server.passwd_extop(&mut op, Some(req.encode().unwrap().as_slice())).await;
        assert_eq!(reply.code, ResultCode::UnwillingToPerform);
        assert_eq!(reply.text.as_deref(), Some(MSG_ID_NOT_ALLOWED));
    }

    #[tokio::test]
    async fn test_passwd_anonymous() {
        let server = PasswdModifyServer::new(
            ServerConfig::default(),
            BackendSet::new(),
            Arc::new(StaticAccessControls::default()),
        )
        .unwrap();
        let mut op = test_operation(None, None);

        let reply = server.passwd_extop(&mut op, None).await;
        assert_eq!(reply.code, ResultCode::StrongerAuthRequired);
        assert_eq!(reply.text.as_deref(), Some(MSG_AUTH_REQUIRED));
        assert!(op.req_ndn.is_none());
    }
}
