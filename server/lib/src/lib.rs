//! The password modify server library. This implements the LDAP Password Modify
//! extended operation: identity and backend resolution, authorisation, old
//! password verification, new password hashing and the final modification.

#![deny(warnings)]
#![warn(unused_extern_crates)]
// Enable some groups of clippy lints.
#![deny(clippy::suspicious)]
#![deny(clippy::perf)]
// Specific lints to enforce.
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::await_holding_lock)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::trivially_copy_pass_by_ref)]
#![deny(clippy::manual_let_else)]
#![allow(clippy::unreachable)]

#[macro_use]
extern crate tracing;

pub mod access;
pub mod be;
pub mod config;
pub mod constants;
pub mod credential;
pub mod dn;
pub mod idm;
pub mod modify;
pub mod op;
pub mod policy;
pub mod testkit;

/// A prelude of imports that should be imported by all other modules to
/// help make imports cleaner.
pub mod prelude {
    pub use pwmod_lib_crypto::HashSchemeRegistry;
    pub use pwmod_proto::constants::*;
    pub use pwmod_proto::internal::{
        BackendError, DecodeError, PasswdModifyError, PasswdModifyReply, ReferralSet, ResultCode,
    };
    pub use sketching::{
        admin_debug, admin_error, admin_info, admin_warn, request_error, request_info,
        request_trace, request_warn, security_access, security_critical, security_error,
        security_info, tagged_event, EventTag,
    };
    pub use std::sync::Arc;

    pub use crate::access::{AccessControls, AccessPurpose};
    pub use crate::be::{Backend, BackendSet, ExtendedOpResult, ExtendedRequest};
    pub use crate::config::ServerConfig;
    pub use crate::constants::*;
    pub use crate::credential::{CredentialVerifier, StoredCredential, VerifyError};
    pub use crate::dn::Dn;
    pub use crate::modify::{Modify, ModifyList};
    pub use crate::op::{Connection, ModifyOrigin, OpTag, Operation};
    pub use crate::policy::{PasswordPolicy, PolicyContext};
}
