//! Per operation and per connection state handed in by the surrounding server.

use std::fmt;
use std::sync::{Mutex, PoisonError};

use crate::prelude::*;

/// The request type the operation is currently executing as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Extended,
    Modify,
}

/// Where a modification came from. Backends can use this to recognise a
/// change requested through password modify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ModifyOrigin {
    #[default]
    Client,
    PasswdModify,
}

pub struct Connection {
    pub id: u64,
    /// Local sockets are already trusted by the server.
    pub trusted_transport: bool,
    authz_backend: Mutex<Option<Arc<dyn Backend>>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("trusted_transport", &self.trusted_transport)
            .finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(id: u64) -> Self {
        Connection {
            id,
            trusted_transport: false,
            authz_backend: Mutex::new(None),
        }
    }

    /// Record the backend holding the bound identity, as done on bind.
    pub fn set_authz_backend(&self, be: Option<Arc<dyn Backend>>) {
        *self
            .authz_backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = be;
    }

    /// Copy out the backend of the bound identity. The lock is released before
    /// this returns.
    pub fn authz_backend(&self) -> Option<Arc<dyn Backend>> {
        self.authz_backend
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Debug)]
pub struct Operation {
    pub conn: Arc<Connection>,
    pub opid: u64,
    /// Normalised bound identity, `None` when anonymous.
    pub ndn: Option<Dn>,
    /// Normalised target of the operation once resolved.
    pub req_ndn: Option<Dn>,
    pub tag: OpTag,
    pub origin: ModifyOrigin,
}

impl Operation {
    pub fn new(conn: Arc<Connection>, opid: u64, ndn: Option<Dn>) -> Self {
        Operation {
            conn,
            opid,
            // The root is not a bound identity.
            ndn: ndn.filter(|dn| !dn.is_root()),
            req_ndn: None,
            tag: OpTag::Extended,
            origin: ModifyOrigin::Client,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.ndn.is_some()
    }

    pub fn log_prefix(&self) -> String {
        format!("conn={} op={}", self.conn.id, self.opid)
    }
}
