//! Serialised access to the system style `crypt` primitive.
//!
//! Traditional `crypt(3)` implementations keep their result in static storage
//! and are not reentrant. Every call into a [`CryptPrimitive`] goes through one
//! process wide lock, held only for the duration of that call.

use std::sync::{Arc, Mutex, Once, PoisonError};

use tracing::{debug, trace};

use crate::crypt_md5::md5_crypt;
use crate::CryptoError;

lazy_static! {
    static ref CRYPT_LOCK: Mutex<()> = Mutex::new(());
}

static CRYPT_INIT: Once = Once::new();

/// Initialise the crypt lock. Safe to call more than once; the lock lives until
/// process exit.
pub fn passwd_init() {
    CRYPT_INIT.call_once(|| {
        lazy_static::initialize(&CRYPT_LOCK);
        debug!("crypt lock initialised");
    });
}

/// A one way `crypt` style function. `setting` is either a bare salt setting
/// such as `$1$abcdefgh$` or a complete previously produced value.
pub trait CryptPrimitive: Send + Sync {
    fn crypt(&self, key: &[u8], setting: &str) -> Option<String>;
}

/// md5-crypt (`$1$`), always available.
#[derive(Debug, Default, Clone, Copy)]
pub struct Md5Crypt;

impl CryptPrimitive for Md5Crypt {
    fn crypt(&self, key: &[u8], setting: &str) -> Option<String> {
        md5_crypt(key, setting)
    }
}

#[derive(Clone)]
pub struct CryptAdapter {
    primitive: Arc<dyn CryptPrimitive>,
}

impl std::fmt::Debug for CryptAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("CryptAdapter").finish_non_exhaustive()
    }
}

impl Default for CryptAdapter {
    fn default() -> Self {
        CryptAdapter::new(Arc::new(Md5Crypt))
    }
}

impl CryptAdapter {
    pub fn new(primitive: Arc<dyn CryptPrimitive>) -> Self {
        passwd_init();
        CryptAdapter { primitive }
    }

    /// Run the primitive under the process wide lock.
    pub fn crypt(&self, key: &[u8], setting: &str) -> Result<String, CryptoError> {
        let result = {
            // The lock guards no data, poisoning is ignored.
            let _guard = CRYPT_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
            self.primitive.crypt(key, setting)
        };

        result.ok_or_else(|| {
            trace!("crypt primitive returned no value");
            CryptoError::PrimitiveFailed(None)
        })
    }
}
