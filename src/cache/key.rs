//! Function call keys
//!
//! A key is `{prefix}_{body}`, where the body is the canonical JSON encoding
//! of `(identity, args, kwargs)`, or its SHA-512 digest when hashing is on.
//!
//! Canonical means: positional arguments keep their order, every JSON object
//! is written with sorted keys (a `HashMap` argument fingerprints the same
//! regardless of its iteration order), and values JSON would conflate
//! (`None` and `Some(vec![])`, `NaN` and `null`) stay apart or are rejected.

use crate::cache::{canonical::to_canonical, types::CacheKey};
use crate::config::CacheSettings;
use crate::error::Result;
use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha512};
use std::fmt;
use tracing::debug;

/// Name of the computation being cached
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallIdentity {
    /// Qualified function name
    pub name: String,

    /// Type defining the function, for methods
    pub type_name: Option<String>,
}

impl CallIdentity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: None,
        }
    }

    /// Identity of a function item, named after its Rust path
    ///
    /// Closures get compiler-generated names; name them explicitly with
    /// [`CallIdentity::new`] when keys must stay stable across builds.
    pub fn of<F>(_f: &F) -> Self {
        Self::new(std::any::type_name::<F>())
    }

    /// Set the defining type, distinguishing same-named methods
    pub fn with_type(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Identity component of the key
    fn qualified(&self, type_safe: bool) -> String {
        if type_safe {
            format!("{}_{}", self.name, self.type_name.as_deref().unwrap_or("fn"))
        } else {
            self.name.clone()
        }
    }
}

impl fmt::Display for CallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_name {
            Some(type_name) => write!(f, "{}::{}", type_name, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Generates cache keys from a call identity and its arguments
#[derive(Debug, Clone)]
pub struct KeyGenerator {
    prefix: String,
    hashing: bool,
    type_safe: bool,
}

impl KeyGenerator {
    /// Generator with hashing on and type safety off
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        debug!("Initializing KeyGenerator with prefix {}", prefix);

        Self {
            prefix,
            hashing: true,
            type_safe: false,
        }
    }

    /// Generator prefixed with the configured service name
    pub fn from_settings(settings: &CacheSettings) -> Self {
        Self::new(settings.service_name.clone())
    }

    /// Digest the serialized call with SHA-512 (default: on)
    pub fn with_hashing(mut self, hashing: bool) -> Self {
        self.hashing = hashing;
        self
    }

    /// Include the defining type in the identity (default: off)
    pub fn with_type_safe(mut self, type_safe: bool) -> Self {
        self.type_safe = type_safe;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Key for a call with positional arguments only
    pub fn generate_args<A>(&self, identity: &CallIdentity, args: &A) -> Result<CacheKey>
    where
        A: Serialize + ?Sized,
    {
        self.generate(identity, args, &())
    }

    /// Key for a call
    ///
    /// `args` is a tuple of positional arguments (`()` means none); `kwargs`
    /// is a map or struct of keyword arguments (`()` means none). Both are
    /// encoded as they are, so any other `Serialize` value works too.
    pub fn generate<A, K>(&self, identity: &CallIdentity, args: &A, kwargs: &K) -> Result<CacheKey>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        self.generate_skipping(identity, args, kwargs, 0)
    }

    /// Key for a call, leaving the first `skip` positional arguments out of
    /// the fingerprint (a receiver, typically)
    ///
    /// `args` that do not encode to a sequence count as a single argument.
    pub(crate) fn generate_skipping<A, K>(
        &self,
        identity: &CallIdentity,
        args: &A,
        kwargs: &K,
        skip: usize,
    ) -> Result<CacheKey>
    where
        A: Serialize + ?Sized,
        K: Serialize + ?Sized,
    {
        let args = match (to_canonical(args)?, skip) {
            (args, 0) => args,
            (Value::Array(items), _) => Value::Array(items.into_iter().skip(skip).collect()),
            (_, _) => Value::Array(Vec::new()),
        };
        let kwargs = to_canonical(kwargs)?;

        let call = Value::Array(vec![
            Value::String(identity.qualified(self.type_safe)),
            args,
            kwargs,
        ]);
        let body = serde_json::to_vec(&call)?;
        debug!("intermediate key: {}", String::from_utf8_lossy(&body));

        let body = if self.hashing {
            Sha512::digest(&body).to_vec()
        } else {
            body
        };

        let mut key = Vec::with_capacity(self.prefix.len() + 1 + body.len());
        key.extend_from_slice(self.prefix.as_bytes());
        key.push(b'_');
        key.extend_from_slice(&body);
        Ok(key)
    }
}
