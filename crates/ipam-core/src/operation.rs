//! Allocation requests and their results

use std::fmt;
use std::net::Ipv4Addr;

/// Resource an operation was issued for, carried through to its result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ResourceRef {
    /// Resource name
    pub name: String,
    /// Resource namespace
    pub namespace: String,
}

impl ResourceRef {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What an operation does to its binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Bind an address, or confirm the existing binding
    Create,
    /// Release the binding if there is one
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Create => "create",
            OperationKind::Delete => "delete",
        }
    }
}

/// A single allocation request.
///
/// `host_name` bindings get a DNS record, `key` bindings are headless.
/// `explicit_address` is only set when replaying a binding that was
/// already recorded in a resource's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Resource the result is written back to
    pub correlation: ResourceRef,
    pub kind: OperationKind,
    /// DNS host name of the binding
    pub host_name: Option<String>,
    /// Opaque key of a headless binding
    pub key: Option<String>,
    /// Pool label or CIDR
    pub pool: String,
    /// Address recorded in status, replayed as-is
    pub explicit_address: Option<String>,
}

impl Operation {
    pub fn create(correlation: ResourceRef, host_name: Option<&str>, key: Option<&str>, pool: &str) -> Self {
        Self::new(OperationKind::Create, correlation, host_name, key, pool)
    }

    /// Create that re-asserts a previously recorded address
    pub fn replay(
        correlation: ResourceRef,
        host_name: Option<&str>,
        key: Option<&str>,
        pool: &str,
        address: &str,
    ) -> Self {
        let mut op = Self::create(correlation, host_name, key, pool);
        op.explicit_address = Some(address.to_string()).filter(|a| !a.is_empty());
        op
    }

    pub fn delete(correlation: ResourceRef, host_name: Option<&str>, key: Option<&str>, pool: &str) -> Self {
        Self::new(OperationKind::Delete, correlation, host_name, key, pool)
    }

    fn new(
        kind: OperationKind,
        correlation: ResourceRef,
        host_name: Option<&str>,
        key: Option<&str>,
        pool: &str,
    ) -> Self {
        let owned = |v: Option<&str>| v.filter(|s| !s.is_empty()).map(str::to_string);
        Self {
            correlation,
            kind,
            host_name: owned(host_name),
            key: owned(key),
            pool: pool.to_string(),
            explicit_address: None,
        }
    }

    /// Reference the binding is stored under: the key when set, otherwise the host name.
    pub fn reference(&self) -> Option<&str> {
        self.key.as_deref().or(self.host_name.as_deref())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} host={} key={} pool={}",
            self.kind.as_str(),
            self.host_name.as_deref().unwrap_or("-"),
            self.key.as_deref().unwrap_or("-"),
            self.pool
        )?;
        if let Some(addr) = &self.explicit_address {
            write!(f, " address={}", addr)?;
        }
        Ok(())
    }
}

/// Outcome of an [`Operation`].
///
/// `address` is `None` on failure and on every delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpamResult {
    pub operation: Operation,
    pub address: Option<Ipv4Addr>,
    pub succeeded: bool,
}

impl IpamResult {
    pub fn success(operation: Operation, address: Option<Ipv4Addr>) -> Self {
        Self {
            operation,
            address,
            succeeded: true,
        }
    }

    pub fn failure(operation: Operation) -> Self {
        Self {
            operation,
            address: None,
            succeeded: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_prefers_key() {
        let owner = ResourceRef::new("ipam", "kube-system");
        let op = Operation::create(owner.clone(), Some("foo.com"), Some("ns/svc"), "dev");
        assert_eq!(op.reference(), Some("ns/svc"));

        let op = Operation::create(owner.clone(), Some("foo.com"), Some(""), "dev");
        assert_eq!(op.reference(), Some("foo.com"));
        assert_eq!(op.key, None);

        let op = Operation::create(owner, None, None, "dev");
        assert_eq!(op.reference(), None);
    }

    #[test]
    fn test_replay_ignores_empty_address() {
        let owner = ResourceRef::new("ipam", "kube-system");
        let op = Operation::replay(owner.clone(), Some("foo.com"), None, "dev", "");
        assert_eq!(op.explicit_address, None);

        let op = Operation::replay(owner, Some("foo.com"), None, "dev", "10.0.0.1");
        assert_eq!(op.explicit_address.as_deref(), Some("10.0.0.1"));
        assert_eq!(op.kind, OperationKind::Create);
    }
}
