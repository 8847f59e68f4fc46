//! Resource serialization: lock resources and an in-memory manager.
//!
//! Two locks protect a member write: a cross-system exclusive lock on the
//! dataset+member resource, and a device-level reserve on the volume that
//! guards against writers outside the cross-system sharing scope. The
//! pathway requests both conditionally: a busy resource is surfaced to
//! the caller, never waited on.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ServiceFailure;
use crate::services::LockService;
use crate::types::DeviceToken;

/// Lock class for the cross-system member lock.
pub const QNAME_MEMBER: &str = "SPFEDIT";
/// Lock class for the device-level volume lock.
pub const QNAME_VOLUME: &str = "SYSVTOC";

/// Sharing scope of a lock resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GrsScope {
    /// Within the current address space.
    Step,
    /// System-wide.
    System,
    /// All cooperating systems sharing the catalog view.
    Systems,
}

/// A serialization resource: queue name, resource name, scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GrsResource {
    /// Queue name (lock class, 1-8 characters).
    pub qname: String,
    /// Resource name (1-255 characters).
    pub rname: String,
    /// Sharing scope.
    pub scope: GrsScope,
}

impl GrsResource {
    /// Create a resource identifier.
    pub fn new(qname: &str, rname: &str, scope: GrsScope) -> Self {
        Self {
            qname: qname.to_string(),
            rname: rname.to_string(),
            scope,
        }
    }
}

impl std::fmt::Display for GrsResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.qname, self.rname.trim_end())
    }
}

/// Cross-system member resource: 44-byte padded dataset name followed by
/// the 8-byte padded member name, under the SPFEDIT class.
pub fn member_resource(dsname: &str, member: &str) -> GrsResource {
    let rname = format!(
        "{:<44}{:<8}",
        dsname.trim().to_uppercase(),
        member.trim().to_uppercase()
    );
    GrsResource::new(QNAME_MEMBER, &rname, GrsScope::Systems)
}

/// Device-level volume resource keyed by the dataset name.
pub fn volume_resource(dsname: &str) -> GrsResource {
    GrsResource::new(QNAME_VOLUME, &dsname.trim().to_uppercase(), GrsScope::Systems)
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum LockKey {
    Named(GrsResource),
    Device(GrsResource, DeviceToken),
}

/// In-memory exclusive lock manager.
///
/// Grants are immediate or refused: there is no wait queue, because the
/// write pathway takes every lock conditionally and reports a busy
/// resource to its caller.
#[derive(Debug, Default)]
pub struct GrsManager {
    held: DashMap<LockKey, ()>,
}

impl GrsManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the named resource is currently held.
    pub fn is_held(&self, resource: &GrsResource) -> bool {
        self.held.contains_key(&LockKey::Named(resource.clone()))
    }

    /// Whether the device-qualified resource is currently held.
    pub fn is_device_held(&self, resource: &GrsResource, device: DeviceToken) -> bool {
        self.held
            .contains_key(&LockKey::Device(resource.clone(), device))
    }

    /// Number of locks currently held.
    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    fn try_grant(&self, key: LockKey, service: &str, label: &GrsResource) -> Result<(), ServiceFailure> {
        match self.held.entry(key) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                debug!(resource = %label, service, "resource busy");
                Err(ServiceFailure::with_msg(
                    service,
                    4,
                    0x0404,
                    format!("resource {label} is busy"),
                ))
            }
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(());
                debug!(resource = %label, service, "exclusive grant");
                Ok(())
            }
        }
    }
}

impl LockService for GrsManager {
    fn enq_exclusive(&self, resource: &GrsResource) -> Result<(), ServiceFailure> {
        self.try_grant(LockKey::Named(resource.clone()), "ENQ", resource)
    }

    fn deq(&self, resource: &GrsResource) -> Result<(), ServiceFailure> {
        self.held.remove(&LockKey::Named(resource.clone()));
        Ok(())
    }

    fn reserve(&self, resource: &GrsResource, device: DeviceToken) -> Result<(), ServiceFailure> {
        self.try_grant(LockKey::Device(resource.clone(), device), "RESERVE", resource)
    }

    fn release(&self, resource: &GrsResource, device: DeviceToken) -> Result<(), ServiceFailure> {
        self.held.remove(&LockKey::Device(resource.clone(), device));
        Ok(())
    }
}
