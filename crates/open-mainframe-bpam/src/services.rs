//! Contracts for the external services the pathway consumes.
//!
//! The pathway is a synchronous sequence of blocking calls; every
//! operation either succeeds or reports a [`ServiceFailure`] carrying the
//! failing service's name and codes. Implementations use interior
//! mutability so shared handles can drive them.

use std::sync::Arc;

use crate::error::ServiceFailure;
use crate::grs::GrsResource;
use crate::types::{DatasetMetadata, DeviceToken};

/// Lock acquire/release at cross-system and device granularity.
pub trait LockService {
    /// Acquire the named resource exclusively; fails if busy.
    fn enq_exclusive(&self, resource: &GrsResource) -> Result<(), ServiceFailure>;

    /// Release the named resource. Releasing a resource this caller does
    /// not hold must succeed as a no-op.
    fn deq(&self, resource: &GrsResource) -> Result<(), ServiceFailure>;

    /// Acquire the device-level lock for the resource on a device;
    /// fails if busy.
    fn reserve(&self, resource: &GrsResource, device: DeviceToken) -> Result<(), ServiceFailure>;

    /// Release the device-level lock. Same no-op guarantee as [`deq`].
    ///
    /// [`deq`]: LockService::deq
    fn release(&self, resource: &GrsResource, device: DeviceToken) -> Result<(), ServiceFailure>;
}

/// Dataset media access: attribute snapshot, open/write/close, and the
/// member directory pair.
pub trait MediaService {
    /// Fetch the attribute snapshot for a logical name. Validation is the
    /// pathway's job, not the service's.
    fn read_metadata(&self, ddname: &str) -> Result<DatasetMetadata, ServiceFailure>;

    /// Open the dataset bound to `ddname` for member output.
    fn open_output(&self, ddname: &str, member: &str) -> Result<(), ServiceFailure>;

    /// Write one physical block. The block's length is the number of
    /// bytes to transfer; a partial final block is shorter than the
    /// dataset block size.
    fn write_block(&self, ddname: &str, block: &[u8]) -> Result<(), ServiceFailure>;

    /// Close the open dataset.
    fn close(&self, ddname: &str) -> Result<(), ServiceFailure>;

    /// Look up a member's raw directory entry bytes, if present.
    fn directory_read(&self, ddname: &str, member: &str)
        -> Result<Option<Vec<u8>>, ServiceFailure>;

    /// Atomically rewrite a member's directory entry from its encoded
    /// form. All-or-nothing: on failure the directory is unchanged.
    fn directory_store(&self, ddname: &str, entry: &[u8]) -> Result<(), ServiceFailure>;
}

// Shared handles delegate, so one lock manager or store can serve
// several writers.

impl<S: LockService + ?Sized> LockService for Arc<S> {
    fn enq_exclusive(&self, resource: &GrsResource) -> Result<(), ServiceFailure> {
        (**self).enq_exclusive(resource)
    }

    fn deq(&self, resource: &GrsResource) -> Result<(), ServiceFailure> {
        (**self).deq(resource)
    }

    fn reserve(&self, resource: &GrsResource, device: DeviceToken) -> Result<(), ServiceFailure> {
        (**self).reserve(resource, device)
    }

    fn release(&self, resource: &GrsResource, device: DeviceToken) -> Result<(), ServiceFailure> {
        (**self).release(resource, device)
    }
}

impl<S: MediaService + ?Sized> MediaService for Arc<S> {
    fn read_metadata(&self, ddname: &str) -> Result<DatasetMetadata, ServiceFailure> {
        (**self).read_metadata(ddname)
    }

    fn open_output(&self, ddname: &str, member: &str) -> Result<(), ServiceFailure> {
        (**self).open_output(ddname, member)
    }

    fn write_block(&self, ddname: &str, block: &[u8]) -> Result<(), ServiceFailure> {
        (**self).write_block(ddname, block)
    }

    fn close(&self, ddname: &str) -> Result<(), ServiceFailure> {
        (**self).close(ddname)
    }

    fn directory_read(
        &self,
        ddname: &str,
        member: &str,
    ) -> Result<Option<Vec<u8>>, ServiceFailure> {
        (**self).directory_read(ddname, member)
    }

    fn directory_store(&self, ddname: &str, entry: &[u8]) -> Result<(), ServiceFailure> {
        (**self).directory_store(ddname, entry)
    }
}
