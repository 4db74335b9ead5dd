//! Host collaborators: device enumeration and the permission gate

use crate::device::DeviceDescriptor;
use crate::driver::Connection;
use crate::error::HostError;

/// Enumerates the USB devices currently attached to the host
pub trait UsbHost: Send + Sync {
    /// Snapshot of attached devices, never cached
    fn list_devices(&self) -> Result<Vec<DeviceDescriptor>, HostError>;
}

/// Called once with the outcome of a permission request
pub type PermissionCallback = Box<dyn FnOnce(bool) + Send + 'static>;

/// Outcome of asking for permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionStatus {
    /// Access was already granted, nothing was requested
    AlreadyGranted,
    /// A request is pending; its result arrives out of band
    RequestSent,
}

/// Host authority deciding whether this process may open a device
pub trait PermissionGate: Send + Sync {
    /// Whether access is currently granted
    fn has_permission(&self, device: &DeviceDescriptor) -> bool;

    /// Ask for access without blocking
    ///
    /// `on_result` fires later, from any thread, once the host grants or
    /// denies the request.
    fn request_permission(&self, device: &DeviceDescriptor, on_result: PermissionCallback);

    /// Open a raw connection to the device
    ///
    /// `None` does not say why: callers re-check [`has_permission`] to tell
    /// a denied permission apart from any other failure.
    ///
    /// [`has_permission`]: PermissionGate::has_permission
    fn open_connection(&self, device: &DeviceDescriptor) -> Option<Box<dyn Connection>>;
}
