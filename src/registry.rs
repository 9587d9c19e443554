//! Platform-neutral view of the IO registry.
//!
//! Backends implement [Registry] over the OS's own primitives; the enumeration code only
//! ever talks to this trait. Every handle a backend hands out is an owned value that
//! releases its underlying reference when dropped, so a handle can't leak or be released
//! twice, no matter which path we leave a scope by.

use crate::error::UsbResult;

/// Identifier of a registry entry; unique for the lifetime of the entry.
pub type RegistryId = u64;

/// The generic service graph.
pub const SERVICE_PLANE: &str = "IOService";

/// The USB topology graph.
pub const USB_PLANE: &str = "IOUSB";

/// Class name matched to find USB host controllers.
pub const USB_CONTROLLER_CLASS: &str = "IOUSBController";

/// Registry property keys.
pub mod keys {
    pub const VENDOR_NAME: &str = "USB Vendor Name";
    pub const VENDOR_ID: &str = "idVendor";
    pub const PRODUCT_ID: &str = "idProduct";
    pub const SERIAL_NUMBER: &str = "USB Serial Number";
    pub const PROPERTY_MATCH: &str = "IOPropertyMatch";
    pub const LOCATION_ID: &str = "locationID";
    pub const PCI_VENDOR_ID: &str = "vendor-id";
    pub const PCI_DEVICE_ID: &str = "device-id";
}

/// Minimal typed access to an IO registry.
pub trait Registry {
    /// An owned reference to a registry entry.
    type Entry;

    /// An owned reference to a property value.
    type Value;

    /// Iterator over entries; owns (and eventually releases) the underlying iterator object.
    type Iter: Iterator<Item = Self::Entry>;

    /// Returns the absolute root of the registry.
    fn root(&self) -> UsbResult<Self::Entry>;

    /// Returns the registry-wide unique ID of an entry.
    fn registry_id(&self, entry: &Self::Entry) -> UsbResult<RegistryId>;

    /// Returns the short name of an entry (e.g. "AppleUSBXHCI").
    fn name(&self, entry: &Self::Entry) -> UsbResult<String>;

    /// Iterates over every service that is an instance of the given class.
    fn services_of_class(&self, class_name: &str) -> UsbResult<Self::Iter>;

    /// Iterates over every service whose property `key` equals `value`.
    fn services_with_property(&self, key: &str, value: &Self::Value) -> UsbResult<Self::Iter>;

    /// Iterates over the direct children of an entry in the given plane.
    fn children(&self, entry: &Self::Entry, plane: &str) -> UsbResult<Self::Iter>;

    /// Returns the parent of an entry in the given plane; or None if the entry
    /// isn't attached in that plane at all.
    fn parent(&self, entry: &Self::Entry, plane: &str) -> UsbResult<Option<Self::Entry>>;

    /// Fetches a property of an entry, if it has one.
    fn property(&self, entry: &Self::Entry, key: &str) -> Option<Self::Value>;

    /// Reads a value as a string; None if it isn't one.
    fn as_string(&self, value: &Self::Value) -> Option<String>;

    /// Reads a value as a signed 64-bit number; None if it isn't one.
    fn as_number(&self, value: &Self::Value) -> Option<i64>;

    /// Reads a value as raw bytes; None if it isn't a data blob.
    fn as_data(&self, value: &Self::Value) -> Option<Vec<u8>>;
}
