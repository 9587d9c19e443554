//! usbtree -- the USB topology of a macOS machine, as a tree rooted at each host controller.

pub use device::{DeviceSelector, Nodes, UsbNode};
pub use enumeration::enumerate_registry;
pub use error::{Error, UsbResult};
pub use host::{device, devices, enumerate, Host};
pub use registry::{Registry, RegistryId};

pub mod backend;
pub mod device;
pub mod enumeration;
pub mod error;
pub mod host;
pub mod registry;
