//! Every error that can occur while walking the USB topology.

/// Alias to simplify implementing the results of usbtree functions.
pub type UsbResult<T> = Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The registry root, or an iterator over matching services, could not be obtained.
    RegistryUnavailable { operation: &'static str },

    /// A property was present, but wasn't the kind of object we expected it to be.
    PropertyDecodeFailed {
        key: String,
        expected: &'static str,
    },

    /// A registry primitive failed; carries the failing operation and the handle it was given.
    OsError {
        operation: &'static str,
        handle: u32,
        code: i64,
    },

    /// Something the registry guarantees turned out not to hold.
    Internal(String),

    /// Error for when no devices are found that match a given selector.
    DeviceNotFound,

    /// There's no registry backend for the platform we're running on.
    UnsupportedPlatform,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use Error::*;

        match self {
            RegistryUnavailable { operation } => {
                write!(f, "IO registry unavailable ({} failed)", operation)?
            }
            PropertyDecodeFailed { key, expected } => {
                write!(f, "registry property '{}' was not a {}", key, expected)?
            }
            OsError {
                operation,
                handle,
                code,
            } => write!(
                f,
                "registry operation {} failed on handle {:#x} with error {:#x}",
                operation, handle, code
            )?,
            Internal(reason) => write!(f, "internal inconsistency: {}", reason)?,
            DeviceNotFound => write!(f, "no device found")?,
            UnsupportedPlatform => write!(f, "USB topology enumeration isn't supported here")?,
        }

        Ok(())
    }
}

impl std::error::Error for Error {}
