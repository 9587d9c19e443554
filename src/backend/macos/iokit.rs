//! Helpers for working with IOKit and CoreFoundation.

use std::{
    ffi::{c_void, CStr, CString},
    os::raw::c_char,
};

use core_foundation_sys::{
    base::{CFGetTypeID, CFRelease, CFTypeRef},
    data::{CFDataGetBytePtr, CFDataGetLength, CFDataGetTypeID, CFDataRef},
    dictionary::CFDictionaryRef,
    number::{kCFNumberSInt64Type, CFNumberGetTypeID, CFNumberGetValue, CFNumberRef},
    string::{
        kCFStringEncodingUTF8, CFStringGetCString, CFStringGetCStringPtr, CFStringGetLength,
        CFStringGetMaximumSizeForEncoding, CFStringGetTypeID, CFStringRef,
    },
};
use io_kit_sys::{
    kIOMasterPortDefault, ret::*, types::io_iterator_t, IOIteratorNext, IOObjectRelease,
    IORegistryEntryGetName, IOServiceGetMatchingServices,
};
use log::error;

use crate::error::{Error, UsbResult};

/// Size of an io_name_t, which is a char[128].
const IO_NAME_LENGTH: usize = 128;

//
// Wrappers around IOKit types.
//

/// Wrapper for an IOKit IO-object that automatically drops it.
#[derive(Debug)]
pub(crate) struct IoObject {
    object: u32,
}

impl IoObject {
    pub(crate) fn new(object: u32) -> Self {
        IoObject { object }
    }

    /// Fetches the inner handle for passing to IOKit functions.
    pub(crate) fn get(&self) -> u32 {
        self.object
    }

    /// Returns true iff the object has been created incorrectly.
    /// Use to maintain internal consistency.
    pub(crate) fn is_invalid(&self) -> bool {
        self.object == 0
    }
}

impl Drop for IoObject {
    fn drop(&mut self) {
        if self.is_invalid() {
            return;
        }

        unsafe {
            IOObjectRelease(self.object);
        }
    }
}

/// Wrapper around an io_iterator_t; yields each object it produces as an owned [IoObject].
#[derive(Debug)]
pub(crate) struct IoIterator {
    iterator: IoObject,
}

impl IoIterator {
    pub(crate) fn new(iterator: io_iterator_t) -> Self {
        Self {
            iterator: IoObject::new(iterator),
        }
    }
}

impl Iterator for IoIterator {
    type Item = IoObject;

    fn next(&mut self) -> Option<IoObject> {
        // A null iterator is what IOKit gives us when nothing matched.
        if self.iterator.is_invalid() {
            return None;
        }

        match unsafe { IOIteratorNext(self.iterator.get()) } {
            0 => None,
            object => Some(IoObject::new(object)),
        }
    }
}

/// Wrapper around a CoreFoundation object we own a reference to; releases it on drop.
#[derive(Debug)]
pub(crate) struct CfType {
    object: CFTypeRef,
}

impl CfType {
    /// Takes ownership of an object returned by a Create or Copy function.
    /// Returns None if we were handed a null pointer.
    pub(crate) fn from_create_rule(object: CFTypeRef) -> Option<Self> {
        if object.is_null() {
            None
        } else {
            Some(Self { object })
        }
    }

    /// Fetches the inner pointer for passing to CoreFoundation functions.
    pub(crate) fn get(&self) -> CFTypeRef {
        self.object
    }

    /// Gives our reference away to a function that consumes it.
    pub(crate) fn into_raw(self) -> CFTypeRef {
        let object = self.object;
        std::mem::forget(self);
        object
    }

    /// Returns true iff the object is of the CoreFoundation type with the given ID.
    fn is_a(&self, type_id: core_foundation_sys::base::CFTypeID) -> bool {
        unsafe { CFGetTypeID(self.object) == type_id }
    }

    pub(crate) fn is_string(&self) -> bool {
        self.is_a(unsafe { CFStringGetTypeID() })
    }

    pub(crate) fn is_number(&self) -> bool {
        self.is_a(unsafe { CFNumberGetTypeID() })
    }

    pub(crate) fn is_data(&self) -> bool {
        self.is_a(unsafe { CFDataGetTypeID() })
    }
}

impl Drop for CfType {
    fn drop(&mut self) {
        unsafe {
            CFRelease(self.object);
        }
    }
}

//
// Helpers for working with CoreFoundation / IOKit types.
//

/// Rustified version of the CFSTR C macro.
macro_rules! cfstr {
    ($string:expr) => {{
        let cstr = std::ffi::CString::new($string).unwrap();
        io_kit_sys::CFSTR(cstr.as_ptr())
    }};
}
pub(crate) use cfstr;

/// Converts a plane or class name into something we can hand to IOKit.
pub(crate) fn c_string(name: &str) -> UsbResult<CString> {
    CString::new(name).map_err(|_| Error::Internal(format!("{:?} contains a NUL byte", name)))
}

// Extend UsbResult with IOKit conversions.
pub(crate) trait IOKitEmptyResultExtension {
    fn from_registry_return(
        io_return: IOReturn,
        operation: &'static str,
        handle: u32,
    ) -> UsbResult<()>;
}

impl IOKitEmptyResultExtension for UsbResult<()> {
    /// Creates a UsbResult from an IOKit return code, noting what we were doing when it failed.
    fn from_registry_return(
        io_return: IOReturn,
        operation: &'static str,
        handle: u32,
    ) -> UsbResult<()> {
        if io_return != kIOReturnSuccess {
            Err(Error::OsError {
                operation,
                handle,
                code: io_return as i64,
            })
        } else {
            Ok(())
        }
    }
}

/// Hands a matching dictionary to IOKit, and returns an iterator over the services it matched.
///
/// IOKit consumes the caller's reference to the dictionary, whether or not this succeeds.
pub(crate) fn get_matching_services(matcher: CFDictionaryRef) -> UsbResult<IoIterator> {
    unsafe {
        let mut raw_iterator: io_iterator_t = 0;
        let rc = IOServiceGetMatchingServices(kIOMasterPortDefault, matcher, &mut raw_iterator);
        if rc != kIOReturnSuccess {
            error!("IOServiceGetMatchingServices failed with {:#x}", rc);
            return Err(Error::RegistryUnavailable {
                operation: "IOServiceGetMatchingServices",
            });
        }

        Ok(IoIterator::new(raw_iterator))
    }
}

/// Reads an entry's short name, which IOKit hands us in an io_name_t.
pub(crate) fn get_entry_name(entry: &IoObject) -> UsbResult<String> {
    let mut buffer: [c_char; IO_NAME_LENGTH] = [0; IO_NAME_LENGTH];

    UsbResult::from_registry_return(
        unsafe { IORegistryEntryGetName(entry.get(), buffer.as_mut_ptr()) },
        "IORegistryEntryGetName",
        entry.get(),
    )?;

    // Make sure we're terminated even if IOKit filled the whole buffer.
    buffer[IO_NAME_LENGTH - 1] = 0;
    let name = unsafe { CStr::from_ptr(buffer.as_ptr()) };
    Ok(name.to_string_lossy().into_owned())
}

/// Converts a CFNumberRef to a Rust integer.
pub(crate) fn number_from_cf_number(number_ref: CFNumberRef) -> Option<i64> {
    unsafe {
        let mut result: i64 = 0;

        let succeeded = CFNumberGetValue(
            number_ref,
            kCFNumberSInt64Type,
            &mut result as *mut i64 as *mut c_void,
        );
        if !succeeded {
            error!("Failed to convert a NumberRef into a 64-bit integer!");
            return None;
        }

        Some(result)
    }
}

/// Converts a raw CFString into a Rust string.
pub(crate) fn string_from_cf_string(string_ref: CFStringRef) -> Option<String> {
    unsafe {
        // If CoreFoundation already has a UTF-8 copy around, just borrow it...
        let c_string = CFStringGetCStringPtr(string_ref, kCFStringEncodingUTF8);
        if !c_string.is_null() {
            return Some(CStr::from_ptr(c_string).to_string_lossy().into_owned());
        }

        // ... otherwise, have it transcode into a buffer of ours.
        let length = CFStringGetLength(string_ref);
        let capacity = CFStringGetMaximumSizeForEncoding(length, kCFStringEncodingUTF8) + 1;
        let mut buffer: Vec<c_char> = vec![0; capacity as usize];

        let succeeded = CFStringGetCString(
            string_ref,
            buffer.as_mut_ptr(),
            capacity,
            kCFStringEncodingUTF8,
        );
        if succeeded == 0 {
            error!("Failed to convert a CFString into UTF-8!");
            return None;
        }

        Some(CStr::from_ptr(buffer.as_ptr()).to_string_lossy().into_owned())
    }
}

/// Copies the bytes out of a CFData.
pub(crate) fn bytes_from_cf_data(data_ref: CFDataRef) -> Vec<u8> {
    unsafe {
        let length = CFDataGetLength(data_ref);
        let bytes = CFDataGetBytePtr(data_ref);
        if length <= 0 || bytes.is_null() {
            return vec![];
        }

        std::slice::from_raw_parts(bytes, length as usize).to_vec()
    }
}
