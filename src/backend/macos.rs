//! Core, low-level functionality for macOS: the IO registry, as seen through IOKit.

use std::{ffi::c_void, os::raw::c_char};

use core_foundation_sys::{
    base::{kCFAllocatorDefault, CFTypeRef},
    dictionary::{
        kCFTypeDictionaryKeyCallBacks, kCFTypeDictionaryValueCallBacks,
        CFDictionaryCreateMutable, CFDictionaryRef, CFDictionarySetValue,
        CFMutableDictionaryRef,
    },
};
use io_kit_sys::{
    kIOMasterPortDefault,
    ret::kIOReturnNoDevice,
    types::{io_iterator_t, io_registry_entry_t},
    IORegistryEntryCreateCFProperty, IORegistryEntryGetChildIterator,
    IORegistryEntryGetParentEntry, IORegistryEntryGetRegistryEntryID, IORegistryGetRootEntry,
    IOServiceMatching,
};

use self::iokit::{
    bytes_from_cf_data, c_string, cfstr, get_entry_name, get_matching_services,
    number_from_cf_number, string_from_cf_string, CfType, IOKitEmptyResultExtension, IoIterator,
    IoObject,
};
use crate::error::{Error, UsbResult};
use crate::registry::{keys, Registry, RegistryId};

mod iokit;

/// The live IO registry of the machine we're running on.
///
/// Holds no state of its own; every call goes straight to IOKit.
#[derive(Debug, Default)]
pub(crate) struct IoKitRegistry {}

impl IoKitRegistry {
    pub(crate) fn new() -> IoKitRegistry {
        IoKitRegistry {}
    }
}

/// Creates an empty CFMutableDictionary that retains its keys and values.
fn create_dictionary() -> UsbResult<CfType> {
    let dictionary = unsafe {
        CFDictionaryCreateMutable(
            kCFAllocatorDefault,
            0,
            &kCFTypeDictionaryKeyCallBacks,
            &kCFTypeDictionaryValueCallBacks,
        )
    };

    CfType::from_create_rule(dictionary as CFTypeRef).ok_or(Error::RegistryUnavailable {
        operation: "CFDictionaryCreateMutable",
    })
}

impl Registry for IoKitRegistry {
    type Entry = IoObject;
    type Value = CfType;
    type Iter = IoIterator;

    fn root(&self) -> UsbResult<IoObject> {
        let root = IoObject::new(unsafe { IORegistryGetRootEntry(kIOMasterPortDefault) });
        if root.is_invalid() {
            return Err(Error::RegistryUnavailable {
                operation: "IORegistryGetRootEntry",
            });
        }

        Ok(root)
    }

    fn registry_id(&self, entry: &IoObject) -> UsbResult<RegistryId> {
        let mut id: u64 = 0;

        UsbResult::from_registry_return(
            unsafe { IORegistryEntryGetRegistryEntryID(entry.get(), &mut id) },
            "IORegistryEntryGetRegistryEntryID",
            entry.get(),
        )?;

        Ok(id)
    }

    fn name(&self, entry: &IoObject) -> UsbResult<String> {
        get_entry_name(entry)
    }

    fn services_of_class(&self, class_name: &str) -> UsbResult<IoIterator> {
        let class_name = c_string(class_name)?;

        unsafe {
            // Create a dictionary containing the object-type we want to match...
            let matcher = IOServiceMatching(class_name.as_ptr());
            if matcher.is_null() {
                return Err(Error::RegistryUnavailable {
                    operation: "IOServiceMatching",
                });
            }

            // ... and convert that dictionary into a match-iterator.
            get_matching_services(matcher as CFDictionaryRef)
        }
    }

    fn services_with_property(&self, key: &str, value: &CfType) -> UsbResult<IoIterator> {
        // We're building { "IOPropertyMatch": { key: value } }.
        let property = create_dictionary()?;
        let matcher = create_dictionary()?;

        unsafe {
            CFDictionarySetValue(
                property.get() as CFMutableDictionaryRef,
                cfstr!(key) as *const c_void,
                value.get(),
            );
            CFDictionarySetValue(
                matcher.get() as CFMutableDictionaryRef,
                cfstr!(keys::PROPERTY_MATCH) as *const c_void,
                property.get(),
            );
        }

        // The matcher now holds its own reference to the inner dictionary, which we
        // drop on the way out; the matcher itself is consumed by IOKit.
        get_matching_services(matcher.into_raw() as CFDictionaryRef)
    }

    fn children(&self, entry: &IoObject, plane: &str) -> UsbResult<IoIterator> {
        let plane = c_string(plane)?;
        let mut raw_iterator: io_iterator_t = 0;

        UsbResult::from_registry_return(
            unsafe {
                IORegistryEntryGetChildIterator(
                    entry.get(),
                    plane.as_ptr() as *mut c_char,
                    &mut raw_iterator,
                )
            },
            "IORegistryEntryGetChildIterator",
            entry.get(),
        )?;

        Ok(IoIterator::new(raw_iterator))
    }

    fn parent(&self, entry: &IoObject, plane: &str) -> UsbResult<Option<IoObject>> {
        let plane = c_string(plane)?;
        let mut raw_parent: io_registry_entry_t = 0;

        let rc = unsafe {
            IORegistryEntryGetParentEntry(
                entry.get(),
                plane.as_ptr() as *mut c_char,
                &mut raw_parent,
            )
        };

        // IOKit reports "no device" for entries that simply aren't in the given plane.
        if rc == kIOReturnNoDevice {
            return Ok(None);
        }
        UsbResult::from_registry_return(rc, "IORegistryEntryGetParentEntry", entry.get())?;

        let parent = IoObject::new(raw_parent);
        if parent.is_invalid() {
            return Ok(None);
        }

        Ok(Some(parent))
    }

    fn property(&self, entry: &IoObject, key: &str) -> Option<CfType> {
        let value = unsafe {
            IORegistryEntryCreateCFProperty(entry.get(), cfstr!(key), kCFAllocatorDefault, 0)
        };

        CfType::from_create_rule(value)
    }

    fn as_string(&self, value: &CfType) -> Option<String> {
        if !value.is_string() {
            return None;
        }

        string_from_cf_string(value.get() as _)
    }

    fn as_number(&self, value: &CfType) -> Option<i64> {
        if !value.is_number() {
            return None;
        }

        number_from_cf_number(value.get() as _)
    }

    fn as_data(&self, value: &CfType) -> Option<Vec<u8>> {
        if !value.is_data() {
            return None;
        }

        Some(bytes_from_cf_data(value.get() as _))
    }
}
