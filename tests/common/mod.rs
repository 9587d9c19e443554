//! A simulated IO registry, for driving enumeration without IOKit.
//!
//! Every handle and value it hands out bumps a shared counter that is only
//! decremented when the handle is dropped, so tests can check nothing leaked.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use usbtree::registry::{Registry, RegistryId, SERVICE_PLANE, USB_CONTROLLER_CLASS, USB_PLANE};
use usbtree::{Error, UsbResult};

/// Property values, by kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Property {
    Number(i64),
    String(String),
    Data(Vec<u8>),
}

#[derive(Debug, Default)]
struct FakeEntry {
    id: RegistryId,
    name: String,
    class: Option<String>,
    properties: HashMap<String, Property>,
    service_parent: Option<u32>,
    service_children: Vec<u32>,
    usb_parent: Option<u32>,
}

/// Counts outstanding handles; shared between the registry and everything it hands out.
#[derive(Debug, Clone, Default)]
struct Outstanding(Rc<Cell<i64>>);

impl Outstanding {
    fn acquire(&self) -> Outstanding {
        self.0.set(self.0.get() + 1);
        self.clone()
    }

    fn release(&self) {
        self.0.set(self.0.get() - 1);
    }
}

#[derive(Debug)]
pub struct FakeHandle {
    object: u32,
    outstanding: Outstanding,
}

impl Drop for FakeHandle {
    fn drop(&mut self) {
        self.outstanding.release();
    }
}

#[derive(Debug)]
pub struct FakeValue {
    property: Property,
    outstanding: Outstanding,
}

impl Drop for FakeValue {
    fn drop(&mut self) {
        self.outstanding.release();
    }
}

/// Hands out one handle per step, the way IOIteratorNext does.
#[derive(Debug)]
pub struct FakeIterator {
    remaining: VecDeque<u32>,
    outstanding: Outstanding,
    counter: Outstanding,
}

impl Iterator for FakeIterator {
    type Item = FakeHandle;

    fn next(&mut self) -> Option<FakeHandle> {
        let object = self.remaining.pop_front()?;
        Some(FakeHandle {
            object,
            outstanding: self.counter.acquire(),
        })
    }
}

impl Drop for FakeIterator {
    fn drop(&mut self) {
        self.outstanding.release();
    }
}

/// An in-memory registry. Object handles are indices into `entries`; the root is handle 0.
#[derive(Debug)]
pub struct FakeRegistry {
    entries: Vec<FakeEntry>,
    outstanding: Outstanding,
    failing_names: RefCell<Vec<u32>>,
}

pub const ROOT_ID: RegistryId = 0x1000_0000;

impl FakeRegistry {
    pub fn new() -> Self {
        let root = FakeEntry {
            id: ROOT_ID,
            name: "Root".into(),
            ..Default::default()
        };

        Self {
            entries: vec![root],
            outstanding: Outstanding::default(),
            failing_names: RefCell::new(vec![]),
        }
    }

    pub fn root_handle(&self) -> u32 {
        0
    }

    /// Adds a bare entry, attached nowhere.
    pub fn entry(&mut self, id: RegistryId, name: &str) -> u32 {
        self.entries.push(FakeEntry {
            id,
            name: name.into(),
            ..Default::default()
        });
        (self.entries.len() - 1) as u32
    }

    /// Adds a USB controller.
    pub fn controller(&mut self, id: RegistryId, name: &str) -> u32 {
        let handle = self.entry(id, name);
        self.entries[handle as usize].class = Some(USB_CONTROLLER_CLASS.into());
        handle
    }

    /// Adds a device that the controller sees as an IOService child, with the given IOUSB parent.
    pub fn device(&mut self, id: RegistryId, name: &str, controller: u32, usb_parent: u32) -> u32 {
        let handle = self.entry(id, name);
        self.attach_service(handle, controller);
        self.entries[handle as usize].usb_parent = Some(usb_parent);
        handle
    }

    pub fn attach_service(&mut self, child: u32, parent: u32) {
        self.entries[child as usize].service_parent = Some(parent);
        self.entries[parent as usize].service_children.push(child);
    }

    pub fn set(&mut self, handle: u32, key: &str, value: Property) {
        self.entries[handle as usize]
            .properties
            .insert(key.into(), value);
    }

    /// Makes reading the name of the given entry fail.
    pub fn fail_name(&self, handle: u32) {
        self.failing_names.borrow_mut().push(handle);
    }

    /// Number of handles, iterators, and values currently held by callers.
    pub fn outstanding(&self) -> i64 {
        self.outstanding.0.get()
    }

    fn handle(&self, object: u32) -> FakeHandle {
        FakeHandle {
            object,
            outstanding: self.outstanding.acquire(),
        }
    }

    fn iterator(&self, objects: impl IntoIterator<Item = u32>) -> FakeIterator {
        FakeIterator {
            remaining: objects.into_iter().collect(),
            outstanding: self.outstanding.acquire(),
            counter: self.outstanding.clone(),
        }
    }

    fn lookup(&self, handle: &FakeHandle, operation: &'static str) -> UsbResult<&FakeEntry> {
        self.entries
            .get(handle.object as usize)
            .ok_or(Error::OsError {
                operation,
                handle: handle.object,
                code: -1,
            })
    }
}

impl Registry for FakeRegistry {
    type Entry = FakeHandle;
    type Value = FakeValue;
    type Iter = FakeIterator;

    fn root(&self) -> UsbResult<FakeHandle> {
        Ok(self.handle(self.root_handle()))
    }

    fn registry_id(&self, entry: &FakeHandle) -> UsbResult<RegistryId> {
        Ok(self.lookup(entry, "registry_id")?.id)
    }

    fn name(&self, entry: &FakeHandle) -> UsbResult<String> {
        if self.failing_names.borrow().contains(&entry.object) {
            return Err(Error::OsError {
                operation: "name",
                handle: entry.object,
                code: 0xe00002bc,
            });
        }

        Ok(self.lookup(entry, "name")?.name.clone())
    }

    fn services_of_class(&self, class_name: &str) -> UsbResult<FakeIterator> {
        let matches = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.class.as_deref() == Some(class_name))
            .map(|(handle, _)| handle as u32);

        Ok(self.iterator(matches.collect::<Vec<_>>()))
    }

    fn services_with_property(&self, key: &str, value: &FakeValue) -> UsbResult<FakeIterator> {
        let matches = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.properties.get(key) == Some(&value.property))
            .map(|(handle, _)| handle as u32);

        Ok(self.iterator(matches.collect::<Vec<_>>()))
    }

    fn children(&self, entry: &FakeHandle, plane: &str) -> UsbResult<FakeIterator> {
        let entry = self.lookup(entry, "children")?;
        assert_eq!(plane, SERVICE_PLANE, "only the service plane is walked downwards");

        Ok(self.iterator(entry.service_children.clone()))
    }

    fn parent(&self, entry: &FakeHandle, plane: &str) -> UsbResult<Option<FakeHandle>> {
        let entry = self.lookup(entry, "parent")?;
        let parent = match plane {
            SERVICE_PLANE => entry.service_parent,
            USB_PLANE => entry.usb_parent,
            _ => None,
        };

        Ok(parent.map(|object| self.handle(object)))
    }

    fn property(&self, entry: &FakeHandle, key: &str) -> Option<FakeValue> {
        let property = self.entries[entry.object as usize].properties.get(key)?;

        Some(FakeValue {
            property: property.clone(),
            outstanding: self.outstanding.acquire(),
        })
    }

    fn as_string(&self, value: &FakeValue) -> Option<String> {
        match &value.property {
            Property::String(string) => Some(string.clone()),
            _ => None,
        }
    }

    fn as_number(&self, value: &FakeValue) -> Option<i64> {
        match value.property {
            Property::Number(number) => Some(number),
            _ => None,
        }
    }

    fn as_data(&self, value: &FakeValue) -> Option<Vec<u8>> {
        match &value.property {
            Property::Data(bytes) => Some(bytes.clone()),
            _ => None,
        }
    }
}
