//! The USB topology as we hand it back to callers.

use std::cmp::Ordering;

/// Identifier used for controllers we couldn't resolve, and inherited from there on down.
pub const UNKNOWN_ID: &str = "0000";

/// One node of the USB topology: a host controller, a hub, or a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbNode {
    /// The short registry name of the node; "vid:pid" if the registry didn't give us one.
    pub name: String,

    /// The vendor string the device reports, or empty.
    pub vendor: String,

    /// Four lowercase hex digits; inherited from the parent if the node has none of its own.
    pub vendor_id: String,

    /// Four lowercase hex digits; inherited from the parent if the node has none of its own.
    pub product_id: String,

    /// The serial string associated with the device, or empty.
    pub serial: String,

    /// Everything attached below this node, in topology order. See [UsbNode::cmp_topology].
    pub children: Vec<UsbNode>,
}

impl UsbNode {
    /// Total order used to sort siblings: by name, then vendor ID, product ID, and serial.
    /// Comparisons are plain byte-wise string comparisons, so they're case-sensitive.
    pub fn cmp_topology(&self, other: &UsbNode) -> Ordering {
        (
            self.name.as_str(),
            self.vendor_id.as_str(),
            self.product_id.as_str(),
            self.serial.as_str(),
        )
            .cmp(&(
                other.name.as_str(),
                other.vendor_id.as_str(),
                other.product_id.as_str(),
                other.serial.as_str(),
            ))
    }

    /// Walks this node and everything below it, depth-first, parents before children.
    pub fn iter(&self) -> Nodes<'_> {
        Nodes { stack: vec![self] }
    }
}

/// Pre-order iterator over a subtree; see [UsbNode::iter].
#[derive(Debug)]
pub struct Nodes<'a> {
    stack: Vec<&'a UsbNode>,
}

impl<'a> Iterator for Nodes<'a> {
    type Item = &'a UsbNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;

        // Push in reverse, so the first child is the next one out.
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

/// Information used to find a specific device.
#[derive(Debug, Default, Clone)]
pub struct DeviceSelector {
    /// If specified, searches for a device with the given VID.
    pub vendor_id: Option<u16>,

    /// If specified, searches for a device with the given PID.
    pub product_id: Option<u16>,

    /// If specified, searches for a device with exactly this serial string.
    pub serial: Option<String>,
}

impl DeviceSelector {
    pub fn matches(&self, device: &UsbNode) -> bool {
        // Our nodes carry their IDs pre-formatted, so compare in that form.
        if let Some(vid) = self.vendor_id {
            if format!("{:04x}", vid) != device.vendor_id {
                return false;
            }
        }

        if let Some(pid) = self.product_id {
            if format!("{:04x}", pid) != device.product_id {
                return false;
            }
        }

        if let Some(serial) = &self.serial {
            if *serial != device.serial {
                return false;
            }
        }

        true
    }
}
