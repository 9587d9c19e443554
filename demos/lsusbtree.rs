//! Prints the USB topology of the system, one tree per host controller.

use usbtree::UsbNode;

fn print_node(node: &UsbNode, depth: usize) {
    let mut line = format!(
        "{:indent$}{} [{}:{}]",
        "",
        node.name,
        node.vendor_id,
        node.product_id,
        indent = depth * 2
    );
    if !node.vendor.is_empty() {
        line.push_str(&format!(" {}", node.vendor));
    }
    if !node.serial.is_empty() {
        line.push_str(&format!(" (serial {})", node.serial));
    }
    println!("{}", line);

    for child in &node.children {
        print_node(child, depth + 1);
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    for controller in usbtree::enumerate()? {
        print_node(&controller, 0);
    }

    Ok(())
}
