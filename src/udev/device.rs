use std::fs;
use std::path::PathBuf;

/// The sysfs identity of the controller's hidraw node, resolved from the
/// record output of `udevadm info`. padbridge only ever hides the one node
/// it holds open, so anything that is not a hidraw device is rejected at
/// parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HidrawNode {
    /// Sysfs device path, without the /sys prefix (the record's P: line).
    pub sysfs_path: String,
    /// Kernel name of the node, e.g. hidraw3 (the record's M: line).
    pub name: String,
}

impl HidrawNode {
    /// Parse a `udevadm info` record. Returns None when the record is
    /// incomplete or describes a node in another subsystem.
    pub fn parse(record: &str) -> Option<Self> {
        let mut sysfs_path = None;
        let mut name = None;
        let mut subsystem = None;
        for line in record.lines() {
            if let Some(value) = line.strip_prefix("P: ") {
                sysfs_path = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("M: ") {
                name = Some(value.trim().to_string());
            } else if let Some(value) = line.strip_prefix("U: ") {
                subsystem = Some(value.trim());
            }
        }
        if subsystem != Some("hidraw") {
            return None;
        }
        Some(Self {
            sysfs_path: sysfs_path?,
            name: name?,
        })
    }

    /// Sysfs path of the HID device this node hangs off, used to retrigger
    /// udev for exactly this controller. The node reaches its parent through
    /// the `device` symlink.
    pub fn parent_sysfs_path(&self) -> Option<String> {
        let node_dir = PathBuf::from(format!("/sys{}", self.sysfs_path));
        let target = fs::read_link(node_dir.join("device")).ok()?;
        let parent = fs::canonicalize(node_dir.join(target)).ok()?;
        let parent = parent.strip_prefix("/sys").ok()?;
        Some(format!("/{}", parent.display()))
    }
}
