//! Hides the physical controller from other processes.
//!
//! A hidden controller keeps working for this (root) process: a udev rule
//! chmods its hidraw node to mode 0000 and udev is retriggered, so every
//! other consumer loses access while the already-open handle stays valid.
//! Removing the rule and retriggering restores the node.

#[cfg(test)]
pub mod device_test;

pub mod device;

use std::{error::Error, fs, path::Path};

use nix::unistd::AccessFlags;
use tokio::process::Command;

use self::device::HidrawNode;

const RULES_PREFIX: &str = "/run/udev/rules.d";
/// Leading part of every rule file this process installs; `unhide_all`
/// removes whatever starts with it.
const RULE_FILE_STEM: &str = "59-padbridge-hide";

/// Whether this process can install hiding rules at all.
pub fn hider_available() -> bool {
    if fs::create_dir_all(RULES_PREFIX).is_err() {
        return false;
    }
    nix::unistd::access(RULES_PREFIX, AccessFlags::W_OK).is_ok()
}

/// Hide the controller behind the given device node (e.g. /dev/hidraw3).
pub async fn hide_device(path: &str) -> Result<(), Box<dyn Error>> {
    let node = query_node(path).await?;
    fs::create_dir_all(RULES_PREFIX)?;
    fs::write(rule_file(&node), hide_rule(&node, path))?;
    retrigger(node.parent_sysfs_path().as_deref()).await
}

/// Restore the controller behind the given device node.
pub async fn unhide_device(path: &str) -> Result<(), Box<dyn Error>> {
    let node = query_node(path).await?;
    fs::remove_file(rule_file(&node))?;
    retrigger(node.parent_sysfs_path().as_deref()).await
}

/// Remove every hiding rule this process has installed.
pub async fn unhide_all() -> Result<(), Box<dyn Error>> {
    let mut removed = false;
    for entry in fs::read_dir(RULES_PREFIX)? {
        let Ok(entry) = entry else {
            continue;
        };
        if entry
            .file_name()
            .to_string_lossy()
            .starts_with(RULE_FILE_STEM)
        {
            fs::remove_file(entry.path())?;
            removed = true;
        }
    }
    if removed {
        retrigger(None).await?;
    }
    Ok(())
}

/// Resolve a device node into its sysfs identity.
async fn query_node(path: &str) -> Result<HidrawNode, Box<dyn Error>> {
    let output = Command::new("udevadm")
        .args(["info", path])
        .output()
        .await?;
    let record = String::from_utf8(output.stdout)?;
    HidrawNode::parse(&record)
        .ok_or_else(|| format!("{path} is not a hidraw device node").into())
}

/// The rule that takes the node away from everyone else. MODE covers the
/// node being recreated; RUN chmods the one that already exists.
fn hide_rule(node: &HidrawNode, devnode: &str) -> String {
    let chmod = chmod_command();
    format!(
        r#"# Hides {devnode} while padbridge owns the controller.
ACTION=="add|change", SUBSYSTEM=="hidraw", KERNEL=="{name}", MODE:="0000", GROUP:="root", RUN:="{chmod} 000 {devnode}"
"#,
        name = node.name
    )
}

fn rule_file(node: &HidrawNode) -> String {
    format!("{RULES_PREFIX}/{RULE_FILE_STEM}-{}.rules", node.name)
}

fn chmod_command() -> &'static str {
    if Path::new("/bin/chmod").exists() {
        "/bin/chmod"
    } else {
        "/usr/bin/chmod"
    }
}

/// Reload the rules, then retrigger one controller's device subtree, or
/// everything when no parent is known.
async fn retrigger(parent: Option<&str>) -> Result<(), Box<dyn Error>> {
    Command::new("udevadm")
        .args(["control", "--reload-rules"])
        .output()
        .await?;

    match parent {
        Some(parent) => {
            for action in ["remove", "add"] {
                Command::new("udevadm")
                    .args(["trigger", "--action", action, "-b", parent])
                    .output()
                    .await?;
            }
        }
        None => {
            Command::new("udevadm").arg("trigger").output().await?;
        }
    }

    Ok(())
}
