use crate::udev::device::HidrawNode;

const HIDRAW_RECORD: &str = "P: /devices/virtual/misc/uhid/0005:054C:0CE6.0007/hidraw/hidraw3
M: hidraw3
R: 3
U: hidraw
D: c 241:3
N: hidraw3
E: DEVPATH=/devices/virtual/misc/uhid/0005:054C:0CE6.0007/hidraw/hidraw3
E: DEVNAME=/dev/hidraw3
E: MAJOR=241
E: MINOR=3
E: SUBSYSTEM=hidraw
";

#[test]
fn test_parse_hidraw_record() {
    let node = HidrawNode::parse(HIDRAW_RECORD).unwrap();
    assert_eq!(node.name, "hidraw3");
    assert_eq!(
        node.sysfs_path,
        "/devices/virtual/misc/uhid/0005:054C:0CE6.0007/hidraw/hidraw3"
    );
}

#[test]
fn test_parse_rejects_other_subsystems() {
    let record = HIDRAW_RECORD.replace("U: hidraw", "U: input");
    assert_eq!(HidrawNode::parse(&record), None);
}

#[test]
fn test_parse_rejects_incomplete_record() {
    assert_eq!(HidrawNode::parse("U: hidraw\n"), None);
    assert_eq!(HidrawNode::parse(""), None);
}

#[test]
fn test_hide_rule_targets_single_node() {
    let node = HidrawNode::parse(HIDRAW_RECORD).unwrap();
    let rule = super::hide_rule(&node, "/dev/hidraw3");
    assert!(rule.contains(r#"SUBSYSTEM=="hidraw""#));
    assert!(rule.contains(r#"KERNEL=="hidraw3""#));
    assert!(rule.contains(r#"MODE:="0000""#));
    assert!(rule.contains("000 /dev/hidraw3"));
}

#[test]
fn test_rule_file_is_per_node() {
    let node = HidrawNode::parse(HIDRAW_RECORD).unwrap();
    assert!(super::rule_file(&node).ends_with("59-padbridge-hide-hidraw3.rules"));
}
