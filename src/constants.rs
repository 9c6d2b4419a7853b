pub const BUS_NAME: &str = "org.padbridge.Bridge";
pub const BUS_PREFIX: &str = "/org/padbridge";
pub const BRIDGE_PATH: &str = "/org/padbridge/Bridge";
