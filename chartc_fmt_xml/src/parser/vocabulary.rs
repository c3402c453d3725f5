//! Tags and attributes of the input dialect.

pub const TAG_SCXML: &str = "scxml";
pub const TAG_HEADER: &str = "header";
pub const TAG_SOURCE: &str = "source";
pub const TAG_DATAMODEL: &str = "datamodel";
pub const TAG_DATA: &str = "data";
pub const TAG_CALLBACKS: &str = "callbacks";
pub const TAG_CALLBACK: &str = "callback";
pub const TAG_STATE: &str = "state";
pub const TAG_PARALLEL: &str = "parallel";
pub const TAG_FINAL: &str = "final";
pub const TAG_INITIAL: &str = "initial";
pub const TAG_TRANSITION: &str = "transition";
pub const TAG_ONENTRY: &str = "onentry";
pub const TAG_ONEXIT: &str = "onexit";

pub const ATTR_VERSION: &str = "version";
pub const ATTR_NAME: &str = "name";
pub const ATTR_PREFIX: &str = "prefix";
pub const ATTR_INITIAL: &str = "initial";
pub const ATTR_XMLNS: &str = "xmlns";
pub const ATTR_ID: &str = "id";
pub const ATTR_TYPE: &str = "type";
pub const ATTR_EXPR: &str = "expr";
pub const ATTR_EVENT: &str = "event";
pub const ATTR_TARGET: &str = "target";
pub const ATTR_COND: &str = "cond";

pub const SUPPORTED_VERSION: &str = "1.0";
pub const TYPE_INTERNAL: &str = "internal";
pub const TYPE_EXTERNAL: &str = "external";
