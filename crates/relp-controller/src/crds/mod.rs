pub mod cluster;
pub mod node_bundle;
pub mod rsyslog_relp;

pub use cluster::*;
pub use node_bundle::*;
pub use rsyslog_relp::*;

/// API group shared by every resource this extension serves or consumes.
pub const GROUP: &str = "extensions.relp.platform";
