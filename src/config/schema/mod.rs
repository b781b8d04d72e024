mod core;
mod policy;
mod reliability;
mod workflow;

pub use self::core::Config;
pub use policy::PolicyConfig;
pub use reliability::{BreakerConfig, LedgerConfig};
pub use workflow::{ApprovalsConfig, DaemonConfig, NotificationsConfig, RulesConfig};
