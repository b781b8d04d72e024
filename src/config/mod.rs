pub mod schema;

pub use schema::{
    ApprovalsConfig, BreakerConfig, Config, DaemonConfig, LedgerConfig, NotificationsConfig,
    PolicyConfig, RulesConfig,
};
