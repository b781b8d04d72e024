pub mod policy;
pub mod safe_mode;
pub mod scopes;

pub use policy::{
    AutonomousBehavior, PermissionsPolicy, PolicyHandle, PolicyOverrides, PolicyOverridesStore,
    PolicySnapshot, ScopeMode,
};
pub use safe_mode::SafeModeStore;
