pub mod context;
pub mod dispatch;
pub mod status;

pub use context::AppContext;
