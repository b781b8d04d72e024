#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::unnecessary_literal_bound,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod app;
pub mod approvals;
pub mod audit;
pub mod cli;
pub mod config;
pub mod daemon;
pub mod error;
pub mod ledger;
pub mod notify;
pub mod orchestration;
pub mod reliability;
pub mod rules;
pub mod security;
pub mod skills;
pub mod utils;

pub use app::AppContext;
pub use config::Config;
pub use error::{BenjaminError, Result};
