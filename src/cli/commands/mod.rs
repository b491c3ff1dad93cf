pub mod request;
pub mod scope;
pub mod strategy;

pub use request::{RequestCommand, handle_request_command};
pub use scope::{ScopeCommand, handle_scope_command};
pub use strategy::handle_strategy_command;
