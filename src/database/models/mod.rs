pub mod attendance;
pub mod configuration;
pub mod employee;
pub mod history;
pub mod leave;
pub(crate) mod macros;
pub mod overtime;
pub mod quota;

// Re-export all models for easy importing
pub use attendance::*;
pub use configuration::*;
pub use employee::*;
pub use history::*;
pub use leave::*;
pub use overtime::*;
pub use quota::*;
