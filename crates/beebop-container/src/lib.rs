pub mod converter;
pub mod docker;
pub mod error;
#[cfg(feature = "test-utils")]
pub mod fake;
pub mod hooks;
pub mod runtime;
pub mod stack;
pub mod waiter;

pub use converter::*;
pub use docker::*;
pub use error::*;
#[cfg(feature = "test-utils")]
pub use fake::*;
pub use hooks::*;
pub use runtime::*;
pub use stack::*;
pub use waiter::*;
