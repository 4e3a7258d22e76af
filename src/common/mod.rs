pub mod comment;
pub mod content;
pub mod env;
pub mod event;
pub mod identity;

pub use comment::*;
pub use env::{EnvProvider, SystemEnvProvider};
pub use event::*;
pub use identity::*;

#[cfg(test)]
pub use env::MockEnvProvider;
