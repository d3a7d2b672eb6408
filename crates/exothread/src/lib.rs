pub mod handle;
pub mod identity;
pub mod launcher;
pub mod lifecycle;
pub mod local;
pub mod logging;
pub mod message;
pub mod registry;

pub use handle::Error;
pub use handle::Handle;
pub use handle::Receipt;
pub use identity::WorkerId;
pub use launcher::Config;
pub use launcher::Launcher;
pub use lifecycle::State;
pub use lifecycle::Unusable;
pub use message::Message;
pub use registry::Registry;

#[cfg(test)]
mod mock_registry;
