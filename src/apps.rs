//! Dify app clients.
//!
//! Every app type shares the operations of [`App`]; chat and completion apps
//! add their message endpoints on top.

pub mod app;
pub mod chat;
pub mod completion;

// Re-export for convenience
pub use app::App;
pub use chat::ChatApp;
pub use completion::CompletionApp;

#[cfg(test)]
mod testing;
