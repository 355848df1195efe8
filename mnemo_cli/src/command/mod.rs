//! Static strategy pattern for CLI commands.
//!
//! This module implements a zero-allocation, static dispatch strategy pattern:
//! each command is a separate strategy type with its own input, enabling
//! compile-time monomorphization instead of a dynamic command dispatch table.

mod info;
mod init;
mod serve;
mod version;

pub use info::InfoStrategy;
pub use init::InitStrategy;
pub use serve::{ServeInput, ServeStrategy};
pub use version::VersionStrategy;

/// Core trait defining the contract for all command strategies.
///
/// # Design Principles
/// - **Zero allocation**: No heap allocation required by the dispatch itself
/// - **Static dispatch**: All calls are monomorphized at compile time
/// - **Type safety**: Each strategy defines its own input type via associated type
pub trait CommandStrategy: Send + Sync + 'static {
    /// The input type this strategy accepts.
    type Input;

    /// Executes the command with the given input.
    ///
    /// # Errors
    /// Returns an error if command execution fails.
    async fn execute(&self, input: Self::Input) -> anyhow::Result<()>;
}
