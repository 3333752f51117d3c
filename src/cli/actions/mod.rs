pub mod server;
pub mod sign;

// Internal "interpreter" for `Action`.
mod run;

use anyhow::{Context, Result};

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
    Sign(sign::Args),
}

impl Action {
    /// Execute the action.
    /// # Errors
    /// Returns an error if the action fails.
    pub async fn execute(self) -> Result<()> {
        run::execute(self).await
    }
}

/// Read a PEM key or JSON config from disk.
pub(crate) fn read_file(path: &str) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("could not read {path}"))
}
