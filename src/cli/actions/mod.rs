pub mod server;

use anyhow::Result;

#[derive(Debug)]
pub enum Action {
    Server(server::Args),
}

impl Action {
    /// Execute the action.
    ///
    /// # Errors
    ///
    /// Returns an error if the action fails
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Server(args) => server::execute(args).await,
        }
    }
}
