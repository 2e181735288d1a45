use anyhow::Result;
use petasync_auth::cli::{actions, actions::Action, start};

// Main function
#[tokio::main]
async fn main() -> Result<()> {
    // Start the program
    let action = start()?;

    // Handle the action
    match action {
        Action::Run { .. } => actions::run::handle(action).await?,
    }

    Ok(())
}
