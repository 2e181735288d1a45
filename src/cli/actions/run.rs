use crate::api::ApiClient;
use crate::cli::actions::Action;
use crate::session::{SessionManager, SessionState};
use crate::store::{FileTokenStore, TokenStore};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle the run action: restore the session and keep it alive until
/// interrupted.
pub async fn handle(action: Action) -> Result<()> {
    let Action::Run {
        api_url,
        state_file,
    } = action;

    let client = ApiClient::new(&api_url)?;
    let store: Arc<dyn TokenStore> = Arc::new(FileTokenStore::open(state_file));
    let manager = Arc::new(SessionManager::new(client, store));

    if let Some(user) = manager.cached_user() {
        debug!("Cached identity: {} ({})", user.email, user.role);
    }

    if let Err(err) = manager.initialize().await {
        warn!("Could not restore session: {err}");
    }

    match manager.state() {
        SessionState::Authenticated { user } => {
            info!("Authenticated as {} ({})", user.email, user.role);
        }
        _ => info!("No active session"),
    }

    let refresh_task = manager.spawn_refresh_task();
    let inactivity_task = manager.spawn_inactivity_task();

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    refresh_task.abort();
    inactivity_task.abort();

    Ok(())
}
