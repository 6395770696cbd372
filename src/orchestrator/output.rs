//! Output aggregation for completed sessions.

use super::session_store::SessionStore;
use crate::models::output::SessionOutput;
use crate::models::session::SessionStatus;
use crate::{AppError, Result};

/// Return the normalized output of a completed session.
///
/// Fields the runner omitted are filled with empty values; nothing else
/// is altered.
///
/// # Errors
///
/// Returns `AppError::NotFound` for an unknown session and
/// `AppError::NotCompleted` if the session is not `completed`.
pub async fn collect(store: &SessionStore, session_id: &str) -> Result<SessionOutput> {
    let session = store.get(session_id).await?;
    if session.status != SessionStatus::Completed {
        return Err(AppError::NotCompleted {
            session_id: session_id.to_owned(),
            status: session.status,
        });
    }
    Ok(session.output.map(SessionOutput::from).unwrap_or_default())
}
