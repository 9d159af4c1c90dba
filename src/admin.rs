#![cfg(feature = "web")]

//! Admin-only maintenance routes. Every handler here sits behind both
//! `require_auth` and `require_admin`.

use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{Error, Result};
use crate::login::PublicUser;
use crate::saving::StoredUpload;

/// Window for the "recent files" statistic
const RECENT_DAYS: i64 = 7;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatusUpdate {
    pub is_active: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: usize,
    pub total_files: usize,
    pub active_users: usize,
    pub admin_users: usize,
    pub recent_files: usize,
}

pub async fn list_users(State(state): State<Arc<AppState>>) -> Json<Vec<PublicUser>> {
    Json(state.users.list().iter().map(PublicUser::from).collect())
}

/// Activate or deactivate a user; deactivation also ends their sessions
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
    Json(update): Json<UserStatusUpdate>,
) -> Result<Json<PublicUser>> {
    let user = state.users.set_active(&username, update.is_active)?;
    if !user.is_active {
        let ended = state.sessions.revoke_user(&username);
        log::info!("deactivated '{}', ended {} session(s)", username, ended);
    }
    Ok(Json(PublicUser::from(&user)))
}

/// Delete a user together with all of their stored uploads
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>> {
    if state.users.get(&username).is_none() {
        return Err(Error::NotFound("User not found".to_string()));
    }
    let removed = state.store.remove_owner(&username)?;
    for upload in &removed {
        discard_raw_file(&state, upload);
    }
    let files_removed = removed.len();
    state.users.remove(&username)?;
    state.sessions.revoke_user(&username);
    log::info!("deleted user '{}' and {} upload(s)", username, files_removed);
    Ok(Json(serde_json::json!({
        "message": "User deleted successfully",
        "filesRemoved": files_removed,
    })))
}

pub async fn list_files(State(state): State<Arc<AppState>>) -> Result<Json<Vec<StoredUpload>>> {
    Ok(Json(state.store.all()?))
}

pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    let Some(upload) = state.store.remove(id)? else {
        return Err(Error::NotFound("File not found".to_string()));
    };
    discard_raw_file(&state, &upload);
    log::info!("deleted upload {}", id);
    Ok(Json(serde_json::json!({ "message": "File deleted successfully" })))
}

/// The document is already gone at this point, so a leftover raw file is only logged
fn discard_raw_file(state: &AppState, upload: &StoredUpload) {
    if let Err(e) = state.uploads.discard(&upload.stored_path) {
        log::warn!("could not remove raw file {}: {}", upload.stored_path, e);
    }
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Result<Json<AdminStats>> {
    let users = state.users.list();
    let files = state.store.all()?;
    let cutoff = Utc::now() - Duration::days(RECENT_DAYS);

    Ok(Json(AdminStats {
        total_users: users.len(),
        total_files: files.len(),
        active_users: users.iter().filter(|u| u.is_active).count(),
        admin_users: users.iter().filter(|u| u.is_admin).count(),
        recent_files: files.iter().filter(|f| f.created_at >= cutoff).count(),
    }))
}
