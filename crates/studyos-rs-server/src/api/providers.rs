//! Provider status and runtime configuration.

use crate::error::ApiError;
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use serde::Deserialize;
use std::sync::Arc;
use studyos_rs_core::{CoreError, ProviderSetting, RouterStatus};
use studyos_rs_protocol::{ProviderKind, RoutingPreference};

pub async fn status(State(state): State<Arc<AppState>>) -> Json<RouterStatus> {
    Json(state.router.status())
}

#[derive(Debug, Deserialize)]
pub struct PreferenceBody {
    pub preference: String,
}

pub async fn set_preference(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PreferenceBody>,
) -> Result<Json<RouterStatus>, ApiError> {
    let preference: RoutingPreference = body
        .preference
        .parse()
        .map_err(|_| CoreError::UnknownProvider(body.preference.clone()))?;
    state.router.set_preference(preference);
    Ok(Json(state.router.status()))
}

/// Runtime settings for one provider. Empty strings clear an override.
#[derive(Debug, Default, Deserialize)]
pub struct ProviderBody {
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

pub async fn configure(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Json(body): Json<ProviderBody>,
) -> Result<Json<RouterStatus>, ApiError> {
    let kind: ProviderKind = kind
        .parse()
        .map_err(|_| CoreError::UnknownProvider(kind.clone()))?;
    let settings = [
        body.credential.map(ProviderSetting::Credential),
        body.base_url.map(ProviderSetting::BaseUrl),
        body.model.map(ProviderSetting::Model),
    ];
    for setting in settings.into_iter().flatten() {
        state.router.configure(kind, setting)?;
    }
    Ok(Json(state.router.status()))
}
