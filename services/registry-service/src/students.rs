use axum::{
    Json,
    extract::{Path, State},
};
use cr_api_types::{ConnectionResponse, FormUpdateRequest, ViewSnapshot};
use std::sync::Arc;

use crate::{ApiResult, AppState, bad_request};

pub(crate) async fn connection(State(state): State<Arc<AppState>>) -> Json<ConnectionResponse> {
    let bootstrapper = state.controller.bootstrapper();
    Json(ConnectionResponse {
        state: state.controller.connection_state().await,
        signer_address: bootstrapper.signer_address().map(|address| address.0),
        contract_address: bootstrapper
            .registry()
            .is_some()
            .then(|| bootstrapper.contract_address().0.clone()),
    })
}

pub(crate) async fn view(State(state): State<Arc<AppState>>) -> Json<ViewSnapshot> {
    Json(state.controller.snapshot().await)
}

pub(crate) async fn edit_form(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FormUpdateRequest>,
) -> Json<ViewSnapshot> {
    Json(state.controller.edit_form(request).await)
}

/// Outcomes of the transaction itself land in `message`, not in the HTTP status.
pub(crate) async fn register_student(State(state): State<Arc<AppState>>) -> Json<ViewSnapshot> {
    Json(state.controller.submit_registration().await)
}

pub(crate) async fn remove_student(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<ViewSnapshot> {
    let id = id
        .trim()
        .parse::<u64>()
        .map_err(|_| bad_request("student id must be a non-negative integer"))?;

    Ok(Json(state.controller.submit_removal(id).await))
}
