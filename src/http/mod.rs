use std::{marker::PhantomData, sync::Arc};

use axum::{
    Json, Router,
    extract::{Extension, FromRequest, Path, Request, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    domain::{
        Container, DomainError, InterfaceResult, NetConf, derive_sandbox_key,
        validate_network_name,
    },
    state::{AgentStore, ResourceKind, StoreError},
};

pub const NETWORK_CONFIGS_PATH: &str = "/networkconfigs";
pub const CONTAINERS_PATH: &str = "/containers";
pub const INTERFACES_PATH: &str = "/interfaces";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AgentStore>,
}

#[derive(Debug)]
pub struct ApiError {
    code: &'static str,
    message: String,
    status: StatusCode,
}

impl ApiError {
    fn new(code: &'static str, status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            status,
        }
    }

    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(code, StatusCode::CONFLICT, message)
    }
}

impl From<DomainError> for ApiError {
    fn from(value: DomainError) -> Self {
        ApiError::bad_request(value.code(), value.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        match &value {
            StoreError::NotFound { kind, .. } => {
                let code = match kind {
                    ResourceKind::NetworkConfig => "network_not_found",
                    ResourceKind::Container => "container_not_found",
                    ResourceKind::Interfaces => "container_interfaces_not_found",
                };
                ApiError::not_found(code, value.to_string())
            }
            StoreError::Conflict { kind, .. } => {
                let code = match kind {
                    ResourceKind::NetworkConfig => "network_cannot_create",
                    ResourceKind::Container => "container_cannot_create",
                    ResourceKind::Interfaces => "container_interfaces_cannot_create",
                };
                ApiError::conflict(code, value.to_string())
            }
        }
    }
}

/// Wire shape of every error response.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

/// Names the resource a request body is decoded for, so a malformed body
/// is reported with that resource's error code.
pub trait BodyContext {
    const KIND: ResourceKind;
    const CODE: &'static str;
}

pub struct NetworkCreate;
pub struct ContainerCreate;
pub struct InterfacesCreate;
pub struct InterfacesModify;

impl BodyContext for NetworkCreate {
    const KIND: ResourceKind = ResourceKind::NetworkConfig;
    const CODE: &'static str = "network_cannot_create";
}

impl BodyContext for ContainerCreate {
    const KIND: ResourceKind = ResourceKind::Container;
    const CODE: &'static str = "container_cannot_create";
}

impl BodyContext for InterfacesCreate {
    const KIND: ResourceKind = ResourceKind::Interfaces;
    const CODE: &'static str = "container_interfaces_cannot_create";
}

impl BodyContext for InterfacesModify {
    const KIND: ResourceKind = ResourceKind::Interfaces;
    const CODE: &'static str = "container_interfaces_cannot_modify";
}

pub struct ApiJson<T, C>(pub T, PhantomData<C>);

#[axum::async_trait]
impl<S, T, C> FromRequest<S> for ApiJson<T, C>
where
    axum::Json<T>: FromRequest<S, Rejection = JsonRejection>,
    C: BodyContext,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = axum::Json::<T>::from_request(req, state)
            .await
            .map_err(|e| {
                let kind = C::KIND;
                let detail = e.body_text();
                error!(resource = %kind, error = %detail, "request body decoding failed");
                ApiError::bad_request(C::CODE, format!("{kind}: JSON decoding error: {detail}"))
            })?;
        Ok(Self(value, PhantomData))
    }
}

pub fn build_router(store: Arc<AgentStore>) -> Router {
    let app_state = AppState { store };

    Router::new()
        .route("/health", get(health))
        .route(
            NETWORK_CONFIGS_PATH,
            get(list_networks).post(create_network),
        )
        .route(
            "/networkconfigs/:name",
            get(get_network).delete(delete_network),
        )
        .route(CONTAINERS_PATH, get(list_containers))
        .route(
            "/containers/:name",
            get(get_container)
                .put(put_container)
                .delete(delete_container),
        )
        .route(
            INTERFACES_PATH,
            get(list_interfaces).post(create_interfaces),
        )
        .route(
            "/interfaces/:name",
            get(get_interfaces)
                .put(put_interfaces)
                .delete(delete_interfaces),
        )
        .fallback(fallback_not_found)
        .layer(Extension(app_state))
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct HealthResponse {
    pub status: String,
    pub networkconfigs: usize,
    pub containers: usize,
    pub interfaces: usize,
}

async fn health(Extension(state): Extension<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        networkconfigs: state.store.networks.len().await,
        containers: state.store.containers.len().await,
        interfaces: state.store.interfaces.len().await,
    })
}

async fn create_network(
    Extension(state): Extension<AppState>,
    ApiJson(netconf, _): ApiJson<NetConf, NetworkCreate>,
) -> Result<StatusCode, ApiError> {
    let name = validate_network_name(&netconf)
        .inspect_err(|_| warn!(?netconf, "cannot create network configuration with an empty name"))?
        .to_string();

    state
        .store
        .networks
        .insert_unique(name.clone(), netconf)
        .await
        .inspect_err(|_| warn!(name = %name, "duplicate network configuration name"))?;

    info!(name = %name, "created network configuration");
    Ok(StatusCode::CREATED)
}

async fn list_networks(Extension(state): Extension<AppState>) -> Json<Vec<NetConf>> {
    info!("serving the list of network configurations");
    Json(state.store.networks.list().await)
}

async fn get_network(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
) -> Result<Json<NetConf>, ApiError> {
    let netconf = state
        .store
        .networks
        .get(&name)
        .await
        .inspect_err(|_| warn!(name = %name, "cannot find network configuration"))?;
    info!(name = %name, "serving network configuration");
    Ok(Json(netconf))
}

async fn delete_network(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .networks
        .delete(&name)
        .await
        .inspect_err(|_| warn!(name = %name, "cannot delete network configuration"))?;
    info!(name = %name, "deleted network configuration");
    Ok(StatusCode::OK)
}

/// Caches a container at a fixed URI. Overwrites are allowed: the same
/// container may be registered more than once within one ADD phase.
async fn put_container(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
    ApiJson(container, _): ApiJson<Container, ContainerCreate>,
) -> Result<StatusCode, ApiError> {
    let replaced = state.store.containers.put(name.clone(), container).await;
    info!(name = %name, replaced, "cached container");
    Ok(StatusCode::CREATED)
}

async fn list_containers(Extension(state): Extension<AppState>) -> Json<Vec<Container>> {
    info!("serving the list of cached containers");
    Json(state.store.containers.list().await)
}

async fn get_container(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Container>, ApiError> {
    let container = state
        .store
        .containers
        .get(&name)
        .await
        .inspect_err(|_| warn!(name = %name, "cannot find container"))?;
    info!(name = %name, "serving container");
    Ok(Json(container))
}

async fn delete_container(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .containers
        .delete(&name)
        .await
        .inspect_err(|_| warn!(name = %name, "cannot find container"))?;
    info!(name = %name, "deleted cached container");
    Ok(StatusCode::OK)
}

/// Creates the interface set of a container whose name is taken from the
/// one interface carrying a `sandbox` value. Duplicates are rejected.
async fn create_interfaces(
    Extension(state): Extension<AppState>,
    ApiJson(results, _): ApiJson<Vec<InterfaceResult>, InterfacesCreate>,
) -> Result<StatusCode, ApiError> {
    let name = derive_sandbox_key(&results)
        .inspect_err(|e| warn!(error = %e, "rejected container interfaces"))?;

    state
        .store
        .interfaces
        .insert_unique(name.clone(), results)
        .await
        .inspect_err(|_| warn!(name = %name, "container interfaces already exist"))?;

    info!(name = %name, "created container interfaces");
    Ok(StatusCode::CREATED)
}

/// Creates or replaces the interface set under the path name. The path is
/// authoritative, so `sandbox` fields are not inspected.
async fn put_interfaces(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
    ApiJson(results, _): ApiJson<Vec<InterfaceResult>, InterfacesModify>,
) -> Result<StatusCode, ApiError> {
    let replaced = state.store.interfaces.put(name.clone(), results).await;
    info!(name = %name, replaced, "stored container interfaces");
    Ok(StatusCode::OK)
}

async fn list_interfaces(
    Extension(state): Extension<AppState>,
) -> Json<Vec<Vec<InterfaceResult>>> {
    info!("serving the list of container interfaces");
    Json(state.store.interfaces.list().await)
}

async fn get_interfaces(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<InterfaceResult>>, ApiError> {
    let results = state
        .store
        .interfaces
        .get(&name)
        .await
        .inspect_err(|_| warn!(name = %name, "cannot find container interfaces"))?;
    info!(name = %name, "serving container interfaces");
    Ok(Json(results))
}

async fn delete_interfaces(
    Extension(state): Extension<AppState>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .store
        .interfaces
        .delete(&name)
        .await
        .inspect_err(|_| warn!(name = %name, "cannot delete container interfaces"))?;
    info!(name = %name, "deleted container interfaces");
    Ok(StatusCode::OK)
}

async fn fallback_not_found() -> ApiError {
    ApiError::not_found("not_found", "not found")
}
