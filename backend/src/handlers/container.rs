//! HTTP handlers for container intake and processing

use axum::extract::State;
use serde_json::json;
use shared::Pagination;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{Access, CurrentUser};
use crate::response::{ApiPath, ApiQuery, ApiResponse, JsonOrForm};
use crate::services::container::{
    ContainerDetail, ContainerFilter, ContainerService, CostPreview, CreateContainerInput,
    LineItemInput, PreviewInput, ProcessOutcome, UpdateContainerInput,
};
use crate::services::FinancialService;
use crate::AppState;

/// Create a container with its initial line items
pub async fn create_container(
    State(state): State<AppState>,
    current_user: CurrentUser,
    JsonOrForm(input): JsonOrForm<CreateContainerInput>,
) -> AppResult<ApiResponse<ContainerDetail>> {
    current_user.0.require(Access::Inventory)?;
    let service = ContainerService::new(state.db);
    let detail = service.create(current_user.0.user_id, input).await?;
    Ok(ApiResponse::new("Container created successfully", detail))
}

/// List containers
pub async fn list_containers(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiQuery(filter): ApiQuery<ContainerFilter>,
) -> AppResult<ApiResponse<shared::PaginatedResponse<shared::Container>>> {
    current_user.0.require(Access::Inventory)?;
    let pagination = Pagination::clamped(
        filter.page,
        filter.per_page,
        state.config.inventory.default_page_size,
        state.config.inventory.max_page_size,
    );
    let service = ContainerService::new(state.db);
    let page = service.list(&filter, &pagination).await?;
    Ok(ApiResponse::new("Containers retrieved", page))
}

/// Get a container with line items and financial summary
pub async fn get_container(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(container_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<ContainerDetail>> {
    current_user.0.require(Access::Inventory)?;
    let service = ContainerService::new(state.db);
    let detail = service.get(container_id).await?;
    Ok(ApiResponse::new("Container retrieved", detail))
}

/// Update container metadata and costs
pub async fn update_container(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(container_id): ApiPath<Uuid>,
    JsonOrForm(input): JsonOrForm<UpdateContainerInput>,
) -> AppResult<ApiResponse<ContainerDetail>> {
    current_user.0.require(Access::Inventory)?;
    let service = ContainerService::new(state.db);
    let detail = service.update(container_id, input).await?;
    Ok(ApiResponse::new("Container updated successfully", detail))
}

/// Delete a container (admin only)
pub async fn delete_container(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(container_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<()>> {
    current_user.0.require(Access::Admin)?;
    let service = ContainerService::new(state.db);
    service.delete(container_id).await?;
    Ok(ApiResponse::message("Container deleted successfully"))
}

pub async fn add_container_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(container_id): ApiPath<Uuid>,
    JsonOrForm(input): JsonOrForm<LineItemInput>,
) -> AppResult<ApiResponse<serde_json::Value>> {
    current_user.0.require(Access::Inventory)?;
    let service = ContainerService::new(state.db);
    let item = service.add_item(container_id, input).await?;
    Ok(ApiResponse::new("Line item added", json!({ "line_item": item })))
}

pub async fn remove_container_item(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath((container_id, item_id)): ApiPath<(Uuid, Uuid)>,
) -> AppResult<ApiResponse<()>> {
    current_user.0.require(Access::Inventory)?;
    let service = ContainerService::new(state.db);
    service.remove_item(container_id, item_id).await?;
    Ok(ApiResponse::message("Line item removed"))
}

/// Mark a container as received
pub async fn receive_container(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(container_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<serde_json::Value>> {
    current_user.0.require(Access::Inventory)?;
    let service = ContainerService::new(state.db);
    let container = service.receive(container_id).await?;
    Ok(ApiResponse::new("Container marked as received", json!({ "container": container })))
}

/// Move every line item into warehouse stock
pub async fn process_container(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(container_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<ProcessOutcome>> {
    current_user.0.require(Access::Inventory)?;
    let service = ContainerService::new(state.db);
    let outcome = service
        .process(container_id, current_user.0.user_id, &state.config.inventory.barcode_prefix)
        .await?;
    let message = format!(
        "Container processed: {} items and {} boxes added to inventory",
        outcome.summary.items_processed, outcome.summary.boxes_processed
    );
    Ok(ApiResponse::new(message, outcome))
}

/// Live cost calculation for an unsaved form
pub async fn preview_container(
    current_user: CurrentUser,
    JsonOrForm(input): JsonOrForm<PreviewInput>,
) -> AppResult<ApiResponse<CostPreview>> {
    current_user.0.require(Access::Inventory)?;
    let preview = ContainerService::preview(&input)?;
    Ok(ApiResponse::new("Preview calculated", preview))
}

pub async fn get_container_financials(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(container_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<serde_json::Value>> {
    current_user.0.require(Access::Inventory)?;
    let service = FinancialService::new(state.db);
    let summary = service.get_summary(container_id).await?;
    Ok(ApiResponse::new("Financial summary retrieved", json!({ "financial_summary": summary })))
}

pub async fn recalculate_container_financials(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(container_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<serde_json::Value>> {
    current_user.0.require(Access::Inventory)?;
    let service = FinancialService::new(state.db);
    let summary = service.recalculate(container_id).await?;
    Ok(ApiResponse::new("Financial summary recalculated", json!({ "financial_summary": summary })))
}
