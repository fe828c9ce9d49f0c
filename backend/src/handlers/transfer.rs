//! HTTP handlers for transfer shipments

use axum::extract::State;
use shared::{PaginatedResponse, Pagination, TransferShipment};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::{Access, CurrentUser};
use crate::response::{ApiPath, ApiQuery, ApiResponse, JsonOrForm};
use crate::services::transfer::{CreateTransferInput, TransferDetail, TransferFilter, TransferService};
use crate::AppState;

/// Create a transfer; `dispatch = "immediate"` also ships and receives it
pub async fn create_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    JsonOrForm(input): JsonOrForm<CreateTransferInput>,
) -> AppResult<ApiResponse<TransferDetail>> {
    current_user.0.require(Access::Transfers)?;
    let service = TransferService::new(state.db);
    let detail = service.create(current_user.0.user_id, input).await?;
    let message = format!("Transfer {} created", detail.shipment.shipment_number);
    Ok(ApiResponse::new(message, detail))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiQuery(filter): ApiQuery<TransferFilter>,
) -> AppResult<ApiResponse<PaginatedResponse<TransferShipment>>> {
    current_user.0.require(Access::Transfers)?;
    let pagination = Pagination::clamped(
        filter.page,
        filter.per_page,
        state.config.inventory.default_page_size,
        state.config.inventory.max_page_size,
    );
    let service = TransferService::new(state.db);
    let page = service.list(&filter, &pagination).await?;
    Ok(ApiResponse::new("Transfers retrieved", page))
}

pub async fn get_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(shipment_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<TransferDetail>> {
    current_user.0.require(Access::Transfers)?;
    let service = TransferService::new(state.db);
    let detail = service.get(shipment_id).await?;
    Ok(ApiResponse::new("Transfer retrieved", detail))
}

/// Deduct source stock and mark the shipment in transit
pub async fn ship_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(shipment_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<TransferDetail>> {
    current_user.0.require(Access::Transfers)?;
    let service = TransferService::new(state.db);
    let detail = service.ship(shipment_id, current_user.0.user_id).await?;
    Ok(ApiResponse::new("Transfer shipped", detail))
}

/// Credit destinations and mark the shipment received
pub async fn receive_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(shipment_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<TransferDetail>> {
    current_user.0.require(Access::Transfers)?;
    let service = TransferService::new(state.db);
    let detail = service.receive(shipment_id, current_user.0.user_id).await?;
    Ok(ApiResponse::new("Transfer received", detail))
}

pub async fn cancel_transfer(
    State(state): State<AppState>,
    current_user: CurrentUser,
    ApiPath(shipment_id): ApiPath<Uuid>,
) -> AppResult<ApiResponse<TransferDetail>> {
    current_user.0.require(Access::Transfers)?;
    let service = TransferService::new(state.db);
    let detail = service.cancel(shipment_id, current_user.0.user_id).await?;
    Ok(ApiResponse::new("Transfer cancelled", detail))
}
