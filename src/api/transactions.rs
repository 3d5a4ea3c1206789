use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};

use super::{tag_request, AppState};
use crate::error::{AppError, AppResult};
use crate::middleware::error::success_response;
use crate::services::reconciliation::{TransactionQuery, TRANSACTIONS_FAILED};

fn query_or_reject(
    query: Result<Query<TransactionQuery>, QueryRejection>,
    headers: &HeaderMap,
) -> AppResult<TransactionQuery> {
    query.map(|Query(q)| q).map_err(|rejection| {
        tag_request(
            AppError::invalid_field("query", rejection.body_text()).with_context(TRANSACTIONS_FAILED),
            headers,
        )
    })
}

/// GET /transactions?page&limit&sort&order
pub async fn list_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> AppResult<Response> {
    let query = query_or_reject(query, &headers)?;

    let page = state
        .engine
        .get_all_transactions(query)
        .await
        .map_err(|e| tag_request(e, &headers))?;

    Ok(success_response(StatusCode::OK, page))
}

/// GET /transactions/school/{school_id}?page&limit&sort&order
pub async fn list_by_school(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(school_id): Path<String>,
    query: Result<Query<TransactionQuery>, QueryRejection>,
) -> AppResult<Response> {
    let query = query_or_reject(query, &headers)?;

    let page = state
        .engine
        .get_transactions_by_school(&school_id, query)
        .await
        .map_err(|e| tag_request(e, &headers))?;

    Ok(success_response(StatusCode::OK, page))
}
