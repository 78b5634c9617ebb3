//! HTTP handler functions for the dd-node API.

pub mod locations;
pub mod reference;
pub mod search;
pub mod timeseries;

use actix_web::error::{JsonPayloadError, QueryPayloadError};
use actix_web::{HttpRequest, HttpResponse, web};
use dd_node_server_models::ApiHealth;
use dd_node_server_models::pagination::Pagination;
use serde::Serialize;

use crate::AppState;
use crate::error::ApiError;

/// Shortest uuid prefix accepted by partial-uuid lookups.
pub const MIN_UUID_PREFIX: usize = 7;

/// Rejects uuid prefixes too short to identify a resource.
fn check_uuid_prefix(prefix: &str) -> Result<(), ApiError> {
    if prefix.len() < MIN_UUID_PREFIX {
        return Err(ApiError::NotFound(
            "Requested resource UUID too short.".to_string(),
        ));
    }
    Ok(())
}

/// Wraps one page of rows in the list response selected by `pagination`.
fn list_response<T: Serialize>(
    req: &HttpRequest,
    pagination: Pagination,
    count: u64,
    rows: Vec<T>,
) -> Result<HttpResponse, ApiError> {
    let response = pagination.respond(count, rows, req.path(), req.query_string())?;
    Ok(HttpResponse::Ok().json(response))
}

/// `GET /api/health`
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    let database = match state.db.query_raw_params("SELECT 1 AS ok", &[]).await {
        Ok(_) => true,
        Err(e) => {
            log::warn!("Health check could not reach the database: {e}");
            false
        }
    };

    HttpResponse::Ok().json(ApiHealth {
        healthy: database,
        version: env!("CARGO_PKG_VERSION").to_string(),
        database,
    })
}

/// Fallback for unknown paths.
pub async fn not_found(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    Err(ApiError::NotFound(format!("No resource at {}", req.path())))
}

/// Fallback for known paths requested with an unsupported method.
pub async fn method_not_allowed(req: HttpRequest) -> Result<HttpResponse, ApiError> {
    Err(ApiError::MethodNotAllowed(format!(
        "Method {} is not allowed on {}",
        req.method(),
        req.path()
    )))
}

/// Renders query string errors as API errors.
pub fn query_error(err: QueryPayloadError, _req: &HttpRequest) -> actix_web::Error {
    ApiError::ParseError(err.to_string()).into()
}

/// Renders request body errors as API errors.
pub fn json_error(err: JsonPayloadError, _req: &HttpRequest) -> actix_web::Error {
    match err {
        JsonPayloadError::ContentType => ApiError::UnsupportedMediaType(err.to_string()),
        JsonPayloadError::Deserialize(e) if e.is_data() => ApiError::Validation(e.to_string()),
        other => ApiError::ParseError(other.to_string()),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use actix_web::test::TestRequest;
    use dd_node_server_models::pagination::Paginated;

    use super::*;

    #[test]
    fn short_uuid_prefixes_are_not_found() {
        assert!(check_uuid_prefix("7d2a1f").is_err());
        assert!(check_uuid_prefix("7d2a1f4").is_ok());
    }

    #[test]
    fn list_response_links_from_request() {
        let req = TestRequest::get()
            .uri("/api/locations?page=1&name=dam")
            .to_http_request();
        let pagination = Pagination::PageNumber {
            page: 1,
            page_size: 2,
        };
        let response = pagination
            .respond(3, vec![1, 2], req.path(), req.query_string())
            .unwrap();
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            serde_json::to_value(Paginated {
                count: 3,
                next: Some("/api/locations?name=dam&page=2".to_string()),
                previous: None,
                results: vec![1, 2],
            })
            .unwrap()
        );
        assert!(list_response(&req, pagination, 3, vec![1, 2]).is_ok());
    }

    #[test]
    fn body_errors_map_by_kind() {
        let req = TestRequest::default().to_http_request();
        let err = json_error(JsonPayloadError::ContentType, &req);
        assert_eq!(err.as_response_error().status_code().as_u16(), 400);
    }
}
