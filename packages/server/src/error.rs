//! The closed set of API errors and their HTTP rendering.
//!
//! Every failure a handler can produce is one [`ApiError`] variant with a
//! fixed status, code and message. The body reads
//! `{status, code, message: "<message> #<status>.<code>", detail}` and, in
//! debug mode, also names the variant under `exception`. Debug mode is an
//! [`ErrorConfig`] registered as app data and applied by [`render_errors`].

use actix_web::body::{EitherBody, MessageBody};
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::middleware::Next;
use actix_web::{HttpResponse, ResponseError, web};
use dd_node_database::DbError;
use dd_node_server_models::pagination::PaginationError;
use dd_node_server_models::params::ParamError;
use dd_node_spatial::GeometryError;
use dd_node_timeseries::ResolveError;
use dd_node_timeseries::summary::WriteError;
use serde::Serialize;
use thiserror::Error;

/// How error bodies are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ErrorConfig {
    /// Whether error bodies name the [`ApiError`] variant.
    pub debug: bool,
}

/// Errors returned by API handlers. Each variant carries the detail shown
/// to the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request body or query string could not be parsed.
    #[error("{0}")]
    ParseError(String),
    /// The request names a key the resource does not have.
    #[error("{0}")]
    InvalidKey(String),
    /// The request content is incomplete or does not validate.
    #[error("{0}")]
    Validation(String),
    /// The body's media type, or the series' value type, cannot be written.
    #[error("{0}")]
    UnsupportedMediaType(String),
    /// A query parameter has a malformed value.
    #[error("{0}")]
    InvalidParameter(String),
    /// Aggregation was requested for a series that is not numeric.
    #[error("{0}")]
    UnsupportedAggregation(String),
    /// No resource matches the request.
    #[error("{0}")]
    NotFound(String),
    /// The resource does not support the request method.
    #[error("{0}")]
    MethodNotAllowed(String),
    /// The resource changed since the client read its version.
    #[error("{0}")]
    Conflict(String),
    /// The database failed.
    #[error("{0}")]
    Database(String),
    /// Any other server side failure.
    #[error("{0}")]
    Internal(String),
}

/// Serialized error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiErrorBody {
    /// HTTP status code.
    pub status: u16,
    /// Error code within the status.
    pub code: u16,
    /// Fixed message, suffixed with `#<status>.<code>`.
    pub message: String,
    /// What went wrong with this request.
    pub detail: String,
    /// Variant name; only present in debug mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<&'static str>,
}

impl ApiError {
    /// HTTP status, error code and fixed message.
    #[must_use]
    pub const fn mapping(&self) -> (StatusCode, u16, &'static str) {
        match self {
            Self::ParseError(_) => (StatusCode::BAD_REQUEST, 10, "Incorrect request format."),
            Self::InvalidKey(_) => (StatusCode::BAD_REQUEST, 11, "Invalid key in request."),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, 20, "Incomplete request content."),
            Self::UnsupportedMediaType(_) => {
                (StatusCode::BAD_REQUEST, 21, "Unsupported media type.")
            }
            Self::InvalidParameter(_) => (
                StatusCode::BAD_REQUEST,
                30,
                "Incorrect parameter value format.",
            ),
            Self::UnsupportedAggregation(_) => (
                StatusCode::BAD_REQUEST,
                31,
                "Aggregation not supported for this series.",
            ),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, 10, "Resource not found."),
            Self::MethodNotAllowed(_) => (
                StatusCode::METHOD_NOT_ALLOWED,
                10,
                "Request method not available.",
            ),
            Self::Conflict(_) => (StatusCode::CONFLICT, 10, "Aborted."),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, 20, "Database error."),
            Self::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                0,
                "Unknown technical error.",
            ),
        }
    }

    /// Variant name, reported as `exception` in debug mode.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ParseError(_) => "ParseError",
            Self::InvalidKey(_) => "InvalidKey",
            Self::Validation(_) => "Validation",
            Self::UnsupportedMediaType(_) => "UnsupportedMediaType",
            Self::InvalidParameter(_) => "InvalidParameter",
            Self::UnsupportedAggregation(_) => "UnsupportedAggregation",
            Self::NotFound(_) => "NotFound",
            Self::MethodNotAllowed(_) => "MethodNotAllowed",
            Self::Conflict(_) => "Conflict",
            Self::Database(_) => "Database",
            Self::Internal(_) => "Internal",
        }
    }

    /// The body sent to the client.
    #[must_use]
    pub fn body(&self, debug: bool) -> ApiErrorBody {
        let (status, code, message) = self.mapping();
        let status = status.as_u16();
        ApiErrorBody {
            status,
            code,
            message: format!("{message} #{status}.{code}"),
            detail: self.to_string(),
            exception: debug.then(|| self.name()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.mapping().0
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("{}: {self}", self.name());
        } else {
            log::debug!("{}: {self}", self.name());
        }
        HttpResponse::build(status).json(self.body(false))
    }
}

/// Re-renders [`ApiError`] responses with their variant name when the app's
/// [`ErrorConfig`] enables debug mode.
///
/// # Errors
///
/// Propagates errors of the wrapped service.
pub async fn render_errors<B: MessageBody + 'static>(
    req: ServiceRequest,
    next: Next<B>,
) -> Result<ServiceResponse<EitherBody<B>>, actix_web::Error> {
    let debug = req
        .app_data::<web::Data<ErrorConfig>>()
        .is_some_and(|config| config.debug);

    let res = next.call(req).await?;
    if !debug {
        return Ok(res.map_into_left_body());
    }

    let api_error = res
        .response()
        .error()
        .and_then(|e| e.as_error::<ApiError>())
        .cloned();

    Ok(match api_error {
        Some(e) => {
            let response = HttpResponse::build(e.status_code()).json(e.body(true));
            res.into_response(response).map_into_right_body()
        }
        None => res.map_into_left_body(),
    })
}

impl From<ResolveError> for ApiError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::InvalidParameter(message) => Self::InvalidParameter(message),
            ResolveError::UnsupportedAggregation { .. } => {
                Self::UnsupportedAggregation(e.to_string())
            }
        }
    }
}

impl From<DbError> for ApiError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::VersionConflict { .. } => Self::Conflict(e.to_string()),
            DbError::UnknownReference { .. } => Self::Validation(e.to_string()),
            _ => Self::Database(e.to_string()),
        }
    }
}

impl From<PaginationError> for ApiError {
    fn from(e: PaginationError) -> Self {
        match e {
            PaginationError::Mixed | PaginationError::InvalidNumber { .. } => {
                Self::ParseError(e.to_string())
            }
            PaginationError::InvalidPage(_) => Self::NotFound(e.to_string()),
        }
    }
}

impl From<ParamError> for ApiError {
    fn from(e: ParamError) -> Self {
        Self::InvalidParameter(e.to_string())
    }
}

impl From<WriteError> for ApiError {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::InvalidValue { .. } => Self::Validation(e.to_string()),
            WriteError::UnsupportedValueType(_) => Self::UnsupportedMediaType(e.to_string()),
        }
    }
}

impl From<GeometryError> for ApiError {
    fn from(e: GeometryError) -> Self {
        Self::Validation(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{App, middleware, test};
    use dd_node_timeseries_models::timestamp::TimestampError;
    use dd_node_timeseries_models::{AggregationWindow, ValueType};
    use uuid::Uuid;

    use super::*;

    #[test]
    fn body_carries_status_code_and_message() {
        let body = ApiError::NotFound("Requested resource UUID too short.".to_string()).body(false);
        assert_eq!(
            body,
            ApiErrorBody {
                status: 404,
                code: 10,
                message: "Resource not found. #404.10".to_string(),
                detail: "Requested resource UUID too short.".to_string(),
                exception: None,
            }
        );
    }

    #[test]
    fn debug_body_names_the_variant() {
        let body = ApiError::Internal("boom".to_string()).body(true);
        assert_eq!(body.message, "Unknown technical error. #500.0");
        assert_eq!(body.exception, Some("Internal"));
        let json = serde_json::to_value(ApiError::Internal(String::new()).body(false)).unwrap();
        assert!(json.get("exception").is_none());
    }

    #[test]
    fn mapping_table() {
        let cases = [
            (ApiError::ParseError(String::new()), 400, 10),
            (ApiError::InvalidKey(String::new()), 400, 11),
            (ApiError::Validation(String::new()), 400, 20),
            (ApiError::UnsupportedMediaType(String::new()), 400, 21),
            (ApiError::InvalidParameter(String::new()), 400, 30),
            (ApiError::UnsupportedAggregation(String::new()), 400, 31),
            (ApiError::NotFound(String::new()), 404, 10),
            (ApiError::MethodNotAllowed(String::new()), 405, 10),
            (ApiError::Conflict(String::new()), 409, 10),
            (ApiError::Database(String::new()), 500, 20),
            (ApiError::Internal(String::new()), 500, 0),
        ];
        for (error, status, code) in cases {
            let (s, c, _) = error.mapping();
            assert_eq!((s.as_u16(), c), (status, code), "{}", error.name());
        }
    }

    #[test]
    fn resolver_errors_map_to_bad_request() {
        let e: ApiError = ResolveError::InvalidParameter("start must not be after end".into()).into();
        assert_eq!(e, ApiError::InvalidParameter("start must not be after end".into()));

        let e: ApiError = ResolveError::UnsupportedAggregation {
            aggregation: AggregationWindow::Hour,
            value_type: ValueType::Text,
        }
        .into();
        assert!(matches!(e, ApiError::UnsupportedAggregation(_)));
    }

    #[test]
    fn version_conflicts_map_to_conflict() {
        let e: ApiError = DbError::VersionConflict {
            uuid: Uuid::nil(),
            expected: 3,
        }
        .into();
        assert_eq!(e.status_code(), StatusCode::CONFLICT);

        let e: ApiError = DbError::Conversion {
            message: "bad row".into(),
        }
        .into();
        assert_eq!(e.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn unknown_references_are_validation_errors() {
        let e: ApiError = DbError::UnknownReference {
            kind: "location",
            key: "7d2a1f4e".into(),
        }
        .into();
        assert_eq!(e, ApiError::Validation("Unknown location '7d2a1f4e'".into()));
    }

    async fn failing() -> Result<HttpResponse, ApiError> {
        Err(ApiError::Conflict("Resource changed".to_string()))
    }

    async fn error_body(config: ErrorConfig) -> serde_json::Value {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .wrap(middleware::from_fn(render_errors))
                .route("/", web::get().to(failing)),
        )
        .await;
        let res = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(res.status(), StatusCode::CONFLICT);
        test::read_body_json(res).await
    }

    #[actix_web::test]
    async fn debug_config_names_the_variant() {
        let body = error_body(ErrorConfig { debug: true }).await;
        assert_eq!(body["exception"], "Conflict");
        assert_eq!(body["message"], "Aborted. #409.10");
        assert_eq!(body["detail"], "Resource changed");
    }

    #[actix_web::test]
    async fn default_config_hides_the_variant() {
        let body = error_body(ErrorConfig::default()).await;
        assert!(body.get("exception").is_none());
        assert_eq!(body["status"], 409);
    }

    #[test]
    fn pagination_errors() {
        assert!(matches!(
            ApiError::from(PaginationError::Mixed),
            ApiError::ParseError(_)
        ));
        assert!(matches!(
            ApiError::from(PaginationError::InvalidPage("9".into())),
            ApiError::NotFound(_)
        ));
    }

    #[test]
    fn parameter_and_write_errors() {
        let e: ApiError = ParamError::Timestamp {
            param: "start",
            source: TimestampError::Invalid("x".into()),
        }
        .into();
        assert!(matches!(e, ApiError::InvalidParameter(_)));

        let e: ApiError = WriteError::UnsupportedValueType(ValueType::FloatArray).into();
        assert!(matches!(e, ApiError::UnsupportedMediaType(_)));

        let e: ApiError = WriteError::InvalidValue {
            value_type: ValueType::Float,
            timestamp: 0,
            value: "abc".into(),
        }
        .into();
        assert!(matches!(e, ApiError::Validation(_)));
    }
}
