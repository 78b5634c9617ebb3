//! Generic reference table endpoints and nested domain tables.
//!
//! Each reference scope registers its [`ReferenceTable`] as app data; the
//! same two handlers serve all of them.

use actix_web::{HttpRequest, HttpResponse, web};
use dd_node_database::reference;
use dd_node_database_models::ReferenceTable;
use dd_node_server_models::params::ReferenceListParams;
use dd_node_server_models::{ApiDomainTable, ApiDomainValue};

use super::list_response;
use crate::AppState;
use crate::error::ApiError;

/// `GET /api/{resource}`
pub async fn list(
    state: web::Data<AppState>,
    table: web::Data<ReferenceTable>,
    params: web::Query<ReferenceListParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let pagination = params.pagination.resolve()?;
    let search = params.search_term();

    let paged = reference::list_reference(
        state.db.as_ref(),
        &table,
        search.as_deref(),
        pagination.window(),
    )
    .await?;

    list_response(&req, pagination, paged.count, paged.rows)
}

/// `GET /api/{resource}/{key}`
pub async fn detail(
    state: web::Data<AppState>,
    table: web::Data<ReferenceTable>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let key = path.into_inner();
    let record = reference::get_reference(state.db.as_ref(), &table, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No {} entry {key}", table.table)))?;
    Ok(HttpResponse::Ok().json(record))
}

/// `GET /api/domains/{name}/tables`
pub async fn domain_tables(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let domain = path.into_inner();
    let tables = reference::list_domain_tables(state.db.as_ref(), &domain)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Domain {domain} not found")))?;

    let tables = tables
        .into_iter()
        .map(|t| ApiDomainTable::new(&domain, t))
        .collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(tables))
}

/// `GET /api/domains/{name}/tables/{table}/values`
pub async fn domain_values(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (domain, table) = path.into_inner();
    let values = reference::list_domain_values(state.db.as_ref(), &domain, &table)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Domain table {domain}/{table} not found")))?;

    let values = values
        .into_iter()
        .map(ApiDomainValue::from)
        .collect::<Vec<_>>();
    Ok(HttpResponse::Ok().json(values))
}
