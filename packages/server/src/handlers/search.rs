//! Search endpoint.

use actix_web::{HttpRequest, HttpResponse, web};
use dd_node_database::search as search_db;
use dd_node_database_models::Page;
use dd_node_server_models::ApiSearchResult;
use dd_node_server_models::params::SearchParams;

use super::list_response;
use crate::AppState;
use crate::error::ApiError;

/// Cuts one page out of an in-memory result list.
fn page_of<T>(items: Vec<T>, page: Page) -> Vec<T> {
    let offset = usize::try_from(page.offset).unwrap_or(usize::MAX);
    let limit = page
        .limit
        .map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX));
    items.into_iter().skip(offset).take(limit).collect()
}

/// `GET /api/search?q=..&type=..&exclude=..`
pub async fn search(
    state: web::Data<AppState>,
    params: web::Query<SearchParams>,
    req: HttpRequest,
) -> Result<HttpResponse, ApiError> {
    let pagination = params.pagination.resolve()?;

    let hits = match params.to_query() {
        Some(query) => search_db::search(state.db.as_ref(), &query).await?,
        None => Vec::new(),
    };

    let count = u64::try_from(hits.len()).unwrap_or(u64::MAX);
    let results = page_of(hits, pagination.window())
        .into_iter()
        .map(ApiSearchResult::from)
        .collect();

    list_response(&req, pagination, count, results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_are_cut_from_memory() {
        let items = (0..25).collect::<Vec<_>>();
        assert_eq!(
            page_of(
                items.clone(),
                Page {
                    limit: Some(10),
                    offset: 20
                }
            ),
            vec![20, 21, 22, 23, 24]
        );
        assert_eq!(page_of(items, Page::all()).len(), 25);
    }
}
