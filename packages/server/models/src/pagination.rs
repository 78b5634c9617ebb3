//! Dual-mode list pagination.
//!
//! List endpoints accept either `page`/`page_size` (page-number mode) or
//! `limit`/`offset` (limit-offset mode). `page_size=0` disables pagination
//! and returns a bare array.

use dd_node_database_models::Page;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Page size used when the request does not specify one.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Errors produced while resolving pagination parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    /// Both pagination families were given.
    #[error("Use either page/page_size or limit/offset, not both.")]
    Mixed,

    /// A pagination parameter is not a non-negative integer.
    #[error("Invalid value for {param}: {value}")]
    InvalidNumber {
        /// The offending parameter.
        param: &'static str,
        /// Its raw value.
        value: String,
    },

    /// The requested page does not exist.
    #[error("Invalid page ({0}).")]
    InvalidPage(String),
}

/// Raw pagination query parameters.
///
/// Kept as strings so that malformed values produce a proper error instead
/// of a generic deserialization failure.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginationParams {
    /// 1-based page number.
    pub page: Option<String>,
    /// Items per page; `0` disables pagination.
    pub page_size: Option<String>,
    /// Maximum number of items.
    pub limit: Option<String>,
    /// Number of items to skip.
    pub offset: Option<String>,
}

/// The pagination mode selected by a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// No pagination: every row, as a bare array.
    Disabled,
    /// Page-number mode.
    PageNumber {
        /// 1-based page number.
        page: u64,
        /// Items per page.
        page_size: u64,
    },
    /// Limit-offset mode.
    LimitOffset {
        /// Maximum number of items.
        limit: u64,
        /// Number of items to skip.
        offset: u64,
    },
}

fn parse_number(param: &'static str, value: &str) -> Result<u64, PaginationError> {
    value
        .trim()
        .parse()
        .map_err(|_| PaginationError::InvalidNumber {
            param,
            value: value.to_string(),
        })
}

impl PaginationParams {
    /// Selects the pagination mode.
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError::Mixed`] when both families are present,
    /// [`PaginationError::InvalidNumber`] for malformed numbers and
    /// [`PaginationError::InvalidPage`] for a page number below 1.
    pub fn resolve(&self) -> Result<Pagination, PaginationError> {
        let page_family = self.page.is_some() || self.page_size.is_some();
        let limit_family = self.limit.is_some() || self.offset.is_some();

        if page_family && limit_family {
            return Err(PaginationError::Mixed);
        }

        if limit_family {
            let limit = self
                .limit
                .as_deref()
                .map(|l| parse_number("limit", l))
                .transpose()?
                .unwrap_or(DEFAULT_PAGE_SIZE);
            if limit == 0 {
                return Err(PaginationError::InvalidNumber {
                    param: "limit",
                    value: "0".to_string(),
                });
            }
            let offset = self
                .offset
                .as_deref()
                .map(|o| parse_number("offset", o))
                .transpose()?
                .unwrap_or(0);
            return Ok(Pagination::LimitOffset { limit, offset });
        }

        let page_size = self
            .page_size
            .as_deref()
            .map(|s| parse_number("page_size", s))
            .transpose()?
            .unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Ok(Pagination::Disabled);
        }

        let page = match self.page.as_deref() {
            None => 1,
            Some(p) => p
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| PaginationError::InvalidPage(p.to_string()))?,
        };

        Ok(Pagination::PageNumber { page, page_size })
    }
}

impl Pagination {
    /// The database window for this pagination.
    #[must_use]
    pub const fn window(self) -> Page {
        match self {
            Self::Disabled => Page::all(),
            Self::PageNumber { page, page_size } => Page {
                limit: Some(page_size),
                offset: page.saturating_sub(1).saturating_mul(page_size),
            },
            Self::LimitOffset { limit, offset } => Page {
                limit: Some(limit),
                offset,
            },
        }
    }

    /// Wraps one page of results in the response envelope.
    ///
    /// `path` and `query` are the request's path and raw query string; links
    /// to the neighbouring pages are built from them.
    ///
    /// # Errors
    ///
    /// Returns [`PaginationError::InvalidPage`] when a page-number request
    /// points past the last page.
    pub fn respond<T>(
        self,
        count: u64,
        results: Vec<T>,
        path: &str,
        query: &str,
    ) -> Result<ListResponse<T>, PaginationError> {
        match self {
            Self::Disabled => Ok(ListResponse::Plain(results)),
            Self::PageNumber { page, page_size } => {
                let pages = count.div_ceil(page_size).max(1);
                if page > pages {
                    return Err(PaginationError::InvalidPage(page.to_string()));
                }
                let next = (page < pages).then(|| {
                    link(path, query, &["page"], &[("page", (page + 1).to_string())])
                });
                let previous = (page > 1).then(|| {
                    if page == 2 {
                        link(path, query, &["page"], &[])
                    } else {
                        link(path, query, &["page"], &[("page", (page - 1).to_string())])
                    }
                });
                Ok(ListResponse::Paginated(Paginated {
                    count,
                    next,
                    previous,
                    results,
                }))
            }
            Self::LimitOffset { limit, offset } => {
                let next = (offset.saturating_add(limit) < count).then(|| {
                    link(
                        path,
                        query,
                        &["limit", "offset"],
                        &[
                            ("limit", limit.to_string()),
                            ("offset", (offset + limit).to_string()),
                        ],
                    )
                });
                let previous = (offset > 0).then(|| {
                    let previous_offset = offset.saturating_sub(limit);
                    let mut params = vec![("limit", limit.to_string())];
                    if previous_offset > 0 {
                        params.push(("offset", previous_offset.to_string()));
                    }
                    link(path, query, &["limit", "offset"], &params)
                });
                Ok(ListResponse::Paginated(Paginated {
                    count,
                    next,
                    previous,
                    results,
                }))
            }
        }
    }
}

/// Rebuilds `path?query` with the `replaced` keys removed and `extra` pairs
/// appended.
fn link(path: &str, query: &str, replaced: &[&str], extra: &[(&str, String)]) -> String {
    let mut pairs = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or_default();
            !replaced.contains(&key)
        })
        .map(ToString::to_string)
        .collect::<Vec<_>>();
    pairs.extend(extra.iter().map(|(k, v)| format!("{k}={v}")));

    if pairs.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{}", pairs.join("&"))
    }
}

/// A page of results with links to its neighbours.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Paginated<T> {
    /// Total number of matching items.
    pub count: u64,
    /// Relative link to the next page.
    pub next: Option<String>,
    /// Relative link to the previous page.
    pub previous: Option<String>,
    /// Items of this page.
    pub results: Vec<T>,
}

/// A list response, paginated or bare.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ListResponse<T> {
    /// Paginated envelope.
    Paginated(Paginated<T>),
    /// Bare array (pagination disabled).
    Plain(Vec<T>),
}

impl<T> ListResponse<T> {
    /// Converts every item.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ListResponse<U> {
        match self {
            Self::Paginated(p) => ListResponse::Paginated(Paginated {
                count: p.count,
                next: p.next,
                previous: p.previous,
                results: p.results.into_iter().map(f).collect(),
            }),
            Self::Plain(items) => ListResponse::Plain(items.into_iter().map(f).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> PaginationParams {
        let get = |k: &str| {
            pairs
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| (*v).to_string())
        };
        PaginationParams {
            page: get("page"),
            page_size: get("page_size"),
            limit: get("limit"),
            offset: get("offset"),
        }
    }

    #[test]
    fn defaults_to_first_page_of_ten() {
        assert_eq!(
            params(&[]).resolve().unwrap(),
            Pagination::PageNumber {
                page: 1,
                page_size: 10
            }
        );
    }

    #[test]
    fn zero_page_size_disables_pagination() {
        assert_eq!(
            params(&[("page_size", "0")]).resolve().unwrap(),
            Pagination::Disabled
        );
    }

    #[test]
    fn limit_selects_limit_offset_mode() {
        assert_eq!(
            params(&[("limit", "5"), ("offset", "15")]).resolve().unwrap(),
            Pagination::LimitOffset {
                limit: 5,
                offset: 15
            }
        );
        assert_eq!(
            params(&[("offset", "3")]).resolve().unwrap(),
            Pagination::LimitOffset {
                limit: 10,
                offset: 3
            }
        );
    }

    #[test]
    fn mixing_families_is_rejected() {
        assert_eq!(
            params(&[("page", "2"), ("limit", "5")]).resolve(),
            Err(PaginationError::Mixed)
        );
        assert_eq!(
            params(&[("page_size", "2"), ("offset", "5")]).resolve(),
            Err(PaginationError::Mixed)
        );
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        assert!(matches!(
            params(&[("page_size", "ten")]).resolve(),
            Err(PaginationError::InvalidNumber {
                param: "page_size",
                ..
            })
        ));
        assert!(matches!(
            params(&[("limit", "0")]).resolve(),
            Err(PaginationError::InvalidNumber { param: "limit", .. })
        ));
        assert_eq!(
            params(&[("page", "0")]).resolve(),
            Err(PaginationError::InvalidPage("0".to_string()))
        );
    }

    #[test]
    fn windows_translate_to_offsets() {
        let p = Pagination::PageNumber {
            page: 3,
            page_size: 10,
        };
        assert_eq!(
            p.window(),
            Page {
                limit: Some(10),
                offset: 20
            }
        );
        assert_eq!(Pagination::Disabled.window(), Page::all());
    }

    #[test]
    fn page_responses_link_neighbours() {
        let p = Pagination::PageNumber {
            page: 2,
            page_size: 10,
        };
        let response = p
            .respond(25, vec![1, 2], "/api/locations", "name=dam&page=2")
            .unwrap();
        let ListResponse::Paginated(page) = response else {
            panic!("expected a paginated response");
        };
        assert_eq!(page.count, 25);
        assert_eq!(page.next.as_deref(), Some("/api/locations?name=dam&page=3"));
        assert_eq!(page.previous.as_deref(), Some("/api/locations?name=dam"));
    }

    #[test]
    fn page_past_the_end_is_invalid() {
        let p = Pagination::PageNumber {
            page: 4,
            page_size: 10,
        };
        assert_eq!(
            p.respond(25, Vec::<u8>::new(), "/api/x", "page=4"),
            Err(PaginationError::InvalidPage("4".to_string()))
        );
    }

    #[test]
    fn first_page_of_empty_result_is_valid() {
        let p = Pagination::PageNumber {
            page: 1,
            page_size: 10,
        };
        let response = p.respond(0, Vec::<u8>::new(), "/api/x", "").unwrap();
        assert_eq!(
            response,
            ListResponse::Paginated(Paginated {
                count: 0,
                next: None,
                previous: None,
                results: vec![],
            })
        );
    }

    #[test]
    fn limit_offset_responses_link_neighbours() {
        let p = Pagination::LimitOffset {
            limit: 5,
            offset: 5,
        };
        let response = p
            .respond(12, vec![0; 5], "/api/x", "limit=5&offset=5")
            .unwrap();
        let ListResponse::Paginated(page) = response else {
            panic!("expected a paginated response");
        };
        assert_eq!(page.next.as_deref(), Some("/api/x?limit=5&offset=10"));
        assert_eq!(page.previous.as_deref(), Some("/api/x?limit=5"));
    }

    #[test]
    fn disabled_pagination_serializes_bare_array() {
        let response = Pagination::Disabled
            .respond(2, vec![1, 2], "/api/x", "page_size=0")
            .unwrap();
        assert_eq!(serde_json::to_value(&response).unwrap(), serde_json::json!([1, 2]));
    }
}
