#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for dd-node.
//!
//! Serves the REST API for locations, timeseries and their events,
//! reference tables and search, backed by a `PostGIS` database.

pub mod error;
mod handlers;
mod resources;

use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use dd_node_database::{db, run_migrations};
use dd_node_database_models::ReferenceTable;
use error::ErrorConfig;
use switchy_database::Database;

/// Server settings, read once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// `postgres://` connection url.
    pub database_url: String,
    /// Address to bind to.
    pub bind_addr: String,
    /// Port to listen on.
    pub port: u16,
    /// Whether error bodies name the error variant.
    pub debug: bool,
}

impl ServerConfig {
    /// Reads `DATABASE_URL`, `BIND_ADDR`, `PORT` and `DD_NODE_DEBUG`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| db::DEFAULT_DATABASE_URL.to_string()),
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(8080),
            debug: lookup("DD_NODE_DEBUG")
                .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true")),
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// `PostGIS` database connection.
    pub db: Arc<dyn Database>,
}

/// A resource answering unsupported methods with `MethodNotAllowed`.
fn resource(path: &str) -> actix_web::Resource {
    web::resource(path).default_service(web::to(handlers::method_not_allowed))
}

/// Registers a reference table's list and detail routes under `path`.
fn reference_scope(path: &str, table: ReferenceTable) -> actix_web::Scope {
    web::scope(path)
        .app_data(web::Data::new(table))
        .service(resource("").route(web::get().to(handlers::reference::list)))
        .service(resource("/{key}").route(web::get().to(handlers::reference::detail)))
}

/// Registers every API route on `cfg`.
fn configure_api(cfg: &mut web::ServiceConfig) {
    cfg.service(resource("/health").route(web::get().to(handlers::health)))
        .service(
            resource("/locations")
                .route(web::get().to(handlers::locations::list))
                .route(web::post().to(handlers::locations::create)),
        )
        .service(
            resource("/locations/{uuid}")
                .route(web::get().to(handlers::locations::detail))
                .route(web::put().to(handlers::locations::update))
                .route(web::patch().to(handlers::locations::update))
                .route(web::delete().to(handlers::locations::delete)),
        )
        .service(
            resource("/locations/{uuid}/timeseries")
                .route(web::get().to(handlers::locations::time_dimension)),
        )
        .service(
            resource("/timeseries")
                .route(web::get().to(handlers::timeseries::list))
                .route(web::post().to(handlers::timeseries::create)),
        )
        // Registered before `/timeseries/{uuid}` so that `data` is not
        // taken for a uuid.
        .service(resource("/timeseries/data").route(web::get().to(handlers::timeseries::multi_data)))
        .service(
            resource("/timeseries/{uuid}")
                .route(web::get().to(handlers::timeseries::detail))
                .route(web::put().to(handlers::timeseries::update))
                .route(web::patch().to(handlers::timeseries::update))
                .route(web::delete().to(handlers::timeseries::delete)),
        )
        .service(
            resource("/timeseries/{uuid}/data")
                .route(web::get().to(handlers::timeseries::data))
                .route(web::post().to(handlers::timeseries::write)),
        )
        .service(
            resource("/timeseries/{uuid}/data/{timestamp}")
                .route(web::get().to(handlers::timeseries::event_detail)),
        )
        .service(
            resource("/domains/{name}/tables")
                .route(web::get().to(handlers::reference::domain_tables)),
        )
        .service(
            resource("/domains/{name}/tables/{table}/values")
                .route(web::get().to(handlers::reference::domain_values)),
        )
        .service(reference_scope("/observationtypes", resources::OBSERVATION_TYPES))
        .service(reference_scope("/datasources", resources::DATA_SOURCES))
        .service(reference_scope("/timeseriestypes", resources::TIMESERIES_TYPES))
        .service(reference_scope("/nodes", resources::NODES))
        .service(reference_scope("/domains", resources::DOMAINS))
        .service(resource("/search").route(web::get().to(handlers::search::search)));
}

/// Starts the dd-node API server.
///
/// Connects to the `PostGIS` database, runs migrations and starts the
/// Actix-Web HTTP server. The caller provides the async runtime (e.g. via
/// `#[actix_web::main]`).
///
/// # Errors
///
/// Returns an `std::io::Result` error if the database is unreachable,
/// migrations fail, or the HTTP server fails to bind or encounters a
/// runtime error.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ServerConfig) -> std::io::Result<()> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    log::info!("Connecting to database...");
    let db_conn = db::connect(&config.database_url)
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to connect to database: {e}")))?;

    log::info!("Running migrations...");
    run_migrations(db_conn.as_ref())
        .await
        .map_err(|e| std::io::Error::other(format!("Failed to run migrations: {e}")))?;

    let state = web::Data::new(AppState {
        db: Arc::from(db_conn),
    });
    let errors = web::Data::new(ErrorConfig {
        debug: config.debug,
    });

    log::info!("Starting server on {}:{}", config.bind_addr, config.port);

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(middleware::from_fn(error::render_errors))
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .app_data(errors.clone())
            .app_data(web::QueryConfig::default().error_handler(handlers::query_error))
            .app_data(web::JsonConfig::default().error_handler(handlers::json_error))
            .service(web::scope("/api").configure(configure_api))
            .default_service(web::to(handlers::not_found))
    })
    .bind((config.bind_addr, config.port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use actix_web::http::{Method, StatusCode};
    use actix_web::test;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let vars = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>();
        ServerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn config_defaults() {
        let c = config(&[]);
        assert_eq!(c.database_url, db::DEFAULT_DATABASE_URL);
        assert_eq!(c.bind_addr, "127.0.0.1");
        assert_eq!(c.port, 8080);
        assert!(!c.debug);
    }

    #[test]
    fn config_from_variables() {
        let c = config(&[
            ("DATABASE_URL", "postgres://u:p@db:5432/x"),
            ("BIND_ADDR", "0.0.0.0"),
            ("PORT", "9000"),
            ("DD_NODE_DEBUG", "True"),
        ]);
        assert_eq!(c.database_url, "postgres://u:p@db:5432/x");
        assert_eq!(c.bind_addr, "0.0.0.0");
        assert_eq!(c.port, 9000);
        assert!(c.debug);
    }

    #[test]
    fn unparsable_port_falls_back() {
        assert_eq!(config(&[("PORT", "http")]).port, 8080);
    }

    #[actix_web::test]
    async fn unsupported_methods_are_not_allowed() {
        let app = test::init_service(
            App::new()
                .service(web::scope("/api").configure(configure_api))
                .default_service(web::to(handlers::not_found)),
        )
        .await;

        let series = "/api/timeseries/7d2a1f4e-3b5c-4e8a-9f10-2b3c4d5e6f70";
        for (method, uri) in [
            (Method::POST, series.to_string()),
            (Method::DELETE, format!("{series}/data")),
            (Method::PUT, format!("{series}/data/1000")),
            (Method::POST, "/api/timeseries/data".to_string()),
            (Method::DELETE, "/api/search".to_string()),
            (Method::PUT, "/api/observationtypes/WNS1400".to_string()),
            (Method::POST, "/api/nodes".to_string()),
            (Method::DELETE, "/api/health".to_string()),
        ] {
            let req = test::TestRequest::default()
                .method(method.clone())
                .uri(&uri)
                .to_request();
            let res = test::call_service(&app, req).await;
            assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED, "{method} {uri}");
        }

        let req = test::TestRequest::get().uri("/api/rasters").to_request();
        let res = test::call_service(&app, req).await;
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
    }
}
