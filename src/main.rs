mod auth;
mod config;
mod models;
mod reconcile;
mod routes;
mod state;
mod store;
mod templates;
mod wizard;

use std::sync::Arc;

use actix_files::Files;
use actix_web::{middleware, web, App, HttpServer};

use crate::{
    auth::AdminCredentials,
    config::{Config, StoreBackend},
    state::AppState,
    store::{RemoteStore, RestStore, SqliteStore},
};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let config = Config::from_env()?;

    let store: Arc<dyn RemoteStore> = match &config.backend {
        StoreBackend::Rest {
            project_url,
            api_key,
            timeout,
        } => Arc::new(RestStore::new(project_url, api_key, *timeout)?),
        StoreBackend::Sqlite { database_url } => Arc::new(SqliteStore::connect(database_url).await?),
    };
    log::info!("Using {} store", store.backend_name());

    let credentials = AdminCredentials::new(&config.admin_user, &config.admin_password)
        .map_err(|err| format!("could not hash admin password: {err}"))?;

    let state = web::Data::new(AppState::new(
        store,
        credentials,
        config.display_offset,
        models::default_catalog(),
    ));

    if state.refresh().await.is_err() {
        log::warn!("Starting with no bookings loaded; the dashboard retries the refresh");
    }

    let address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting Serenity Spa on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(middleware::Logger::default())
            .service(Files::new("/static", "./static").prefer_utf8(true))
            .configure(routes::public::configure)
            .configure(routes::admin::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
