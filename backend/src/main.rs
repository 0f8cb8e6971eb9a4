use actix_cors::Cors;
use actix_web::{App, HttpServer, web};
use fingerspell::config::AppConfig;
use fingerspell::prediction::{AccuracyTable, PredictionService};
use fingerspell::routes::{configure_routes, json_config};
use std::env;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    } else {
        log::error!("Failed to get the current working directory.");
    }

    dotenv::dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let accuracy = match &config.accuracy_table_path {
        Some(path) => AccuracyTable::load(path).map_err(|e| {
            log::error!("Failed to load accuracy table {}: {}", path.display(), e);
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?,
        None => AccuracyTable::builtin(),
    };
    log::info!("Accuracy table loaded with {} labels", accuracy.len());

    let service = PredictionService::from_config(&config, Arc::new(accuracy));
    for path in [&config.classifier.script_path, &config.classifier.model_path] {
        if !path.exists() {
            log::warn!(
                "{} does not exist yet; predictions will fail until it is provided",
                path.display()
            );
        }
    }
    log::info!(
        "Classifier: script {}, model {}, timeout {}s, scratch dir {}",
        config.classifier.script_path.display(),
        config.classifier.model_path.display(),
        config.classifier.timeout.as_secs(),
        config.scratch_dir.display()
    );

    let service = web::Data::new(service);
    let body_limit = config.body_limit_bytes;
    let bind_address = config.bind_address();

    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(service.clone())
            .app_data(json_config(body_limit))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
