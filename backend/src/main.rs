use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use detection_service::config::ServiceConfig;
use detection_service::detector::DefaultLoader;
use detection_service::routes::configure_routes;
use detection_service::service::InferenceService;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    dotenv::dotenv().ok();

    let config = ServiceConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!("Model path: {}", config.model_path);
    log::info!("Results directory: {}", config.results_dir.display());
    log::info!(
        "Inference defaults: conf={} iou={} imgsz={} max_det={} device={}",
        config.defaults.confidence,
        config.defaults.iou_threshold,
        config.defaults.image_size,
        config.defaults.max_detections,
        config.defaults.device
    );

    let bind_address = config.bind_address();
    let workers = config.workers;
    let loader = Arc::new(DefaultLoader::new(config.defaults.device.clone()));
    let service = InferenceService::new(config, loader).map_err(|e| {
        log::error!("Failed to build HTTP client: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    // The server starts accepting requests while the model loads; /health
    // reports "loading" until the registry is Ready.
    let mut readiness = service.registry().subscribe();
    service.spawn_initial_load()?;
    actix_web::rt::spawn(async move {
        while readiness.changed().await.is_ok() {
            let state = *readiness.borrow_and_update();
            log::info!("Model state: {}", state);
        }
    });

    log::info!("Starting server on {}", bind_address);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(web::Data::new(service.clone()))
            .configure(configure_routes)
    });

    let server = match workers {
        Some(workers) => server.workers(workers),
        None => server,
    };

    server.bind(&bind_address)?.run().await
}
