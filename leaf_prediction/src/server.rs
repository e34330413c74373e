use crate::{
    config::{Config, CorsConfig, ServerConfig},
    inference_service::InferenceService,
    model_service::ModelService,
    ort_service::OrtModelService,
    preprocess::InputShape,
    routes::api_routes,
};
use axum::{extract::DefaultBodyLimit, Router};
use tokio::{net::TcpListener, signal};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};

pub struct HttpServer {
    router: Router,
    listener: TcpListener,
}

impl HttpServer {
    pub async fn new<M: ModelService>(
        inference_service: InferenceService<M>,
        config: &Config,
    ) -> anyhow::Result<Self> {
        let router = build_router(inference_service, &config.server, &config.cors)?;
        let listener = TcpListener::bind(config.server.get_address()).await?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        tracing::info!("Starting app on {}", self.listener.local_addr()?);

        let shutdown = async {
            shutdown_signal().await;
            tracing::info!("Shutdown signal received, starting graceful shutdown");
        };

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

pub fn build_router<M: ModelService>(
    inference_service: InferenceService<M>,
    server_config: &ServerConfig,
    cors_config: &CorsConfig,
) -> anyhow::Result<Router> {
    let router = Router::new()
        .merge(api_routes())
        .with_state(inference_service)
        .layer(DefaultBodyLimit::max(server_config.max_upload_bytes))
        .layer(TraceLayer::new_for_http());

    if !cors_config.is_enabled() {
        return Ok(router);
    }

    tracing::info!("CORS enabled for {:?}", cors_config.allowed_origins);
    Ok(router.layer(cors_layer(cors_config)?))
}

fn cors_layer(cors_config: &CorsConfig) -> anyhow::Result<CorsLayer> {
    let origins = cors_config
        .origin_header_values()
        .map_err(anyhow::Error::msg)?;

    // Wildcards cannot be combined with credentials, so methods and headers
    // are mirrored from the preflight request instead.
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(cors_config.allow_credentials))
}

pub async fn start_server(config: Config) -> anyhow::Result<()> {
    let ort_model_service = match OrtModelService::new(&config.model) {
        Ok(service) => service,
        Err(e) => {
            tracing::error!("Failed to initialize model service: {}", e);
            return Err(e.into());
        }
    };

    let input_shape = InputShape {
        height: config.model.input_height,
        width: config.model.input_width,
        normalize: config.model.normalize,
    };
    let inference_service = InferenceService::new(
        ort_model_service,
        config.model.class_labels.clone(),
        input_shape,
    );

    let server = HttpServer::new(inference_service, &config).await?;
    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
