use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::signal;

use crate::{
    auth,
    config::Config,
    context::AppContext,
    errors::AppError,
    index::ImageIndex,
    ingest,
    models::{ImageId, ImageOptUpdate, PagingParams, SearchCriteria, SearchHit},
    moderation, parse_categories,
    search::{self, QueryId, SearchBasis, SearchOutcome},
};

/// Upload limit: 10M
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

async fn start_app(config: Config) -> anyhow::Result<()> {
    let ctx = AppContext::initialize(config)?;

    async fn shutdown_signal() {
        let ctrl_c = async {
            signal::ctrl_c()
                .await
                .expect("failed to install Ctrl+C handler");
        };

        let terminate = async {
            signal::unix::signal(signal::unix::SignalKind::terminate())
                .expect("failed to install signal handler")
                .recv()
                .await;
        };

        tokio::select! {
            _ = ctrl_c => {},
            _ = terminate => {},
        }
    }

    let bind = ctx.config.bind.clone();
    let app = create_router(ctx);

    let listener = tokio::net::TcpListener::bind(&bind).await?;
    log::info!("listening on {bind}");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

pub fn start_daemon(config: Config) -> anyhow::Result<()> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async { start_app(config).await })
}

pub fn create_router(ctx: Arc<AppContext>) -> Router {
    let search_routes = Router::new()
        .route("/text/:prompt", get(text_search))
        .route("/image", post(image_search))
        .route("/similar/:id", get(similar_search))
        .route("/advanced", post(advanced_search))
        .route("/random", get(random_search))
        .route("/recall/:query_id", get(recall_query))
        .route_layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_access_token,
        ));

    let admin_routes = Router::new()
        .route("/delete/:id", delete(delete_image))
        .route("/update_opt/:id", put(update_image))
        .route("/upload", post(upload_image))
        .route("/server_info", get(server_info))
        .route_layer(axum::middleware::from_fn_with_state(
            ctx.clone(),
            auth::require_admin_token,
        ));

    Router::new()
        .merge(search_routes)
        .merge(admin_routes)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(
            tower_http::trace::TraceLayer::new_for_http()
                .make_span_with(
                    tower_http::trace::DefaultMakeSpan::new().level(tracing::Level::INFO),
                )
                .on_response(
                    tower_http::trace::DefaultOnResponse::new().level(tracing::Level::INFO),
                ),
        )
        .with_state(ctx)
}

// Wraps `AppError` so axum knows how to turn it into a response.
#[derive(Debug)]
struct HttpError(AppError);

impl IntoResponse for HttpError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self.0 {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::UnsupportedFormat => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::InvalidPayload => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::BAD_REQUEST,
            AppError::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            AppError::Computation(_) | AppError::Io(_) | AppError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        if status.is_server_error() {
            log::error!("{:?}", self.0);
        }

        // a duplicate carries the existing id so the caller can resolve the
        // record without a second lookup
        let body = match &self.0 {
            AppError::Duplicate(id) => {
                json!({"error": self.0.to_string(), "id": id.to_string()})
            }
            _ => json!({"error": self.0.to_string()}),
        };

        (status, body.to_string()).into_response()
    }
}

// This enables using `?` on functions that return `Result<_, AppError>` to
// turn them into `Result<_, HttpError>`.
impl<E> From<E> for HttpError
where
    E: Into<AppError>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct BasisParams {
    #[serde(default)]
    basis: SearchBasis,
}

#[derive(Serialize)]
struct SearchApiResponse {
    message: String,
    query_id: QueryId,
    result: Vec<SearchHit>,
}

impl From<SearchOutcome> for SearchApiResponse {
    fn from(outcome: SearchOutcome) -> Self {
        Self {
            message: format!("successfully got {} results", outcome.hits.len()),
            query_id: outcome.query_id,
            result: outcome.hits,
        }
    }
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn text_search(
    State(ctx): State<Arc<AppContext>>,
    Path(prompt): Path<String>,
    Query(basis): Query<BasisParams>,
    Query(paging): Query<PagingParams>,
) -> Result<Json<SearchApiResponse>, HttpError> {
    let length = prompt.chars().count();
    if !(3..=100).contains(&length) {
        return Err(AppError::validation("prompt must be between 3 and 100 characters").into());
    }

    let paging = paging.validated()?;
    let outcome = search::text_search(&ctx, &prompt, basis.basis, paging).await?;
    Ok(Json(outcome.into()))
}

async fn image_search(
    State(ctx): State<Arc<AppContext>>,
    Query(paging): Query<PagingParams>,
    body: Bytes,
) -> Result<Json<SearchApiResponse>, HttpError> {
    let paging = paging.validated()?;
    let outcome = search::image_search(&ctx, &body, paging).await?;
    Ok(Json(outcome.into()))
}

async fn similar_search(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Query(basis): Query<BasisParams>,
    Query(paging): Query<PagingParams>,
) -> Result<Json<SearchApiResponse>, HttpError> {
    let paging = paging.validated()?;
    let outcome = search::similar_search(&ctx, &ImageId::from(id), basis.basis, paging).await?;
    Ok(Json(outcome.into()))
}

async fn advanced_search(
    State(ctx): State<Arc<AppContext>>,
    Query(basis): Query<BasisParams>,
    Query(paging): Query<PagingParams>,
    Json(criteria): Json<SearchCriteria>,
) -> Result<Json<SearchApiResponse>, HttpError> {
    let paging = paging.validated()?;
    let outcome = search::advanced_search(&ctx, &criteria, basis.basis, paging).await?;
    Ok(Json(outcome.into()))
}

async fn random_search(
    State(ctx): State<Arc<AppContext>>,
    Query(paging): Query<PagingParams>,
) -> Result<Json<SearchApiResponse>, HttpError> {
    let paging = paging.validated()?;
    let outcome = search::random_search(&ctx, paging).await?;
    Ok(Json(outcome.into()))
}

async fn recall_query(
    Path(query_id): Path<String>,
) -> Result<Json<SearchApiResponse>, HttpError> {
    search::recall(&query_id)
        .map(|outcome| Json(outcome.into()))
        .map_err(Into::into)
}

async fn delete_image(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, HttpError> {
    moderation::delete_image(&ctx, &ImageId::from(id)).await?;
    Ok(Json(MessageResponse {
        message: "image deleted".to_string(),
    }))
}

async fn update_image(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(update): Json<ImageOptUpdate>,
) -> Result<Json<MessageResponse>, HttpError> {
    moderation::update_image(&ctx, &ImageId::from(id), update).await?;
    Ok(Json(MessageResponse {
        message: "image updated".to_string(),
    }))
}

#[derive(Debug, Clone, Deserialize)]
struct UploadParams {
    url: String,
    thumbnail_url: Option<String>,
    #[serde(default)]
    local: bool,
    categories: Option<String>,
    #[serde(default)]
    starred: bool,
    #[serde(default)]
    skip_ocr: bool,
    filename: Option<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    message: String,
    id: ImageId,
}

async fn upload_image(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, HttpError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok());

    let fields = ingest::UploadFields {
        url: params.url,
        thumbnail_url: params.thumbnail_url,
        local: params.local,
        categories: params.categories.map(parse_categories).unwrap_or_default(),
        starred: params.starred,
    };

    let record = ingest::prepare(
        ctx.index.as_ref(),
        &body,
        content_type,
        params.filename.as_deref(),
        fields,
    )
    .await?;

    let id = record.id.clone();
    ctx.queue.submit(record, body.to_vec(), params.skip_ocr)?;
    log::info!("image {id} queued for indexing");

    Ok(Json(UploadResponse {
        message: "image added to the indexing queue".to_string(),
        id,
    }))
}

#[derive(Serialize)]
struct ServerInfoResponse {
    message: String,
    image_count: usize,
    index_queue_length: usize,
}

async fn server_info(
    State(ctx): State<Arc<AppContext>>,
) -> Result<Json<ServerInfoResponse>, HttpError> {
    Ok(Json(ServerInfoResponse {
        message: "server information".to_string(),
        image_count: ctx.index.count().await?,
        index_queue_length: ctx.queue.depth(),
    }))
}
