use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use chrono::{Local, Utc};
use rifas_config::DEFAULT_MAX_BODY_BYTES;
use rifas_export::{Artifact, ExportError, Exporter, image_data_url};
use rifas_models::validation::field;
use rifas_models::{
    GridPreset, ParticipantDraft, Raffle, RaffleDraft, StatusCounts, Ticket, ValidationErrors,
    parse_ticket_number,
};
use rifas_store::{Outcome, RaffleStore, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::{version_string, views};

/// Shared by every handler. The store lock is held only for synchronous
/// store work; exports run on a snapshot after the lock is released.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Mutex<RaffleStore>>,
    pub exporter: Exporter,
    /// Request body limit; image uploads arrive inside the body.
    pub max_body_bytes: usize,
}

impl AppState {
    pub fn new(store: RaffleStore, exporter: Exporter) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            exporter,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }

    pub fn with_body_limit(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    async fn snapshot(&self) -> Raffle {
        self.store.lock().await.snapshot()
    }
}

pub fn router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health))
        .route("/raffle", get(api_get_raffle).post(api_create_raffle).put(api_update_raffle))
        .route("/report", get(api_report))
        .route("/tickets/{number}/reserve", post(api_reserve_ticket))
        .route("/tickets/{number}/pay", post(api_pay_ticket));

    Router::new()
        .route("/", get(participate))
        .route("/reserve/{number}", get(reserve_form).post(reserve_submit))
        .route("/admin", get(admin))
        .route("/admin/raffle", post(admin_save_raffle))
        .route("/admin/tickets/{number}/pay", post(admin_pay_ticket))
        .route("/tickets/{number}/pdf", get(ticket_pdf))
        .route("/grid.png", get(grid_png))
        .route("/board.png", get(board_png))
        .nest("/api", api_routes)
        .layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(port: u16, state: AppState) -> anyhow::Result<()> {
    info!("Rifas v{}", version_string());

    let app = router(state);
    let addr = format!("0.0.0.0:{port}");
    info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Responses ---

fn notice(status: StatusCode, title: &str, message: &str, back: &str) -> Response {
    (status, Html(views::notice_page(title, message, back))).into_response()
}

fn unknown_ticket(raw: &str) -> Response {
    notice(
        StatusCode::NOT_FOUND,
        "Boleto inexistente",
        &format!("El boleto \"{raw}\" no existe. Los números van del 00 al 99."),
        "/",
    )
}

fn storage_failure(e: &StoreError, back: &str) -> Response {
    error!("Store operation failed: {e}");
    notice(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Error al guardar",
        "No se pudo guardar el cambio. La rifa no fue modificada.",
        back,
    )
}

/// `attachment` disposition with an ASCII fallback name plus the UTF-8 name.
fn content_disposition(file_name: &str) -> HeaderValue {
    let fallback: String = file_name
        .chars()
        .map(|c| if c.is_ascii_graphic() && c != '"' && c != '\\' { c } else { '_' })
        .collect();
    let encoded = urlencoding::encode(file_name);
    HeaderValue::from_str(&format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

fn download(artifact: Artifact) -> Response {
    let disposition = content_disposition(&artifact.file_name);
    (
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(artifact.content_type)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        artifact.bytes,
    )
        .into_response()
}

/// Logs an export failure and turns it into a blocking notice.
fn export_failure(e: &ExportError, message: &str, back: &str) -> Response {
    match e {
        ExportError::UnknownTicket(number) => unknown_ticket(number),
        ExportError::NoParticipant(number) => notice(
            StatusCode::CONFLICT,
            "Boleto sin participante",
            &format!("El boleto #{number} no está reservado ni pagado."),
            back,
        ),
        _ => {
            error!("Export failed: {e}");
            notice(StatusCode::INTERNAL_SERVER_ERROR, "Error de exportación", message, back)
        }
    }
}

// --- Participate view ---

#[derive(Deserialize)]
struct ParticipateQuery {
    reserved: Option<String>,
}

async fn participate(State(state): State<AppState>, Query(query): Query<ParticipateQuery>) -> Html<String> {
    let store = state.store.lock().await;
    let raffle = store.raffle();
    let reserved = query
        .reserved
        .as_deref()
        .and_then(parse_ticket_number)
        .and_then(|number| raffle.ticket(&number))
        .filter(|ticket| ticket.participant().is_some());
    Html(views::participate_page(raffle, reserved))
}

async fn reserve_form(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Some(number) = parse_ticket_number(&raw) else {
        return unknown_ticket(&raw);
    };
    let store = state.store.lock().await;
    let raffle = store.raffle();
    match raffle.ticket(&number) {
        Some(ticket) if ticket.is_available() => {
            Html(views::reserve_page(raffle, &number, &ParticipantDraft::default(), None)).into_response()
        }
        Some(_) => not_available(&number),
        None => unknown_ticket(&raw),
    }
}

fn not_available(number: &str) -> Response {
    notice(
        StatusCode::CONFLICT,
        "Boleto no disponible",
        &format!("El boleto #{number} ya no está disponible. Elige otro número."),
        "/",
    )
}

async fn reserve_submit(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Form(draft): Form<ParticipantDraft>,
) -> Response {
    let Some(number) = parse_ticket_number(&raw) else {
        return unknown_ticket(&raw);
    };
    let mut store = state.store.lock().await;
    if store.raffle().ticket(&number).is_some_and(|t| !t.is_available()) {
        return not_available(&number);
    }
    match store.reserve(&number, &draft) {
        Ok(Outcome::Applied) => Redirect::to(&format!("/?reserved={number}")).into_response(),
        Ok(Outcome::Unchanged) => not_available(&number),
        Err(StoreError::Validation(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Html(views::reserve_page(store.raffle(), &number, &draft, Some(&errors))),
        )
            .into_response(),
        Err(e) => storage_failure(&e, "/"),
    }
}

// --- Administer view ---

async fn admin(State(state): State<AppState>) -> Html<String> {
    let store = state.store.lock().await;
    let raffle = store.raffle();
    Html(views::admin_page(raffle, &RaffleDraft::from_raffle(raffle), None))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Intent {
    Create,
    Update,
}

/// Fields of the multipart raffle form.
struct RaffleForm {
    intent: Intent,
    draft: RaffleDraft,
    upload: Option<Vec<u8>>,
    /// The body limit cut the form short; fields after that point are missing.
    too_large: bool,
}

fn is_too_large(e: &MultipartError) -> bool {
    e.status() == StatusCode::PAYLOAD_TOO_LARGE
}

async fn read_raffle_form(mut multipart: Multipart) -> Result<RaffleForm, MultipartError> {
    let mut form = RaffleForm {
        intent: Intent::Update,
        draft: RaffleDraft::default(),
        upload: None,
        too_large: false,
    };
    loop {
        let part = match multipart.next_field().await {
            Ok(Some(part)) => part,
            Ok(None) => break,
            Err(e) if is_too_large(&e) => {
                form.too_large = true;
                break;
            }
            Err(e) => return Err(e),
        };
        let name = part.name().unwrap_or_default().to_string();
        let read = match name.as_str() {
            "itemImage" => part.bytes().await.map(|bytes| {
                if !bytes.is_empty() {
                    form.upload = Some(bytes.to_vec());
                }
            }),
            "intent" => part.text().await.map(|text| {
                if text == "create" {
                    form.intent = Intent::Create;
                }
            }),
            "title" => part.text().await.map(|v| form.draft.title = v),
            "description" => part.text().await.map(|v| form.draft.description = v),
            "ticketPrice" => part.text().await.map(|v| form.draft.ticket_price = v),
            "raffleDate" => part.text().await.map(|v| form.draft.raffle_date = v),
            "lotteryName" => part.text().await.map(|v| form.draft.lottery_name = v),
            "gridSizePreset" => part
                .text()
                .await
                .map(|v| form.draft.grid_size_preset = GridPreset::parse(&v)),
            other => {
                warn!("Ignoring unknown raffle form field {other:?}");
                Ok(())
            }
        };
        match read {
            Ok(()) => {}
            Err(e) if is_too_large(&e) => {
                form.too_large = true;
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(form)
}

fn image_rejected(store: &RaffleStore, draft: &RaffleDraft, message: String) -> Response {
    let mut errors = ValidationErrors::default();
    errors.errors.insert(field::ITEM_IMAGE, message);
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Html(views::admin_page(store.raffle(), draft, Some(&errors))),
    )
        .into_response()
}

async fn admin_save_raffle(State(state): State<AppState>, multipart: Multipart) -> Response {
    let form = match read_raffle_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            warn!("Unreadable raffle form: {e}");
            return notice(
                StatusCode::BAD_REQUEST,
                "Formulario inválido",
                "No se pudo leer el formulario enviado.",
                "/admin",
            );
        }
    };
    let mut draft = form.draft;

    let mut store = state.store.lock().await;
    if form.too_large {
        warn!("Raffle form exceeds the {} byte body limit", state.max_body_bytes);
        let megabytes = state.max_body_bytes as f64 / (1024.0 * 1024.0);
        let message = format!("La imagen es demasiado grande. El máximo es {megabytes:.1} MB.");
        // The cut-off form is incomplete, so the stored values are shown again.
        let current = RaffleDraft::from_raffle(store.raffle());
        return image_rejected(&store, &current, message);
    }
    match form.upload.as_deref().map(image_data_url) {
        Some(Ok(url)) => draft.item_image = Some(url),
        Some(Err(e)) => {
            warn!("Rejected item image upload: {e}");
            return image_rejected(&store, &draft, "El archivo no es una imagen válida.".to_string());
        }
        None if form.intent == Intent::Update => draft.item_image = store.raffle().item_image.clone(),
        None => {}
    }

    let result = match form.intent {
        Intent::Create => store.create(&draft, Utc::now()).map(|_| ()),
        Intent::Update => store.update(&draft, Utc::now()).map(|_| ()),
    };
    match result {
        Ok(()) => Redirect::to("/admin").into_response(),
        Err(StoreError::Validation(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Html(views::admin_page(store.raffle(), &draft, Some(&errors))),
        )
            .into_response(),
        Err(e) => storage_failure(&e, "/admin"),
    }
}

/// Marks the ticket paid, then downloads its document. A failed export
/// leaves the payment recorded.
async fn admin_pay_ticket(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Some(number) = parse_ticket_number(&raw) else {
        return unknown_ticket(&raw);
    };
    let raffle = {
        let mut store = state.store.lock().await;
        match store.mark_paid(&number) {
            Ok(Outcome::Applied) => store.snapshot(),
            Ok(Outcome::Unchanged) => {
                return notice(
                    StatusCode::CONFLICT,
                    "No se puede procesar el pago",
                    &format!("El boleto #{number} no está reservado."),
                    "/admin",
                );
            }
            Err(e) => return storage_failure(&e, "/admin"),
        }
    };
    match state.exporter.ticket_pdf(&raffle, &number).await {
        Ok(artifact) => download(artifact),
        Err(e) => export_failure(
            &e,
            "Hubo un error al generar el PDF del boleto pagado. El pago quedó registrado.",
            "/admin",
        ),
    }
}

// --- Exports ---

async fn ticket_pdf(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let Some(number) = parse_ticket_number(&raw) else {
        return unknown_ticket(&raw);
    };
    let raffle = state.snapshot().await;
    match state.exporter.ticket_pdf(&raffle, &number).await {
        Ok(artifact) => download(artifact),
        Err(e) => export_failure(&e, "Hubo un error al generar el PDF del boleto.", "/"),
    }
}

async fn grid_png(State(state): State<AppState>) -> Response {
    let raffle = state.snapshot().await;
    let today = Local::now().date_naive();
    match state.exporter.grid_png(&raffle, today).await {
        Ok(artifact) => download(artifact),
        Err(e) => export_failure(&e, "Hubo un error al generar la imagen de la cuadrícula.", "/admin"),
    }
}

async fn board_png(State(state): State<AppState>) -> Response {
    let raffle = state.snapshot().await;
    let today = Local::now().date_naive();
    match state.exporter.board_png(&raffle, today).await {
        Ok(artifact) => download(artifact),
        Err(e) => export_failure(&e, "Hubo un error al generar la captura de pantalla.", "/"),
    }
}

// --- JSON API ---

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Conflict(String),
    Invalid(ValidationErrors),
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Validation(errors) => Self::Invalid(errors),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::NotFound(message) => (
                StatusCode::NOT_FOUND,
                json!({ "code": "NOT_FOUND", "message": message }),
            ),
            Self::Conflict(message) => (
                StatusCode::CONFLICT,
                json!({ "code": "CONFLICT", "message": message }),
            ),
            Self::Invalid(errors) => {
                let message = errors.to_string();
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({ "code": "VALIDATION", "message": message, "fields": errors.errors }),
                )
            }
            Self::Internal(message) => {
                error!("Internal error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "code": "INTERNAL", "message": "An internal error occurred" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

fn ticket_number(raw: &str) -> Result<String, ApiError> {
    parse_ticket_number(raw).ok_or_else(|| ApiError::NotFound(format!("Ticket {raw} not found")))
}

fn ticket_of(raffle: &Raffle, number: &str) -> Result<Ticket, ApiError> {
    raffle
        .ticket(number)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("Ticket {number} not found")))
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "¡Bienvenido a las rifas!",
        "version": version_string()
    }))
}

async fn api_get_raffle(State(state): State<AppState>) -> Json<Raffle> {
    Json(state.snapshot().await)
}

async fn api_create_raffle(
    State(state): State<AppState>,
    Json(draft): Json<RaffleDraft>,
) -> Result<(StatusCode, Json<Raffle>), ApiError> {
    let mut store = state.store.lock().await;
    let raffle = store.create(&draft, Utc::now())?.clone();
    Ok((StatusCode::CREATED, Json(raffle)))
}

/// Updates the descriptive fields; an omitted image keeps the current one.
async fn api_update_raffle(
    State(state): State<AppState>,
    Json(mut draft): Json<RaffleDraft>,
) -> Result<Json<Raffle>, ApiError> {
    let mut store = state.store.lock().await;
    if draft.item_image.is_none() {
        draft.item_image = store.raffle().item_image.clone();
    }
    let raffle = store.update(&draft, Utc::now())?.clone();
    Ok(Json(raffle))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Report {
    raffle_id: String,
    title: String,
    counts: StatusCounts,
    tickets: Vec<Ticket>,
}

async fn api_report(State(state): State<AppState>) -> Json<Report> {
    let store = state.store.lock().await;
    let raffle = store.raffle();
    Json(Report {
        raffle_id: raffle.id.clone(),
        title: raffle.title.clone(),
        counts: raffle.counts(),
        tickets: raffle.participant_tickets().into_iter().cloned().collect(),
    })
}

async fn api_reserve_ticket(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    Json(draft): Json<ParticipantDraft>,
) -> Result<(StatusCode, Json<Ticket>), ApiError> {
    let number = ticket_number(&raw)?;
    let mut store = state.store.lock().await;
    if !ticket_of(store.raffle(), &number)?.is_available() {
        return Err(ApiError::Conflict(format!("Ticket {number} is not available")));
    }
    match store.reserve(&number, &draft)? {
        Outcome::Applied => Ok((StatusCode::CREATED, Json(ticket_of(store.raffle(), &number)?))),
        Outcome::Unchanged => Err(ApiError::Conflict(format!("Ticket {number} is not available"))),
    }
}

async fn api_pay_ticket(
    State(state): State<AppState>,
    Path(raw): Path<String>,
) -> Result<Json<Ticket>, ApiError> {
    let number = ticket_number(&raw)?;
    let mut store = state.store.lock().await;
    ticket_of(store.raffle(), &number)?;
    match store.mark_paid(&number)? {
        Outcome::Applied => Ok(Json(ticket_of(store.raffle(), &number)?)),
        Outcome::Unchanged => Err(ApiError::Conflict(format!("Ticket {number} is not reserved"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disposition_keeps_ascii_names_readable() {
        let value = content_disposition("boleto_rifa_Gran_Rifa_07.pdf");
        assert_eq!(
            value.to_str().unwrap(),
            "attachment; filename=\"boleto_rifa_Gran_Rifa_07.pdf\"; \
             filename*=UTF-8''boleto_rifa_Gran_Rifa_07.pdf"
        );
    }

    #[test]
    fn disposition_encodes_non_ascii_names() {
        let value = content_disposition("vista_rifa_Navideña_2026-10-19.png");
        let text = value.to_str().unwrap();
        assert!(text.contains("filename=\"vista_rifa_Navide_a_2026-10-19.png\""));
        assert!(text.contains("filename*=UTF-8''vista_rifa_Navide%C3%B1a_2026-10-19.png"));
    }

    #[test]
    fn store_validation_maps_to_invalid() {
        let mut errors = ValidationErrors::default();
        errors.errors.insert(field::EMAIL, "Correo electrónico inválido.".into());
        let api: ApiError = StoreError::Validation(errors).into();
        assert!(matches!(api, ApiError::Invalid(e) if e.get(field::EMAIL).is_some()));
    }
}
