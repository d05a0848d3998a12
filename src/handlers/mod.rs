use crate::error::Error;
use crate::models::{NewPoll, PollVotes};
use crate::sampler::Sampler;
use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, Responder, ResponseError};
use log::{error, info, warn};
use serde_json::json;

pub struct AppState {
    pub sampler: Sampler,
    /// Answer unknown polls with the old placeholder payload instead of a 404.
    pub legacy_placeholder: bool,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(health_check))
        .route("/polls", web::get().to(list_polls))
        .route("/polls", web::post().to(create_poll))
        .route("/polls/{poll_id}", web::get().to(poll_detail))
        .route("/polls/{poll_id}/votes", web::get().to(get_votes));
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::PollNotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidPoll(_) => StatusCode::BAD_REQUEST,
            Error::Device(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Parse(_) => StatusCode::BAD_GATEWAY,
            Error::Database(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        if self.status_code().is_server_error() {
            error!("Request failed: {}", self);
        }
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}

async fn health_check() -> impl Responder {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

async fn list_polls(state: web::Data<AppState>) -> Result<HttpResponse, Error> {
    let polls = state.sampler.database().list_polls().await?;
    Ok(HttpResponse::Ok().json(polls))
}

async fn create_poll(
    state: web::Data<AppState>,
    body: web::Json<NewPoll>,
) -> Result<HttpResponse, Error> {
    let (question, choices) = body.validated()?;
    let poll = state.sampler.database().create_poll(question, &choices).await?;
    info!("Created poll {} with {} choice(s)", poll.id, poll.choices.len());
    Ok(HttpResponse::Created().json(poll))
}

async fn poll_detail(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, Error> {
    let poll_id = path.into_inner();
    let poll = state
        .sampler
        .database()
        .get_poll(poll_id)
        .await?
        .ok_or(Error::PollNotFound(poll_id))?;
    Ok(HttpResponse::Ok().json(poll))
}

// Polled by the results page to refresh the chart
async fn get_votes(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, Error> {
    let poll_id = path.into_inner();
    match state.sampler.sample(poll_id).await {
        Ok(votes) => Ok(HttpResponse::Ok().json(votes)),
        Err(Error::PollNotFound(id)) if state.legacy_placeholder => {
            warn!("Poll {} not found, answering with placeholder choices", id);
            Ok(HttpResponse::Ok().json(PollVotes::legacy_placeholder()))
        }
        Err(e) => Err(e),
    }
}
