//! # ab-api Handlers
//!
//! Thin adapters from HTTP requests to [`Board`] operations.

use std::fmt;

use ab_core::board::Board;
use ab_core::error::AppError;
use ab_core::models::{EntryId, Order, Reaction};
use ab_ui::{CommentTemplate, IndexTemplate};
use actix_web::http::{header, StatusCode};
use actix_web::{web, HttpRequest, HttpResponse, ResponseError};
use askama::Template;
use serde::Deserialize;
use tracing::{error, info};

/// State shared across all Actix-web workers.
pub struct AppState {
    pub board: Board,
    pub index_order: Order,
}

/// [`AppError`] carried across the HTTP boundary.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl From<askama::Error> for ApiError {
    fn from(err: askama::Error) -> Self {
        Self(AppError::Storage(err.into()))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self.0 {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Forbidden(_) => StatusCode::UNAUTHORIZED,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match &self.0 {
            AppError::Storage(err) => {
                error!(error = %err, "request failed");
                "internal error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(body)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Deserialize)]
pub struct ReplyForm {
    #[serde(default)]
    pub content: String,
    pub name: Option<String>,
    pub title: Option<String>,
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body)
}

fn see_other(location: &str) -> HttpResponse {
    HttpResponse::SeeOther()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Sends the browser back where it came from. Only local referers are
/// followed; anything else falls back to `fallback`.
fn redirect_back(req: &HttpRequest, fallback: &str) -> HttpResponse {
    let conn = req.connection_info();
    let host = conn.host();
    let referer = req
        .headers()
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|r| {
            (r.starts_with('/') && !r.starts_with("//"))
                || [format!("http://{host}/"), format!("https://{host}/")]
                    .iter()
                    .any(|origin| r.starts_with(origin.as_str()))
        });
    see_other(referer.unwrap_or(fallback))
}

/// Renders the root index (`GET /`).
pub async fn index(data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let roots = data.board.list_roots(data.index_order).await?;
    let page = IndexTemplate { title: "all posts", roots: &roots }.render()?;
    Ok(html(page))
}

/// `GET /post/{title}/{content}`: find-or-create a root, then show it.
pub async fn post_root(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> ApiResult<HttpResponse> {
    let (title, content) = path.into_inner();
    let resolved = data.board.submit_root(&title, Some(&content), None).await?;
    info!(id = resolved.entry.id, created = resolved.created, "root submitted");
    Ok(see_other(&format!("/comment/{}", resolved.entry.id)))
}

pub async fn view_comment(
    data: web::Data<AppState>,
    path: web::Path<EntryId>,
) -> ApiResult<HttpResponse> {
    let tree = data.board.render_tree(path.into_inner()).await?;
    let page = CommentTemplate::for_tree(&tree).render()?;
    Ok(html(page))
}

/// `POST /comment/{id}`: reply to entry `id`.
pub async fn post_comment(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<EntryId>,
    form: web::Form<ReplyForm>,
) -> ApiResult<HttpResponse> {
    let parent_id = path.into_inner();
    let form = form.into_inner();
    let id = data
        .board
        .submit_reply(
            parent_id,
            &form.content,
            form.name.as_deref(),
            form.title.as_deref(),
        )
        .await?;
    info!(id, parent_id, "reply submitted");
    Ok(redirect_back(&req, &format!("/comment/{parent_id}")))
}

async fn react(
    data: web::Data<AppState>,
    req: HttpRequest,
    id: EntryId,
    reaction: Reaction,
) -> ApiResult<HttpResponse> {
    data.board.bump(id, reaction).await?;
    Ok(redirect_back(&req, &format!("/comment/{id}")))
}

pub async fn like(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<EntryId>,
) -> ApiResult<HttpResponse> {
    react(data, req, path.into_inner(), Reaction::Like).await
}

pub async fn dislike(
    data: web::Data<AppState>,
    req: HttpRequest,
    path: web::Path<EntryId>,
) -> ApiResult<HttpResponse> {
    react(data, req, path.into_inner(), Reaction::Dislike).await
}

/// `GET /api/tree/{id}`: the nested tree as JSON.
pub async fn api_tree(
    data: web::Data<AppState>,
    path: web::Path<EntryId>,
) -> ApiResult<HttpResponse> {
    let tree = data.board.render_tree(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(tree))
}
