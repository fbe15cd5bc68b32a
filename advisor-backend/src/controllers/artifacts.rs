use actix_files::NamedFile;
use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;

use crate::context::AppContext;
use crate::turn::{is_session_key, ARTIFACT_URL_PREFIX};

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::resource(format!("{}/{{session_key}}/{{file_name}}", ARTIFACT_URL_PREFIX))
            .route(web::get().to(get_artifact)),
    );
}

/// Serve the artifact a turn attached, addressed by the session key the chat
/// response's `artifact_url` carries. Only the configured artifact file of a
/// session can be fetched.
async fn get_artifact(
    ctx: web::Data<Arc<AppContext>>,
    path: web::Path<(String, String)>,
    req: HttpRequest,
) -> HttpResponse {
    let (key, file_name) = path.into_inner();
    let artifacts = ctx.orchestrator.artifacts();

    if file_name != artifacts.file_name() || !is_session_key(&key) {
        return HttpResponse::NotFound().finish();
    }

    let slot = artifacts.slot(&key);
    if !artifacts.exists(&slot).await {
        log::debug!("[ARTIFACT] No artifact for session key {}", key);
        return HttpResponse::NotFound().finish();
    }

    match NamedFile::open_async(&slot).await {
        Ok(file) => file.into_response(&req),
        Err(e) => {
            log::warn!("[ARTIFACT] Failed to open {}: {}", slot.display(), e);
            HttpResponse::NotFound().finish()
        }
    }
}
