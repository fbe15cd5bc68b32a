//! Telemetry API endpoints for recorded turns and their spans.

use actix_web::{web, HttpResponse, Responder};
use serde::Deserialize;
use std::sync::Arc;

use crate::context::AppContext;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/telemetry")
            .route("/records", web::get().to(list_records))
            .route("/records/{turn_id}", web::get().to(get_record))
            .route("/records/{turn_id}/spans", web::get().to(get_record_spans)),
    );
}

#[derive(Deserialize)]
struct RecordsQuery {
    limit: Option<usize>,
}

async fn list_records(ctx: web::Data<Arc<AppContext>>, query: web::Query<RecordsQuery>) -> impl Responder {
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    HttpResponse::Ok().json(ctx.telemetry.recent_records(limit))
}

async fn get_record(ctx: web::Data<Arc<AppContext>>, path: web::Path<String>) -> impl Responder {
    match ctx.telemetry.turn_record(&path.into_inner()) {
        Some(record) => HttpResponse::Ok().json(record),
        None => HttpResponse::NotFound().json(serde_json::json!({ "error": "Turn not found" })),
    }
}

async fn get_record_spans(ctx: web::Data<Arc<AppContext>>, path: web::Path<String>) -> impl Responder {
    HttpResponse::Ok().json(ctx.telemetry.turn_spans(&path.into_inner()))
}
