use actix_web::{web, HttpResponse, Responder};
use std::sync::Arc;

use crate::context::AppContext;

/// Version from Cargo.toml, available at compile time
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/api/health").route(web::get().to(health_check)));
    cfg.service(web::resource("/api/version").route(web::get().to(get_version)));
}

async fn health_check(ctx: web::Data<Arc<AppContext>>) -> impl Responder {
    let lanes = ctx.lanes.stats();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "version": VERSION,
        "app_id": ctx.recorder.app_id(),
        "artifact_policy": ctx.orchestrator.policy().as_str(),
        "active_sessions": lanes.active_lanes,
        "turns_processed": lanes.total_turns_processed
    }))
}

async fn get_version() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "version": VERSION
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controllers::test_support::test_context;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_health_reports_ok() {
        let (ctx, _dir) = test_context(vec![]);
        let app = test::init_service(App::new().app_data(web::Data::new(ctx)).configure(config)).await;

        let req = test::TestRequest::get().uri("/api/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["artifact_policy"], "clear_and_attach");
        assert_eq!(body["version"], VERSION);
        assert_eq!(body["app_id"], "test-app");
    }
}
