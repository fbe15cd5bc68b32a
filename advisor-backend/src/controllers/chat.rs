use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, Responder};
use advisor_types::{ChatResponse, ChatTurn, ChatUiConfig, FileRef};
use futures_util::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::context::AppContext;
use crate::turn::TurnError;
use crate::uploads::UploadError;

const CHAT_TITLE: &str = "Tax & Finance Agent";

const PLACEHOLDER_HTML: &str = r#"<div style='text-align: center; padding: 20px;'>
    <h2>Financial Advisor</h2>
    <p>Upload <b>CSV or PDF</b> statements to begin.</p>
    <hr style='margin: 20px auto; width: 50%; opacity: 0.3;'>
    <p style='font-size: 0.9em; color: #666;'>
        <i>The model will analyze your spending and suggest CRA tax deductions.</i><br>
        (Processing multi-agent workflows may take a few minutes)
    </p>
</div>"#;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/chat")
            .route("", web::post().to(chat))
            .route("/config", web::get().to(get_chat_config))
            .route("/upload", web::post().to(chat_with_upload)),
    );
}

async fn get_chat_config() -> impl Responder {
    HttpResponse::Ok().json(ChatUiConfig {
        title: CHAT_TITLE.to_string(),
        placeholder_html: PLACEHOLDER_HTML.to_string(),
        multimodal: true,
        file_count: "multiple".to_string(),
        height: 500,
    })
}

async fn chat(ctx: web::Data<Arc<AppContext>>, body: web::Json<ChatTurn>) -> impl Responder {
    run_turn(&ctx, body.into_inner()).await
}

/// Multipart variant: `text`, optional `session_id`, and any number of file parts.
///
/// Files are stored through the upload store. If any part fails, every file
/// this request already stored is removed and no turn runs.
async fn chat_with_upload(
    ctx: web::Data<Arc<AppContext>>,
    mut payload: Multipart,
) -> Result<HttpResponse, actix_web::Error> {
    let mut turn = ChatTurn::default();
    let mut stored: Vec<PathBuf> = Vec::new();

    let outcome = read_upload_form(&ctx, &mut payload, &mut turn, &mut stored).await;
    if let Err(e) = outcome {
        for path in &stored {
            ctx.uploads.discard(path).await;
        }
        return Err(e);
    }

    Ok(run_turn(&ctx, turn).await)
}

async fn read_upload_form(
    ctx: &AppContext,
    payload: &mut Multipart,
    turn: &mut ChatTurn,
    stored: &mut Vec<PathBuf>,
) -> Result<(), actix_web::Error> {
    while let Some(item) = payload.next().await {
        let mut field = item?;
        let disposition = field.content_disposition().clone();
        let field_name = disposition.get_name().unwrap_or_default().to_string();

        match disposition.get_filename() {
            Some(original) if !original.trim().is_empty() => {
                let original = original.to_string();
                let upload = ctx.uploads.save(&original, &mut field).await.map_err(upload_error)?;

                log::info!(
                    "[CHAT] Stored upload {} ({} bytes) at {}",
                    original,
                    upload.size,
                    upload.path.display()
                );
                turn.files
                    .push(FileRef::named(upload.path.to_string_lossy().into_owned(), original));
                stored.push(upload.path);
            }
            _ => {
                let value = read_text_field(&mut field).await?;
                match field_name.as_str() {
                    "text" => turn.text = value,
                    "session_id" => turn.session_id = Some(value),
                    other => log::debug!("[CHAT] Ignoring form field {}", other),
                }
            }
        }
    }
    Ok(())
}

fn upload_error(e: UploadError) -> actix_web::Error {
    match e {
        UploadError::TooLarge { .. } => actix_web::error::ErrorPayloadTooLarge(e.to_string()),
        UploadError::Stream(_) => actix_web::error::ErrorBadRequest(e.to_string()),
        UploadError::Io(_) => {
            log::error!("[CHAT] {}", e);
            actix_web::error::ErrorInternalServerError("Failed to store upload")
        }
    }
}

async fn read_text_field(field: &mut actix_multipart::Field) -> Result<String, actix_web::Error> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

async fn run_turn(ctx: &AppContext, turn: ChatTurn) -> HttpResponse {
    if turn.text.trim().is_empty() && turn.files.is_empty() {
        return HttpResponse::BadRequest().json(ChatResponse::err("Message text or files are required"));
    }

    match ctx.orchestrator.handle(turn).await {
        Ok(outcome) => {
            log::debug!("[CHAT] Turn {} answered for session key {}", outcome.turn_id, outcome.session_key);
            let mut response = ChatResponse::ok(outcome.turn_id, outcome.reply);
            if let Some(url) = outcome.artifact_url {
                response = response.with_artifact_url(url);
            }
            HttpResponse::Ok().json(response)
        }
        Err(TurnError::Runner(e)) => HttpResponse::BadGateway().json(ChatResponse::err(e.to_string())),
        Err(e) => HttpResponse::ServiceUnavailable().json(ChatResponse::err(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::AiError;
    use crate::agents::{RunOutput, RunTask, Runner};
    use crate::controllers::test_support::{context_around, test_context, test_context_with_runner};
    use actix_web::{http::StatusCode, test, App};
    use async_trait::async_trait;
    use serde_json::json;

    /// Draws a chart into the slot it is given.
    struct ChartRunner;

    #[async_trait]
    impl Runner for ChartRunner {
        async fn run(&self, task: &RunTask) -> Result<RunOutput, AiError> {
            std::fs::write(&task.artifact_slot, b"\x89PNG").map_err(|e| AiError::new(e.to_string()))?;
            Ok(RunOutput {
                text: "Here is your spending chart.".to_string(),
                artifact: Some(task.artifact_slot.clone()),
            })
        }
    }

    fn multipart_request(boundary: &str, body: String) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/chat/upload")
            .insert_header(("content-type", format!("multipart/form-data; boundary={}", boundary)))
            .set_payload(body)
    }

    #[actix_web::test]
    async fn test_chat_config() {
        let app = test::init_service(App::new().configure(config)).await;
        let req = test::TestRequest::get().uri("/api/chat/config").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["title"], "Tax & Finance Agent");
        assert_eq!(body["file_count"], "multiple");
        assert_eq!(body["height"], 500);
        assert!(body["placeholder_html"].as_str().unwrap().contains("CSV or PDF"));
    }

    #[actix_web::test]
    async fn test_chat_returns_reply() {
        let (ctx, runner, _dir) = test_context_with_runner(vec![Ok("You spent $42.".to_string())]);
        let app = test::init_service(App::new().app_data(web::Data::new(ctx)).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({"text": "Summarize", "files": ["/tmp/jan.csv"], "history": []}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["success"], true);
        assert_eq!(body["reply"], "You spent $42.");
        assert!(body["turn_id"].is_string());
        assert!(body.get("artifact_url").is_none());
        assert_eq!(
            runner.instructions.lock().clone(),
            vec!["The user uploaded: [\"/tmp/jan.csv\"]. Provide a text breakdown of spending.Summarize"]
        );
    }

    #[actix_web::test]
    async fn test_empty_turn_is_rejected() {
        let (ctx, _dir) = test_context(vec![]);
        let app = test::init_service(App::new().app_data(web::Data::new(ctx)).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({"text": "   "}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_runner_failure_is_bad_gateway() {
        let (ctx, _dir) = test_context(vec![Err(AiError::with_status("upstream down", 503))]);
        let app = test::init_service(App::new().app_data(web::Data::new(ctx)).configure(config)).await;

        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({"text": "hello"}))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("upstream down"));
    }

    #[actix_web::test]
    async fn test_upload_stores_files_and_runs_turn() {
        let (ctx, runner, _dir) = test_context_with_runner(vec![Ok("Parsed.".to_string())]);
        let upload_dir = ctx.config.upload_dir.clone();
        let app = test::init_service(App::new().app_data(web::Data::new(ctx)).configure(config)).await;

        let boundary = "XBOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\nWhat did I spend?\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"session_id\"\r\n\r\nalice\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"jan.csv\"\r\n\
             Content-Type: text/csv\r\n\r\nDate,Amount\n2024-01-02,10.00\r\n\
             --{b}--\r\n",
            b = boundary
        );
        let body: serde_json::Value = test::call_and_read_body_json(&app, multipart_request(boundary, body).to_request()).await;
        assert_eq!(body["success"], true);

        let stored: Vec<_> = std::fs::read_dir(&upload_dir).unwrap().flatten().collect();
        assert_eq!(stored.len(), 1);
        let stored_path = stored[0].path();
        assert!(stored_path.to_string_lossy().ends_with("-jan.csv"));
        assert_eq!(std::fs::read_to_string(&stored_path).unwrap(), "Date,Amount\n2024-01-02,10.00");

        let instructions = runner.instructions.lock().clone();
        assert!(instructions[0].contains(&*stored_path.to_string_lossy()));
        assert!(instructions[0].ends_with("What did I spend?"));
    }

    #[actix_web::test]
    async fn test_chart_turn_returns_fetchable_artifact_url() {
        let (ctx, _dir) = context_around(Arc::new(ChartRunner));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(ctx))
                .configure(config)
                .configure(crate::controllers::artifacts::config),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/chat")
            .set_json(json!({"text": "Plot my spending", "session_id": "bob/phone"}))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["reply"]["text"], "Here is your spending chart.");
        let url = body["artifact_url"].as_str().unwrap().to_string();
        assert_eq!(url, "/api/artifacts/bob_2fphone/activity_plot.png");

        let resp = test::call_service(&app, test::TestRequest::get().uri(&url).to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(test::read_body(resp).await.as_ref(), b"\x89PNG");
    }

    #[actix_web::test]
    async fn test_oversized_upload_is_rejected_and_cleaned_up() {
        let (ctx, runner, _dir) = test_context_with_runner(vec![Ok("unused".to_string())]);
        let upload_dir = ctx.config.upload_dir.clone();
        let limit = ctx.config.max_upload_bytes;
        let app = test::init_service(App::new().app_data(web::Data::new(ctx)).configure(config)).await;

        let boundary = "XBOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"small.csv\"\r\n\r\nDate,Amount\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"huge.csv\"\r\n\r\n{big}\r\n\
             --{b}\r\nContent-Disposition: form-data; name=\"text\"\r\n\r\nSummarize\r\n\
             --{b}--\r\n",
            b = boundary,
            big = "9".repeat(limit + 1)
        );
        let resp = test::call_service(&app, multipart_request(boundary, body).to_request()).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);

        // Neither the partial file nor the earlier complete one is kept
        assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 0);
        assert!(runner.instructions.lock().is_empty());
    }

    #[actix_web::test]
    async fn test_truncated_upload_leaves_no_file() {
        let (ctx, runner, _dir) = test_context_with_runner(vec![Ok("unused".to_string())]);
        let upload_dir = ctx.config.upload_dir.clone();
        let app = test::init_service(App::new().app_data(web::Data::new(ctx)).configure(config)).await;

        let boundary = "XBOUNDARY";
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"jan.csv\"\r\n\r\nDate,Amount\n2024-01",
            b = boundary
        );
        let resp = test::call_service(&app, multipart_request(boundary, body).to_request()).await;
        assert!(resp.status().is_client_error());

        assert_eq!(std::fs::read_dir(&upload_dir).unwrap().count(), 0);
        assert!(runner.instructions.lock().is_empty());
    }
}
