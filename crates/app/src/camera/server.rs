//! Actix Web server exposing the control page, the MJPEG stream, face
//! detection APIs, and the serial command channel.
//!
//! The server runs on a dedicated thread so the capture loop never competes
//! with the Actix runtime. Every viewer connection gets its own stream
//! generator reading from the shared frame store; a slow viewer only slows
//! itself down.

use std::{sync::Arc, time::Duration};

use actix_web::{
    http::header,
    web::{self, Bytes},
    App, HttpRequest, HttpResponse, HttpServer,
};
use anyhow::{Context, Result};
use async_stream::stream;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use crate::{
    camera::{self, encoding},
    config::{AuthCredentials, ServeConfig},
    control::{chat, SerialLink},
    html, telemetry,
};

/// Delay between stream polls; doubles as the startup wait while no frame
/// exists yet.
const STREAM_TICK: Duration = Duration::from_millis(10);

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    pub(crate) config: ServeConfig,
    pub(crate) serial: Option<Arc<SerialLink>>,
}

#[derive(Default)]
/// Handle for the HTTP server thread.
pub(crate) struct ControlServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl ControlServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

/// Spawn the HTTP server thread and return a handle that can stop it.
pub(crate) fn spawn_server(
    config: ServeConfig,
    serial: Option<Arc<SerialLink>>,
) -> Result<ControlServer> {
    let port = config.port;
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = std::thread::Builder::new()
        .name("hexacam-http".into())
        .spawn(move || {
            if let Err(err) = actix_web::rt::System::new().block_on(async move {
                let state = web::Data::new(ServerState { config, serial });
                let server = HttpServer::new(move || {
                    App::new()
                        .app_data(state.clone())
                        .route("/", web::get().to(index_route))
                        .route("/video_feed", web::get().to(video_feed_handler))
                        .route(
                            "/toggle_face_detection",
                            web::post().to(toggle_face_detection_handler),
                        )
                        .route("/face_count", web::get().to(face_count_handler))
                        .route("/send_command", web::post().to(send_command_handler))
                        .route("/chat_command", web::post().to(chat_command_handler))
                        .route("/metrics", web::get().to(metrics_handler))
                })
                .bind(("0.0.0.0", port))?
                .run();

                let srv_handle = server.handle();
                actix_web::rt::spawn(async move {
                    let _ = shutdown_rx.await;
                    srv_handle.stop(true).await;
                });

                server.await
            }) {
                error!("HTTP server error: {err}");
            }
        })
        .context("Failed to spawn HTTP server thread")?;
    Ok(ControlServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

#[derive(Deserialize)]
struct ToggleRequest {
    enabled: bool,
}

#[derive(Serialize)]
struct ToggleResponse {
    enabled: bool,
}

#[derive(Serialize)]
struct FaceCountResponse {
    count: usize,
}

#[derive(Deserialize)]
struct CommandRequest {
    command: String,
}

#[derive(Deserialize)]
struct ChatRequest {
    message: String,
}

#[derive(Serialize)]
struct CommandResponse {
    response: String,
}

impl CommandResponse {
    fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
        }
    }
}

/// Serve the control page.
async fn index_route(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
    if !authorized(&req, &state.config.auth) {
        return unauthorized();
    }
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html::control::CONTROL_PAGE)
}

/// Stream the MJPEG feed over a multipart response, one generator per viewer.
async fn video_feed_handler(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
    if !authorized(&req, &state.config.auth) {
        return unauthorized();
    }
    let service = match camera::get_or_start(&state.config.camera) {
        Ok(service) => service,
        Err(err) => {
            warn!("camera unavailable: {err:#}");
            return HttpResponse::ServiceUnavailable().body("Camera unavailable");
        }
    };
    let store = service.store();
    let quality = state.config.jpeg_quality;

    let stream = stream! {
        let _viewer = ViewerGuard::register();
        let mut interval = actix_web::rt::time::interval(STREAM_TICK);
        loop {
            interval.tick().await;
            let Some(view) = store.read_current() else {
                // Startup race: the loop has not published yet. Keep waiting
                // rather than erroring out.
                continue;
            };
            match encoding::encode_jpeg(&view.frame, quality) {
                Ok(jpeg) => {
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from(encoding::multipart_part(&jpeg)));
                }
                Err(err) => {
                    debug!("frame encode failed, skipping chunk: {err}");
                }
            }
        }
    };

    HttpResponse::Ok()
        .append_header(("Cache-Control", "no-cache"))
        .append_header((
            "Content-Type",
            format!(
                "multipart/x-mixed-replace; boundary={}",
                encoding::MULTIPART_BOUNDARY
            ),
        ))
        .streaming(stream)
}

/// Flip the detection flag and echo the new value.
async fn toggle_face_detection_handler(
    req: HttpRequest,
    state: web::Data<ServerState>,
    body: web::Json<ToggleRequest>,
) -> HttpResponse {
    if !authorized(&req, &state.config.auth) {
        return unauthorized();
    }
    let service = match camera::get_or_start(&state.config.camera) {
        Ok(service) => service,
        Err(err) => {
            warn!("camera unavailable: {err:#}");
            return HttpResponse::ServiceUnavailable().body("Camera unavailable");
        }
    };
    let store = service.store();
    store.set_detection_active(body.enabled);
    HttpResponse::Ok().json(ToggleResponse {
        enabled: store.detection_active(),
    })
}

/// Report the face count of the last detection pass.
async fn face_count_handler(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
    if !authorized(&req, &state.config.auth) {
        return unauthorized();
    }
    let service = match camera::get_or_start(&state.config.camera) {
        Ok(service) => service,
        Err(err) => {
            warn!("camera unavailable: {err:#}");
            return HttpResponse::ServiceUnavailable().body("Camera unavailable");
        }
    };
    HttpResponse::Ok().json(FaceCountResponse {
        count: service.store().face_count(),
    })
}

/// Relay a raw movement code to the robot.
async fn send_command_handler(
    req: HttpRequest,
    state: web::Data<ServerState>,
    body: web::Json<CommandRequest>,
) -> HttpResponse {
    if !authorized(&req, &state.config.auth) {
        return unauthorized();
    }
    let Some(code) = chat::device_code(&body.command) else {
        return HttpResponse::BadRequest().json(CommandResponse::new("Unknown command"));
    };
    let Some(link) = state.serial.as_ref() else {
        return HttpResponse::ServiceUnavailable()
            .json(CommandResponse::new("Serial not connected"));
    };
    match link.send_immediate(code).await {
        Ok(Some(reply)) => HttpResponse::Ok().json(CommandResponse::new(reply)),
        Ok(None) => HttpResponse::Ok().json(CommandResponse::new("Command sent.")),
        Err(err) => {
            error!("serial command failed: {err:#}");
            HttpResponse::InternalServerError().json(CommandResponse::new("Serial write failed"))
        }
    }
}

/// Interpret a chat/voice message and drive the robot, honoring "for N
/// seconds" durations.
async fn chat_command_handler(
    req: HttpRequest,
    state: web::Data<ServerState>,
    body: web::Json<ChatRequest>,
) -> HttpResponse {
    if !authorized(&req, &state.config.auth) {
        return unauthorized();
    }
    let Some(link) = state.serial.as_ref() else {
        return HttpResponse::ServiceUnavailable()
            .json(CommandResponse::new("Serial not connected"));
    };
    let Some(cmd) = chat::parse_message(&body.message) else {
        return HttpResponse::Ok().json(CommandResponse::new(
            "Command not recognized. Try 'move forward for 5 seconds'.",
        ));
    };

    if cmd.duration_secs > 0 {
        match link
            .send_timed(cmd.code, Duration::from_secs(cmd.duration_secs))
            .await
        {
            Ok(()) => HttpResponse::Ok().json(CommandResponse::new(format!(
                "Executed '{}' for {} seconds.",
                cmd.phrase, cmd.duration_secs
            ))),
            Err(err) => {
                error!("timed serial command failed: {err:#}");
                HttpResponse::InternalServerError()
                    .json(CommandResponse::new("Serial write failed"))
            }
        }
    } else {
        match link.send_immediate(cmd.code).await {
            Ok(_) => HttpResponse::Ok().json(CommandResponse::new(format!(
                "Executed command: {}.",
                cmd.phrase
            ))),
            Err(err) => {
                error!("serial command failed: {err:#}");
                HttpResponse::InternalServerError()
                    .json(CommandResponse::new("Serial write failed"))
            }
        }
    }
}

/// Render the Prometheus registry.
async fn metrics_handler(req: HttpRequest, state: web::Data<ServerState>) -> HttpResponse {
    if !authorized(&req, &state.config.auth) {
        return unauthorized();
    }
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

/// Check the Basic credentials when the server is configured with any.
fn authorized(req: &HttpRequest, auth: &Option<AuthCredentials>) -> bool {
    let Some(credentials) = auth else {
        return true;
    };
    let Some(value) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    else {
        return false;
    };
    let Some(encoded) = value.strip_prefix("Basic ") else {
        return false;
    };
    let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
        return false;
    };
    let Ok(pair) = String::from_utf8(decoded) else {
        return false;
    };
    match pair.split_once(':') {
        Some((user, pass)) => user == credentials.username && pass == credentials.password,
        None => false,
    }
}

fn unauthorized() -> HttpResponse {
    HttpResponse::Unauthorized()
        .insert_header((header::WWW_AUTHENTICATE, "Basic realm=\"hexacam\""))
        .body("Authentication required")
}

/// Tracks one live stream consumer for the viewer gauge.
struct ViewerGuard;

impl ViewerGuard {
    fn register() -> Self {
        metrics::gauge!("camera_stream_viewers").increment(1.0);
        Self
    }
}

impl Drop for ViewerGuard {
    fn drop(&mut self) {
        metrics::gauge!("camera_stream_viewers").decrement(1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{body::to_bytes, test};

    use crate::camera::CameraOptions;
    use video_ingest::CameraTuning;

    fn test_config(auth: Option<AuthCredentials>) -> ServeConfig {
        ServeConfig {
            port: 0,
            jpeg_quality: 70,
            serial_path: None,
            auth,
            camera: CameraOptions {
                // A path no capture backend can open; handlers must degrade
                // to their unavailable responses instead of panicking.
                device: "/dev/null/not-a-camera".to_string(),
                tuning: CameraTuning::default(),
                cascade: None,
                detect_on_start: false,
            },
        }
    }

    fn test_state(auth: Option<AuthCredentials>) -> web::Data<ServerState> {
        web::Data::new(ServerState {
            config: test_config(auth),
            serial: None,
        })
    }

    #[actix_web::test]
    async fn index_serves_the_control_page() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(None))
                .route("/", web::get().to(index_route)),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert!(resp.status().is_success());
        let body = to_bytes(resp.into_body()).await.unwrap();
        assert!(std::str::from_utf8(&body).unwrap().contains("/video_feed"));
    }

    #[actix_web::test]
    async fn video_feed_reports_unavailable_without_a_device() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(None))
                .route("/video_feed", web::get().to(video_feed_handler)),
        )
        .await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/video_feed").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 503);
    }

    #[actix_web::test]
    async fn face_count_reports_unavailable_without_a_device() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(None))
                .route("/face_count", web::get().to(face_count_handler)),
        )
        .await;
        let resp = test::call_service(
            &app,
            test::TestRequest::get().uri("/face_count").to_request(),
        )
        .await;
        assert_eq!(resp.status(), 503);
    }

    #[actix_web::test]
    async fn send_command_rejects_unknown_codes() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(None))
                .route("/send_command", web::post().to(send_command_handler)),
        )
        .await;
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/send_command")
                .set_json(serde_json::json!({"command": "X"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 400);
    }

    #[actix_web::test]
    async fn send_command_requires_a_serial_link() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(None))
                .route("/send_command", web::post().to(send_command_handler)),
        )
        .await;
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/send_command")
                .set_json(serde_json::json!({"command": "F"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 503);
        let body = to_bytes(resp.into_body()).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["response"], "Serial not connected");
    }

    #[actix_web::test]
    async fn chat_command_requires_a_serial_link() {
        let app = test::init_service(
            App::new()
                .app_data(test_state(None))
                .route("/chat_command", web::post().to(chat_command_handler)),
        )
        .await;
        let resp = test::call_service(
            &app,
            test::TestRequest::post()
                .uri("/chat_command")
                .set_json(serde_json::json!({"message": "move forward"}))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 503);
    }

    #[actix_web::test]
    async fn missing_credentials_are_rejected() {
        let auth = AuthCredentials {
            username: "pi".into(),
            password: "pi".into(),
        };
        let app = test::init_service(
            App::new()
                .app_data(test_state(Some(auth)))
                .route("/", web::get().to(index_route)),
        )
        .await;
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), 401);
        assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
    }

    #[actix_web::test]
    async fn valid_credentials_are_accepted() {
        let auth = AuthCredentials {
            username: "pi".into(),
            password: "pi".into(),
        };
        let app = test::init_service(
            App::new()
                .app_data(test_state(Some(auth)))
                .route("/", web::get().to(index_route)),
        )
        .await;
        let encoded = base64::engine::general_purpose::STANDARD.encode("pi:pi");
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/")
                .insert_header((header::AUTHORIZATION, format!("Basic {encoded}")))
                .to_request(),
        )
        .await;
        assert!(resp.status().is_success());
    }

    #[actix_web::test]
    async fn wrong_password_is_rejected() {
        let auth = AuthCredentials {
            username: "pi".into(),
            password: "pi".into(),
        };
        let app = test::init_service(
            App::new()
                .app_data(test_state(Some(auth)))
                .route("/", web::get().to(index_route)),
        )
        .await;
        let encoded = base64::engine::general_purpose::STANDARD.encode("pi:wrong");
        let resp = test::call_service(
            &app,
            test::TestRequest::get()
                .uri("/")
                .insert_header((header::AUTHORIZATION, format!("Basic {encoded}")))
                .to_request(),
        )
        .await;
        assert_eq!(resp.status(), 401);
    }
}
