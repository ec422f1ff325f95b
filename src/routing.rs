use actix::Addr;
use actix_session::Session;
use actix_web::{web, Error, HttpRequest, HttpResponse, Responder};
use actix_web_actors::ws;
use serde::Deserialize;
use uuid::Uuid;

use crate::actors::tour::{Dismiss, GetContext, ResetUi, Restart, RunStepAction, SetOpen, SetStep, TourActor};
use crate::actors::tour_socket::{PageState, TourSetup, TourSocket};
use crate::actors::ws_server::{FindTour, SessionCount, WsServer};
use crate::errors::TourError;
use crate::session::{is_authenticated, viewer_id};
use crate::static_assets::{ASSET_SCOPE, EMBEDDED_FILES};

/// Header naming the page a control request is for. The id is only ever
/// handed to that page's own socket.
pub const PAGE_HEADER: &str = "x-tour-page";

#[derive(Deserialize)]
pub struct SetStepBody {
    pub index: usize,
}

#[derive(Deserialize)]
pub struct SetOpenBody {
    pub open: bool,
}

/// Registers the tour endpoints. Embedded scripts are served under
/// `{static_prefix}/ai-tour/`.
pub fn configure(cfg: &mut web::ServiceConfig, static_prefix: &str) {
    cfg.route("/health", web::get().to(health_check))
        .service(
            web::scope("/tour")
                .route("", web::get().to(tour_context))
                .route("/step", web::put().to(set_step))
                .route("/open", web::put().to(set_open))
                .route("/mask", web::post().to(mask_click))
                .route("/close", web::post().to(mask_click))
                .route("/reset-ui", web::post().to(reset_ui))
                .route("/start", web::post().to(start_tour))
                .route("/action", web::post().to(run_step_action))
                .route("/ws", web::get().to(tour_socket)),
        )
        .route(
            &format!("{}/{}/{{file}}", static_prefix.trim_end_matches('/'), ASSET_SCOPE),
            web::get().to(embedded_script),
        );
}

/// Resolves the tour of the page named in [`PAGE_HEADER`].
async fn page_tour(req: &HttpRequest, hub: &Addr<WsServer>) -> Result<(Uuid, Addr<TourActor>), TourError> {
    let raw = req
        .headers()
        .get(PAGE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let unknown = || TourError::UnknownPage { page: raw.to_string() };
    let id = Uuid::parse_str(raw).map_err(|_| unknown())?;
    match hub.send(FindTour { id }).await? {
        Some(tour) => Ok((id, tour)),
        None => Err(unknown()),
    }
}

pub async fn tour_context(
    req: HttpRequest,
    session: Session,
    hub: web::Data<Addr<WsServer>>,
) -> Result<HttpResponse, TourError> {
    let (page, tour) = page_tour(&req, &hub).await?;
    let context = tour.send(GetContext).await?;
    Ok(HttpResponse::Ok().json(PageState {
        page: page.to_string(),
        can_start_tour: is_authenticated(&req, &session),
        context,
    }))
}

pub async fn set_step(
    req: HttpRequest,
    hub: web::Data<Addr<WsServer>>,
    body: web::Json<SetStepBody>,
) -> Result<HttpResponse, TourError> {
    let (_, tour) = page_tour(&req, &hub).await?;
    tour.send(SetStep { index: body.index }).await??;
    Ok(HttpResponse::Accepted().finish())
}

pub async fn set_open(
    req: HttpRequest,
    hub: web::Data<Addr<WsServer>>,
    body: web::Json<SetOpenBody>,
) -> Result<HttpResponse, TourError> {
    let (_, tour) = page_tour(&req, &hub).await?;
    tour.send(SetOpen { open: body.open }).await?;
    Ok(HttpResponse::Accepted().finish())
}

/// The mask and the overlay's close button both dismiss the tour.
pub async fn mask_click(req: HttpRequest, hub: web::Data<Addr<WsServer>>) -> Result<HttpResponse, TourError> {
    let (_, tour) = page_tour(&req, &hub).await?;
    tour.send(Dismiss).await?;
    Ok(HttpResponse::Accepted().finish())
}

pub async fn reset_ui(req: HttpRequest, hub: web::Data<Addr<WsServer>>) -> Result<HttpResponse, TourError> {
    let (_, tour) = page_tour(&req, &hub).await?;
    let report = tour.send(ResetUi).await?;
    Ok(HttpResponse::Ok().json(report))
}

pub async fn start_tour(
    req: HttpRequest,
    session: Session,
    hub: web::Data<Addr<WsServer>>,
) -> Result<HttpResponse, TourError> {
    if !is_authenticated(&req, &session) {
        log::debug!("Refusing to start the tour for an anonymous viewer");
        return Err(TourError::NotAuthenticated);
    }
    let (_, tour) = page_tour(&req, &hub).await?;
    tour.send(Restart).await?;
    Ok(HttpResponse::Accepted().finish())
}

pub async fn run_step_action(req: HttpRequest, hub: web::Data<Addr<WsServer>>) -> Result<HttpResponse, TourError> {
    let (_, tour) = page_tour(&req, &hub).await?;
    tour.send(RunStepAction).await??;
    Ok(HttpResponse::Accepted().finish())
}

/// Each socket is one page with its own mirror and tour. The viewer id from
/// the session scopes the completion flag.
pub async fn tour_socket(
    req: HttpRequest,
    stream: web::Payload,
    session: Session,
    hub: web::Data<Addr<WsServer>>,
    setup: web::Data<TourSetup>,
) -> Result<HttpResponse, Error> {
    let viewer = viewer_id(&session);
    let can_start_tour = is_authenticated(&req, &session);
    let socket = TourSocket::new(hub.get_ref().clone(), setup.get_ref().clone(), viewer, can_start_tour);
    ws::start(socket, &req, stream)
}

pub async fn health_check(hub: web::Data<Addr<WsServer>>) -> impl Responder {
    match hub.send(SessionCount).await {
        Ok(pages) => HttpResponse::Ok().json(serde_json::json!({ "status": "ok", "attached_pages": pages })),
        Err(e) => {
            log::error!("Could not reach the page hub: {}. The tour cannot talk to browsers right now.", e);
            HttpResponse::InternalServerError().finish()
        }
    }
}

pub async fn embedded_script(file: web::Path<String>) -> HttpResponse {
    match EMBEDDED_FILES.get(file.as_str()) {
        Some(embedded) => HttpResponse::Ok()
            .content_type(embedded.content_type)
            .insert_header(("Cache-Control", "public, max-age=31536000, immutable"))
            .body(embedded.content),
        None => HttpResponse::NotFound().finish(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actors::ws_server::Connect;
    use crate::config::TourConfig;
    use crate::playground::start_playground;
    use crate::store::{CompletionFlag, MemoryStore};
    use actix::Actor;
    use actix_session::storage::CookieSessionStore;
    use actix_session::SessionMiddleware;
    use actix_web::cookie::Key;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};
    use std::sync::Arc;
    use std::time::Duration;

    macro_rules! tour_app {
        ($hub:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new($hub.clone()))
                    .configure(|cfg| configure(cfg, "/static"))
                    .wrap(SessionMiddleware::new(CookieSessionStore::default(), Key::from(&[0; 64]))),
            )
            .await
        };
    }

    /// Starts a tour on a playground page and registers it with `hub`.
    async fn attach_page(hub: &Addr<WsServer>, completed: bool) -> (String, Addr<TourActor>) {
        let config = Arc::new(TourConfig { dock_settle_ms: 5, popup_settle_ms: 5, reset_settle_ms: 5, reopen_delay_ms: 5, ..TourConfig::default() });
        let page = start_playground(config.clone()).unwrap();
        let flag = CompletionFlag::new(Arc::new(MemoryStore::new()), &config.completion_key);
        if completed {
            flag.set();
        }
        let tour = TourActor::new(config, page.bridge.clone(), flag).start();
        let id = Uuid::new_v4();
        hub.send(Connect { id, tour: tour.clone() }).await.unwrap();
        (id.to_string(), tour)
    }

    #[actix_rt::test]
    async fn test_context_reports_anonymous_viewer() {
        let hub = WsServer::new().start();
        let (page, _tour) = attach_page(&hub, false).await;
        let app = tour_app!(hub);
        actix_rt::time::sleep(Duration::from_millis(30)).await;

        let req = test::TestRequest::get().uri("/tour").insert_header((PAGE_HEADER, page.as_str())).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["page"], page.as_str());
        assert_eq!(body["is_open"], true);
        assert_eq!(body["current_step_index"], 0);
        assert_eq!(body["can_start_tour"], false);
        assert_eq!(body["steps"].as_array().unwrap().len(), 3);
    }

    #[actix_rt::test]
    async fn test_start_requires_authentication() {
        let hub = WsServer::new().start();
        let (page, tour) = attach_page(&hub, true).await;
        let app = tour_app!(hub);

        let req = test::TestRequest::post().uri("/tour/start").insert_header((PAGE_HEADER, page.as_str())).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/tour/start")
            .insert_header((PAGE_HEADER, page.as_str()))
            .insert_header(("Authorization", "Bearer staff-123"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        actix_rt::time::sleep(Duration::from_millis(80)).await;
        let context = tour.send(GetContext).await.unwrap();
        assert!(context.is_open);
        assert_eq!(context.current_step_index, 0);
    }

    #[actix_rt::test]
    async fn test_bearer_counts_for_can_start() {
        let hub = WsServer::new().start();
        let (page, _tour) = attach_page(&hub, true).await;
        let app = tour_app!(hub);

        let req = test::TestRequest::get()
            .uri("/tour")
            .insert_header((PAGE_HEADER, page.as_str()))
            .insert_header(("Authorization", "Bearer staff-123"))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["can_start_tour"], true);
        assert_eq!(body["is_open"], false);
    }

    #[actix_rt::test]
    async fn test_out_of_range_step_is_unprocessable() {
        let hub = WsServer::new().start();
        let (page, _tour) = attach_page(&hub, false).await;
        let app = tour_app!(hub);

        let req = test::TestRequest::put()
            .uri("/tour/step")
            .insert_header((PAGE_HEADER, page.as_str()))
            .set_json(serde_json::json!({ "index": 5 }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["kind"], "step_out_of_range");
    }

    #[actix_rt::test]
    async fn test_mask_and_action_endpoints() {
        let hub = WsServer::new().start();
        let (page, tour) = attach_page(&hub, false).await;
        let app = tour_app!(hub);
        actix_rt::time::sleep(Duration::from_millis(30)).await;

        let req = test::TestRequest::post().uri("/tour/action").insert_header((PAGE_HEADER, page.as_str())).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY, "step 0 has no action");

        let req = test::TestRequest::post().uri("/tour/mask").insert_header((PAGE_HEADER, page.as_str())).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);
        assert!(!tour.send(GetContext).await.unwrap().is_open);

        let req = test::TestRequest::post().uri("/tour/reset-ui").insert_header((PAGE_HEADER, page.as_str())).to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["popup_closed"], false);
    }

    #[actix_rt::test]
    async fn test_requests_only_reach_their_own_page() {
        let hub = WsServer::new().start();
        let (first, first_tour) = attach_page(&hub, false).await;
        let (_second, second_tour) = attach_page(&hub, false).await;
        let app = tour_app!(hub);
        actix_rt::time::sleep(Duration::from_millis(30)).await;

        for header in [None, Some("not-a-page"), Some("6f1c2a4e-0000-4000-8000-000000000000")] {
            let mut req = test::TestRequest::post().uri("/tour/mask");
            if let Some(value) = header {
                req = req.insert_header((PAGE_HEADER, value));
            }
            let resp = test::call_service(&app, req.to_request()).await;
            assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        }
        assert!(first_tour.send(GetContext).await.unwrap().is_open);
        assert!(second_tour.send(GetContext).await.unwrap().is_open);

        let req = test::TestRequest::post().uri("/tour/mask").insert_header((PAGE_HEADER, first.as_str())).to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::ACCEPTED);
        assert!(!first_tour.send(GetContext).await.unwrap().is_open);
        assert!(second_tour.send(GetContext).await.unwrap().is_open, "the other page keeps its tour");
    }

    #[actix_rt::test]
    async fn test_health_and_embedded_script() {
        let hub = WsServer::new().start();
        let _page = attach_page(&hub, true).await;
        let app = tour_app!(hub);

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["attached_pages"], 1);

        let file = EMBEDDED_FILES.keys().next().unwrap();
        let req = test::TestRequest::get().uri(&format!("/static/ai-tour/{}", file)).to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let req = test::TestRequest::get().uri("/static/ai-tour/missing.js").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::NOT_FOUND);
    }
}
