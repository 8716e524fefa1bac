use crate::transport::pull::PullTransport;
use actix_server::ServerHandle;
use actix_web::{
    App, HttpResponse, HttpServer, Responder,
    http::header::{CacheControl, CacheDirective},
    web::{self, Data},
};
use anyhow::{Context, Result};
use log::{debug, error, info};
use std::sync::Arc;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>minirouter</title>
<style>body { background: #222; } img { image-rendering: pixelated; }</style>
</head>
<body>
<img id="display" src="/image">
<script>
const display = document.getElementById("display");
setInterval(() => { display.src = "/image?" + Date.now(); }, 200);
</script>
</body>
</html>
"#;

/// Handlers of the image endpoint.
#[derive(Clone)]
pub struct Api {
    frames: Arc<PullTransport>,
}

impl Api {
    pub fn new(frames: Arc<PullTransport>) -> Self {
        Self { frames }
    }

    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(Data::new(self.clone()))
            .route("/", web::get().to(Self::index))
            .route("/image", web::get().to(Self::image))
            .route("/version", web::get().to(Self::version));
    }

    pub async fn index() -> impl Responder {
        debug!("index() called");

        HttpResponse::Ok()
            .content_type("text/html; charset=utf-8")
            .body(INDEX_HTML)
    }

    pub async fn image(api: web::Data<Self>) -> impl Responder {
        match api.frames.encode_latest() {
            Ok(Some(bmp)) => HttpResponse::Ok()
                .content_type("image/bmp")
                .insert_header(CacheControl(vec![CacheDirective::NoStore]))
                .body(bmp),
            Ok(None) => HttpResponse::ServiceUnavailable().body("no frame rendered yet"),
            Err(e) => {
                error!("image failed: {e:#}");
                HttpResponse::InternalServerError().body(e.to_string())
            }
        }
    }

    pub async fn version() -> impl Responder {
        HttpResponse::Ok().body(env!("CARGO_PKG_VERSION"))
    }
}

/// Binds the image server; binding failures are fatal.
pub async fn run_server(
    api: Api,
    host: &str,
    port: u16,
) -> Result<(
    ServerHandle,
    tokio::task::JoinHandle<Result<(), std::io::Error>>,
)> {
    let server = HttpServer::new(move || {
        let api = api.clone();
        App::new().configure(|cfg| api.configure(cfg))
    })
    .workers(1)
    .bind((host, port))
    .context(format!("failed to bind server to {host}:{port}"))?
    .disable_signals()
    .run();

    info!("serving display on http://{host}:{port}/");

    Ok((server.handle(), tokio::spawn(server)))
}
