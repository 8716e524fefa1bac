use actix_web::{App, http::StatusCode, test};
use minirouter_ui::{
    api::Api,
    config::DisplayConfig,
    render::Renderer,
    transport::{OutputTransport, pull::PullTransport},
    ui::View,
};
use std::sync::Arc;

fn transport(scale: u32, border: u32) -> Arc<PullTransport> {
    Arc::new(PullTransport::new(scale, border))
}

#[actix_web::test]
async fn index_polls_the_image() {
    let api = Api::new(transport(1, 0));
    let app = test::init_service(App::new().configure(|cfg| api.configure(cfg))).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();
    assert!(body.contains(r#"src="/image""#));
    assert!(body.contains("200"));
}

#[actix_web::test]
async fn image_unavailable_before_first_frame() {
    let api = Api::new(transport(1, 0));
    let app = test::init_service(App::new().configure(|cfg| api.configure(cfg))).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/image").to_request()).await;
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[actix_web::test]
async fn image_serves_latest_frame_as_bmp() {
    let pull = transport(2, 1);
    let renderer = Renderer::new(&DisplayConfig::default());
    pull.publish(&renderer.render(&View::text(["first"])));
    let latest = renderer.render(&View::text(["wifi: home"]));
    pull.publish(&latest);

    let api = Api::new(pull);
    let app = test::init_service(App::new().configure(|cfg| api.configure(cfg))).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/image").to_request()).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-type").unwrap().to_str().unwrap(),
        "image/bmp"
    );

    let body = test::read_body(resp).await;
    assert_eq!(&body[..2], b"BM");

    let image = image::load_from_memory(&body).unwrap().to_luma8();
    assert_eq!(image.dimensions(), ((128 + 2) * 2, (32 + 2) * 2));
    for y in 0..32 {
        for x in 0..128 {
            let lit = image.get_pixel((x + 1) * 2, (y + 1) * 2).0[0] == 0xFF;
            assert_eq!(lit, latest.pixel(x, y), "({x}, {y})");
        }
    }
}

#[actix_web::test]
async fn unknown_path_is_not_found() {
    let api = Api::new(transport(1, 0));
    let app = test::init_service(App::new().configure(|cfg| api.configure(cfg))).await;

    let resp = test::call_service(&app, test::TestRequest::get().uri("/nope").to_request()).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
