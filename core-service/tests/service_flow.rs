//! The façade wired end to end against a mocked storefront and image host.

use async_trait::async_trait;
use bridge_desktop::{SqliteSettingsStore, TokioFileSystem};
use bridge_traits::error::Result as BridgeResult;
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse, RetryPolicy};
use bridge_traits::{BackendKind, MediaKind};
use bytes::Bytes;
use core_media::{MediaQuery, UploadRequest};
use core_runtime::config::{ContentCacheConfig, CoreConfig, ProviderCredentials};
use core_runtime::events::{CoreEvent, MediaEvent};
use core_service::CoreService;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use mockall::mock;
use serde_json::json;
use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mock! {
    HttpClient {}

    #[async_trait]
    impl HttpClient for HttpClient {
        async fn execute(&self, request: HttpRequest) -> BridgeResult<HttpResponse>;
        async fn execute_with_retry(
            &self,
            request: HttpRequest,
            policy: RetryPolicy,
        ) -> BridgeResult<HttpResponse>;
    }
}

const IMGBB_URL: &str = "https://i.ibb.co/w04Prt6/oranges.jpg";

fn respond(status: u16, body: String) -> BridgeResult<HttpResponse> {
    Ok(HttpResponse {
        status,
        headers: HashMap::new(),
        body: Bytes::from(body),
    })
}

fn storefront_http() -> MockHttpClient {
    let mut http = MockHttpClient::new();
    http.expect_execute().returning(|req| {
        let url = req.url.as_str();
        if url == "https://api.imgbb.com/1/upload" {
            respond(
                200,
                json!({
                    "data": {
                        "id": "2ndCYJK",
                        "url": IMGBB_URL,
                        "display_url": "https://ibb.co/2ndCYJK",
                        "image": {"extension": "jpg"}
                    },
                    "success": true,
                    "status": 200
                })
                .to_string(),
            )
        } else if url.ends_with("/api/products") {
            respond(
                200,
                json!([{
                    "id": "p1",
                    "name": "Oranges",
                    "image": "https://www.dropbox.com/s/abc/oranges.jpg?dl=0"
                }])
                .to_string(),
            )
        } else if url.starts_with("https://shop.example.com/api/") {
            respond(200, "{}".to_string())
        } else {
            respond(404, String::new())
        }
    });
    http
}

fn png() -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb([255, 140, 0])));
    let mut buffer = Vec::new();
    img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
        .unwrap();
    buffer
}

async fn service() -> (CoreService, PathBuf) {
    let dir = std::env::temp_dir().join(format!("core-service-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).unwrap();

    let config = CoreConfig::builder()
        .database_path(dir.join("media.db"))
        .media_root(dir.join("public"))
        .http_client(Arc::new(storefront_http()))
        .file_system(Arc::new(TokioFileSystem::with_data_directory(dir.clone())))
        .settings_store(Arc::new(SqliteSettingsStore::in_memory().await.unwrap()))
        .enable_polling(false)
        .credentials(ProviderCredentials::default().with_imgbb("imgbb-key"))
        .content(ContentCacheConfig::new("https://shop.example.com"))
        .build()
        .unwrap();

    (CoreService::new(config).await.unwrap(), dir)
}

#[tokio::test]
async fn image_goes_to_the_image_host() {
    let (core, dir) = service().await;
    let mut events = core.subscribe();

    assert_eq!(
        core.backend_chain(None),
        vec![
            BackendKind::ImgBb,
            BackendKind::DatabaseBlob,
            BackendKind::LocalFilesystem
        ]
    );

    let outcome = core
        .upload(UploadRequest::new(png(), MediaKind::Image, "oranges.png"))
        .await
        .unwrap();

    assert_eq!(outcome.record.backend, BackendKind::ImgBb);
    assert_eq!(outcome.record.direct_url, core_media::normalize(IMGBB_URL));
    assert!(outcome.fallbacks.is_empty());

    match events.recv().await.unwrap() {
        CoreEvent::Media(MediaEvent::Uploaded { backend, kind, .. }) => {
            assert_eq!(backend, BackendKind::ImgBb);
            assert_eq!(kind, MediaKind::Image);
        }
        other => panic!("unexpected event {other:?}"),
    }

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn video_falls_back_to_the_database() {
    let (core, dir) = service().await;

    let outcome = core
        .upload(UploadRequest::new(vec![7u8; 512], MediaKind::Video, "visite.mov"))
        .await
        .unwrap();

    assert_eq!(outcome.record.backend, BackendKind::DatabaseBlob);
    assert_eq!(outcome.record.kind, MediaKind::Video);
    assert_eq!(outcome.fallbacks.len(), 1);
    assert_eq!(outcome.fallbacks[0].backend, BackendKind::ImgBb);

    let blob_id = outcome.record.provider_id.clone().unwrap();
    let blob = core.read_blob(&blob_id).await.unwrap().unwrap();
    assert_eq!(blob.content_type, "video/quicktime");

    core.track_access(outcome.record.direct_url.clone(), Some(MediaKind::Video));

    let mut accessed = 0;
    for _ in 0..100 {
        accessed = core
            .media(&outcome.record.id)
            .await
            .unwrap()
            .unwrap()
            .access_count;
        if accessed == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(accessed, 2);

    let videos = core
        .list_media(MediaQuery::new().kind(MediaKind::Video))
        .await
        .unwrap();
    assert_eq!(videos.len(), 1);
    assert_eq!(core.media_count().await.unwrap(), 1);

    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn content_refresh_and_link_repair() {
    let (core, dir) = service().await;
    assert!(core.content_enabled());

    core.start().await.unwrap();
    let report = core.refresh_content().await.unwrap().unwrap();
    assert!(report.failed.is_empty());

    let mut products = core.get_content("products").unwrap();
    let fixes = core.repair_links(&mut products);
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0].pointer, "/0/image");
    assert_eq!(
        products[0]["image"],
        "https://dl.dropboxusercontent.com/s/abc/oranges.jpg"
    );

    core.update_content("products", products.clone()).await.unwrap();
    assert_eq!(core.get_content("products"), Some(products));

    core.invalidate_content().await.unwrap();
    assert!(core.content_snapshot().is_empty());

    core.stop().await;
    std::fs::remove_dir_all(dir).ok();
}
