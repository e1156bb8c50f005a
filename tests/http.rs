//! HTTP adapter against a running server.

use axum::http::StatusCode;

mod common;

use common::{payload, IPXE_EFI_LEN, UNDIONLY_LEN};

#[tokio::test]
async fn test_get_known_binary() {
    let running = common::start(common::config(false)).await;

    let res = common::http_client()
        .get(running.url("/ipxe.efi"))
        .send()
        .await
        .expect("server unreachable");
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap(),
        "application/octet-stream"
    );
    assert!(res.headers().contains_key("x-request-id"));
    let body = res.bytes().await.unwrap();
    assert_eq!(&body[..], &payload(IPXE_EFI_LEN, 0x5a)[..]);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_get_missing_binary() {
    let running = common::start(common::config(false)).await;
    let client = common::http_client();

    for path in ["/missing.bin", "/", "/%2e%2e", "/ipxe.efi/"] {
        let res = client.get(running.url(path)).send().await.unwrap();
        let expected = if path == "/ipxe.efi/" {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        };
        assert_eq!(res.status(), expected, "path {path}");
    }

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_get_with_mac_prefix() {
    let running = common::start(common::config(false)).await;

    let res = common::http_client()
        .get(running.url("/52-54-00-12-34-56/undionly.kpxe"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await.unwrap().len(), UNDIONLY_LEN);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_head_reports_length_without_body() {
    let running = common::start(common::config(false)).await;

    let res = common::http_client()
        .head(running.url("/ipxe.efi"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-length").unwrap(),
        &IPXE_EFI_LEN.to_string()
    );
    assert!(res.bytes().await.unwrap().is_empty());

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_other_methods_not_allowed() {
    let running = common::start(common::config(false)).await;

    let res = common::http_client()
        .post(running.url("/ipxe.efi"))
        .body("x")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    running.stop().await.unwrap();
}

#[tokio::test]
async fn test_same_bytes_over_both_protocols() {
    let running = common::start(common::config(false)).await;

    let over_http = common::http_client()
        .get(running.url("/ipxe.efi"))
        .send()
        .await
        .unwrap()
        .bytes()
        .await
        .unwrap();
    let over_tftp = running.tftp_client().get("ipxe.efi").await.unwrap().data;
    assert_eq!(over_http, over_tftp);

    running.stop().await.unwrap();
}
