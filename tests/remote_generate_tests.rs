mod support;

use imagerouter_studio::{
    imagerouter::ImageRouterClient, ErrorKind, GenerationRequest, ImageModel, PipelineError,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use support::TestTransport;

fn fox() -> GenerationRequest {
    GenerationRequest::new("a red fox", ImageModel::SdxlTurbo, 1024, 640).unwrap()
}

fn client(transport: &TestTransport) -> ImageRouterClient<TestTransport> {
    ImageRouterClient::new(Arc::new(transport.clone()), "http://router.test")
}

#[tokio::test]
async fn posts_prompt_with_bearer_key_and_returns_first_url() {
    let transport = TestTransport::new().with_generate_json(
        200,
        json!({"created": 1, "data": [{"url": "http://x/img.png"}, {"url": "http://x/other.png"}]}),
    );

    let url = client(&transport).generate(&fox(), "sk-test").await.unwrap();
    assert_eq!(url, "http://x/img.png");

    let posts = transport.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].url, "http://router.test/v1/openai/images/generations");
    assert_eq!(posts[0].bearer, "sk-test");
    assert_eq!(posts[0].timeout, Duration::from_secs(60));
    assert_eq!(
        posts[0].body,
        json!({
            "prompt": "a red fox",
            "model": "stabilityai/sdxl-turbo:free",
            "quality": "auto",
            "size": "1024x640",
            "response_format": "url",
            "output_format": "png"
        })
    );
}

#[tokio::test]
async fn custom_timeout_is_passed_to_transport() {
    let transport = TestTransport::new().with_generate_json(200, json!({"data": [{"url": "http://x/a.png"}]}));
    client(&transport)
        .with_timeout(Duration::from_secs(5))
        .generate(&fox(), "k")
        .await
        .unwrap();
    assert_eq!(transport.posts()[0].timeout, Duration::from_secs(5));
}

#[tokio::test]
async fn empty_data_is_a_remote_error_with_payload() {
    let transport = TestTransport::new().with_generate_json(200, json!({"data": []}));
    let err = client(&transport).generate(&fox(), "k").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert_eq!(err.message(), "{\n  \"data\": []\n}");
}

#[tokio::test]
async fn missing_data_reports_the_api_payload() {
    let transport = TestTransport::new().with_generate_json(200, json!({"error": {"message": "Invalid model"}}));
    let err = client(&transport).generate(&fox(), "k").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
    assert!(err.message().contains("Invalid model"), "{}", err.message());
}

#[tokio::test]
async fn entry_without_url_is_a_remote_error() {
    let transport = TestTransport::new().with_generate_json(200, json!({"data": [{"b64_json": "iVBOR"}]}));
    let err = client(&transport).generate(&fox(), "k").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Remote);
}

#[tokio::test]
async fn non_success_status_keeps_raw_body() {
    let transport = TestTransport::new().with_generate_raw(401, r#"{"error":"Unauthorized"}"#);
    let err = client(&transport).generate(&fox(), "bad").await.unwrap_err();
    assert_eq!(err, PipelineError::Remote(r#"status=401 body={"error":"Unauthorized"}"#.to_string()));
}

#[tokio::test]
async fn non_json_body_is_returned_verbatim() {
    let transport = TestTransport::new().with_generate_raw(200, "<html>gateway hiccup</html>");
    let err = client(&transport).generate(&fox(), "k").await.unwrap_err();
    assert_eq!(err, PipelineError::Remote("<html>gateway hiccup</html>".to_string()));
}

#[tokio::test]
async fn transport_failure_is_a_transport_error() {
    let transport = TestTransport::new().with_generate_timeout();
    let err = client(&transport).generate(&fox(), "k").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
    assert!(err.message().contains("timed out"));
}
