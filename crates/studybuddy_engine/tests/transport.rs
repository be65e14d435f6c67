use std::io::Write;
use std::time::Duration;

use pretty_assertions::assert_eq;
use serde_json::json;
use studybuddy_core::{ChatRequest, HistoryEntry, Role, StreamEvent, TaskStatus};
use studybuddy_engine::{
    ChatStream, ClientSettings, ErrorClass, FailureKind, ReqwestTransport, Transport,
};
use wiremock::matchers::{body_json, body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> ReqwestTransport {
    let settings = ClientSettings::default()
        .with_base_url(&server.uri())
        .expect("mock server url");
    ReqwestTransport::new(settings).expect("client")
}

fn pdf_file(name: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(b"%PDF-1.4\n%fake\n").unwrap();
    (dir, path)
}

#[tokio::test]
async fn upload_sends_multipart_and_returns_receipt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/documents/upload"))
        .and(header_exists("content-type"))
        .and(body_string_contains("filename=\"lecture.pdf\""))
        .and(body_string_contains("%PDF-1.4"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "task_id": "t-1",
            "document_id": "d-1",
            "filename": "lecture.pdf",
            "message": "Processing started"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (_dir, file) = pdf_file("lecture.pdf");
    let receipt = transport(&server).upload(&file).await.expect("upload ok");

    assert_eq!(receipt.task_id, "t-1");
    assert_eq!(receipt.document_id, "d-1");
    assert_eq!(receipt.filename, "lecture.pdf");
    assert_eq!(receipt.message.as_deref(), Some("Processing started"));
}

#[tokio::test]
async fn upload_refuses_non_pdf_without_a_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (_dir, file) = pdf_file("notes.txt");
    let err = transport(&server).upload(&file).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::UnsupportedFile);
}

#[tokio::test]
async fn upload_surfaces_backend_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/documents/upload"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "detail": "Upload failed: disk full" })),
        )
        .mount(&server)
        .await;

    let (_dir, file) = pdf_file("lecture.pdf");
    let err = transport(&server).upload(&file).await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(500));
    assert_eq!(err.message, "Upload failed: disk full");
    assert_eq!(err.class(), ErrorClass::Transport);
}

#[tokio::test]
async fn status_is_decoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/status/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "processing",
            "message": "Generating embeddings...",
            "progress": 66,
            "current_stage": "Generating embeddings",
            "timestamp": "2024-05-01T10:00:00"
        })))
        .mount(&server)
        .await;

    let snapshot = transport(&server).fetch_status("t-1").await.unwrap();
    assert_eq!(snapshot.status, TaskStatus::Processing);
    assert_eq!(snapshot.progress, 66);
    assert_eq!(snapshot.current_stage, "Generating embeddings");
    assert_eq!(snapshot.result, None);
}

#[tokio::test]
async fn unknown_task_is_http_404() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/status/missing"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "detail": "Task not found" })))
        .mount(&server)
        .await;

    let err = transport(&server).fetch_status("missing").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::HttpStatus(404));
    assert_eq!(err.to_string(), "http status 404: Task not found");
}

#[tokio::test]
async fn undecodable_status_is_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/status/t-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "exploded" })))
        .mount(&server)
        .await;

    let err = transport(&server).fetch_status("t-1").await.unwrap_err();
    assert_eq!(err.kind, FailureKind::MalformedResponse);
    assert_eq!(err.class(), ErrorClass::Protocol);
}

#[tokio::test]
async fn slow_status_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents/status/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_millis(250))
                .set_body_json(json!({ "status": "processing" })),
        )
        .mount(&server)
        .await;

    let settings = ClientSettings {
        request_timeout: Duration::from_millis(50),
        ..ClientSettings::default()
    }
    .with_base_url(&server.uri())
    .unwrap();
    let err = ReqwestTransport::new(settings)
        .unwrap()
        .fetch_status("slow")
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn chat_posts_request_and_streams_records() {
    let server = MockServer::start().await;
    let request = ChatRequest {
        query: "What is on page 3?".to_string(),
        document_id: None,
        conversation_history: vec![HistoryEntry {
            role: Role::User,
            content: "hi".to_string(),
        }],
        n_results: 5,
    };
    let body = concat!(
        "data: {\"type\":\"content\",\"data\":\"Page 3 \"}\n",
        "data: {\"type\":\"content\",\"data\":\"covers sorting.\"}\n",
        "data: {\"type\":\"sources\",\"data\":{\"sources\":[{\"filename\":\"algo.pdf\",\"page_number\":3,\"similarity\":0.7}],\"context_used\":5}}\n",
    );
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_json(json!({
            "query": "What is on page 3?",
            "document_id": null,
            "conversation_history": [{ "role": "user", "content": "hi" }],
            "n_results": 5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let body = transport(&server).open_chat(&request).await.expect("stream");
    let mut chat = ChatStream::new(body);
    let mut events = Vec::new();
    while let Some(event) = chat.next_event().await {
        events.push(event);
    }

    assert_eq!(events.len(), 3);
    assert_eq!(events[0], StreamEvent::Content("Page 3 ".to_string()));
    assert_eq!(events[1], StreamEvent::Content("covers sorting.".to_string()));
    match &events[2] {
        StreamEvent::Sources {
            sources,
            context_used,
        } => {
            assert_eq!(*context_used, 5);
            assert_eq!(sources[0].filename, "algo.pdf");
            assert_eq!(sources[0].page_number, 3);
        }
        other => panic!("unexpected event {other:?}"),
    }
    assert!(chat.failure().is_none());
}

#[tokio::test]
async fn chat_non_success_fails_to_open() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let request = ChatRequest {
        query: "q".to_string(),
        document_id: Some("d-1".to_string()),
        conversation_history: Vec::new(),
        n_results: 5,
    };
    let err = match transport(&server).open_chat(&request).await {
        Ok(_) => panic!("expected failure"),
        Err(err) => err,
    };
    assert_eq!(err.kind, FailureKind::HttpStatus(503));
}

#[tokio::test]
async fn chat_with_empty_body_is_missing_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let request = ChatRequest {
        query: "q".to_string(),
        document_id: None,
        conversation_history: Vec::new(),
        n_results: 5,
    };
    let err = match transport(&server).open_chat(&request).await {
        Err(err) => err,
        Ok(body) => {
            let mut chat = ChatStream::new(body);
            assert!(matches!(chat.next_event().await, Some(StreamEvent::Error(_))));
            assert_eq!(chat.next_event().await, None);
            chat.failure().cloned().expect("stream failure")
        }
    };
    assert_eq!(err.kind, FailureKind::MissingBody);
}

#[tokio::test]
async fn documents_can_be_listed_and_deleted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/documents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "collection": "documents",
            "total_chunks": 42,
            "documents": [
                { "document_id": "d-1", "filename": "d-1.pdf", "size_bytes": 2048 }
            ]
        })))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/documents/d-1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "document_id": "d-1", "status": "deleted" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = transport(&server);
    let listing = transport.list_documents().await.unwrap();
    assert_eq!(listing.total_chunks, 42);
    assert_eq!(listing.documents.len(), 1);
    assert_eq!(listing.documents[0].size_bytes, Some(2048));

    transport.delete_document("d-1").await.unwrap();
}

#[tokio::test]
async fn health_reports_backend_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "message": "AI Study Buddy API",
            "version": "0.1.0",
            "status": "running"
        })))
        .mount(&server)
        .await;

    let health = transport(&server).health().await.unwrap();
    assert_eq!(health.status, "running");
    assert_eq!(health.version, "0.1.0");
}

#[test]
fn base_url_must_be_absolute() {
    let err = ClientSettings::default().with_base_url("localhost").unwrap_err();
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}
