use std::collections::HashMap;
use webserv::http::request::{Method, Request, RequestBuilder};

fn request_with(headers: HashMap<String, String>) -> Request {
    Request {
        method: "GET".to_string(),
        path: "/".to_string(),
        version: "HTTP/1.1".to_string(),
        headers,
        ..Default::default()
    }
}

#[test]
fn test_request_header_retrieval() {
    let mut headers = HashMap::new();
    headers.insert("Host".to_string(), "example.com".to_string());
    headers.insert("Content-Type".to_string(), "application/json".to_string());

    let req = request_with(headers);

    assert_eq!(req.header("Host"), Some("example.com"));
    assert_eq!(req.header("Content-Type"), Some("application/json"));
    assert_eq!(req.header("Missing"), None);
}

#[test]
fn test_request_header_lookup_ignores_case() {
    let mut headers = HashMap::new();
    headers.insert("content-length".to_string(), "3".to_string());

    let req = request_with(headers);

    assert_eq!(req.header("Content-Length"), Some("3"));
}

#[test]
fn test_request_content_length_parsing() {
    let mut headers = HashMap::new();
    headers.insert("Content-Length".to_string(), "42".to_string());

    let req = request_with(headers);

    assert_eq!(req.content_length(), Some(Ok(42)));
}

#[test]
fn test_request_content_length_missing() {
    let req = request_with(HashMap::new());

    assert_eq!(req.content_length(), None);
}

#[test]
fn test_request_content_length_invalid() {
    let mut headers = HashMap::new();
    headers.insert("Content-Length".to_string(), "not-a-number".to_string());

    let req = request_with(headers);

    assert!(matches!(req.content_length(), Some(Err(_))));
}

#[test]
fn test_request_method_equality() {
    assert_eq!(Method::Get, Method::Get);
    assert_ne!(Method::Get, Method::Post);
}

#[test]
fn test_request_method_from_token() {
    assert_eq!(Method::from_token("GET"), Some(Method::Get));
    assert_eq!(Method::from_token("POST"), Some(Method::Post));
    assert_eq!(Method::from_token("DELETE"), Some(Method::Delete));
    assert_eq!(Method::from_token("PATCH"), None);
    assert_eq!(Method::from_token("get"), None); // Case-sensitive
}

#[test]
fn test_request_known_method() {
    let mut req = request_with(HashMap::new());
    assert_eq!(req.known_method(), Some(Method::Get));

    req.method = "BREW".to_string();
    assert_eq!(req.known_method(), None);
}

#[test]
fn test_request_builder_derives_host_and_size() {
    let req = RequestBuilder::new()
        .method("POST")
        .path("/upload")
        .header("Host", "localhost:3492")
        .body(b"test body content".to_vec())
        .build()
        .unwrap();

    assert_eq!(req.version, "HTTP/1.1");
    assert_eq!(req.host, "localhost:3492");
    assert_eq!(req.body_size, 17);
    assert!(req.finished);
}

#[test]
fn test_request_builder_requires_method_and_path() {
    assert!(RequestBuilder::new().path("/").build().is_err());
    assert!(RequestBuilder::new().method("GET").build().is_err());
}

#[test]
fn test_request_set_header_replaces_other_case() {
    let mut req = request_with(HashMap::new());
    req.set_header("Content-Length".to_string(), "1".to_string());
    req.set_header("content-length".to_string(), "3".to_string());
    req.set_header("HOST".to_string(), "example.com".to_string());

    assert_eq!(req.headers.len(), 2);
    assert_eq!(req.header("Content-Length"), Some("3"));
    assert_eq!(req.content_length(), Some(Ok(3)));
    assert_eq!(req.host, "example.com");
}

#[test]
fn test_request_builder_header_replaces_other_case() {
    let req = RequestBuilder::new()
        .method("GET")
        .path("/")
        .header("host", "a.test")
        .header("Host", "b.test")
        .build()
        .unwrap();

    assert_eq!(req.headers.len(), 1);
    assert_eq!(req.host, "b.test");
}
