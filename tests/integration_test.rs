// SPDX-License-Identifier: MIT
//! Integration tests for the phone book server.

use phonebook::config::Config;
use phonebook::handlers::{ADD_ERROR, ADD_SUCCESS, DELETE_ERROR, DELETE_SUCCESS};
use phonebook::server::run_server;
use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use tempfile::{TempDir, tempdir};

const PNG_BYTES: [u8; 12] = [
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D,
];

/// A helper struct to manage a running test server.
struct TestServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

/// Sets up and runs a server in a background thread, storing contacts in
/// `data_file`.
fn start_server(data_file: &Path) -> TestServer {
    let config = Config {
        listen: "127.0.0.1".to_string(),
        port: 0, // Port 0 lets the OS pick a free port.
        threads: 2,
        max_body_size: 64 * 1024,
        data_file: data_file.to_path_buf(),
        ..Config::default()
    };

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    let (addr_tx, addr_rx) = mpsc::channel();

    let server_handle = thread::spawn(move || {
        if let Err(e) = run_server(config, Some(shutdown_rx), Some(addr_tx)) {
            eprintln!("Server thread failed: {e}");
        }
    });

    // Block until the server has started and sent us its address.
    let server_addr = addr_rx.recv().unwrap();

    TestServer {
        addr: server_addr,
        shutdown_tx,
        handle: Some(server_handle),
    }
}

/// When the TestServer is dropped, shut down the server thread.
impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shutdown_tx.send(()).ok();
            handle.join().unwrap();
        }
    }
}

fn setup() -> (TestServer, TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("contacts.json");
    (start_server(&data_file), dir, data_file)
}

/// Redirects are checked by hand, so the client must not follow them.
fn client() -> Client {
    Client::builder().redirect(Policy::none()).build().unwrap()
}

fn location(res: &reqwest::blocking::Response) -> String {
    res.headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn add_contact(server: &TestServer, client: &Client, name: &str) -> String {
    let res = client
        .post(server.url("/add"))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body(format!("name={name}&phone=555-0100&cellPhone=555-0199"))
        .send()
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    location(&res)
}

fn multipart_body(boundary: &str, name: &str, photo: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    for (field, value) in [("name", name), ("phone", "111"), ("cellPhone", "222")] {
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Disposition: form-data; name=\"{field}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"photo\"; filename=\"p.png\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(photo);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[test]
fn test_home_page_lists_contacts() {
    let (server, _dir, _) = setup();
    let client = client();

    let res = client.get(server.url("/")).send().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .starts_with("text/html")
    );

    assert_eq!(add_contact(&server, &client, "Ada+Lovelace"), ADD_SUCCESS);

    let body = client
        .get(server.url(ADD_SUCCESS))
        .send()
        .unwrap()
        .text()
        .unwrap();
    assert!(body.contains("Ada Lovelace"));
    assert!(body.contains("Contact added successfully"));
}

#[test]
fn test_add_incomplete_contact_redirects_with_error() {
    let (server, _dir, _) = setup();
    let client = client();

    let res = client
        .post(server.url("/add"))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("name=Ada&phone=&cellPhone=1")
        .send()
        .unwrap();
    assert_eq!(res.status(), StatusCode::FOUND);
    assert_eq!(location(&res), ADD_ERROR);
}

#[test]
fn test_multipart_add_and_image_fetch() {
    let (server, _dir, _) = setup();
    let client = client();

    let boundary = "----phonebookTestBoundary";
    let res = client
        .post(server.url("/add"))
        .header(
            "Content-Type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(multipart_body(boundary, "Grace", &PNG_BYTES))
        .send()
        .unwrap();
    assert_eq!(location(&res), ADD_SUCCESS);

    let res = client.get(server.url("/image?id=0")).send().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        res.headers().get("content-type").unwrap().to_str().unwrap(),
        "image/png"
    );
    assert!(
        res.headers()
            .get("cache-control")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("no-cache")
    );
    assert_eq!(res.bytes().unwrap().as_ref(), &PNG_BYTES[..]);

    // No photo, unknown id and malformed id are all 404
    add_contact(&server, &client, "NoPhoto");
    for path in ["/image?id=1", "/image?id=99", "/image?id=abc", "/image"] {
        let res = client.get(server.url(path)).send().unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND, "{path}");
    }
}

#[test]
fn test_search_is_case_insensitive() {
    let (server, _dir, _) = setup();
    let client = client();
    add_contact(&server, &client, "Alice");
    add_contact(&server, &client, "Bob");

    let body = client
        .get(server.url("/search?query=aLi"))
        .send()
        .unwrap()
        .text()
        .unwrap();
    assert!(body.contains("Alice"));
    assert!(!body.contains("Bob"));

    let body = client
        .get(server.url("/search?query=zzz"))
        .send()
        .unwrap()
        .text()
        .unwrap();
    assert!(body.contains("No contacts found"));
}

#[test]
fn test_delete_shifts_ids() {
    let (server, _dir, _) = setup();
    let client = client();
    for name in ["First", "Second", "Third"] {
        add_contact(&server, &client, name);
    }

    let res = client
        .post(server.url("/delete"))
        .header("Content-Type", "application/x-www-form-urlencoded")
        .body("id=0")
        .send()
        .unwrap();
    assert_eq!(location(&res), DELETE_SUCCESS);

    let body = client.get(server.url("/")).send().unwrap().text().unwrap();
    assert!(!body.contains("First"));
    let second = body.find("Second").unwrap();
    let third = body.find("Third").unwrap();
    assert!(second < third);
    assert!(body.contains(r#"name="id" value="0""#));
    assert!(!body.contains(r#"name="id" value="2""#));

    for bad in ["id=2", "id=-1", "id=x", ""] {
        let res = client
            .post(server.url("/delete"))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(bad)
            .send()
            .unwrap();
        assert_eq!(location(&res), DELETE_ERROR, "body {bad:?}");
    }
}

#[test]
fn test_contacts_persist_across_restart() {
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("contacts.json");

    {
        let server = start_server(&data_file);
        let client = client();
        let boundary = "persist";
        let res = client
            .post(server.url("/add"))
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(multipart_body(boundary, "Persisted", &PNG_BYTES))
            .send()
            .unwrap();
        assert_eq!(location(&res), ADD_SUCCESS);
    }
    assert!(data_file.exists());

    let server = start_server(&data_file);
    let client = client();
    let body = client.get(server.url("/")).send().unwrap().text().unwrap();
    assert!(body.contains("Persisted"));

    let res = client.get(server.url("/image?id=0")).send().unwrap();
    assert_eq!(res.bytes().unwrap().as_ref(), &PNG_BYTES[..]);
}

#[test]
fn test_routing_errors() {
    let (server, _dir, _) = setup();
    let client = client();

    let res = client.get(server.url("/add")).send().unwrap();
    assert_eq!(res.status(), StatusCode::METHOD_NOT_ALLOWED);

    let res = client.get(server.url("/nowhere")).send().unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert!(res.text().unwrap().contains("404"));
}

#[test]
fn test_health_and_stylesheet() {
    let (server, _dir, _) = setup();
    let client = client();
    add_contact(&server, &client, "Health");

    let res = client.get(server.url("/_health")).send().unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let health: serde_json::Value = res.json().unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["contacts"], 1);

    let res = client
        .get(server.url("/_phonebook/static/styles.css"))
        .send()
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert!(
        res.headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/css")
    );
}
