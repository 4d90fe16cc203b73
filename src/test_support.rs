//! Fixtures shared by unit tests: in-memory zip archives and a mock HTTP
//! server.

use std::{
    io::{Cursor, Write},
    time::Duration,
};

use reqwest::blocking::Client;
use tokio::runtime::Runtime;
use wiremock::{matchers::any, Mock, MockServer, Request, ResponseTemplate};
use zip::{write::SimpleFileOptions, ZipWriter};

/// Builds a zip archive; `None` content makes a directory entry.
pub fn zip_bytes(entries: &[(&str, Option<&str>)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        match content {
            Some(content) => {
                writer.start_file(*name, SimpleFileOptions::default()).unwrap();
                writer.write_all(content.as_bytes()).unwrap();
            }
            None => writer.add_directory(*name, SimpleFileOptions::default()).unwrap(),
        }
    }
    writer.finish().unwrap().into_inner()
}

/// HTTP client that never goes through a proxy configured in the environment.
pub fn client() -> Client {
    Client::builder()
        .no_proxy()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

#[derive(Clone)]
pub struct TestResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn zip(body: Vec<u8>) -> TestResponse {
        TestResponse {
            status: 200,
            headers: vec![("Content-Type".to_owned(), "application/zip".to_owned())],
            body,
        }
    }

    pub fn json(status: u16, body: &str) -> TestResponse {
        TestResponse {
            status,
            headers: vec![("Content-Type".to_owned(), "application/json".to_owned())],
            body: body.as_bytes().to_vec(),
        }
    }

    pub fn status(status: u16) -> TestResponse {
        TestResponse {
            status,
            headers: Vec::new(),
            body: b"nope".to_vec(),
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> TestResponse {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    fn template(&self) -> ResponseTemplate {
        self.headers.iter().fold(
            ResponseTemplate::new(self.status).set_body_bytes(self.body.clone()),
            |template, (name, value)| template.insert_header(name.as_str(), value.as_str()),
        )
    }
}

/// A mock server answering every request with the same response.
///
/// The server runs on its own thread, so blocking clients can call it from
/// the test thread. The runtime only drives setup and inspection.
pub struct TestServer {
    pub url: String,
    server: MockServer,
    runtime: Runtime,
}

impl TestServer {
    pub fn start(response: TestResponse) -> TestServer {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let server = runtime.block_on(async {
            let server = MockServer::start().await;
            Mock::given(any())
                .respond_with(response.template())
                .mount(&server)
                .await;
            server
        });
        TestServer {
            url: server.uri(),
            server,
            runtime,
        }
    }

    /// Paths of the requests received so far.
    pub fn requests(&self) -> Vec<String> {
        self.received()
            .iter()
            .map(|request| request.url.path().to_owned())
            .collect()
    }

    pub fn received(&self) -> Vec<Request> {
        self.runtime
            .block_on(self.server.received_requests())
            .unwrap_or_default()
    }
}

/// Writes an executable file, used to stand in for protoc and its plugins.
#[cfg(unix)]
pub fn write_executable(path: &std::path::Path, contents: &str) {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
}
