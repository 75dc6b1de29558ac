use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::path::Path;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread;

use crate::audio::decode::{decode_bytes, DecodedTrack};
use crate::error::IngestionError;

/// Multipart field the upload service reads the file from.
const UPLOAD_FIELD: &str = "music";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_path: Option<String>,
}

/// Raw media plus a format hint for the decoder.
#[derive(Debug)]
pub struct MediaBytes {
    pub source: String,
    pub bytes: Vec<u8>,
    pub extension: Option<String>,
}

/// Results of background ingestion, consumed by the render thread.
#[derive(Debug)]
pub enum IngestEvent {
    Decoded { source: String, track: Arc<DecodedTrack> },
    Failed { source: String, message: String },
}

/// Client for the external upload service and media fetches.
pub struct IngestionClient {
    http: Client,
    server: Option<String>,
}

impl IngestionClient {
    pub fn new(server: Option<String>) -> Self {
        Self {
            http: Client::new(),
            server: server.map(|s| s.trim_end_matches('/').to_string()),
        }
    }

    /// `POST {server}/upload` with one file; returns the fetchable URL.
    pub fn upload(&self, path: &Path) -> Result<String, IngestionError> {
        let server = self
            .server
            .as_deref()
            .ok_or_else(|| IngestionError::InvalidUrl("no upload server configured".into()))?;
        let url = format!("{}/upload", server);

        let form = multipart::Form::new()
            .file(UPLOAD_FIELD, path)
            .map_err(|source| IngestionError::Read {
                path: path.display().to_string(),
                source,
            })?;

        log::info!("Uploading {} to {}", path.display(), url);
        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .map_err(|source| IngestionError::Transport { url: url.clone(), source })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .map_err(|source| IngestionError::Transport { url: url.clone(), source })?;

        let file_path = parse_upload_response(&url, status, &body)?;
        Ok(resolve_url(server, &file_path))
    }

    /// Fetch media from an http(s) URL, a `file://` URL, or a local path.
    pub fn fetch_media_bytes(&self, url: &str) -> Result<Vec<u8>, IngestionError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self
                .http
                .get(url)
                .send()
                .map_err(|source| IngestionError::Transport { url: url.to_string(), source })?;
            let status = response.status();
            if !status.is_success() {
                return Err(IngestionError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            let bytes = response
                .bytes()
                .map_err(|source| IngestionError::Transport { url: url.to_string(), source })?;
            return Ok(bytes.to_vec());
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        std::fs::read(path).map_err(|source| IngestionError::Read {
            path: path.to_string(),
            source,
        })
    }

    /// Local files go through the upload service when one is configured;
    /// URLs are fetched directly.
    pub fn ingest(&self, input: &str) -> Result<MediaBytes, IngestionError> {
        let is_remote = input.starts_with("http://") || input.starts_with("https://");
        let url = if !is_remote && self.server.is_some() {
            self.upload(Path::new(input.strip_prefix("file://").unwrap_or(input)))?
        } else {
            input.to_string()
        };

        let bytes = self.fetch_media_bytes(&url)?;
        log::info!("Fetched {} bytes from {}", bytes.len(), url);
        Ok(MediaBytes {
            extension: extension_of(&url),
            source: url,
            bytes,
        })
    }
}

/// Any non-2xx status, malformed JSON or missing `filePath` is a failure.
pub fn parse_upload_response(url: &str, status: u16, body: &str) -> Result<String, IngestionError> {
    if !(200..300).contains(&status) {
        return Err(IngestionError::Status {
            url: url.to_string(),
            status,
        });
    }
    let response: UploadResponse =
        serde_json::from_str(body).map_err(|e| IngestionError::MalformedResponse(e.to_string()))?;
    match response.file_path {
        Some(path) if !path.is_empty() => Ok(path),
        _ => Err(IngestionError::MissingFilePath),
    }
}

/// Server-relative paths are joined onto the server; absolute URLs pass through.
pub fn resolve_url(server: &str, file_path: &str) -> String {
    if file_path.starts_with("http://") || file_path.starts_with("https://") {
        return file_path.to_string();
    }
    let server = server.trim_end_matches('/');
    if file_path.starts_with('/') {
        format!("{}{}", server, file_path)
    } else {
        format!("{}/{}", server, file_path)
    }
}

fn extension_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Fetch and decode on a worker thread so the frame loop never waits on I/O.
pub fn spawn_ingest(client: Arc<IngestionClient>, input: String, events: Sender<IngestEvent>) {
    thread::spawn(move || {
        let event = match client.ingest(&input) {
            Ok(media) => match decode_bytes(media.bytes, media.extension.as_deref()) {
                Ok(track) => IngestEvent::Decoded {
                    source: media.source,
                    track: Arc::new(track),
                },
                Err(e) => {
                    log::error!("Could not decode {}: {}", media.source, e);
                    IngestEvent::Failed {
                        source: media.source,
                        message: e.to_string(),
                    }
                }
            },
            Err(e) => {
                log::error!("Could not load {}: {}", input, e);
                IngestEvent::Failed {
                    source: input,
                    message: e.to_string(),
                }
            }
        };
        let _ = events.send(event);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::decode::tests::{sine, wav_bytes};
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::time::Duration;

    const URL: &str = "http://localhost:3000/upload";

    #[test]
    fn accepts_file_path() {
        let body = r#"{"message":"File uploaded successfully!","filePath":"/uploads/abc123"}"#;
        assert_eq!(parse_upload_response(URL, 200, body).unwrap(), "/uploads/abc123");
    }

    #[test]
    fn non_success_status_fails() {
        let err = parse_upload_response(URL, 400, "No file uploaded.").unwrap_err();
        assert!(matches!(err, IngestionError::Status { status: 400, .. }));
    }

    #[test]
    fn missing_file_path_fails() {
        let err = parse_upload_response(URL, 200, r#"{"message":"ok"}"#).unwrap_err();
        assert!(matches!(err, IngestionError::MissingFilePath));
    }

    #[test]
    fn malformed_json_fails() {
        let err = parse_upload_response(URL, 200, "<html>").unwrap_err();
        assert!(matches!(err, IngestionError::MalformedResponse(_)));
    }

    #[test]
    fn resolves_relative_paths() {
        assert_eq!(
            resolve_url("http://localhost:3000/", "/uploads/x"),
            "http://localhost:3000/uploads/x"
        );
        assert_eq!(resolve_url("http://h", "uploads/x"), "http://h/uploads/x");
        assert_eq!(resolve_url("http://h", "https://cdn/x.mp3"), "https://cdn/x.mp3");
    }

    #[test]
    fn extension_hint() {
        assert_eq!(extension_of("http://h/uploads/song.MP3?x=1").as_deref(), Some("mp3"));
        assert_eq!(extension_of("/tmp/clip.wav").as_deref(), Some("wav"));
        assert_eq!(extension_of("http://h/uploads/abc123"), None);
    }

    /// Answers one request with `response` and hands back the request line.
    fn serve_once(response: impl Into<String>) -> (String, thread::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let response = response.into();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
            let request = read_request(&mut stream);
            stream.write_all(response.as_bytes()).unwrap();
            stream.flush().unwrap();
            request.lines().next().unwrap_or_default().to_string()
        });
        (base, handle)
    }

    /// Reads headers plus a Content-Length or chunked body.
    fn read_request(stream: &mut impl Read) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).unwrap_or(0);
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&buf).to_string();
            let Some(header_end) = text.find("\r\n\r\n") else {
                continue;
            };
            let headers = text[..header_end].to_ascii_lowercase();
            let body_len = buf.len() - (header_end + 4);
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok());
            let done = match length {
                Some(len) => body_len >= len,
                None if headers.contains("transfer-encoding: chunked") => buf.ends_with(b"0\r\n\r\n"),
                None => true,
            };
            if done {
                break;
            }
        }
        String::from_utf8_lossy(&buf).to_string()
    }

    #[test]
    fn fetch_reports_http_status() {
        let (base, server) =
            serve_once("HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n");
        let client = IngestionClient::new(None);
        let err = client
            .fetch_media_bytes(&format!("{}/uploads/missing", base))
            .unwrap_err();
        assert!(matches!(err, IngestionError::Status { status: 404, .. }));
        assert!(server.join().unwrap().starts_with("GET /uploads/missing"));
    }

    #[test]
    fn fetch_returns_body_bytes() {
        let (base, server) =
            serve_once("HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\nRIFF");
        let client = IngestionClient::new(None);
        let bytes = client.fetch_media_bytes(&format!("{}/uploads/x", base)).unwrap();
        assert_eq!(bytes, b"RIFF");
        server.join().unwrap();
    }

    #[test]
    fn upload_without_file_path_fails() {
        let body = r#"{"message":"ok"}"#;
        let (base, server) = serve_once(format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        ));

        let path = std::env::temp_dir().join(format!("sonica-live-upload-{}.wav", std::process::id()));
        std::fs::write(&path, wav_bytes(&sine(220.0, 0.05, 8_000), 8_000)).unwrap();

        let client = IngestionClient::new(Some(base));
        let err = client.upload(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, IngestionError::MissingFilePath));
        assert!(server.join().unwrap().starts_with("POST /upload"));
    }

    #[test]
    fn upload_rejection_is_status_error() {
        let (base, server) =
            serve_once("HTTP/1.1 400 Bad Request\r\nContent-Length: 17\r\nConnection: close\r\n\r\nNo file uploaded.");

        let path = std::env::temp_dir().join(format!("sonica-live-reject-{}.wav", std::process::id()));
        std::fs::write(&path, b"tiny").unwrap();

        let client = IngestionClient::new(Some(base));
        let err = client.upload(&path).unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, IngestionError::Status { status: 400, .. }));
        server.join().unwrap();
    }

    #[test]
    fn missing_local_file_is_ingestion_error() {
        let client = IngestionClient::new(None);
        let err = client.fetch_media_bytes("/nonexistent/sonica-live.wav").unwrap_err();
        assert!(matches!(err, IngestionError::Read { .. }));
    }

    #[test]
    fn worker_decodes_local_file() {
        let path = std::env::temp_dir().join(format!("sonica-live-ingest-{}.wav", std::process::id()));
        std::fs::write(&path, wav_bytes(&sine(220.0, 0.25, 8_000), 8_000)).unwrap();

        let (tx, rx) = mpsc::channel();
        spawn_ingest(
            Arc::new(IngestionClient::new(None)),
            format!("file://{}", path.display()),
            tx,
        );
        let event = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        std::fs::remove_file(&path).ok();

        match event {
            IngestEvent::Decoded { track, .. } => assert_eq!(track.frames(), 2_000),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn worker_reports_undecodable_bytes() {
        let path = std::env::temp_dir().join(format!("sonica-live-bad-{}.bin", std::process::id()));
        std::fs::write(&path, b"not audio at all").unwrap();

        let (tx, rx) = mpsc::channel();
        spawn_ingest(Arc::new(IngestionClient::new(None)), path.display().to_string(), tx);
        let event = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(matches!(event, IngestEvent::Failed { .. }));
    }
}
