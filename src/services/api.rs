use crate::core::config::ApiConfig;
use crate::core::error::{extract_error_message, WizardError, WizardResult};
use crate::utils::audio::is_audio_content_type;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use log::{debug, info};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

const AUDIO_ACCEPT: &str = "audio/mpeg, audio/*;q=0.9, application/json;q=0.5";

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct GenerateScriptRequest {
    pub platform: String,
    pub title: String,
    pub duration: u8,
    pub prompt: String,
    pub age_group: String,
    /// Comma separated.
    pub tags: String,
}

#[derive(Serialize)]
struct SpeakableRequest<'a> {
    script: &'a str,
}

#[derive(Serialize)]
struct SynthesizeRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ScriptResponse {
    script: Option<String>,
}

/// Raw synthesized audio as the server sent it.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// The three backend calls the wizard depends on.
#[async_trait]
pub trait ScriptApi: Send + Sync {
    async fn generate_script(&self, request: &GenerateScriptRequest) -> WizardResult<String>;
    async fn prepare_speakable_text(&self, script: &str) -> WizardResult<String>;
    async fn synthesize_speech(&self, text: &str) -> WizardResult<AudioPayload>;
}

pub struct HttpScriptApi {
    client: Client,
    generate_url: Url,
    speakable_url: Url,
    synthesize_url: Url,
}

fn endpoint(base: &Url, path: &str) -> Result<Url> {
    base.join(path.trim_start_matches('/'))
        .with_context(|| format!("Invalid endpoint path: {}", path))
}

impl HttpScriptApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let mut base = config.base_url.trim().to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base = Url::parse(&base)
            .with_context(|| format!("Invalid API base URL: {}", config.base_url))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to build HTTP client")?;

        info!("Using script API at {}", base);
        Ok(Self {
            client,
            generate_url: endpoint(&base, &config.generate_path)?,
            speakable_url: endpoint(&base, &config.speakable_path)?,
            synthesize_url: endpoint(&base, &config.synthesize_path)?,
        })
    }

    async fn post_for_script<T: Serialize + ?Sized>(&self, url: &Url, body: &T) -> WizardResult<String> {
        debug!("POST {}", url);
        let resp = self.client.post(url.clone()).json(body).send().await?;
        let resp = check_status(resp).await?;

        let text = resp.text().await?;
        let parsed: ScriptResponse = serde_json::from_str(&text).map_err(|e| {
            WizardError::MalformedResponse(format!("Failed to parse script response: {}", e))
        })?;
        parsed.script.ok_or_else(|| {
            WizardError::MalformedResponse("The response did not contain a script.".to_string())
        })
    }
}

/// Maps non-2xx responses to `WizardError::Server` with the best message available.
async fn check_status(resp: Response) -> WizardResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(WizardError::Server {
        status: status.as_u16(),
        message: extract_error_message(&body),
    })
}

#[async_trait]
impl ScriptApi for HttpScriptApi {
    async fn generate_script(&self, request: &GenerateScriptRequest) -> WizardResult<String> {
        self.post_for_script(&self.generate_url, request).await
    }

    async fn prepare_speakable_text(&self, script: &str) -> WizardResult<String> {
        self.post_for_script(&self.speakable_url, &SpeakableRequest { script })
            .await
    }

    async fn synthesize_speech(&self, text: &str) -> WizardResult<AudioPayload> {
        debug!("POST {} ({} chars)", self.synthesize_url, text.len());
        let resp = self
            .client
            .post(self.synthesize_url.clone())
            .header(ACCEPT, AUDIO_ACCEPT)
            .json(&SynthesizeRequest { text })
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        if !is_audio_content_type(content_type.as_deref()) {
            let body = resp.text().await.unwrap_or_default();
            return Err(WizardError::MalformedResponse(format!(
                "Expected audio but received {}: {}",
                content_type.as_deref().unwrap_or("no content type"),
                extract_error_message(&body)
            )));
        }

        let mut bytes = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk?);
        }

        if bytes.is_empty() {
            return Err(WizardError::MalformedResponse(
                "The server returned an empty audio file.".to_string(),
            ));
        }

        debug!("Received {} bytes of audio", bytes.len());
        Ok(AudioPayload {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serves one canned HTTP response and records the request body.
    async fn serve_once(
        status_line: &'static str,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> (String, Arc<Mutex<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let captured = Arc::new(Mutex::new(String::new()));
        let captured_clone = captured.clone();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        *captured_clone.lock().unwrap() =
                            String::from_utf8_lossy(&buf[header_end + 4..]).to_string();
                        break;
                    }
                }
            }

            let header = format!(
                "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status_line,
                content_type,
                body.len()
            );
            socket.write_all(header.as_bytes()).await.unwrap();
            socket.write_all(&body).await.unwrap();
            socket.shutdown().await.ok();
        });

        (format!("http://{}", addr), captured)
    }

    fn api_for(base_url: String) -> HttpScriptApi {
        HttpScriptApi::new(&ApiConfig {
            base_url,
            timeout_seconds: 5,
            ..ApiConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_keeps_base_prefix() {
        let api = HttpScriptApi::new(&ApiConfig {
            base_url: "https://scripts.example.com/v1".to_string(),
            ..ApiConfig::default()
        })
        .unwrap();
        assert_eq!(
            api.generate_url.as_str(),
            "https://scripts.example.com/v1/api/generate-script"
        );
        assert_eq!(
            api.synthesize_url.as_str(),
            "https://scripts.example.com/v1/api/text-to-speech"
        );
    }

    #[tokio::test]
    async fn test_generate_script_sends_contract_body() {
        let (url, captured) = serve_once(
            "200 OK",
            "application/json",
            br##"{"script": "# My Trip\n\nHello world"}"##.to_vec(),
        )
        .await;
        let api = api_for(url);

        let request = GenerateScriptRequest {
            platform: "youtube".to_string(),
            title: "My Trip".to_string(),
            duration: 5,
            prompt: String::new(),
            age_group: "All Ages".to_string(),
            tags: "Travel,Vlog".to_string(),
        };
        let script = api.generate_script(&request).await.unwrap();
        assert_eq!(script, "# My Trip\n\nHello world");

        let body: serde_json::Value = serde_json::from_str(&captured.lock().unwrap()).unwrap();
        assert_eq!(body["platform"], "youtube");
        assert_eq!(body["duration"], 5);
        assert_eq!(body["age_group"], "All Ages");
        assert_eq!(body["tags"], "Travel,Vlog");
    }

    #[tokio::test]
    async fn test_server_error_uses_json_message() {
        let (url, _) = serve_once(
            "500 Internal Server Error",
            "application/json",
            br#"{"message": "Model overloaded"}"#.to_vec(),
        )
        .await;
        let api = api_for(url);

        let err = api.prepare_speakable_text("# Script").await.unwrap_err();
        assert_eq!(
            err,
            WizardError::Server {
                status: 500,
                message: "Model overloaded".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_missing_script_field_is_malformed() {
        let (url, _) = serve_once("200 OK", "application/json", br#"{"text": "hi"}"#.to_vec()).await;
        let api = api_for(url);

        let err = api.prepare_speakable_text("# Script").await.unwrap_err();
        assert!(matches!(err, WizardError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_synthesize_returns_audio_bytes() {
        let (url, captured) = serve_once("200 OK", "audio/mpeg", vec![0xFFu8; 10 * 1024]).await;
        let api = api_for(url);

        let payload = api.synthesize_speech("Hello there").await.unwrap();
        assert_eq!(payload.bytes.len(), 10 * 1024);
        assert_eq!(payload.content_type.as_deref(), Some("audio/mpeg"));
        assert!(captured.lock().unwrap().contains("Hello there"));
    }

    #[tokio::test]
    async fn test_synthesize_rejects_json_success() {
        let (url, _) = serve_once(
            "200 OK",
            "application/json",
            br#"{"message": "queued"}"#.to_vec(),
        )
        .await;
        let api = api_for(url);

        let err = api.synthesize_speech("Hello").await.unwrap_err();
        assert!(matches!(err, WizardError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_synthesize_rejects_empty_body() {
        let (url, _) = serve_once("200 OK", "audio/mpeg", Vec::new()).await;
        let api = api_for(url);

        let err = api.synthesize_speech("Hello").await.unwrap_err();
        assert!(matches!(err, WizardError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        // Bind then drop so the port is almost certainly closed.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let api = api_for(format!("http://{}", addr));
        let err = api.synthesize_speech("Hello").await.unwrap_err();
        assert!(matches!(err, WizardError::Network(_)));
    }
}
