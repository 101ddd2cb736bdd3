//! Rendering through a PlantUML server
//!
//! The server takes the diagram source deflated and base64-encoded with
//! PlantUML's own alphabet in the URL path: `GET {server}/png/{encoded}`.
//! Syntax errors come back as HTTP 400 with the message in the
//! `X-PlantUML-Diagram-Error` header.

use async_trait::async_trait;
use base64::Engine as _;
use base64::alphabet::Alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use reqwest::Client;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use super::{DiagramRenderer, RenderError, RenderedDiagram};
use crate::config::RendererConfig;

/// File name of the rendered diagram inside the output directory
const DIAGRAM_FILE: &str = "use_case_diagram.png";

const ERROR_HEADER: &str = "X-PlantUML-Diagram-Error";
const ERROR_LINE_HEADER: &str = "X-PlantUML-Diagram-Error-Line";

const PLANTUML_ALPHABET: Alphabet =
    match Alphabet::new("0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_") {
        Ok(alphabet) => alphabet,
        Err(_) => panic!("invalid PlantUML alphabet"),
    };

pub(crate) const PLANTUML_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &PLANTUML_ALPHABET,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encode diagram source the way PlantUML servers expect in URLs
pub fn encode_plantuml(source: &str) -> Result<String, std::io::Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::best());
    encoder.write_all(source.as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(PLANTUML_ENGINE.encode(compressed))
}

/// Renders PNGs through a PlantUML server and writes them to disk
pub struct PlantUmlServerRenderer {
    server_url: String,
    output_dir: PathBuf,
    http: Client,
}

impl PlantUmlServerRenderer {
    pub fn from_config(config: &RendererConfig) -> Result<Self, RenderError> {
        debug!(server_url = %config.server_url, "PlantUmlServerRenderer::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            server_url: config.server_url.trim_end_matches('/').to_string(),
            output_dir: config.output_dir.clone(),
            http,
        })
    }

    fn png_url(&self, source: &str) -> Result<String, RenderError> {
        Ok(format!("{}/png/{}", self.server_url, encode_plantuml(source)?))
    }
}

#[async_trait]
impl DiagramRenderer for PlantUmlServerRenderer {
    async fn render(&self, source: &str) -> Result<RenderedDiagram, RenderError> {
        let url = self.png_url(source)?;
        debug!(url_len = url.len(), "render: requesting diagram");

        let response = self.http.get(&url).send().await?;
        let status = response.status();

        if let Some(message) = response.headers().get(ERROR_HEADER).and_then(|v| v.to_str().ok()) {
            let line = response
                .headers()
                .get(ERROR_LINE_HEADER)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let message = match line {
                Some(line) => format!("{message} (line {line})"),
                None => message.to_string(),
            };
            debug!(%message, "render: syntax error reported by server");
            return Err(RenderError::Syntax(message));
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(RenderError::Server {
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response.bytes().await?;
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.output_dir.join(DIAGRAM_FILE);
        tokio::fs::write(&path, &bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "render: diagram saved");

        Ok(RenderedDiagram { path })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    #[test]
    fn test_alphabet_maps_six_bit_groups() {
        assert_eq!(PLANTUML_ENGINE.encode([0u8, 0, 0]), "0000");
        assert_eq!(PLANTUML_ENGINE.encode([0xFFu8, 0xFF, 0xFF]), "____");
        // 0b000001_000010_000011_000100 -> 1, 2, 3, 4
        assert_eq!(PLANTUML_ENGINE.encode([0x04u8, 0x20, 0xC4]), "1234");
    }

    #[test]
    fn test_encoded_source_inflates_back() {
        let source = "@startuml\nactor Librarian\nLibrarian --> (Lend Book)\n@enduml";
        let encoded = encode_plantuml(source).unwrap();

        assert!(
            encoded
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );

        let compressed = PLANTUML_ENGINE.decode(&encoded).unwrap();
        let mut inflated = String::new();
        DeflateDecoder::new(compressed.as_slice())
            .read_to_string(&mut inflated)
            .unwrap();
        assert_eq!(inflated, source);
    }

    #[test]
    fn test_png_url_uses_trimmed_server() {
        let renderer = PlantUmlServerRenderer::from_config(&RendererConfig {
            server_url: "http://localhost:8080/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let url = renderer.png_url("@startuml\n@enduml").unwrap();
        assert!(url.starts_with("http://localhost:8080/png/"));
    }
}
