/// Provider output normalization and download
///
/// Providers report results in three shapes:
///
/// ```text
/// "https://.../out.png"                       -> Text
/// ["https://.../0.png", "https://.../1.png"]  -> List
/// {"model_file": "https://.../mesh.glb", ...} -> Fields
/// ```
///
/// [`JobOutput::extract_url`] turns any of them into a single URL. Object
/// values may themselves be strings, arrays, or objects with a `url` field.
///
/// [`fetch_output`] downloads the bytes behind the URL (or decodes a `data:`
/// URL in place) so the API can return them inline.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};

/// Raw provider output
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum JobOutput {
    Text(String),
    List(Vec<JsonValue>),
    Fields(Map<String, JsonValue>),
}

impl JobOutput {
    /// Parses a raw payload; numbers, booleans and null are not outputs
    pub fn from_value(value: JsonValue) -> Option<Self> {
        serde_json::from_value(value).ok()
    }

    /// First usable URL
    ///
    /// For `Fields`, `keys` are tried in order.
    pub fn extract_url(&self, keys: &[&str]) -> Option<String> {
        match self {
            JobOutput::Text(s) => non_empty(s),
            JobOutput::List(items) => items.iter().find_map(url_in_value),
            JobOutput::Fields(map) => keys
                .iter()
                .find_map(|key| map.get(*key).and_then(url_in_value)),
        }
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

fn url_in_value(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => non_empty(s),
        JsonValue::Array(items) => items.iter().find_map(url_in_value),
        JsonValue::Object(map) => map.get("url").and_then(url_in_value),
        _ => None,
    }
}

/// Error downloading a result
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Output download returned {0}")]
    Status(u16),

    #[error("Malformed data URL")]
    InvalidDataUrl,

    #[error("Unsupported output URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// Downloaded result
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedOutput {
    pub bytes: Bytes,
    pub content_type: String,
}

impl FetchedOutput {
    pub fn to_data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.content_type,
            STANDARD.encode(&self.bytes)
        )
    }
}

/// Downloads the result at `url`
pub async fn fetch_output(client: &reqwest::Client, url: &str) -> Result<FetchedOutput, FetchError> {
    if url.starts_with("data:") {
        return decode_data_url(url);
    }

    if !(url.starts_with("https://") || url.starts_with("http://")) {
        let scheme = url.split(':').next().unwrap_or_default().to_string();
        return Err(FetchError::UnsupportedScheme(scheme));
    }

    let response = client.get(url).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
        .filter(|v| !v.is_empty() && v != "application/octet-stream")
        .unwrap_or_else(|| guess_content_type(url).to_string());

    let bytes = response.bytes().await?;

    tracing::debug!(url = %url, content_type = %content_type, size = bytes.len(), "Fetched job output");

    Ok(FetchedOutput { bytes, content_type })
}

/// Decodes `data:<mime>;base64,<payload>`
pub fn decode_data_url(url: &str) -> Result<FetchedOutput, FetchError> {
    let rest = url.strip_prefix("data:").ok_or(FetchError::InvalidDataUrl)?;
    let (meta, payload) = rest.split_once(',').ok_or(FetchError::InvalidDataUrl)?;
    let content_type = meta
        .strip_suffix(";base64")
        .ok_or(FetchError::InvalidDataUrl)?;

    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|_| FetchError::InvalidDataUrl)?;

    Ok(FetchedOutput {
        bytes: Bytes::from(bytes),
        content_type: if content_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            content_type.to_string()
        },
    })
}

/// Content type from the URL path extension
fn guess_content_type(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "glb" => "model/gltf-binary",
        "gltf" => "model/gltf+json",
        "obj" => "model/obj",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: JsonValue) -> JobOutput {
        JobOutput::from_value(value).unwrap()
    }

    #[test]
    fn test_text_output() {
        let output = parse(json!("https://cdn.example.com/a.png"));
        assert_eq!(
            output.extract_url(&["image"]).as_deref(),
            Some("https://cdn.example.com/a.png")
        );

        assert_eq!(parse(json!("  ")).extract_url(&["image"]), None);
    }

    #[test]
    fn test_list_output_takes_first_usable() {
        let output = parse(json!(["", null, "https://cdn.example.com/1.png", "https://cdn.example.com/2.png"]));
        assert_eq!(
            output.extract_url(&[]).as_deref(),
            Some("https://cdn.example.com/1.png")
        );
    }

    #[test]
    fn test_fields_output_respects_key_order() {
        let output = parse(json!({
            "mesh": "https://cdn.example.com/mesh.obj",
            "glb": "https://cdn.example.com/model.glb"
        }));
        let keys = ["model_file", "glb", "output_model", "mesh"];
        assert_eq!(
            output.extract_url(&keys).as_deref(),
            Some("https://cdn.example.com/model.glb")
        );
    }

    #[test]
    fn test_fields_nested_values() {
        let output = parse(json!({ "image": { "url": "https://cdn.example.com/n.png" } }));
        assert_eq!(
            output.extract_url(&["image"]).as_deref(),
            Some("https://cdn.example.com/n.png")
        );

        let output = parse(json!({ "output": ["https://cdn.example.com/first.png"] }));
        assert_eq!(
            output.extract_url(&["image", "output"]).as_deref(),
            Some("https://cdn.example.com/first.png")
        );
    }

    #[test]
    fn test_fields_without_known_key() {
        let output = parse(json!({ "preview": "https://cdn.example.com/p.png" }));
        assert_eq!(output.extract_url(&["model_file", "glb"]), None);
    }

    #[test]
    fn test_scalars_are_not_outputs() {
        assert!(JobOutput::from_value(json!(42)).is_none());
        assert!(JobOutput::from_value(JsonValue::Null).is_none());
    }

    #[test]
    fn test_decode_data_url() {
        let fetched = decode_data_url("data:image/png;base64,AQID").unwrap();
        assert_eq!(fetched.content_type, "image/png");
        assert_eq!(fetched.bytes.as_ref(), &[1u8, 2, 3]);
        assert_eq!(fetched.to_data_url(), "data:image/png;base64,AQID");
    }

    #[test]
    fn test_decode_data_url_invalid() {
        assert!(matches!(decode_data_url("data:image/png,raw"), Err(FetchError::InvalidDataUrl)));
        assert!(matches!(decode_data_url("data:image/png;base64"), Err(FetchError::InvalidDataUrl)));
        assert!(matches!(decode_data_url("data:;base64,@@@"), Err(FetchError::InvalidDataUrl)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_unknown_scheme() {
        let client = reqwest::Client::new();
        let err = fetch_output(&client, "ftp://example.com/a.png").await.unwrap_err();
        assert!(matches!(err, FetchError::UnsupportedScheme(s) if s == "ftp"));
    }

    #[tokio::test]
    async fn test_fetch_data_url_without_network() {
        let client = reqwest::Client::new();
        let fetched = fetch_output(&client, "data:model/gltf-binary;base64,Z2xURg==").await.unwrap();
        assert_eq!(fetched.content_type, "model/gltf-binary");
        assert_eq!(fetched.bytes.as_ref(), b"glTF");
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type("https://x/y/model.GLB?sig=1"), "model/gltf-binary");
        assert_eq!(guess_content_type("https://x/y/out.webp"), "image/webp");
        assert_eq!(guess_content_type("https://x/y/blob"), "application/octet-stream");
    }
}
