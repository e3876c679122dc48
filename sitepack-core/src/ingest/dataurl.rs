use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::{Result, SiteError};

/// Raw bytes of an uploaded archive (or any other uploaded file).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveBlob {
    mime_type: Option<String>,
    bytes: Vec<u8>,
}

impl ArchiveBlob {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            mime_type: None,
            bytes,
        }
    }

    /// Decode `data:[<mime>][;base64],<payload>`, or a bare base64 string.
    pub fn from_data_url(input: &str) -> Result<Self> {
        let input = input.trim();
        let Some(rest) = input.strip_prefix("data:") else {
            return Ok(Self::from_bytes(decode_base64(input)?));
        };
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| SiteError::DataUrl("missing ',' separator".into()))?;
        let mut params = header.split(';');
        let mime = params.next().filter(|m| !m.is_empty()).map(str::to_string);
        if !params.any(|p| p.eq_ignore_ascii_case("base64")) {
            return Err(SiteError::DataUrl(
                "only base64-encoded data URLs are supported".into(),
            ));
        }
        Ok(Self {
            mime_type: mime,
            bytes: decode_base64(payload)?,
        })
    }

    /// Encode bytes the way a browser file reader does.
    pub fn to_data_url(&self) -> String {
        let mime = self
            .mime_type
            .as_deref()
            .unwrap_or("application/octet-stream");
        format!("data:{mime};base64,{}", STANDARD.encode(&self.bytes))
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn decode_base64(payload: &str) -> Result<Vec<u8>> {
    // Line-wrapped payloads are common when data URLs are pasted around.
    let compact: String = payload.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| SiteError::DataUrl(format!("base64: {e}")))
}
