//! Optional remote pose classification over HTTP.

use std::{io::Cursor, time::Duration};

use image::{RgbaImage, codecs::jpeg::JpegEncoder};
use reqwest::blocking::{
    Client,
    multipart::{Form, Part},
};
use serde::Deserialize;

use crate::{
    error::{PipelineError, Result},
    types::{Alternative, ClassificationResult},
};

pub const JPEG_QUALITY: u8 = 85;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A classifier living outside the process.
pub trait RemoteClassifier: Send + 'static {
    fn classify(&self, image: &RgbaImage) -> Result<ClassificationResult>;
}

#[derive(Debug, Deserialize)]
struct RemoteAlternative {
    pose: String,
    confidence: f32,
}

#[derive(Debug, Deserialize)]
struct RemoteResponse {
    pose: String,
    confidence: f32,
    #[serde(default)]
    alternatives: Option<Vec<RemoteAlternative>>,
}

/// Parses `{"pose", "confidence", "alternatives"}`; a `null` or missing
/// alternatives list becomes empty.
pub fn parse_response(body: &str) -> Result<ClassificationResult> {
    let response: RemoteResponse = serde_json::from_str(body)
        .map_err(|err| PipelineError::InvalidResponse(err.to_string()))?;
    Ok(ClassificationResult {
        label: response.pose,
        confidence: response.confidence,
        alternatives: response
            .alternatives
            .unwrap_or_default()
            .into_iter()
            .map(|alt| Alternative {
                label: alt.pose,
                confidence: alt.confidence,
            })
            .collect(),
    })
}

pub fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>> {
    let rgb = image::DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder.encode_image(&rgb)?;
    Ok(out.into_inner())
}

/// Uploads the capture as multipart field `image` and decodes the JSON
/// answer.
#[derive(Clone, Debug)]
pub struct HttpClassifier {
    client: Client,
    url: String,
}

impl HttpClassifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RemoteClassifier for HttpClassifier {
    fn classify(&self, image: &RgbaImage) -> Result<ClassificationResult> {
        let jpeg = encode_jpeg(image, JPEG_QUALITY)?;
        let part = Part::bytes(jpeg)
            .file_name("frame.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("image", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()?
            .error_for_status()?;
        let body = response.text()?;
        log::debug!("remote classifier answered {} bytes", body.len());
        parse_response(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn parses_full_response() {
        let result = parse_response(
            r#"{"pose": "Sitting", "confidence": 0.7,
                "alternatives": [{"pose": "Standing", "confidence": 0.2}]}"#,
        )
        .unwrap();
        assert_eq!(result.label, "Sitting");
        assert_eq!(result.alternatives.len(), 1);
        assert_eq!(result.alternatives[0].label, "Standing");
    }

    #[test]
    fn null_alternatives_become_empty() {
        let result =
            parse_response(r#"{"pose": "Walking", "confidence": 0.1, "alternatives": null}"#)
                .unwrap();
        assert!(result.alternatives.is_empty());
        assert_eq!(result.confidence, 0.1);
    }

    #[test]
    fn malformed_body_is_invalid_response() {
        assert!(matches!(
            parse_response("<html>bad gateway</html>"),
            Err(PipelineError::InvalidResponse(_))
        ));
    }

    #[test]
    fn jpeg_encoding_produces_jfif_bytes() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([120, 40, 200, 255]));
        let bytes = encode_jpeg(&image, JPEG_QUALITY).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn unreachable_server_is_transport_error() {
        let classifier = HttpClassifier::new("http://127.0.0.1:9/classify").unwrap();
        let image = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        assert!(matches!(
            classifier.classify(&image),
            Err(PipelineError::Transport(_))
        ));
    }
}
