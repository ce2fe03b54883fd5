use crate::EndpointRequest;
use bytes::Bytes;
use splatgate_core::Handler;
use std::fmt::{Debug, Formatter};
use std::path::Path;
use thiserror::Error;
use tracing::warn;

/// File name assumed when the client does not send one
pub const DEFAULT_FILENAME: &str = "image.jpg";

/// Camera elevation, in degrees, assumed when the client does not send one
pub const DEFAULT_ELEVATION: i32 = 20;

/// Every PLY file, ascii or binary, starts with this magic
const PLY_MAGIC: &[u8] = b"ply";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TaskError {
    #[error("No image provided")]
    EmptyImage,
}

/// The image to lift to 3D, along with the name it was uploaded under.
///
/// The file name is only used to derive an extension and for logging, the bytes are never
/// interpreted here. An `ImageInput` always holds at least one byte.
#[derive(Clone)]
pub struct ImageInput {
    bytes: Bytes,
    filename: String,
}

impl ImageInput {
    pub fn new<B: Into<Bytes>>(bytes: B, filename: Option<String>) -> Result<Self, TaskError> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(TaskError::EmptyImage);
        }

        let filename = filename
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| String::from(DEFAULT_FILENAME));

        Ok(Self { bytes, filename })
    }

    #[inline]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Extension of the uploaded file name, if any
    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.filename)
            .extension()
            .and_then(|extension| extension.to_str())
    }

    /// File name safe to create inside a scratch directory: only the last path component is
    /// kept and every character outside `[A-Za-z0-9._-]` is replaced by `_`.
    pub fn sanitized_filename(&self) -> String {
        let name = Path::new(&self.filename)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(DEFAULT_FILENAME);

        let sanitized = name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();

        if sanitized.trim_matches('.').is_empty() {
            String::from(DEFAULT_FILENAME)
        } else {
            sanitized
        }
    }
}

impl Debug for ImageInput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageInput")
            .field("filename", &self.filename)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Optional conditioning forwarded to the inference engine.
/// Engines are free to ignore both values.
#[cfg_attr(debug_assertions, derive(Debug))]
#[derive(Clone, PartialEq, Eq)]
pub struct ImageTo3dParams {
    prompt: Option<String>,
    elevation: i32,
}

impl Default for ImageTo3dParams {
    #[inline]
    fn default() -> Self {
        Self {
            prompt: None,
            elevation: DEFAULT_ELEVATION,
        }
    }
}

impl ImageTo3dParams {
    /// Blank prompts are treated as absent
    pub fn new(prompt: Option<String>, elevation: Option<i32>) -> Self {
        Self {
            prompt: prompt.filter(|prompt| !prompt.trim().is_empty()),
            elevation: elevation.unwrap_or(DEFAULT_ELEVATION),
        }
    }

    #[inline]
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    #[inline]
    pub fn elevation(&self) -> i32 {
        self.elevation
    }
}

/// Represents a request to turn a single image into a Gaussian splat
pub type ImageTo3dRequest = EndpointRequest<ImageInput, ImageTo3dParams>;

/// Raw bytes of the point cloud produced by the engine, usually a PLY file.
/// The content is opaque and handed back to the client untouched.
#[derive(Clone, PartialEq, Eq)]
pub struct PlyOutput(Bytes);

impl PlyOutput {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[inline]
    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check the content starts like a PLY file. Diagnostic only, nothing is rejected on it.
    pub fn looks_like_ply(&self) -> bool {
        self.0.starts_with(PLY_MAGIC)
    }

    /// Wrap engine output, logging when it does not look like a PLY file
    pub fn checked<B: Into<Bytes>>(bytes: B) -> Self {
        let output = Self(bytes.into());
        if !output.looks_like_ply() {
            warn!(
                "Engine output ({} bytes) does not start with a PLY header",
                output.len()
            );
        }
        output
    }
}

impl From<Bytes> for PlyOutput {
    #[inline]
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for PlyOutput {
    #[inline]
    fn from(value: Vec<u8>) -> Self {
        Self(Bytes::from(value))
    }
}

impl Debug for PlyOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "PlyOutput(<{} bytes>)", self.0.len())
    }
}

/// Helper trait to implement `Handler` for image-to-3D endpoints
pub trait ImageTo3dHandler: Handler<Request = ImageTo3dRequest, Response = PlyOutput> {}

impl<T> ImageTo3dHandler for T where T: Handler<Request = ImageTo3dRequest, Response = PlyOutput> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(filename: &str) -> ImageInput {
        ImageInput::new(vec![0xFF, 0xD8, 0xFF], Some(filename.to_string())).unwrap()
    }

    #[test]
    fn test_empty_image_is_rejected() {
        let result = ImageInput::new(Vec::new(), Some(String::from("image.png")));
        assert_eq!(result.unwrap_err(), TaskError::EmptyImage);
        assert_eq!(TaskError::EmptyImage.to_string(), "No image provided");
    }

    #[test]
    fn test_default_filename() {
        let image = ImageInput::new(vec![1], None).unwrap();
        assert_eq!(image.filename(), DEFAULT_FILENAME);

        let image = ImageInput::new(vec![1], Some(String::from("  "))).unwrap();
        assert_eq!(image.filename(), DEFAULT_FILENAME);
    }

    #[test]
    fn test_extension() {
        assert_eq!(input("chair.png").extension(), Some("png"));
        assert_eq!(input("archive.tar.gz").extension(), Some("gz"));
        assert_eq!(input("no_extension").extension(), None);
    }

    #[test]
    fn test_sanitized_filename() {
        assert_eq!(input("chair.png").sanitized_filename(), "chair.png");
        assert_eq!(input("../../etc/passwd").sanitized_filename(), "passwd");
        assert_eq!(input("my photo (1).jpg").sanitized_filename(), "my_photo__1_.jpg");
        assert_eq!(input("..").sanitized_filename(), DEFAULT_FILENAME);
    }

    #[test]
    fn test_params() {
        let params = ImageTo3dParams::default();
        assert_eq!(params.prompt(), None);
        assert_eq!(params.elevation(), DEFAULT_ELEVATION);

        let params = ImageTo3dParams::new(Some(String::from("")), Some(-10));
        assert_eq!(params.prompt(), None);
        assert_eq!(params.elevation(), -10);

        let params = ImageTo3dParams::new(Some(String::from("a red chair")), None);
        assert_eq!(params.prompt(), Some("a red chair"));
        assert_eq!(params.elevation(), DEFAULT_ELEVATION);
    }

    #[test]
    fn test_ply_output() {
        let output = PlyOutput::checked(b"ply\nformat binary_little_endian 1.0\n".to_vec());
        assert!(output.looks_like_ply());
        assert!(!output.is_empty());

        let output = PlyOutput::from(vec![0u8; 4]);
        assert!(!output.looks_like_ply());
        assert_eq!(format!("{output:?}"), "PlyOutput(<4 bytes>)");
    }

    #[test]
    fn test_request_parts() {
        let request = ImageTo3dRequest::new(input("chair.png"), ImageTo3dParams::default());
        let (image, params) = request.into_parts();
        assert_eq!(image.len(), 3);
        assert_eq!(params.elevation(), DEFAULT_ELEVATION);
    }
}
