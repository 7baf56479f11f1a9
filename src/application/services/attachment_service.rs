//! Attachment Resolver
//!
//! Validates inbound file payloads against the per-category allow-lists and
//! size ceilings, then hands the decoded bytes to the object store.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::config::AttachmentSettings;
use crate::domain::{AttachmentDescriptor, MessageType};
use crate::infrastructure::storage::ObjectStore;
use crate::shared::error::AppError;

/// One file as submitted by a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilePayload {
    /// Base64 bytes, optionally as a `data:<mime>;base64,` URL
    pub file_data: String,
    pub file_name: String,
    /// Declared size in bytes
    pub file_size: u64,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentCategory {
    Image,
    Voice,
    File,
}

impl AttachmentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Voice => "voice",
            Self::File => "file",
        }
    }

    /// Message type carried by a message whose attachments are of this category.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::Image => MessageType::Image,
            Self::Voice => MessageType::Voice,
            Self::File => MessageType::File,
        }
    }
}

/// A payload accepted and written to the object store.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAttachment {
    pub category: AttachmentCategory,
    pub descriptor: AttachmentDescriptor,
}

pub struct AttachmentResolver {
    store: Arc<dyn ObjectStore>,
    settings: AttachmentSettings,
}

impl AttachmentResolver {
    pub fn new(store: Arc<dyn ObjectStore>, settings: AttachmentSettings) -> Self {
        Self { store, settings }
    }

    /// Category and size ceiling for a MIME type, if it is allowed at all.
    pub fn classify(&self, mime_type: &str) -> Option<(AttachmentCategory, u64)> {
        let allowed = |list: &[String]| list.iter().any(|m| m.eq_ignore_ascii_case(mime_type));
        if allowed(&self.settings.image_types) {
            Some((AttachmentCategory::Image, self.settings.max_image_size))
        } else if allowed(&self.settings.voice_types) {
            Some((AttachmentCategory::Voice, self.settings.max_voice_size))
        } else if allowed(&self.settings.file_types) {
            Some((AttachmentCategory::File, self.settings.max_file_size))
        } else {
            None
        }
    }

    /// Validate and store a single payload.
    pub async fn resolve(
        &self,
        sender_id: i64,
        payload: FilePayload,
    ) -> Result<ResolvedAttachment, AppError> {
        self.resolve_in(sender_id, &Uuid::new_v4().simple().to_string(), payload)
            .await
    }

    /// Validate and store every payload of one message concurrently. The
    /// result keeps submission order. If any payload is rejected, the ones
    /// already stored are discarded and the first error is returned.
    pub async fn resolve_all(
        &self,
        sender_id: i64,
        payloads: Vec<FilePayload>,
    ) -> Result<Vec<ResolvedAttachment>, AppError> {
        let batch = Uuid::new_v4().simple().to_string();
        let results = join_all(
            payloads
                .into_iter()
                .map(|payload| self.resolve_in(sender_id, &batch, payload)),
        )
        .await;

        let mut resolved = Vec::with_capacity(results.len());
        let mut first_error = None;
        for result in results {
            match result {
                Ok(attachment) => resolved.push(attachment),
                Err(e) if first_error.is_none() => first_error = Some(e),
                Err(_) => {}
            }
        }

        match first_error {
            None => Ok(resolved),
            Some(e) => {
                let stored: Vec<_> = resolved.into_iter().map(|r| r.descriptor).collect();
                self.discard(&stored).await;
                Err(e)
            }
        }
    }

    /// Best-effort removal of stored attachments whose message never made it.
    pub async fn discard(&self, descriptors: &[AttachmentDescriptor]) {
        let results = join_all(descriptors.iter().map(|d| self.store.delete(&d.file_path))).await;
        for (descriptor, result) in descriptors.iter().zip(results) {
            if let Err(e) = result {
                tracing::warn!(
                    file_path = %descriptor.file_path,
                    error = %e,
                    "Failed to discard orphaned attachment"
                );
            }
        }
    }

    async fn resolve_in(
        &self,
        sender_id: i64,
        batch: &str,
        payload: FilePayload,
    ) -> Result<ResolvedAttachment, AppError> {
        let (data_url_mime, encoded) = split_data_url(&payload.file_data);
        let mime_type = match payload.mime_type.trim() {
            "" => data_url_mime.unwrap_or_default(),
            declared => declared,
        }
        .to_ascii_lowercase();

        let file_name = sanitize_file_name(&payload.file_name)
            .ok_or_else(|| AppError::Validation("File name is required".into()))?;

        let (category, max_size) = self.classify(&mime_type).ok_or_else(|| {
            AppError::Validation(format!("File type {} is not allowed", mime_type))
        })?;

        if payload.file_size > max_size {
            return Err(too_large(&file_name, max_size));
        }
        if encoded.trim().is_empty() {
            return Err(AppError::Validation(format!("{} is empty", file_name)));
        }
        // Base64 expands 3 bytes to 4 chars; reject before decoding anything huge.
        if encoded.len() as u64 > max_size.saturating_mul(4) / 3 + 4 {
            return Err(too_large(&file_name, max_size));
        }

        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|_| AppError::Validation(format!("{} is not valid base64", file_name)))?;

        if bytes.is_empty() {
            return Err(AppError::Validation(format!("{} is empty", file_name)));
        }
        if bytes.len() as u64 > max_size {
            return Err(too_large(&file_name, max_size));
        }
        if bytes.len() as u64 != payload.file_size {
            return Err(AppError::Validation(format!(
                "{} declared {} bytes but contains {}",
                file_name,
                payload.file_size,
                bytes.len()
            )));
        }

        let duration = match payload.duration {
            Some(d) if !d.is_finite() || d < 0.0 => {
                return Err(AppError::Validation("Duration must be non-negative".into()))
            }
            other => other,
        };

        let key = object_key(category, batch, &bytes, &file_name);
        let size = bytes.len() as i64;
        let url = self.store.put(&key, bytes, &mime_type).await?;

        tracing::debug!(
            sender_id,
            category = category.as_str(),
            size,
            key = %key,
            "Attachment resolved"
        );

        Ok(ResolvedAttachment {
            category,
            descriptor: AttachmentDescriptor {
                file_name,
                file_path: url,
                file_size: size,
                mime_type,
                duration,
            },
        })
    }
}

fn too_large(file_name: &str, max_size: u64) -> AppError {
    AppError::Validation(format!(
        "{} exceeds the maximum size of {} bytes",
        file_name, max_size
    ))
}

/// Splits `data:<mime>;base64,<data>` into the MIME type and the data.
fn split_data_url(raw: &str) -> (Option<&str>, &str) {
    let Some(rest) = raw.strip_prefix("data:") else {
        return (None, raw);
    };
    match rest.split_once(',') {
        Some((header, data)) => {
            let mime = header.split(';').next().filter(|m| !m.is_empty());
            (mime, data)
        }
        None => (None, raw),
    }
}

/// Last path component of a client-supplied name.
fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name).trim();
    (!base.is_empty() && base != "." && base != "..").then(|| base.to_string())
}

/// `<category>/<batch>/<sha256>[.<ext>]`
fn object_key(category: AttachmentCategory, batch: &str, bytes: &[u8], file_name: &str) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()));

    match extension {
        Some(ext) => format!("{}/{}/{}.{}", category.as_str(), batch, hex, ext),
        None => format!("{}/{}/{}", category.as_str(), batch, hex),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::infrastructure::storage::MockObjectStore;
    use test_case::test_case;

    fn settings() -> AttachmentSettings {
        Settings::with_defaults("test-secret-that-is-at-least-32-characters")
            .unwrap()
            .attachments
    }

    fn payload(name: &str, mime: &str, bytes: &[u8]) -> FilePayload {
        FilePayload {
            file_data: STANDARD.encode(bytes),
            file_name: name.to_string(),
            file_size: bytes.len() as u64,
            mime_type: mime.to_string(),
            duration: None,
        }
    }

    fn accepting_store() -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store
            .expect_put()
            .returning(|key, _, _| Ok(format!("http://cdn.test/{}", key)));
        store
    }

    fn rejecting_store() -> MockObjectStore {
        let mut store = MockObjectStore::new();
        store.expect_put().never();
        store
    }

    #[test_case("image/png", Some(AttachmentCategory::Image) ; "png image")]
    #[test_case("IMAGE/JPEG", Some(AttachmentCategory::Image) ; "uppercase jpeg")]
    #[test_case("application/pdf", Some(AttachmentCategory::File) ; "pdf file")]
    #[test_case("audio/mpeg", Some(AttachmentCategory::Voice) ; "mp3 voice")]
    #[test_case("application/x-msdownload", None ; "executable")]
    fn test_classify(mime: &str, expected: Option<AttachmentCategory>) {
        let resolver = AttachmentResolver::new(Arc::new(rejecting_store()), settings());
        assert_eq!(resolver.classify(mime).map(|(c, _)| c), expected);
    }

    #[tokio::test]
    async fn test_resolve_image() {
        let resolver = AttachmentResolver::new(Arc::new(accepting_store()), settings());
        let resolved = resolver
            .resolve(1, payload("cat.PNG", "image/png", b"not really a png"))
            .await
            .unwrap();

        assert_eq!(resolved.category, AttachmentCategory::Image);
        assert_eq!(resolved.category.message_type(), MessageType::Image);
        assert_eq!(resolved.descriptor.file_name, "cat.PNG");
        assert_eq!(resolved.descriptor.file_size, 16);
        assert!(resolved.descriptor.file_path.starts_with("http://cdn.test/image/"));
        assert!(resolved.descriptor.file_path.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_resolve_accepts_data_url() {
        let resolver = AttachmentResolver::new(Arc::new(accepting_store()), settings());
        let mut p = payload("note.ogg", "", b"voice bytes");
        p.file_data = format!("data:audio/ogg;base64,{}", p.file_data);
        p.duration = Some(3.5);

        let resolved = resolver.resolve(1, p).await.unwrap();
        assert_eq!(resolved.category, AttachmentCategory::Voice);
        assert_eq!(resolved.descriptor.mime_type, "audio/ogg");
        assert_eq!(resolved.descriptor.duration, Some(3.5));
    }

    #[tokio::test]
    async fn test_rejections_never_touch_the_store() {
        let resolver = AttachmentResolver::new(Arc::new(rejecting_store()), settings());

        let disallowed = payload("run.exe", "application/x-msdownload", b"MZ");
        let mut oversized = payload("big.png", "image/png", b"x");
        oversized.file_size = 10 * 1024 * 1024 + 1;
        let mut mismatched = payload("a.png", "image/png", b"abc");
        mismatched.file_size = 4;
        let mut undecodable = payload("a.png", "image/png", b"abc");
        undecodable.file_data = "!!!not base64!!!".into();
        let empty = payload("a.png", "image/png", b"");
        let nameless = payload("  ", "image/png", b"abc");

        for p in [disallowed, oversized, mismatched, undecodable, empty, nameless] {
            let err = resolver.resolve(1, p).await.unwrap_err();
            assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);
        }
    }

    #[tokio::test]
    async fn test_resolve_all_preserves_order() {
        let resolver = AttachmentResolver::new(Arc::new(accepting_store()), settings());
        let resolved = resolver
            .resolve_all(
                1,
                vec![
                    payload("first.png", "image/png", b"one"),
                    payload("second.pdf", "application/pdf", b"two"),
                ],
            )
            .await
            .unwrap();

        let names: Vec<_> = resolved.iter().map(|r| r.descriptor.file_name.as_str()).collect();
        assert_eq!(names, vec!["first.png", "second.pdf"]);
    }

    #[tokio::test]
    async fn test_resolve_all_discards_stored_files_when_one_is_rejected() {
        let mut store = accepting_store();
        store.expect_delete().times(1).returning(|_| Ok(()));
        let resolver = AttachmentResolver::new(Arc::new(store), settings());

        let err = resolver
            .resolve_all(
                1,
                vec![
                    payload("ok.png", "image/png", b"fine"),
                    payload("bad.exe", "application/x-msdownload", b"MZ"),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_sanitize_file_name_strips_directories() {
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\docs\\cv.pdf").as_deref(), Some("cv.pdf"));
        assert_eq!(sanitize_file_name("uploads/"), None);
    }
}
