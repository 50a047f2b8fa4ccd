use std::{
    fs,
    io::Cursor,
    path::{Path, PathBuf},
};

use image::{ImageFormat, ImageReader};

use crate::{client::ImagePayload, error::UploadError, types::Resolution};

/// A validated image waiting to be analysed.
#[derive(Clone, Debug)]
pub struct PendingUpload {
    pub path: PathBuf,
    pub payload: ImagePayload,
    pub preview: Resolution,
}

/// Validate `path` as an uploadable image: an `image/*` type no larger than
/// `max_bytes`. Type is checked before size.
pub fn validate_image(path: &Path, max_bytes: u64) -> Result<PendingUpload, UploadError> {
    let format = ImageFormat::from_path(path)
        .map_err(|_| UploadError::InvalidFileType(path.display().to_string()))?;
    let mime = format.to_mime_type();
    if !mime.starts_with("image/") {
        return Err(UploadError::InvalidFileType(mime.to_string()));
    }

    let size = fs::metadata(path)
        .map_err(|source| UploadError::Read {
            path: path.to_path_buf(),
            source,
        })?
        .len();
    if size > max_bytes {
        return Err(UploadError::FileTooLarge {
            size,
            limit: max_bytes,
        });
    }

    let bytes = fs::read(path).map_err(|source| UploadError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let (width, height) = ImageReader::with_format(Cursor::new(&bytes), format)
        .into_dimensions()
        .map_err(|err| UploadError::InvalidFileType(format!("{}: {err}", path.display())))?;

    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());

    Ok(PendingUpload {
        path: path.to_path_buf(),
        payload: ImagePayload {
            file_name,
            mime,
            bytes,
        },
        preview: Resolution { width, height },
    })
}

/// The upload mode's selection state.
#[derive(Debug)]
pub struct UploadPanel {
    max_bytes: u64,
    pending: Option<PendingUpload>,
}

impl UploadPanel {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            pending: None,
        }
    }

    /// Replace the pending upload with `path`. On rejection the previous
    /// selection is left untouched.
    pub fn select(&mut self, path: &Path) -> Result<&PendingUpload, UploadError> {
        let upload = validate_image(path, self.max_bytes)?;
        log::info!(
            "selected {} ({}, {} bytes, {})",
            upload.payload.file_name,
            upload.payload.mime,
            upload.payload.bytes.len(),
            upload.preview
        );
        Ok(self.pending.insert(upload))
    }

    pub fn pending(&self) -> Option<&PendingUpload> {
        self.pending.as_ref()
    }

    pub fn clear(&mut self) {
        self.pending = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_pixel(width, height, Rgb([40, 120, 200]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn valid_image_is_selected_with_preview() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "face.png", 32, 24);
        let mut panel = UploadPanel::new(10 * 1024 * 1024);

        let upload = panel.select(&path).unwrap();
        assert_eq!(upload.payload.mime, "image/png");
        assert_eq!(upload.payload.file_name, "face.png");
        assert_eq!(upload.preview, Resolution { width: 32, height: 24 });
        assert!(panel.pending().is_some());
    }

    #[test]
    fn non_image_is_rejected_and_selection_kept() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_png(dir.path(), "face.png", 8, 8);
        let text = dir.path().join("notes.txt");
        fs::write(&text, "hello").unwrap();

        let mut panel = UploadPanel::new(10 * 1024 * 1024);
        panel.select(&good).unwrap();
        let err = panel.select(&text).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::InvalidFileType);
        assert_eq!(panel.pending().unwrap().path, good);
    }

    #[test]
    fn oversized_image_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "big.png", 64, 64);
        let size = fs::metadata(&path).unwrap().len();

        let mut panel = UploadPanel::new(size - 1);
        let err = panel.select(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileTooLarge);
        assert!(panel.pending().is_none());
    }

    #[test]
    fn image_exactly_at_limit_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "edge.png", 16, 16);
        let size = fs::metadata(&path).unwrap().len();
        assert!(validate_image(&path, size).is_ok());
    }

    #[test]
    fn image_extension_with_garbage_content_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fake.jpg");
        fs::write(&path, b"definitely not a jpeg").unwrap();
        let err = validate_image(&path, 1024).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidFileType);
    }

    #[test]
    fn clear_drops_pending_upload() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), "face.png", 4, 4);
        let mut panel = UploadPanel::new(1024 * 1024);
        panel.select(&path).unwrap();
        panel.clear();
        assert!(panel.pending().is_none());
    }
}
