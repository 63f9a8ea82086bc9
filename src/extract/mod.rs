//! Attachment text extraction.
//!
//! [`extract`] turns an uploaded document into plain text for the Summarize
//! payload. It never fails: malformed files, formats without an interpreter,
//! and undecodable bytes all come back as a bracketed placeholder line that the
//! generation service (and the human) can read. Images are not extracted; they
//! travel to the service as inline image items.
use std::fmt;
use std::panic::{self, UnwindSafe};
use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::thread;
use thiserror::Error;

mod formats;

/// Image formats forwarded as-is to the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn mime(self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Document formats with a dedicated interpreter, plus the raw-text fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Pdf,
    Docx,
    /// Legacy binary Word; never decoded.
    Doc,
    Pptx,
    Spreadsheet,
    Csv,
    /// Anything else; decoded as UTF-8 text.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachmentKind {
    Image(ImageFormat),
    Document(DocumentFormat),
}

impl AttachmentKind {
    /// Classify a file by its (case-insensitive) extension.
    pub fn from_name(name: &str) -> Self {
        let ext = Path::new(name)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "png" => AttachmentKind::Image(ImageFormat::Png),
            "jpg" | "jpeg" => AttachmentKind::Image(ImageFormat::Jpeg),
            "pdf" => AttachmentKind::Document(DocumentFormat::Pdf),
            "docx" => AttachmentKind::Document(DocumentFormat::Docx),
            "doc" => AttachmentKind::Document(DocumentFormat::Doc),
            "pptx" => AttachmentKind::Document(DocumentFormat::Pptx),
            "xlsx" | "xls" | "xlx" => AttachmentKind::Document(DocumentFormat::Spreadsheet),
            "csv" => AttachmentKind::Document(DocumentFormat::Csv),
            _ => AttachmentKind::Document(DocumentFormat::Other),
        }
    }

    /// Whether the kind is one of the formats the upload form advertises.
    pub fn is_listed(self) -> bool {
        !matches!(self, AttachmentKind::Document(DocumentFormat::Other))
    }
}

/// One uploaded file.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub bytes: Vec<u8>,
    pub kind: AttachmentKind,
}

impl Attachment {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let kind = AttachmentKind::from_name(&name);
        Self { name, bytes, kind }
    }

    /// Read a file from disk, naming the attachment after its file name.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, bytes))
    }
}

impl fmt::Debug for Attachment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attachment")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .field("kind", &self.kind)
            .finish()
    }
}

/// Why a document could not be decoded. Never escapes [`extract`].
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[cfg(feature = "documents")]
    #[error(transparent)]
    Archive(#[from] zip::result::ZipError),

    #[cfg(feature = "documents")]
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),

    #[error("{0}")]
    Malformed(String),

    #[error("this build has no {0} support")]
    MissingSupport(&'static str),

    #[error("the {0} interpreter crashed")]
    Panicked(&'static str),
}

const DOC_PLACEHOLDER: &str =
    "[.doc file detected. Automatic extraction is limited. Please convert to .docx or PDF for better results.]";

/// Placeholder for a file that yielded no usable text.
pub fn unreadable_placeholder(name: &str) -> String {
    format!(
        "[Could not automatically extract text from {name}. Please provide instructions in the text box.]"
    )
}

/// Best-effort plain text for an attachment.
pub fn extract(attachment: &Attachment) -> String {
    let name = attachment.name.as_str();
    let format = match attachment.kind {
        AttachmentKind::Image(format) => {
            return format!("[{name} is an {} image and is sent as-is.]", format.mime());
        }
        AttachmentKind::Document(format) => format,
    };

    let result = match format {
        DocumentFormat::Doc => return DOC_PLACEHOLDER.to_string(),
        DocumentFormat::Other => match std::str::from_utf8(&attachment.bytes) {
            Ok(text) => Ok(text.to_string()),
            Err(err) => {
                tracing::debug!(name, %err, "attachment is not UTF-8 text");
                return unreadable_placeholder(name);
            }
        },
        format => decode_guarded(format, &attachment.bytes),
    };

    match result {
        Ok(text) if text.trim().is_empty() => {
            tracing::debug!(name, "attachment produced no text");
            unreadable_placeholder(name)
        }
        Ok(text) => {
            tracing::debug!(name, chars = text.len(), "extracted attachment text");
            text
        }
        Err(ExtractionError::MissingSupport(what)) => {
            tracing::warn!(name, what, "document support not compiled in");
            format!(
                "[Missing {what} support to parse {name}. Rebuild with the `documents` feature or paste the text into the brief.]"
            )
        }
        Err(err) => {
            tracing::warn!(name, %err, "attachment extraction failed");
            format!("[Error while reading {name}: {err}]")
        }
    }
}

/// Run a format interpreter, turning a panic into an error.
fn decode_guarded(format: DocumentFormat, bytes: &[u8]) -> Result<String, ExtractionError> {
    catch_quietly(|| formats::decode(format, bytes))
        .unwrap_or_else(|_| Err(ExtractionError::Panicked(formats::label(format))))
}

static PANIC_HOOK: Mutex<()> = Mutex::new(());

/// `catch_unwind` with the panic message sent to the debug log instead of
/// stderr. The previous hook is restored afterwards.
fn catch_quietly<T>(f: impl FnOnce() -> T + UnwindSafe) -> thread::Result<T> {
    let _lock = PANIC_HOOK.lock().unwrap_or_else(PoisonError::into_inner);
    let previous = panic::take_hook();
    panic::set_hook(Box::new(|info| {
        tracing::debug!(%info, "document decoder panicked");
    }));
    let result = panic::catch_unwind(f);
    panic::set_hook(previous);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn kinds_follow_extension_case_insensitively() {
        assert_eq!(
            AttachmentKind::from_name("Scan.JPG"),
            AttachmentKind::Image(ImageFormat::Jpeg)
        );
        assert_eq!(
            AttachmentKind::from_name("grades.xlx"),
            AttachmentKind::Document(DocumentFormat::Spreadsheet)
        );
        assert_eq!(
            AttachmentKind::from_name("README"),
            AttachmentKind::Document(DocumentFormat::Other)
        );
        assert!(!AttachmentKind::from_name("notes.xyz").is_listed());
        assert!(AttachmentKind::from_name("brief.pdf").is_listed());
    }

    #[test]
    fn unknown_extension_that_is_not_text_names_the_file() {
        let attachment = Attachment::new("data.xyz", vec![0xff, 0xfe, 0x00, 0x81]);
        assert_eq!(
            extract(&attachment),
            "[Could not automatically extract text from data.xyz. Please provide instructions in the text box.]"
        );
    }

    #[test]
    fn unknown_extension_that_is_text_is_passed_through() {
        let attachment = Attachment::new("rubric.xyz", b"Marked out of 20.".to_vec());
        assert_eq!(extract(&attachment), "Marked out of 20.");
    }

    #[test]
    fn empty_file_gets_the_placeholder() {
        let attachment = Attachment::new("blank.txt", Vec::new());
        assert_eq!(extract(&attachment), unreadable_placeholder("blank.txt"));
    }

    #[test]
    fn legacy_doc_is_never_decoded() {
        let attachment = Attachment::new("old.doc", b"\xd0\xcf\x11\xe0".to_vec());
        assert_eq!(extract(&attachment), DOC_PLACEHOLDER);
    }

    #[test]
    fn csv_is_normalized() {
        let attachment = Attachment::new("marks.csv", b"name,score\n\"Ada\",  19\nBob,17".to_vec());
        assert_eq!(extract(&attachment), "name,score\nAda,  19\nBob,17\n");
    }

    #[test]
    fn malformed_documents_degrade_to_error_text() {
        for name in ["report.pdf", "essay.docx", "slides.pptx", "grades.xlsx"] {
            let attachment = Attachment::new(name, b"definitely not a document".to_vec());
            let text = extract(&attachment);
            assert!(
                text.starts_with(&format!("[Error while reading {name}: "))
                    || text.starts_with("[Missing "),
                "{name}: {text}"
            );
            assert!(text.ends_with(']'), "{text}");
        }
    }

    #[test]
    fn decoder_panics_stay_off_the_panic_hook() {
        static HOOK_CALLS: AtomicUsize = AtomicUsize::new(0);

        let original = {
            let _lock = PANIC_HOOK.lock().unwrap_or_else(PoisonError::into_inner);
            let original = panic::take_hook();
            panic::set_hook(Box::new(|_| {
                HOOK_CALLS.fetch_add(1, Ordering::SeqCst);
            }));
            original
        };

        let quiet = catch_quietly(|| -> u8 { panic!("bad xref table") });
        let quiet_calls = HOOK_CALLS.load(Ordering::SeqCst);
        let loud = {
            let _lock = PANIC_HOOK.lock().unwrap_or_else(PoisonError::into_inner);
            let loud = panic::catch_unwind(|| -> u8 { panic!("outside the guard") });
            panic::set_hook(original);
            loud
        };

        assert!(quiet.is_err());
        assert_eq!(quiet_calls, 0);
        assert!(loud.is_err());
        assert_eq!(HOOK_CALLS.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn images_are_not_extracted() {
        let attachment = Attachment::new("photo.png", vec![0x89, b'P', b'N', b'G']);
        assert!(extract(&attachment).contains("image/png"));
    }
}
