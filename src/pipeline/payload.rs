//! Per-stage payload assembly.
//!
//! Each stage sends only the text it needs for its own task, never the whole
//! upstream chain.
use crate::extract::{self, Attachment, AttachmentKind};
use crate::generate::ContentItem;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Heading that separates the reference list from the citation list.
pub const CITATION_LIST_MARKER: &str = "Citation List";

/// References requested per 1000 words of draft.
pub const REFERENCES_PER_THOUSAND_WORDS: u64 = 7;

/// Reference style used when neither the human nor the job summary names one.
pub const DEFAULT_REFERENCE_STYLE: &str = "Harvard";

const EMPTY_BRIEF_INSTRUCTION: &str = "The instructions for the writing task are in the following extracted file contents. Please infer all possible details about the assignment.";
const ATTACHMENT_TEXT_INTRO: &str = "Below is the extracted text from the uploaded files:";

/// The human's writing brief: free text plus attachments.
#[derive(Debug, Clone, Default)]
pub struct Brief {
    pub instruction: String,
    pub attachments: Vec<Attachment>,
}

impl Brief {
    pub fn is_empty(&self) -> bool {
        self.instruction.trim().is_empty() && self.attachments.is_empty()
    }
}

/// Extra inputs to the Cite-Build stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiteParams {
    pub reference_style: String,
    pub word_count: u64,
}

impl CiteParams {
    pub fn target_references(&self) -> u64 {
        target_reference_count(self.word_count)
    }
}

/// Extra inputs to the Finalize stage. The lists default to the split of the
/// stored reference bundle when not overridden.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FinalizeParams {
    pub reference_style: String,
    pub reference_list: Option<String>,
    pub citation_list: Option<String>,
}

/// A Cite-Build artifact split into its two lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceBundle {
    pub reference_list: String,
    pub citation_list: String,
}

impl ReferenceBundle {
    /// Split on the first occurrence of [`CITATION_LIST_MARKER`]. Without the
    /// marker the whole text is the reference list.
    pub fn split(raw: &str) -> Self {
        match raw.split_once(CITATION_LIST_MARKER) {
            Some((head, tail)) => Self {
                reference_list: head.trim().to_string(),
                citation_list: format!("{CITATION_LIST_MARKER}{}", tail.trim_end()),
            },
            None => Self {
                reference_list: raw.to_string(),
                citation_list: String::new(),
            },
        }
    }
}

/// Whitespace-delimited word count.
pub fn word_count(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

/// round(7 * words / 1000), halves rounding up.
pub fn target_reference_count(words: u64) -> u64 {
    (words.saturating_mul(REFERENCES_PER_THOUSAND_WORDS) + 500) / 1000
}

/// Read a `Label: value` field out of free-form job summary prose.
///
/// Values end at a semicolon, a line break, or a sentence-ending period;
/// "Not specified" counts as absent.
pub fn summary_field(summary: &str, label: &str) -> Option<String> {
    const VALUE: &str = r"\s*:\s*\**([^;\n]*?)\s*(?:\.(?:\s|$)|;|$)";
    let label = regex::escape(label);
    let pattern = format!(r"(?im)^[\s*#-]*\**{label}\**{VALUE}");
    let inline = format!(r"(?im)[;.]\s*\**{label}\**{VALUE}");
    [pattern, inline].iter().find_map(|pattern| {
        let re = Regex::new(pattern).ok()?;
        let value = re.captures(summary)?.get(1)?.as_str();
        let value = value.trim().trim_matches('*').trim().trim_end_matches('.').trim_end();
        if value.is_empty() || value.eq_ignore_ascii_case("not specified") {
            None
        } else {
            Some(value.to_string())
        }
    })
}

/// Summarize payload: instruction text with extracted document text, then the
/// raw images.
pub fn summarize_payload(brief: &Brief) -> Vec<ContentItem> {
    let mut text_blocks = Vec::new();
    let mut images = Vec::new();
    for attachment in &brief.attachments {
        match attachment.kind {
            AttachmentKind::Image(format) => images.push(ContentItem::Image {
                mime: format.mime().to_string(),
                data: attachment.bytes.clone(),
            }),
            AttachmentKind::Document(_) => {
                let text = extract::extract(attachment);
                if !text.is_empty() {
                    text_blocks.push(format!("----- File: {} -----\n{}", attachment.name, text));
                }
            }
        }
    }

    let base = match brief.instruction.trim() {
        "" => EMPTY_BRIEF_INSTRUCTION,
        instruction => instruction,
    };
    let attachment_text = text_blocks.join("\n\n");
    let attachment_text = attachment_text.trim();
    let combined = if attachment_text.is_empty() {
        base.to_string()
    } else {
        format!("{base}\n\n{ATTACHMENT_TEXT_INTRO}\n\n{attachment_text}")
    };

    let mut payload = vec![ContentItem::Text(combined)];
    payload.extend(images);
    payload
}

/// Structure and Draft payloads: the upstream artifact alone.
pub fn artifact_payload(text: &str) -> Vec<ContentItem> {
    vec![ContentItem::Text(text.to_string())]
}

pub fn cite_payload(draft: &str, params: &CiteParams) -> Vec<ContentItem> {
    vec![ContentItem::Text(format!(
        "Reference style: {}\nApproximate total word count: {}\nTarget reference count: {}\n\nContent:\n{}",
        params.reference_style,
        params.word_count,
        params.target_references(),
        draft
    ))]
}

pub fn finalize_payload(
    draft: &str,
    bundle: &ReferenceBundle,
    reference_style: &str,
) -> Vec<ContentItem> {
    vec![ContentItem::Text(format!(
        "Reference style: {reference_style}\n\n\
         === CONTENT (NO CITATIONS) ===\n{draft}\n\n\
         === REFERENCE LIST ===\n{}\n\n\
         === CITATION LIST ===\n{}\n",
        bundle.reference_list, bundle.citation_list
    ))]
}
