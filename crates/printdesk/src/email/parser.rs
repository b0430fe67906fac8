//! Extracting printable documents from a raw message.

use log::debug;
use mail_parser::{Message, MessageParser, MessagePart, MimeHeaders, PartType};

use super::error::{EmailError, Result};

/// One document found in a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailDocument {
    pub filename: String,
    pub content: Vec<u8>,
    /// The plain-text body rather than an attachment.
    pub is_body: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedEmail {
    pub subject: Option<String>,
    /// Bare address of the first `From` entry.
    pub sender: Option<String>,
    pub documents: Vec<EmailDocument>,
}

/// Parses `raw` and collects its attachments, then its non-blank
/// plain-text body saved as `body_filename`.
pub fn parse_email(raw: &[u8], body_filename: &str) -> Result<ParsedEmail> {
    let message = MessageParser::default()
        .parse(raw)
        .ok_or_else(|| EmailError::Parse("not an RFC 822 message".to_string()))?;

    let subject = message.subject().map(|s| s.to_string());
    let sender = message
        .from()
        .and_then(|addr| addr.first())
        .and_then(|a| a.address())
        .map(|a| a.to_string());

    let mut documents: Vec<EmailDocument> = message
        .attachments()
        .map(|part| EmailDocument {
            filename: attachment_filename(part),
            content: part.contents().to_vec(),
            is_body: false,
        })
        .collect();

    if let Some(body) = plain_body(&message) {
        documents.push(EmailDocument {
            filename: body_filename.to_string(),
            content: body.into_bytes(),
            is_body: true,
        });
    }

    debug!(
        "Parsed email {:?}: {} document(s)",
        subject.as_deref().unwrap_or("(no subject)"),
        documents.len()
    );
    Ok(ParsedEmail {
        subject,
        sender,
        documents,
    })
}

fn plain_body(message: &Message) -> Option<String> {
    let text: Vec<&str> = message
        .text_bodies()
        .filter_map(|part| match &part.body {
            PartType::Text(text) => Some(text.as_ref()),
            _ => None,
        })
        .filter(|t| !t.trim().is_empty())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.join("\n"))
    }
}

fn attachment_filename(part: &MessagePart) -> String {
    if let Some(name) = part
        .attachment_name()
        .or_else(|| part.content_type().and_then(|ct| ct.attribute("name")))
        .filter(|n| !n.trim().is_empty())
    {
        return name.to_string();
    }

    let ext = part
        .content_type()
        .and_then(|ct| {
            let mime = format!("{}/{}", ct.ctype(), ct.subtype().unwrap_or("octet-stream"));
            mime_guess::get_mime_extensions_str(&mime).and_then(|exts| exts.first().copied())
        })
        .unwrap_or("bin");
    format!("attachment.{}", ext)
}
