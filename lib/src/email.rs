use chrono::{TimeZone, Utc};
use mailparse::{DispositionType, MailAddr, MailHeaderMap, ParsedMail, SingleInfo};
use serde::{Deserialize, Serialize};

use crate::Error;

/// Narrow interface over the MIME parser so that tests can substitute it.
pub trait Parser {
    fn parse(&self, raw: &[u8]) -> Result<Email, Error>;
}

/// Default `Parser`, backed by `mailparse`.
#[derive(Clone, Copy, Debug, Default)]
pub struct MimeParser;

impl Parser for MimeParser {
    fn parse(&self, raw: &[u8]) -> Result<Email, Error> {
        Email::from_mime(raw)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    /// All top-level headers, in message order
    pub headers: Vec<Header>,

    pub from: Option<Address>,
    pub sender: Option<Address>,
    pub reply_to: Vec<Address>,
    pub delivered_to: Option<String>,
    pub return_path: Option<String>,

    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,

    pub subject: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<String>,

    /// RFC 3339 date if the Date header parses, raw header value otherwise
    pub date: Option<String>,

    /// Plaintext body
    pub text: Option<String>,

    /// HTML body, if any
    pub html: Option<String>,

    /// List of attachments, if any
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Header {
    pub key: String,
    pub value: String,
}

/// A mailbox, or a named group of mailboxes.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Address {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Vec<Address>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    Attachment,
    Inline,
}

impl Default for Disposition {
    fn default() -> Self {
        Disposition::Attachment
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Attachment filename, from Content-Disposition or Content-Type
    pub filename: Option<String>,

    /// MIME type of attachment (e.g., image/png)
    pub mime_type: String,

    /// Attachment type (regular or inline)
    pub disposition: Disposition,

    /// Charset declared on the part
    pub charset: String,

    /// Content-ID is set for *inline* attachments.
    /// This ID is used to map the attachment to the image in HTML.
    /// For example: <img src="cid:abcd">
    pub content_id: Option<String>,

    /// Attachment size, in bytes
    pub size: usize,

    /// Decoded attachment data
    #[serde(with = "base64_content")]
    pub content: Vec<u8>,
}

impl From<&SingleInfo> for Address {
    fn from(info: &SingleInfo) -> Self {
        Self {
            name: info.display_name.clone().unwrap_or_default(),
            address: Some(info.addr.clone()),
            group: None,
        }
    }
}

impl From<&MailAddr> for Address {
    fn from(addr: &MailAddr) -> Self {
        match addr {
            MailAddr::Single(info) => info.into(),
            MailAddr::Group(group) => Self {
                name: group.group_name.clone(),
                address: None,
                group: Some(group.addrs.iter().map(Address::from).collect()),
            },
        }
    }
}

impl Email {
    pub fn new() -> Email {
        Default::default()
    }

    /// Convert a raw MIME email into structured format
    pub fn from_mime(mime_content: &[u8]) -> Result<Email, Error> {
        let parsed = mailparse::parse_mail(mime_content)?;

        let mut email = Email::new();
        email.parse_headers(&parsed);
        email.parse_recursive(&parsed)?;

        Ok(email)
    }

    /// One-line description of the email, for logging
    pub fn summary(&self) -> String {
        let from = self
            .from
            .as_ref()
            .and_then(|a| a.address.as_deref())
            .unwrap_or("<unknown>");

        format!(
            "from: {}, to: {}, subject: {:?}, text: {} bytes, html: {} bytes, attachments: {}",
            from,
            self.to.len(),
            self.subject.as_deref().unwrap_or(""),
            self.text.as_ref().map_or(0, |t| t.len()),
            self.html.as_ref().map_or(0, |h| h.len()),
            self.attachments.len()
        )
    }

    fn parse_headers(&mut self, mail: &ParsedMail) {
        let headers = &mail.headers;

        self.headers = headers
            .iter()
            .map(|h| Header {
                key: h.get_key(),
                value: h.get_value(),
            })
            .collect();

        self.from = addresses(mail, "From").into_iter().next();
        self.sender = addresses(mail, "Sender").into_iter().next();
        self.reply_to = addresses(mail, "Reply-To");
        self.to = addresses(mail, "To");
        self.cc = addresses(mail, "Cc");
        self.bcc = addresses(mail, "Bcc");

        self.delivered_to = headers.get_first_value("Delivered-To");
        self.return_path = headers
            .get_first_value("Return-Path")
            .map(|v| trim_angle_brackets(&v));

        self.subject = headers.get_first_value("Subject");
        self.message_id = headers.get_first_value("Message-ID");
        self.in_reply_to = headers.get_first_value("In-Reply-To");
        self.references = headers.get_first_value("References");

        self.date = headers.get_first_value("Date").map(|raw| {
            mailparse::dateparse(&raw)
                .ok()
                .and_then(|ts| Utc.timestamp_opt(ts, 0).single())
                .map(|dt| dt.to_rfc3339())
                .unwrap_or(raw)
        });
    }

    /// Recursively walk the MIME parts and extract the following:
    ///
    /// 1. Body (text and/or html)
    /// 2. Inline attachments
    /// 3. Regular attachments
    ///
    fn parse_recursive(&mut self, part: &ParsedMail) -> Result<(), Error> {
        let mimetype = &part.ctype.mimetype;

        // If this is an attachment, append to Vec and return
        if let Some(attachment) = Attachment::from_mime(part)? {
            self.attachments.push(attachment);
            return Ok(());
        }

        // Multipart -> process each subpart recursively
        if mimetype.starts_with("multipart/") {
            for subpart in part.subparts.iter() {
                self.parse_recursive(subpart)?;
            }
            return Ok(());
        }

        // Email body
        let body = part.get_body()?;

        if mimetype == "text/html" {
            append_body(&mut self.html, body);
        } else {
            append_body(&mut self.text, body);
        }

        Ok(())
    }
}

impl Attachment {
    pub fn new() -> Attachment {
        Default::default()
    }

    /// Inspect part headers to determine if this is an attachment.
    /// If it is, build the Attachment and return it.
    fn from_mime(part: &ParsedMail) -> Result<Option<Attachment>, Error> {
        let content_type = &part.ctype;
        let mimetype = &content_type.mimetype;

        if mimetype.starts_with("multipart/") {
            return Ok(None);
        }

        // mailparse reports a missing Content-Disposition as inline
        let declared = part.headers.get_first_header("Content-Disposition").is_some();
        let content_disposition = part.get_content_disposition();
        let content_id = part
            .headers
            .get_first_value("Content-ID")
            .map(|v| trim_angle_brackets(&v));

        let disposition = match content_disposition.disposition {
            DispositionType::Attachment if declared => Disposition::Attachment,
            // Text bodies, even with an inline disposition
            _ if is_body(mimetype) => return Ok(None),
            DispositionType::Inline if declared => Disposition::Inline,
            // Images, application/*, message/rfc822 without a disposition
            _ if content_id.is_some() => Disposition::Inline,
            _ => Disposition::Attachment,
        };

        let mut attachment = Attachment::new();

        attachment.filename = content_disposition
            .params
            .get("filename")
            .or_else(|| content_type.params.get("name"))
            .cloned();
        attachment.mime_type = mimetype.to_string();
        attachment.disposition = disposition;
        attachment.charset = content_type.charset.to_lowercase();
        attachment.content_id = content_id;
        attachment.content = part.get_body_raw()?;
        attachment.size = attachment.content.len();

        Ok(Some(attachment))
    }
}

fn is_body(mimetype: &str) -> bool {
    mimetype == "text/plain" || mimetype == "text/html"
}

/// Malformed address headers are logged and skipped
fn addresses(mail: &ParsedMail, key: &str) -> Vec<Address> {
    let header = match mail.headers.get_first_header(key) {
        Some(h) => h,
        None => return Vec::new(),
    };

    match mailparse::addrparse_header(header) {
        Ok(list) => list.iter().map(Address::from).collect(),
        Err(e) => {
            log::warn!("Could not parse {} header: {}", key, e);
            Vec::new()
        }
    }
}

fn append_body(slot: &mut Option<String>, body: String) {
    match slot {
        Some(existing) => {
            existing.push('\n');
            existing.push_str(&body);
        }
        None => *slot = Some(body),
    }
}

fn trim_angle_brackets(value: &str) -> String {
    value
        .trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .to_string()
}

/// Attachment content is carried as a base64 string in JSON
mod base64_content {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
