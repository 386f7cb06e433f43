//! Request payloads and their wire encoding.
//!
//! A [`Payload`] is either a raw string body or a form. Forms are sent as
//! `multipart/form-data` when the declared content type asks for it and as
//! `application/x-www-form-urlencoded` otherwise. [`Payload::encode`] turns a
//! payload into what the transport puts on the wire: body bytes with their
//! `Content-Type`, or the ordered parts of a multipart form.

use crate::{Error, Result};
use bytes::Bytes;
use encoding_rs::Encoding;
use serde::ser::{Serialize, SerializeMap, SerializeStruct, Serializer};
use std::borrow::Cow;
use std::path::{Path, PathBuf};

/// The `multipart/form-data` media type.
pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

/// The `application/x-www-form-urlencoded` media type.
pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// The `application/json` media type.
pub const APPLICATION_JSON: &str = "application/json";

/// Content type of file parts that do not declare their own.
pub const DEFAULT_BINARY: &str = "application/octet-stream";

/// A character set payload text is encoded with.
///
/// Any label known to the WHATWG Encoding Standard is accepted. Labels that
/// can only be decoded map to the encoding used for output, so the name put
/// on the wire always matches the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Charset(&'static Encoding);

impl Charset {
    /// Returns UTF-8.
    pub fn utf8() -> Self {
        Charset(encoding_rs::UTF_8)
    }

    /// Looks up a charset by label, e.g. `"UTF-8"`, `"latin1"` or `"Shift_JIS"`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] for unknown labels.
    pub fn from_name(name: &str) -> Result<Self> {
        Encoding::for_label(name.as_bytes())
            .filter(|encoding| *encoding != encoding_rs::REPLACEMENT)
            .map(|encoding| Charset(encoding.output_encoding()))
            .ok_or_else(|| Error::Encoding(format!("Unsupported charset: {}", name)))
    }

    /// Returns the canonical name.
    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Returns `true` for UTF-8.
    pub fn is_utf8(&self) -> bool {
        self.0 == encoding_rs::UTF_8
    }

    /// Encodes `text` in this charset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if a character cannot be represented.
    pub fn encode<'a>(&self, text: &'a str) -> Result<Cow<'a, [u8]>> {
        let (bytes, _, had_unmappable_characters) = self.0.encode(text);
        if had_unmappable_characters {
            return Err(Error::Encoding(format!(
                "Text {:?} cannot be encoded as {}",
                text,
                self.name()
            )));
        }
        Ok(bytes)
    }
}

/// A file attached to a form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    path: PathBuf,
    content_type: Option<String>,
    bytes: Bytes,
}

impl FilePart {
    /// Creates a file part from a path and its contents.
    pub fn new(path: impl Into<PathBuf>, bytes: impl Into<Bytes>) -> Self {
        Self {
            path: path.into(),
            content_type: None,
            bytes: bytes.into(),
        }
    }

    /// Reads a file part from disk.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file cannot be read.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| {
            Error::ConfigurationError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Ok(Self::new(path, bytes))
    }

    /// Overrides the part's content type, which defaults to [`DEFAULT_BINARY`].
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Returns the path this part was created from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name sent in the part's `Content-Disposition`.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Returns the file contents.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Returns the part's content type.
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_BINARY)
    }
}

impl Serialize for FilePart {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("FilePart", 2)?;
        state.serialize_field("path", &self.path.display().to_string())?;
        state.serialize_field("size", &self.bytes.len())?;
        state.end()
    }
}

/// A single element of a form list.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum FormPart {
    /// A text value.
    Text(String),
    /// A file.
    File(FilePart),
}

/// The value stored under one form key.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum FormValue {
    /// A text value.
    Text(String),
    /// A file.
    File(FilePart),
    /// Several values sent under the same key, in order.
    List(Vec<FormPart>),
}

impl FormValue {
    fn parts(&self) -> Vec<FormPartRef<'_>> {
        match self {
            FormValue::Text(text) => vec![FormPartRef::Text(text)],
            FormValue::File(file) => vec![FormPartRef::File(file)],
            FormValue::List(parts) => parts
                .iter()
                .map(|part| match part {
                    FormPart::Text(text) => FormPartRef::Text(text),
                    FormPart::File(file) => FormPartRef::File(file),
                })
                .collect(),
        }
    }
}

impl From<&str> for FormValue {
    fn from(value: &str) -> Self {
        FormValue::Text(value.to_string())
    }
}

impl From<String> for FormValue {
    fn from(value: String) -> Self {
        FormValue::Text(value)
    }
}

impl From<FilePart> for FormValue {
    fn from(value: FilePart) -> Self {
        FormValue::File(value)
    }
}

impl From<Vec<FormPart>> for FormValue {
    fn from(value: Vec<FormPart>) -> Self {
        FormValue::List(value)
    }
}

impl From<Vec<&str>> for FormValue {
    fn from(value: Vec<&str>) -> Self {
        FormValue::List(
            value
                .into_iter()
                .map(|v| FormPart::Text(v.to_string()))
                .collect(),
        )
    }
}

enum FormPartRef<'a> {
    Text(&'a str),
    File(&'a FilePart),
}

/// An insertion-ordered form with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Form {
    fields: Vec<(String, FormValue)>,
}

impl Form {
    /// Creates an empty form.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<FormValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Adds or replaces a field in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<FormValue>) {
        let key = key.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((key, value)),
        }
    }

    /// Returns the value stored under `key`.
    pub fn get(&self, key: &str) -> Option<&FormValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterates over the fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormValue)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns `true` if any field holds a file.
    pub fn has_files(&self) -> bool {
        self.fields.iter().any(|(_, value)| {
            value
                .parts()
                .iter()
                .any(|part| matches!(part, FormPartRef::File(_)))
        })
    }

    /// Returns the number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns `true` if the form has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Form {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// What a payload carries.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadContent {
    /// A raw string body.
    Body(String),
    /// Form fields.
    Form(Form),
}

/// The body of a request together with its charset and declared content type.
///
/// # Examples
///
/// ```
/// use redial::payload::{Form, Payload};
///
/// # fn example() -> Result<(), redial::Error> {
/// let json = Payload::json(r#"{"k":"v"}"#).encode()?;
/// assert_eq!(json.body().map(|b| &b[..]), Some(&br#"{"k":"v"}"#[..]));
///
/// let form = Payload::form("UTF-8", "application/x-www-form-urlencoded",
///     Form::new().field("a", "x").field("b", vec!["y", "z"])).encode()?;
/// assert_eq!(form.body().map(|b| &b[..]), Some(&b"a=x&b=y&b=z"[..]));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Payload {
    charset: String,
    content_type: String,
    content: PayloadContent,
}

/// A payload ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncodedPayload {
    /// Bytes sent as the request body.
    Raw {
        /// The body bytes.
        body: Bytes,
        /// The value of the `Content-Type` header.
        content_type: String,
    },
    /// Form parts the transport frames as `multipart/form-data`, choosing
    /// the boundary itself.
    Multipart(MultipartBody),
}

impl EncodedPayload {
    /// Returns the body bytes, or `None` for a multipart form.
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            EncodedPayload::Raw { body, .. } => Some(body),
            EncodedPayload::Multipart(_) => None,
        }
    }

    /// Returns the content type recorded on the request.
    ///
    /// Multipart forms report [`MULTIPART_FORM_DATA`] without a boundary.
    pub fn content_type(&self) -> &str {
        match self {
            EncodedPayload::Raw { content_type, .. } => content_type,
            EncodedPayload::Multipart(_) => MULTIPART_FORM_DATA,
        }
    }
}

/// One part of a multipart form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MultipartPart {
    /// A text field, already encoded in `charset`.
    Text {
        /// The field name.
        name: String,
        /// The encoded value.
        value: Bytes,
        /// The charset `value` is encoded in.
        charset: Charset,
    },
    /// A file field.
    File {
        /// The field name.
        name: String,
        /// The file name sent in the part's `Content-Disposition`.
        file_name: String,
        /// The part's content type.
        content_type: String,
        /// The file contents.
        bytes: Bytes,
    },
}

impl MultipartPart {
    /// Returns the field name.
    pub fn name(&self) -> &str {
        match self {
            MultipartPart::Text { name, .. } | MultipartPart::File { name, .. } => name,
        }
    }
}

/// The ordered parts of a multipart form, one per form value.
///
/// The assembled wire request carries it as a request extension in place of
/// a body; the transport frames it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultipartBody {
    parts: Vec<MultipartPart>,
}

impl MultipartBody {
    /// Returns the parts in wire order.
    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    /// Consumes the form and returns its parts in wire order.
    pub fn into_parts(self) -> Vec<MultipartPart> {
        self.parts
    }

    /// Returns the number of parts.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Returns `true` if the form has no parts.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

impl Payload {
    /// Creates a payload carrying a raw string body.
    pub fn body(
        charset: impl Into<String>,
        content_type: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            charset: charset.into(),
            content_type: content_type.into(),
            content: PayloadContent::Body(body.into()),
        }
    }

    /// Creates a UTF-8 `application/json` payload.
    pub fn json(body: impl Into<String>) -> Self {
        Self::body("UTF-8", APPLICATION_JSON, body)
    }

    /// Creates a form payload.
    pub fn form(charset: impl Into<String>, content_type: impl Into<String>, form: Form) -> Self {
        Self {
            charset: charset.into(),
            content_type: content_type.into(),
            content: PayloadContent::Form(form),
        }
    }

    /// Creates a new `PayloadBuilder`.
    pub fn builder() -> PayloadBuilder {
        PayloadBuilder::default()
    }

    /// Returns the declared charset name.
    pub fn charset(&self) -> &str {
        &self.charset
    }

    /// Returns the declared content type.
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Returns the payload content.
    pub fn content(&self) -> &PayloadContent {
        &self.content
    }

    /// Returns `true` if this form payload is sent as `multipart/form-data`.
    pub fn is_multipart(&self) -> bool {
        matches!(self.content, PayloadContent::Form(_))
            && self
                .content_type
                .to_ascii_lowercase()
                .contains(MULTIPART_FORM_DATA)
    }

    /// Encodes the payload for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encoding`] if the charset is unsupported, a character
    /// cannot be represented, or a URL-encoded form contains a file.
    pub fn encode(&self) -> Result<EncodedPayload> {
        let charset = Charset::from_name(&self.charset)?;
        match &self.content {
            PayloadContent::Body(body) => Ok(EncodedPayload::Raw {
                body: Bytes::from(charset.encode(body)?.into_owned()),
                content_type: self.content_type.clone(),
            }),
            PayloadContent::Form(form) if self.is_multipart() => {
                encode_multipart(form, charset).map(EncodedPayload::Multipart)
            }
            PayloadContent::Form(form) => encode_urlencoded(form, charset),
        }
    }
}

fn encode_urlencoded(form: &Form, charset: Charset) -> Result<EncodedPayload> {
    let mut pairs = Vec::new();
    for (key, value) in form.iter() {
        for part in value.parts() {
            let text = match part {
                FormPartRef::Text(text) => text,
                FormPartRef::File(file) => {
                    return Err(Error::Encoding(format!(
                        "File {} in field {:?} requires a {} payload",
                        file.path().display(),
                        key,
                        MULTIPART_FORM_DATA
                    )))
                }
            };
            let key: String = url::form_urlencoded::byte_serialize(&charset.encode(key)?).collect();
            let value: String =
                url::form_urlencoded::byte_serialize(&charset.encode(text)?).collect();
            pairs.push(format!("{}={}", key, value));
        }
    }

    Ok(EncodedPayload::Raw {
        body: Bytes::from(pairs.join("&")),
        content_type: format!("{}; charset={}", FORM_URLENCODED, charset.name()),
    })
}

fn encode_multipart(form: &Form, charset: Charset) -> Result<MultipartBody> {
    let mut parts = Vec::new();
    for (key, value) in form.iter() {
        for part in value.parts() {
            parts.push(match part {
                FormPartRef::Text(text) => MultipartPart::Text {
                    name: key.to_string(),
                    value: Bytes::from(charset.encode(text)?.into_owned()),
                    charset,
                },
                FormPartRef::File(file) => MultipartPart::File {
                    name: key.to_string(),
                    file_name: file.file_name(),
                    content_type: file.content_type().to_string(),
                    bytes: file.bytes().clone(),
                },
            });
        }
    }
    Ok(MultipartBody { parts })
}

/// Builder for [`Payload`] that rejects contradictory settings.
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    charset: Option<String>,
    content_type: Option<String>,
    body: Option<String>,
    form: Option<Form>,
}

impl PayloadBuilder {
    /// Sets the charset. Defaults to `UTF-8`.
    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    /// Sets the content type.
    ///
    /// Defaults to `text/plain` for bodies and URL-encoded for forms.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets a raw string body.
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets form fields.
    pub fn form(mut self, form: Form) -> Self {
        self.form = Some(form);
        self
    }

    /// Builds the payload.
    ///
    /// # Errors
    ///
    /// Returns a configuration error unless exactly one of body and form is set.
    pub fn build(self) -> Result<Payload> {
        let charset = self.charset.unwrap_or_else(|| Charset::utf8().name().to_string());
        match (self.body, self.form) {
            (Some(body), None) => Ok(Payload::body(
                charset,
                self.content_type.unwrap_or_else(|| "text/plain".to_string()),
                body,
            )),
            (None, Some(form)) => Ok(Payload::form(
                charset,
                self.content_type
                    .unwrap_or_else(|| FORM_URLENCODED.to_string()),
                form,
            )),
            (Some(_), Some(_)) => Err(Error::ConfigurationError(
                "Payload cannot carry both a body and a form".to_string(),
            )),
            (None, None) => Err(Error::ConfigurationError(
                "Payload needs either a body or a form".to_string(),
            )),
        }
    }
}
