//! The wire transport the engine delegates to.
//!
//! [`Transport`] decouples the execution engine from any particular HTTP
//! implementation. The crate ships an implementation for [`reqwest::Client`];
//! tests and embedders can provide their own.

use crate::{
    assemble::{BasicCredentials, RequestTimeout},
    error::{TransportError, TransportErrorKind},
    payload::{MultipartBody, MultipartPart},
    response::HttpResponse,
};
use bytes::Bytes;
use http::{header::CONTENT_TYPE, Request};
use reqwest::multipart::{Form, Part};
use std::future::Future;
use std::sync::Arc;

/// Sends one wire request and reads the whole response.
///
/// Implementations must support GET, POST, PUT and DELETE, arbitrary headers,
/// request bodies on every method (including GET), and honour the
/// [`BasicCredentials`] and [`RequestTimeout`] request extensions. A
/// [`MultipartBody`] extension replaces the (empty) body; the transport frames
/// it and sets the `Content-Type` with its boundary.
pub trait Transport: Send + Sync {
    /// Executes `request`.
    ///
    /// # Returns
    ///
    /// The fully-read response, or a [`TransportError`] if the connection or
    /// the protocol exchange failed. Error statuses are responses, not errors.
    fn send(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send;

    /// Creates the transport used when a client is built without one.
    fn default_transport() -> Result<Self, TransportError>
    where
        Self: Sized,
    {
        Err(TransportError::new(
            TransportErrorKind::Other,
            "no default transport, provide one with ClientBuilder::transport",
        ))
    }
}

impl Transport for reqwest::Client {
    async fn send(&self, request: Request<Bytes>) -> Result<HttpResponse, TransportError> {
        let (mut parts, body) = request.into_parts();
        let multipart = parts.extensions.remove::<MultipartBody>();
        if multipart.is_some() {
            parts.headers.remove(CONTENT_TYPE);
        }

        let mut builder = self
            .request(parts.method, parts.uri.to_string())
            .headers(parts.headers);
        builder = match multipart {
            Some(form) => builder.multipart(multipart_form(form)?),
            None => builder.body(body),
        };

        if let Some(credentials) = parts.extensions.get::<BasicCredentials>() {
            builder = builder.basic_auth(&credentials.username, Some(&credentials.password));
        }
        if let Some(RequestTimeout(timeout)) = parts.extensions.get::<RequestTimeout>() {
            builder = builder.timeout(*timeout);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse::new(status, headers, body))
    }

    fn default_transport() -> Result<Self, TransportError> {
        reqwest::Client::builder().build().map_err(TransportError::from)
    }
}

fn multipart_form(body: MultipartBody) -> reqwest::Result<Form> {
    let mut form = Form::new();
    for part in body.into_parts() {
        form = match part {
            MultipartPart::Text { name, value, charset } if charset.is_utf8() => {
                form.text(name, String::from_utf8_lossy(&value).into_owned())
            }
            MultipartPart::Text { name, value, charset } => form.part(
                name,
                Part::bytes(value.to_vec())
                    .mime_str(&format!("text/plain; charset={}", charset.name()))?,
            ),
            MultipartPart::File {
                name,
                file_name,
                content_type,
                bytes,
            } => form.part(
                name,
                Part::bytes(bytes.to_vec())
                    .file_name(file_name)
                    .mime_str(&content_type)?,
            ),
        };
    }
    Ok(form)
}

impl<T: Transport> Transport for Arc<T> {
    fn send(
        &self,
        request: Request<Bytes>,
    ) -> impl Future<Output = Result<HttpResponse, TransportError>> + Send {
        self.as_ref().send(request)
    }
}
