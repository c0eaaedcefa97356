//! Request options accepted by [`ApiClient::request`](crate::ApiClient::request).

use reqwest::multipart::Form;
use reqwest::Method;

use crate::headers::HeaderInput;

/// Body of an outgoing request.
#[derive(Debug, Default)]
pub enum RequestBody {
    /// No body.
    #[default]
    Empty,
    /// A JSON value, serialized on send.
    Json(serde_json::Value),
    /// Pre-serialized text, sent verbatim.
    Text(String),
    /// A multipart form. The transport sets the content type and boundary.
    Form(Form),
}

impl RequestBody {
    /// Whether this is a multipart form payload.
    #[must_use]
    pub const fn is_form(&self) -> bool {
        matches!(self, Self::Form(_))
    }
}

/// Per-request configuration.
#[derive(Debug, Default)]
pub struct RequestOptions {
    /// HTTP method. Defaults to `GET`.
    pub method: Method,
    /// Request body.
    pub body: RequestBody,
    /// Caller headers; these win over every default.
    pub headers: Option<HeaderInput>,
    /// Skip the default JSON content type even for non-form bodies.
    pub omit_content_type: bool,
}

impl RequestOptions {
    /// Options for a `GET` request.
    #[must_use]
    pub fn get() -> Self {
        Self::default()
    }

    /// Options for a `DELETE` request.
    #[must_use]
    pub fn delete() -> Self {
        Self::default().method(Method::DELETE)
    }

    /// Options for a `POST` request.
    #[must_use]
    pub fn post() -> Self {
        Self::default().method(Method::POST)
    }

    /// Set the HTTP method.
    #[must_use]
    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Send a JSON body.
    #[must_use]
    pub fn json(mut self, value: serde_json::Value) -> Self {
        self.body = RequestBody::Json(value);
        self
    }

    /// Send a pre-serialized text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.body = RequestBody::Text(text.into());
        self
    }

    /// Send a multipart form body.
    #[must_use]
    pub fn form(mut self, form: Form) -> Self {
        self.body = RequestBody::Form(form);
        self
    }

    /// Attach caller headers in any supported shape.
    #[must_use]
    pub fn headers(mut self, headers: impl Into<HeaderInput>) -> Self {
        self.headers = Some(headers.into());
        self
    }

    /// Do not send the default `Content-Type`.
    #[must_use]
    pub fn without_content_type(mut self) -> Self {
        self.omit_content_type = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_get_without_body() {
        let options = RequestOptions::get();
        assert_eq!(options.method, Method::GET);
        assert!(matches!(options.body, RequestBody::Empty));
        assert!(options.headers.is_none());
        assert!(!options.omit_content_type);
    }

    #[test]
    fn builder_sets_fields() {
        let options = RequestOptions::post()
            .json(serde_json::json!({"title": "Dune"}))
            .headers([("x-request-id", "1")])
            .without_content_type();
        assert_eq!(options.method, Method::POST);
        assert!(matches!(options.body, RequestBody::Json(_)));
        assert!(options.headers.is_some());
        assert!(options.omit_content_type);
    }

    #[test]
    fn form_body_detected() {
        let options = RequestOptions::post().form(Form::new().text("title", "Dune"));
        assert!(options.body.is_form());
        assert!(!RequestBody::Text("x".into()).is_form());
    }
}
