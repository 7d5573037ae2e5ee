//! HTTP request to controller request translation

use std::collections::BTreeMap;

use percent_encoding::percent_decode_str;
use serde::Serialize;
use serde_json::Value;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// The parts of an HTTP request the gateway cares about
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpRequestContext {
    /// HTTP method as received
    pub method: String,
    /// Decoded request path, leading `/` included
    pub path: String,
    /// Query and form parameters, form values winning on conflicts
    pub params: BTreeMap<String, String>,
    /// Raw request body
    pub body: Option<Vec<u8>>,
}

impl HttpRequestContext {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Add one parameter, replacing any previous value
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Build a context from raw request parts.
    ///
    /// `path` is percent-decoded; invalid UTF-8 is replaced. Query
    /// parameters are read first. For `POST` requests with an
    /// `application/x-www-form-urlencoded` body the form fields are merged
    /// on top; the body itself is kept either way.
    pub fn from_parts(
        method: &str,
        path: &str,
        query: Option<&str>,
        content_type: Option<&str>,
        body: &[u8],
    ) -> Self {
        let mut params = BTreeMap::new();
        if let Some(query) = query {
            params.extend(url::form_urlencoded::parse(query.as_bytes()).into_owned());
        }
        if method.eq_ignore_ascii_case("POST") && content_type.is_some_and(is_form) {
            params.extend(url::form_urlencoded::parse(body).into_owned());
        }

        Self {
            method: method.to_string(),
            path: percent_decode_str(path).decode_utf8_lossy().into_owned(),
            params,
            body: (!body.is_empty()).then(|| body.to_vec()),
        }
    }
}

fn is_form(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case(FORM_CONTENT_TYPE))
}

/// Request record sent to the controller
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayRequest {
    /// Upper-cased HTTP method
    pub method: String,
    /// Path without its leading `/`
    pub uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri_params: Option<BTreeMap<String, String>>,
    /// Body for `PUT`/`POST`; `Some(Value::Null)` when it was absent or not JSON
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Translate an HTTP request into the controller's request record
pub fn translate(ctx: &HttpRequestContext) -> GatewayRequest {
    let method = ctx.method.to_ascii_uppercase();
    let uri = ctx.path.strip_prefix('/').unwrap_or(&ctx.path).to_string();
    let uri_params = (!ctx.params.is_empty()).then(|| ctx.params.clone());
    let data = matches!(method.as_str(), "PUT" | "POST").then(|| parse_body(ctx.body.as_deref()));

    GatewayRequest {
        method,
        uri,
        uri_params,
        data,
    }
}

fn parse_body(body: Option<&[u8]>) -> Value {
    match body {
        Some(bytes) if !bytes.is_empty() => serde_json::from_slice(bytes).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
