//! Encoding a prepared request into its wire form.
//!
//! Parameters:
//!
//! | name      | value |
//! |-----------|-------|
//! | `jxnr`    | clock milliseconds, defeats caches |
//! | `jxnv`    | protocol version |
//! | `jxncall` | JSON call descriptor with the (pruned) arguments |
//! | `jxnbags` | JSON object of the named databags, only when bags are named |
//!
//! GET requests carry them in the query string; POST requests in a form or
//! multipart body. An upload forces POST, and a GET whose URI grows past the
//! configured limit falls back to POST.

use chrono::{DateTime, Utc};
use jxn_core::request::HeaderSet;
use jxn_core::wire::{encode_pairs, FilePart};
use jxn_core::{CallTarget, DataBags, HttpMethod, RequestContext, Value, WireBody, WireRequest};
use serde_json::Map;

use crate::config::ClientConfig;
use crate::error::RequestError;

/// Build the wire request for a context.
///
/// # Errors
///
/// [`RequestError::Encoding`] when the call descriptor cannot be serialized.
pub fn encode(
    ctx: &RequestContext,
    config: &ClientConfig,
    bags: &DataBags,
    now: DateTime<Utc>,
) -> Result<WireRequest, RequestError> {
    let args: Vec<Value> = ctx
        .args
        .iter()
        .take(config.max_object_size)
        .map(|arg| prune(arg, 1, config.max_object_depth, config.max_object_size))
        .collect();
    let call = call_descriptor(&ctx.call, args);

    let mut params = vec![
        ("jxnr".to_string(), now.timestamp_millis().to_string()),
        ("jxnv".to_string(), config.protocol_version.clone()),
        (
            "jxncall".to_string(),
            serde_json::to_string(&call).map_err(|err| RequestError::Encoding(err.to_string()))?,
        ),
    ];
    if !ctx.bags.is_empty() {
        params.push(("jxnbags".to_string(), bags.snapshot(&ctx.bags).to_string()));
    }

    if ctx.upload.is_none() && ctx.method == HttpMethod::Get {
        let uri = with_query(&ctx.uri, &encode_pairs(&params));
        if uri.len() <= config.max_get_uri_length {
            return Ok(WireRequest {
                method: HttpMethod::Get,
                uri,
                headers: headers(&ctx.headers, HttpMethod::Get),
                body: WireBody::Empty,
            });
        }
        tracing::debug!(
            request_id = %ctx.id(),
            length = uri.len(),
            limit = config.max_get_uri_length,
            "GET URI too long, sending as POST"
        );
    }

    let body = match &ctx.upload {
        Some(upload) => WireBody::Multipart {
            fields: params,
            files: upload
                .files
                .iter()
                .map(|file| FilePart {
                    field: upload.name.clone(),
                    file_name: file.name.clone(),
                    content_type: file.content_type.clone(),
                    bytes: file.bytes.clone(),
                })
                .collect(),
        },
        None => WireBody::Form(params),
    };

    Ok(WireRequest {
        method: HttpMethod::Post,
        uri: ctx.uri.clone(),
        headers: headers(&ctx.headers, HttpMethod::Post),
        body,
    })
}

/// Limit nesting depth and container size of a call argument.
///
/// Containers found deeper than `max_depth` become `null`; arrays and
/// objects keep at most `max_size` entries.
#[must_use]
pub fn prune(value: &Value, depth: usize, max_depth: usize, max_size: usize) -> Value {
    match value {
        Value::Array(_) | Value::Object(_) if depth > max_depth => Value::Null,
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(max_size)
                .map(|item| prune(item, depth + 1, max_depth, max_size))
                .collect(),
        ),
        Value::Object(entries) => Value::Object(
            entries
                .iter()
                .take(max_size)
                .map(|(key, item)| (key.clone(), prune(item, depth + 1, max_depth, max_size)))
                .collect(),
        ),
        scalar => scalar.clone(),
    }
}

/// Replace headers of `base` with same-named `overrides`, appending new ones.
#[must_use]
pub fn merge_headers(base: &[(String, String)], overrides: &[(String, String)]) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = base
        .iter()
        .filter(|(name, _)| !overrides.iter().any(|(other, _)| other.eq_ignore_ascii_case(name)))
        .cloned()
        .collect();
    merged.extend(overrides.iter().cloned());
    merged
}

fn call_descriptor(call: &CallTarget, args: Vec<Value>) -> Value {
    let mut descriptor = match serde_json::to_value(call) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    descriptor.insert("args".to_string(), Value::Array(args));
    Value::Object(descriptor)
}

fn headers(set: &HeaderSet, method: HttpMethod) -> Vec<(String, String)> {
    let specific = match method {
        HttpMethod::Get => &set.get,
        HttpMethod::Post => &set.post,
    };
    let mut headers = set.common.clone();
    headers.extend(specific.iter().cloned());
    headers
}

fn with_query(uri: &str, query: &str) -> String {
    let separator = if uri.contains('?') { '&' } else { '?' };
    format!("{uri}{separator}{query}")
}
