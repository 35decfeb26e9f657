// SPDX-License-Identifier: Apache-2.0

use http::{HeaderValue, Uri};
use tower::BoxError;

/// Parse the delivery URL. Only absolute http(s) URLs are accepted.
pub fn parse_url(s: &str) -> Result<Uri, BoxError> {
    let uri: Uri = s.trim().parse()?;

    match uri.scheme_str() {
        Some("http") | Some("https") => {}
        Some(other) => return Err(format!("unsupported url scheme `{other}` in `{s}`").into()),
        None => return Err(format!("url must include a scheme: `{s}`").into()),
    }

    if uri.authority().is_none() {
        return Err(format!("url must include a host: `{s}`").into());
    }

    Ok(uri)
}

/// Parse a Content-Type value, rejecting anything that can't be sent as a header
pub fn parse_content_type(s: &str) -> Result<String, BoxError> {
    if s.is_empty() {
        return Err("content type must not be empty".into());
    }
    HeaderValue::from_str(s).map_err(|e| format!("invalid content type `{s}`: {e}"))?;
    Ok(s.to_string())
}
