//! Query string encoding.

use crate::error::{Error, Result};
use crate::options::RequestOptions;
use url::Url;

/// Encodes `params` as `key=value` pairs joined by `&`.
///
/// Keys and values are both percent-encoded (form-urlencoded, so a space becomes `+`).
/// Keys without a value are left out. Pairs appear in the mapping's insertion order.
pub fn encode_query(params: &RequestOptions) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in params.iter() {
        serializer.append_pair(key, &value.to_string());
    }
    serializer.finish()
}

/// Appends the encoded `params` to `url`, adding `?` (or `&` if `url` already has a query)
/// only when there is something to append.
pub fn append_query(url: &str, params: &RequestOptions) -> String {
    let query = encode_query(params);
    if query.is_empty() {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}{query}")
}

/// Appends percent-encoded path segments to `base`, dropping any trailing slashes first.
pub fn join_path<S: AsRef<str>>(base: &str, segments: &[S]) -> Result<String> {
    let mut url = Url::parse(base.trim_end_matches('/'))
        .map_err(|e| Error::precondition(format!("invalid endpoint url {base:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| Error::precondition(format!("endpoint url {base:?} cannot have a path")))?
        .pop_if_empty()
        .extend(segments.iter().map(AsRef::as_ref));
    Ok(url.into())
}
