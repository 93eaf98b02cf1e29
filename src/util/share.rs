use thiserror::Error;
use url::Url;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ShareUrlError {
    #[error("Invalid share URL: {0}")]
    Invalid(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https can be opened)")]
    UnsupportedScheme(String),
    #[error("Share URL has no host")]
    MissingHost,
    #[error("Share URL must not embed credentials")]
    Credentials,
}

/// Checks a server-supplied share link before it is passed to `open`.
///
/// Only plain `http`/`https` links with a host and no userinfo are allowed;
/// anything else could launch an arbitrary handler on the viewer's machine.
pub fn validate_share_url(raw: &str) -> Result<Url, ShareUrlError> {
    let url = Url::parse(raw.trim())?;
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(ShareUrlError::UnsupportedScheme(other.to_string())),
    }
    if !url.host_str().is_some_and(|h| !h.is_empty()) {
        return Err(ShareUrlError::MissingHost);
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(ShareUrlError::Credentials);
    }
    Ok(url)
}
