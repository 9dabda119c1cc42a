use crate::UrlError;
use url::Url;

/// Tracking query parameters ignored when comparing page URLs
const TRACKING_PARAMS: &[&str] = &["fbclid", "gclid", "msclkid", "mc_eid", "mc_cid"];

/// Parses a page URL, accepting only http and https URLs with a host
///
/// # Arguments
///
/// * `url_str` - The URL string to parse
///
/// # Returns
///
/// * `Ok(Url)` - The parsed URL
/// * `Err(UrlError)` - Malformed URL, unsupported scheme, or missing host
pub fn parse_page_url(url_str: &str) -> Result<Url, UrlError> {
    let url = Url::parse(url_str).map_err(|e| UrlError::Parse(e.to_string()))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    if url.host_str().is_none() {
        return Err(UrlError::MissingHost);
    }

    Ok(url)
}

/// Computes the key two page URLs are compared by
///
/// # Canonicalization Steps
///
/// 1. Lowercase the host (the scheme is already lowercase)
/// 2. Remove the fragment
/// 3. Remove the trailing slash (except for the root path)
/// 4. Remove tracking query parameters
/// 5. Sort the remaining query parameters
/// 6. Drop an empty query string
///
/// The scheme is kept as-is: `http://` and `https://` pages are different pages.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use pagesift::url::canonical_key;
///
/// let a = Url::parse("https://Example.com/list/?page=2&sort=asc#top").unwrap();
/// let b = Url::parse("https://example.com/list?sort=asc&page=2").unwrap();
/// assert_eq!(canonical_key(&a), canonical_key(&b));
/// ```
pub fn canonical_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    if let Some(host) = url.host_str() {
        let lower = host.to_lowercase();
        if lower != host {
            // Only fails for cannot-be-a-base URLs, which have no host to begin with
            let _ = url.set_host(Some(&lower));
        }
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        let trimmed = if trimmed.is_empty() { "/" } else { trimmed }.to_string();
        url.set_path(&trimmed);
    }

    if url.query().is_some() {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        params.sort();

        if params.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(params);
        }
    }

    url.to_string()
}

/// Checks if a query parameter is a tracking parameter
fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
