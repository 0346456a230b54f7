/**
 * Endpoint resolution.
 *
 * A client is configured with a single endpoint string and an optional
 * token. Two shapes are understood:
 *
 * 1. Direct submission URLs of the collection service, e.g.
 *    `https://submit.backtrace.io/{universe}/{64-char token}/json`.
 *    The universe and (unless passed explicitly) the token are parsed from
 *    the path.
 * 2. Any other URL, e.g. `https://{universe}.sp.backtrace.io:6098`. The
 *    universe is the first label of the hostname; the token is the explicit
 *    one or, failing that, the URL's `token` query parameter.
 *
 * From the resolved `{universe, token}` pair the metrics endpoints are
 * derived; the submission URL is derived from the raw endpoint.
 */
use url::Url;

use crate::error::ConfigError;
use crate::protocol::constants::{SUBMIT_HOST, TOKEN_LENGTH, UNIVERSE_MARKER};

// ---------------------------------------------------------------------------
// EndpointParams
// ---------------------------------------------------------------------------

/// Tenant coordinates parsed from an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointParams {
    pub universe: String,
    pub token: Option<String>,
}

/**
 * Parses `endpoint` (and an optional explicit `token`) into
 * `{universe, token}`. Pure function; returns `None` when the endpoint
 * cannot be resolved.
 *
 * For direct submission URLs without an explicit token, the path segment
 * after the universe must be exactly 64 characters long.
 */
pub fn resolve_endpoint(endpoint: &str, token: Option<&str>) -> Option<EndpointParams> {
    if endpoint.is_empty() {
        return None;
    }

    if endpoint.contains(SUBMIT_HOST) {
        let start = endpoint.find(UNIVERSE_MARKER)? + UNIVERSE_MARKER.len();
        let universe_end = start + endpoint[start..].find('/')?;
        let universe = endpoint[start..universe_end].to_string();

        let token = match token {
            Some(token) => token.to_string(),
            None => {
                /*
                 * The token sits between the universe and the last path
                 * separator: `.../{universe}/{token}/json`.
                 */
                let last_separator = endpoint.rfind('/')?;
                if last_separator == universe_end {
                    return None;
                }
                let parsed = &endpoint[universe_end + 1..last_separator];
                if parsed.len() != TOKEN_LENGTH {
                    return None;
                }
                parsed.to_string()
            }
        };

        return Some(EndpointParams {
            universe,
            token: Some(token),
        });
    }

    let url = Url::parse(endpoint).ok()?;
    let host = url.host_str()?;
    let (universe, _) = host.split_once('.')?;

    let token = token.map(str::to_string).or_else(|| {
        url.query_pairs()
            .find(|(key, _)| key == "token")
            .map(|(_, value)| value.into_owned())
    });

    Some(EndpointParams {
        universe: universe.to_string(),
        token,
    })
}

/**
 * Builds the URL reports are POSTed to.
 *
 * Endpoints that already name the submission host or carry a `token=`
 * query parameter are used verbatim. Anything else needs a token and gets
 * `post?format=json&token=<token>` appended.
 */
pub fn submission_url(endpoint: &str, token: Option<&str>) -> Result<String, ConfigError> {
    if endpoint.is_empty() {
        return Err(ConfigError::MissingEndpoint);
    }

    if endpoint.contains(SUBMIT_HOST) || endpoint.contains("token=") {
        return Ok(endpoint.to_string());
    }

    let token = token
        .filter(|t| !t.is_empty())
        .ok_or(ConfigError::MissingToken)?;
    let separator = if endpoint.ends_with('/') { "" } else { "/" };
    Ok(format!("{endpoint}{separator}post?format=json&token={token}"))
}

// ---------------------------------------------------------------------------
// MetricsEndpoints
// ---------------------------------------------------------------------------

/// The pair of URLs metrics events are POSTed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsEndpoints {
    pub unique: String,
    pub summed: String,
}

impl MetricsEndpoints {
    pub fn new(host: &str, universe: &str, token: &str) -> Self {
        let host = host.trim_end_matches('/');
        Self {
            unique: format!(
                "{host}/api/unique-events/submit?universe={universe}&token={token}"
            ),
            summed: format!(
                "{host}/api/summed-events/submit?universe={universe}&token={token}"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_resolve_submission_url_parses_universe_and_token() {
        let endpoint = format!("https://submit.backtrace.io/acme/{TOKEN}/json");
        let params = resolve_endpoint(&endpoint, None).expect("should resolve");
        assert_eq!(params.universe, "acme");
        assert_eq!(params.token.as_deref(), Some(TOKEN));
    }

    /**
     * An explicit token wins and skips the path-length check.
     */
    #[test]
    fn test_resolve_submission_url_prefers_explicit_token() {
        let endpoint = "https://submit.backtrace.io/acme/short/json";
        let params = resolve_endpoint(endpoint, Some("explicit")).expect("should resolve");
        assert_eq!(params.universe, "acme");
        assert_eq!(params.token.as_deref(), Some("explicit"));
    }

    #[test]
    fn test_resolve_submission_url_missing_token_segment_fails() {
        assert!(resolve_endpoint("https://submit.backtrace.io/acme/", None).is_none());
        assert!(resolve_endpoint("https://submit.backtrace.io/acme", None).is_none());
    }

    #[test]
    fn test_resolve_submission_url_wrong_token_length_fails() {
        let endpoint = "https://submit.backtrace.io/acme/deadbeef/json";
        assert!(resolve_endpoint(endpoint, None).is_none());
    }

    #[test]
    fn test_resolve_generic_host_uses_first_label() {
        let params =
            resolve_endpoint("https://foo.example.com", Some("tok")).expect("should resolve");
        assert_eq!(params.universe, "foo");
        assert_eq!(params.token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_resolve_generic_host_without_token() {
        let params = resolve_endpoint("https://foo.example.com:6098/", None).expect("should resolve");
        assert_eq!(params.universe, "foo");
        assert!(params.token.is_none());
    }

    #[test]
    fn test_resolve_generic_host_reads_token_query() {
        let params = resolve_endpoint(
            "https://foo.sp.backtrace.io:6098/post?format=json&token=abc",
            None,
        )
        .expect("should resolve");
        assert_eq!(params.universe, "foo");
        assert_eq!(params.token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_resolve_rejects_dotless_host_and_garbage() {
        assert!(resolve_endpoint("http://localhost:8080", Some("t")).is_none());
        assert!(resolve_endpoint("not a url", Some("t")).is_none());
        assert!(resolve_endpoint("", Some("t")).is_none());
    }

    #[test]
    fn test_submission_url_verbatim_forms() {
        let direct = format!("https://submit.backtrace.io/acme/{TOKEN}/json");
        assert_eq!(submission_url(&direct, None).unwrap(), direct);

        let with_token = "https://acme.sp.backtrace.io:6098/post?format=json&token=abc";
        assert_eq!(submission_url(with_token, None).unwrap(), with_token);
    }

    #[test]
    fn test_submission_url_appends_post_path() {
        assert_eq!(
            submission_url("https://acme.sp.backtrace.io:6098", Some("abc")).unwrap(),
            "https://acme.sp.backtrace.io:6098/post?format=json&token=abc"
        );
        assert_eq!(
            submission_url("https://acme.sp.backtrace.io:6098/", Some("abc")).unwrap(),
            "https://acme.sp.backtrace.io:6098/post?format=json&token=abc"
        );
    }

    #[test]
    fn test_submission_url_requires_token() {
        assert!(matches!(
            submission_url("https://acme.sp.backtrace.io:6098", None),
            Err(ConfigError::MissingToken)
        ));
        assert!(matches!(
            submission_url("", Some("abc")),
            Err(ConfigError::MissingEndpoint)
        ));
    }

    #[test]
    fn test_metrics_endpoints() {
        let endpoints = MetricsEndpoints::new("https://events.backtrace.io/", "acme", "tok");
        assert_eq!(
            endpoints.unique,
            "https://events.backtrace.io/api/unique-events/submit?universe=acme&token=tok"
        );
        assert_eq!(
            endpoints.summed,
            "https://events.backtrace.io/api/summed-events/submit?universe=acme&token=tok"
        );
    }
}
