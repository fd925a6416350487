use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::OnceLock;

// Swagger UI is served from the same origin and needs inline scripts/styles.
const DEFAULT_API_CSP: &str = "default-src 'self'; base-uri 'self'; frame-ancestors 'none'; object-src 'none'; script-src 'self' 'unsafe-inline'; style-src 'self' 'unsafe-inline'; img-src 'self' data: https:; connect-src 'self'";
// Uploaded photos never execute anything.
const UPLOAD_CSP: &str = "default-src 'none'; img-src 'self'; sandbox";
const HSTS_VALUE: &str = "max-age=31536000; includeSubDomains";
const UPLOAD_CACHE: &str = "public, max-age=604800, immutable";

#[derive(Debug, Clone)]
struct SecurityHeaders {
    api_csp: HeaderValue,
    enable_hsts: bool,
}

impl SecurityHeaders {
    fn from_env() -> Self {
        let api_csp = match std::env::var("CSP_POLICY") {
            Ok(raw) => HeaderValue::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!("Invalid CSP_POLICY ({}), using the default", err);
                HeaderValue::from_static(DEFAULT_API_CSP)
            }),
            Err(_) => HeaderValue::from_static(DEFAULT_API_CSP),
        };
        Self {
            api_csp,
            enable_hsts: crate::config::env_flag("ENABLE_HSTS", true),
        }
    }
}

fn security_headers() -> &'static SecurityHeaders {
    static CONFIG: OnceLock<SecurityHeaders> = OnceLock::new();
    CONFIG.get_or_init(SecurityHeaders::from_env)
}

/// Locally stored issue photos, served by `ServeDir`.
fn is_upload_path(path: &str) -> bool {
    path == "/uploads" || path.starts_with("/uploads/")
}

fn apply_common(headers: &mut HeaderMap, enable_hsts: bool) {
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    if enable_hsts {
        headers.insert(
            header::STRICT_TRANSPORT_SECURITY,
            HeaderValue::from_static(HSTS_VALUE),
        );
    }
}

fn apply_upload(headers: &mut HeaderMap) {
    headers.insert(
        header::CONTENT_SECURITY_POLICY,
        HeaderValue::from_static(UPLOAD_CSP),
    );
    // Photos are embedded by the separately hosted frontend.
    headers.insert(
        "cross-origin-resource-policy",
        HeaderValue::from_static("cross-origin"),
    );
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static(UPLOAD_CACHE));
    }
}

fn apply_api(headers: &mut HeaderMap, csp: &HeaderValue) {
    headers.insert(header::CONTENT_SECURITY_POLICY, csp.clone());
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    // The report form asks for location and camera access.
    headers.insert(
        "permissions-policy",
        HeaderValue::from_static("geolocation=(self), microphone=(), camera=(self)"),
    );
    headers.insert(
        "cross-origin-resource-policy",
        HeaderValue::from_static("same-site"),
    );
    if !headers.contains_key(header::CACHE_CONTROL) {
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let config = security_headers();
    let upload = is_upload_path(request.uri().path());
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    apply_common(headers, config.enable_hsts);
    if upload {
        apply_upload(headers);
    } else {
        apply_api(headers, &config.api_csp);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_paths() {
        assert!(is_upload_path("/uploads/issues/ab12.png"));
        assert!(is_upload_path("/uploads"));
        assert!(!is_upload_path("/uploadsx"));
        assert!(!is_upload_path("/api/v1/issues"));
    }

    #[test]
    fn api_responses_are_not_cached() {
        let mut headers = HeaderMap::new();
        apply_api(&mut headers, &HeaderValue::from_static(DEFAULT_API_CSP));
        assert_eq!(headers[header::CACHE_CONTROL], "no-store");
        assert_eq!(headers[header::X_FRAME_OPTIONS], "DENY");
    }

    #[test]
    fn uploads_keep_existing_cache_control() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("max-age=60"));
        apply_upload(&mut headers);
        assert_eq!(headers[header::CACHE_CONTROL], "max-age=60");
        assert_eq!(headers["cross-origin-resource-policy"], "cross-origin");
    }
}
