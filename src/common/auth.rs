//! 凭据提取
//!
//! 网关本身不校验密钥：调用方携带的 Bearer token 即为 Gemini API Key，
//! 原样转交给上游。

use http::{HeaderMap, header};

/// 调用方的 Gemini API Key（请求扩展）
#[derive(Clone)]
pub struct ApiKey(pub String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// 从请求头中提取 API Key
///
/// 支持：
/// - `Authorization: Bearer <key>`
/// - `x-goog-api-key: <key>`
pub fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| {
            s.strip_prefix("Bearer ")
                .or_else(|| s.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|key| !key.is_empty());

    bearer
        .or_else(|| {
            headers
                .get("x-goog-api-key")
                .and_then(|h| h.to_str().ok())
                .map(str::trim)
                .filter(|key| !key.is_empty())
        })
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn test_extract_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer AIza-test"),
        );
        assert_eq!(extract_api_key(&headers).as_deref(), Some("AIza-test"));
    }

    #[test]
    fn test_extract_goog_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_static("AIza-other"));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("AIza-other"));
    }

    #[test]
    fn test_missing_or_empty_key() {
        assert_eq!(extract_api_key(&HeaderMap::new()), None);

        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_api_key(&headers), None);

        // 非 Bearer 方案不接受
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(extract_api_key(&headers), None);
    }

    #[test]
    fn test_empty_bearer_falls_back_to_goog_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        headers.insert("x-goog-api-key", HeaderValue::from_static("AIza-real"));
        assert_eq!(extract_api_key(&headers).as_deref(), Some("AIza-real"));
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = ApiKey("AIza-secret".to_string());
        assert_eq!(format!("{:?}", key), "ApiKey(***)");
    }
}
