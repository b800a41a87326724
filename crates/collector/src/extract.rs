//! 요청 기록 추출 -- HTTP 요청에서 [`RequestRecord`]를 만듭니다.
//!
//! # IP 우선순위 (비어있지 않은 첫 값)
//! 1. `X-Real-IP`
//! 2. `X-Forwarded-For` (원본 값 그대로)
//! 3. 전송 계층 피어 주소의 IP
//!
//! 타임스탬프는 기록 생성(추출) 시각입니다.

use std::net::SocketAddr;

use http::header::{HOST, HeaderMap, HeaderName, USER_AGENT};
use http::Request;

use webstats_core::types::RequestRecord;

/// `X-Real-IP` 헤더
pub const X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");

/// `X-Forwarded-For` 헤더
pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// 요청에서 기록을 추출합니다.
///
/// `peer`는 연결의 원격 주소입니다. 알 수 없으면 `None`.
pub fn extract<B>(req: &Request<B>, peer: Option<SocketAddr>) -> RequestRecord {
    let headers = req.headers();
    RequestRecord::new(source_ip(headers, peer), user_agent(headers))
}

/// 헤더 우선순위에 따라 출발지 IP를 결정합니다.
///
/// 헤더 값은 ASCII가 아닌 바이트를 포함해도 비어있지 않으면 사용됩니다.
pub fn source_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    header_bytes(headers, &X_REAL_IP)
        .or_else(|| header_bytes(headers, &X_FORWARDED_FOR))
        .map(|v| String::from_utf8_lossy(v).into_owned())
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_default()
}

/// `User-Agent` 원본 값. 없으면 빈 문자열.
pub fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}

/// 허용 목록 검사에 사용할 호스트명을 반환합니다.
///
/// `Host` 헤더를 우선 사용하고, 없으면 URI authority를 사용합니다.
/// 포트(`:8080`)는 제거합니다.
pub fn request_host<B>(req: &Request<B>) -> Option<&str> {
    let raw = header_str(req.headers(), &HOST).or_else(|| req.uri().authority().map(|a| a.as_str()))?;
    let host = strip_port(raw);
    (!host.is_empty()).then_some(host)
}

fn strip_port(host: &str) -> &str {
    // IPv6 리터럴: [::1]:8080
    if host.starts_with('[') {
        return match host.find(']') {
            Some(end) => &host[..=end],
            None => host,
        };
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

fn header_bytes<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a [u8]> {
    headers
        .get(name)
        .map(|v| v.as_bytes().trim_ascii())
        .filter(|v| !v.is_empty())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use http::HeaderValue;

    fn peer() -> Option<SocketAddr> {
        Some("192.0.2.10:54321".parse().unwrap())
    }

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/pixel.css");
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn x_real_ip_wins() {
        let req = request(&[("X-Real-IP", "203.0.113.1"), ("X-Forwarded-For", "198.51.100.2")]);
        assert_eq!(extract(&req, peer()).source_ip, "203.0.113.1");
    }

    #[test]
    fn forwarded_for_used_when_real_ip_missing() {
        let req = request(&[("X-Forwarded-For", "198.51.100.2, 10.0.0.1")]);
        assert_eq!(extract(&req, peer()).source_ip, "198.51.100.2, 10.0.0.1");
    }

    #[test]
    fn empty_headers_fall_through_to_peer() {
        let req = request(&[("X-Real-IP", ""), ("X-Forwarded-For", "  ")]);
        assert_eq!(extract(&req, peer()).source_ip, "192.0.2.10");
    }

    #[test]
    fn no_headers_and_no_peer_gives_empty_ip() {
        let req = request(&[]);
        assert_eq!(extract(&req, None).source_ip, "");
    }

    #[test]
    fn non_ascii_real_ip_still_wins() {
        // Given: X-Real-IP carrying an obs-text byte, plus X-Forwarded-For
        let req = Request::builder()
            .uri("/pixel.css")
            .header("X-Real-IP", HeaderValue::from_bytes(b"203.0.113.1\xff").unwrap())
            .header("X-Forwarded-For", "198.51.100.2")
            .body(())
            .unwrap();

        // When / Then: The non-empty X-Real-IP is used, decoded lossily
        assert_eq!(extract(&req, peer()).source_ip, "203.0.113.1\u{FFFD}");
    }

    #[test]
    fn user_agent_raw_or_empty() {
        let req = request(&[("User-Agent", "Mozilla/5.0 (X11; Linux x86_64)")]);
        assert_eq!(extract(&req, None).user_agent, "Mozilla/5.0 (X11; Linux x86_64)");
        assert_eq!(extract(&request(&[]), None).user_agent, "");
    }

    #[test]
    fn timestamp_is_extraction_time() {
        let before = Utc::now();
        let record = extract(&request(&[]), peer());
        assert!(record.timestamp >= before);
        assert!(record.timestamp <= Utc::now());
    }

    #[test]
    fn host_header_with_port_is_stripped() {
        let req = request(&[("Host", "sub.example.com:8080")]);
        assert_eq!(request_host(&req), Some("sub.example.com"));
    }

    #[test]
    fn host_falls_back_to_uri_authority() {
        let req = Request::builder()
            .uri("http://example.com:81/x.css")
            .body(())
            .unwrap();
        assert_eq!(request_host(&req), Some("example.com"));
    }

    #[test]
    fn ipv6_host_keeps_brackets() {
        let req = request(&[("Host", "[::1]:8080")]);
        assert_eq!(request_host(&req), Some("[::1]"));
    }

    #[test]
    fn missing_host_is_none() {
        assert_eq!(request_host(&request(&[])), None);
    }
}
