//! 호스트 허용 목록
//!
//! 호스트가 설정된 도메인과 정확히 같거나, `"." + domain`으로 끝나면 허용합니다.
//! 와일드카드/정규식은 지원하지 않으며 대소문자를 구분합니다.

/// 설정된 도메인 목록에 대한 호스트 매처
#[derive(Debug, Clone, Default)]
pub struct Allowlist {
    /// 정확 일치용 도메인
    domains: Vec<String>,
    /// 서브도메인 접미사 (`.example.com`), 요청마다 할당하지 않도록 미리 계산
    suffixes: Vec<String>,
}

impl Allowlist {
    /// 도메인 목록으로 허용 목록을 생성합니다.
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let domains: Vec<String> = domains.into_iter().map(Into::into).collect();
        let suffixes = domains.iter().map(|d| format!(".{d}")).collect();
        Self { domains, suffixes }
    }

    /// 호스트가 허용 대상인지 확인합니다.
    pub fn is_whitelisted(&self, host: &str) -> bool {
        self.domains
            .iter()
            .zip(&self.suffixes)
            .any(|(domain, suffix)| host == domain || host.ends_with(suffix.as_str()))
    }

    /// 설정된 도메인 목록
    pub fn domains(&self) -> &[String] {
        &self.domains
    }

    /// 도메인이 하나도 없는지 확인합니다 (모든 요청이 거부됨).
    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }
}
