//! 설정 관리 — webstats.toml 파싱 및 런타임 설정
//!
//! [`WebstatsConfig`]는 프로세스 시작 시 한 번 로드되고 이후 변경되지 않습니다.
//! 런타임 리로드는 지원하지 않습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선, daemon에서 적용)
//! 2. 환경변수 (`WEBSTATS_COLLECTOR_BATCH_SIZE=500` 형식)
//! 3. 설정 파일 (`webstats.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), webstats_core::error::WebstatsError> {
//! use webstats_core::config::WebstatsConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드 + 검증
//! let config = WebstatsConfig::load("webstats.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = WebstatsConfig::parse("[collector]\nbatch_size = 10")?;
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, WebstatsError};

/// 배치 크기 상한
pub const MAX_BATCH_SIZE: usize = 1_000_000;

/// zstd 압축 레벨 허용 범위
pub const COMPRESSION_LEVEL_RANGE: std::ops::RangeInclusive<i32> = 1..=21;

/// 비어있거나 앞뒤 공백이 있는 첫 허용 도메인 항목을 찾습니다.
///
/// 매칭은 정확한 문자열 비교이므로 그런 항목은 어떤 호스트와도 맞지 않습니다.
pub fn find_invalid_domain(domains: &[String]) -> Option<&str> {
    domains
        .iter()
        .map(String::as_str)
        .find(|d| d.trim().is_empty() || d.trim() != *d)
}

/// webstats 통합 설정
///
/// `webstats.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebstatsConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// HTTP 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 수집기(허용 목록, 배치 크기) 설정
    #[serde(default)]
    pub collector: CollectorConfig,
    /// 배치 파일 저장 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl WebstatsConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, WebstatsError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드, 검증 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, WebstatsError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                WebstatsError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                WebstatsError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, WebstatsError> {
        toml::from_str(toml_str).map_err(|e| {
            WebstatsError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `WEBSTATS_{SECTION}_{FIELD}`
    /// 예: `WEBSTATS_STORAGE_FORMAT=columnar`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "WEBSTATS_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "WEBSTATS_GENERAL_LOG_FORMAT");

        // Server
        override_string(&mut self.server.listen_addr, "WEBSTATS_SERVER_LISTEN_ADDR");

        // Collector
        override_csv(
            &mut self.collector.whitelisted_domains,
            "WEBSTATS_COLLECTOR_WHITELISTED_DOMAINS",
        );
        override_parse(&mut self.collector.batch_size, "WEBSTATS_COLLECTOR_BATCH_SIZE");

        // Storage
        override_string(&mut self.storage.log_dir, "WEBSTATS_STORAGE_LOG_DIR");
        override_parse(&mut self.storage.format, "WEBSTATS_STORAGE_FORMAT");
        override_parse(
            &mut self.storage.compression_level,
            "WEBSTATS_STORAGE_COMPRESSION_LEVEL",
        );
        override_parse(
            &mut self.storage.flush_on_shutdown,
            "WEBSTATS_STORAGE_FLUSH_ON_SHUTDOWN",
        );

        // Metrics
        override_parse(&mut self.metrics.enabled, "WEBSTATS_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "WEBSTATS_METRICS_LISTEN_ADDR");
        override_parse(&mut self.metrics.port, "WEBSTATS_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), WebstatsError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        self.server.socket_addr()?;

        // batch_size 0은 "플러시 없음"으로 동작하지만, 설정에서는 조기에 거부
        if self.collector.batch_size == 0 || self.collector.batch_size > MAX_BATCH_SIZE {
            return Err(invalid(
                "collector.batch_size",
                format!("must be 1-{}", MAX_BATCH_SIZE),
            ));
        }

        if let Some(bad) = find_invalid_domain(&self.collector.whitelisted_domains) {
            return Err(invalid(
                "collector.whitelisted_domains",
                format!("domain entry '{}' is empty or has surrounding whitespace", bad),
            ));
        }

        if self.storage.log_dir.trim().is_empty() {
            return Err(invalid("storage.log_dir", "must not be empty".to_owned()));
        }

        if !COMPRESSION_LEVEL_RANGE.contains(&self.storage.compression_level) {
            return Err(invalid(
                "storage.compression_level",
                format!(
                    "must be {}-{}",
                    COMPRESSION_LEVEL_RANGE.start(),
                    COMPRESSION_LEVEL_RANGE.end()
                ),
            ));
        }

        if self.metrics.enabled && self.metrics.endpoint != "/metrics" {
            return Err(invalid(
                "metrics.endpoint",
                "only '/metrics' is supported".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> WebstatsError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// HTTP 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 수신 주소 (`ip:port`)
    pub listen_addr: String,
}

impl ServerConfig {
    /// 수신 주소를 파싱합니다.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.listen_addr
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
                field: "server.listen_addr".to_owned(),
                reason: format!("'{}': {}", self.listen_addr, e),
            })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_owned(),
        }
    }
}

/// 수집기 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// 기록 대상 도메인 (정확히 일치하거나 서브도메인이면 허용)
    pub whitelisted_domains: Vec<String>,
    /// 배치 크기 (이 개수가 모이면 플러시)
    pub batch_size: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            whitelisted_domains: Vec::new(),
            batch_size: 100,
        }
    }
}

/// 배치 파일 인코딩 형식
///
/// 배포 시점에 결정되며 요청마다 바뀌지 않습니다.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchFormat {
    /// 레코드 배열 JSON (한 번에 기록)
    #[default]
    Json,
    /// zstd 압축 컬럼형 컨테이너
    Columnar,
}

impl BatchFormat {
    /// 배치 파일 확장자
    pub fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Columnar => "wscol",
        }
    }
}

impl fmt::Display for BatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => f.write_str("json"),
            Self::Columnar => f.write_str("columnar"),
        }
    }
}

impl FromStr for BatchFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "columnar" => Ok(Self::Columnar),
            other => Err(ConfigError::InvalidValue {
                field: "storage.format".to_owned(),
                reason: format!("unknown format '{}', expected 'json' or 'columnar'", other),
            }),
        }
    }
}

/// 배치 파일 저장 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// 배치 파일 디렉토리 (없으면 생성)
    pub log_dir: String,
    /// 인코딩 형식
    pub format: BatchFormat,
    /// 컬럼형 형식의 zstd 압축 레벨
    pub compression_level: i32,
    /// 종료 시 미완성 배치를 기록할지 여부
    pub flush_on_shutdown: bool,
}

impl StorageConfig {
    /// 로그 디렉토리를 생성하고 쓰기 가능한지 확인합니다.
    ///
    /// 실패는 시작을 중단시키는 [`ConfigError::LogDirUnavailable`]입니다.
    pub fn prepare_log_dir(&self) -> Result<PathBuf, ConfigError> {
        let dir = PathBuf::from(&self.log_dir);
        let unavailable = |e: std::io::Error| ConfigError::LogDirUnavailable {
            path: dir.display().to_string(),
            reason: e.to_string(),
        };

        std::fs::create_dir_all(&dir).map_err(unavailable)?;

        let probe = dir.join(".webstats-write-check");
        std::fs::write(&probe, b"").map_err(unavailable)?;
        let _ = std::fs::remove_file(&probe);

        Ok(dir)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_owned(),
            format: BatchFormat::Json,
            compression_level: 3,
            flush_on_shutdown: true,
        }
    }
}

/// 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// Prometheus 리스너 주소
    pub listen_addr: String,
    /// Prometheus 리스너 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parse<T>(target: &mut T, env_key: &str)
where
    T: FromStr,
{
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = std::any::type_name::<T>(),
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = WebstatsConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
        assert!(config.collector.whitelisted_domains.is_empty());
        assert_eq!(config.collector.batch_size, 100);
        assert_eq!(config.storage.format, BatchFormat::Json);
        assert!(config.storage.flush_on_shutdown);
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        WebstatsConfig::default().validate().unwrap();
    }

    #[test]
    fn from_str_empty_toml_uses_defaults() {
        let config = WebstatsConfig::parse("").unwrap();
        assert_eq!(config.storage.log_dir, "logs");
        assert_eq!(config.collector.batch_size, 100);
    }

    #[test]
    fn from_str_full_toml() {
        let toml = r#"
[general]
log_level = "debug"
log_format = "pretty"

[server]
listen_addr = "127.0.0.1:9000"

[collector]
whitelisted_domains = ["example.com", "example.org"]
batch_size = 2

[storage]
log_dir = "/var/lib/webstats"
format = "columnar"
compression_level = 9
flush_on_shutdown = false

[metrics]
enabled = true
port = 9200
"#;
        let config = WebstatsConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.server.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.collector.whitelisted_domains.len(), 2);
        assert_eq!(config.collector.batch_size, 2);
        assert_eq!(config.storage.format, BatchFormat::Columnar);
        assert_eq!(config.storage.compression_level, 9);
        assert!(!config.storage.flush_on_shutdown);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.port, 9200);
        // 지정하지 않은 필드는 기본값 유지
        assert_eq!(config.metrics.endpoint, "/metrics");
        config.validate().unwrap();
    }

    #[test]
    fn from_str_unknown_format_fails_to_parse() {
        let result = WebstatsConfig::parse("[storage]\nformat = \"parquet\"");
        assert!(matches!(
            result.unwrap_err(),
            WebstatsError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn from_str_invalid_toml_returns_error() {
        let err = WebstatsConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            WebstatsError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_zero_batch_size() {
        let mut config = WebstatsConfig::default();
        config.collector.batch_size = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("batch_size"));
    }

    #[test]
    fn validate_rejects_huge_batch_size() {
        let mut config = WebstatsConfig::default();
        config.collector.batch_size = MAX_BATCH_SIZE + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = WebstatsConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_bad_listen_addr() {
        let mut config = WebstatsConfig::default();
        config.server.listen_addr = ":8080".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("listen_addr"));
    }

    #[test]
    fn validate_rejects_blank_domain() {
        let mut config = WebstatsConfig::default();
        config.collector.whitelisted_domains = vec!["example.com".to_owned(), " ".to_owned()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("whitelisted_domains"));
    }

    #[test]
    fn validate_rejects_compression_level_out_of_range() {
        let mut config = WebstatsConfig::default();
        config.storage.compression_level = 0;
        assert!(config.validate().is_err());
        config.storage.compression_level = 22;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_custom_metrics_endpoint_when_enabled() {
        let mut config = WebstatsConfig::default();
        config.metrics.enabled = true;
        config.metrics.endpoint = "/stats".to_owned();
        assert!(config.validate().is_err());

        config.metrics.enabled = false;
        config.validate().unwrap();
    }

    #[test]
    fn batch_format_from_str_and_extension() {
        assert_eq!("json".parse::<BatchFormat>().unwrap(), BatchFormat::Json);
        assert_eq!(
            "columnar".parse::<BatchFormat>().unwrap(),
            BatchFormat::Columnar
        );
        assert!("csv".parse::<BatchFormat>().is_err());
        assert_eq!(BatchFormat::Json.extension(), "json");
        assert_eq!(BatchFormat::Columnar.extension(), "wscol");
    }

    #[test]
    fn prepare_log_dir_creates_nested_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        let storage = StorageConfig {
            log_dir: nested.display().to_string(),
            ..Default::default()
        };
        let dir = storage.prepare_log_dir().unwrap();
        assert!(dir.is_dir());
        // 쓰기 확인용 파일은 남지 않음
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[test]
    fn prepare_log_dir_fails_when_path_is_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();
        let storage = StorageConfig {
            log_dir: file.display().to_string(),
            ..Default::default()
        };
        assert!(matches!(
            storage.prepare_log_dir().unwrap_err(),
            ConfigError::LogDirUnavailable { .. }
        ));
    }

    #[test]
    #[serial]
    fn env_override_batch_size_and_domains() {
        let mut config = WebstatsConfig::default();
        // SAFETY: serial 테스트로 환경변수 동시 접근이 없습니다.
        unsafe {
            std::env::set_var("WEBSTATS_COLLECTOR_BATCH_SIZE", "7");
            std::env::set_var("WEBSTATS_COLLECTOR_WHITELISTED_DOMAINS", "a.com, b.org,");
        }
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("WEBSTATS_COLLECTOR_BATCH_SIZE");
            std::env::remove_var("WEBSTATS_COLLECTOR_WHITELISTED_DOMAINS");
        }
        assert_eq!(config.collector.batch_size, 7);
        assert_eq!(config.collector.whitelisted_domains, vec!["a.com", "b.org"]);
    }

    #[test]
    #[serial]
    fn env_override_invalid_value_keeps_original() {
        let mut config = WebstatsConfig::default();
        // SAFETY: serial 테스트로 환경변수 동시 접근이 없습니다.
        unsafe { std::env::set_var("WEBSTATS_STORAGE_FORMAT", "xml") };
        config.apply_env_overrides();
        unsafe { std::env::remove_var("WEBSTATS_STORAGE_FORMAT") };
        assert_eq!(config.storage.format, BatchFormat::Json);
    }

    #[test]
    fn env_override_missing_var_keeps_original() {
        let mut val = "original".to_owned();
        override_string(&mut val, "TEST_WEBSTATS_NONEXISTENT_12345");
        assert_eq!(val, "original");
    }

    #[test]
    fn config_serialize_roundtrip() {
        let mut config = WebstatsConfig::default();
        config.collector.whitelisted_domains = vec!["example.com".to_owned()];
        config.storage.format = BatchFormat::Columnar;
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed = WebstatsConfig::parse(&toml_str).unwrap();
        assert_eq!(parsed.collector.whitelisted_domains, vec!["example.com"]);
        assert_eq!(parsed.storage.format, BatchFormat::Columnar);
    }

    #[tokio::test]
    async fn from_file_not_found() {
        let err = WebstatsConfig::from_file("/nonexistent/path/webstats.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WebstatsError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
