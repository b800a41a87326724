//! 설정 로딩 통합 테스트 — 파일 + 환경변수 + 검증 전체 흐름

use std::io::Write;

use serial_test::serial;
use webstats_core::config::{BatchFormat, WebstatsConfig};
use webstats_core::error::{ConfigError, WebstatsError};

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
    file.write_all(content.as_bytes())
        .expect("should write config");
    file
}

#[tokio::test]
#[serial]
async fn load_reads_file_and_validates() {
    let file = write_config(
        r#"
[collector]
whitelisted_domains = ["example.com"]
batch_size = 2

[storage]
log_dir = "stats"
format = "columnar"
"#,
    );

    let config = WebstatsConfig::load(file.path())
        .await
        .expect("config should load");

    assert_eq!(config.collector.whitelisted_domains, vec!["example.com"]);
    assert_eq!(config.collector.batch_size, 2);
    assert_eq!(config.storage.log_dir, "stats");
    assert_eq!(config.storage.format, BatchFormat::Columnar);
}

#[tokio::test]
#[serial]
async fn load_rejects_zero_batch_size() {
    let file = write_config("[collector]\nbatch_size = 0\n");

    let err = WebstatsConfig::load(file.path()).await.unwrap_err();

    assert!(matches!(
        err,
        WebstatsError::Config(ConfigError::InvalidValue { .. })
    ));
}

#[tokio::test]
#[serial]
async fn env_overrides_take_precedence_over_file() {
    let file = write_config("[collector]\nbatch_size = 50\n\n[server]\nlisten_addr = \"127.0.0.1:1\"\n");

    // SAFETY: serial 테스트로 환경변수 동시 접근이 없습니다.
    unsafe {
        std::env::set_var("WEBSTATS_COLLECTOR_BATCH_SIZE", "3");
        std::env::set_var("WEBSTATS_SERVER_LISTEN_ADDR", "127.0.0.1:18080");
    }
    let result = WebstatsConfig::load(file.path()).await;
    unsafe {
        std::env::remove_var("WEBSTATS_COLLECTOR_BATCH_SIZE");
        std::env::remove_var("WEBSTATS_SERVER_LISTEN_ADDR");
    }

    let config = result.expect("config should load");
    assert_eq!(config.collector.batch_size, 3);
    assert_eq!(config.server.listen_addr, "127.0.0.1:18080");
}

#[tokio::test]
#[serial]
async fn env_override_that_breaks_validation_is_reported() {
    let file = write_config("");

    // SAFETY: serial 테스트로 환경변수 동시 접근이 없습니다.
    unsafe { std::env::set_var("WEBSTATS_GENERAL_LOG_LEVEL", "chatty") };
    let result = WebstatsConfig::load(file.path()).await;
    unsafe { std::env::remove_var("WEBSTATS_GENERAL_LOG_LEVEL") };

    let err = result.unwrap_err();
    assert!(err.to_string().contains("general.log_level"));
}

#[tokio::test]
async fn load_missing_file_is_file_not_found() {
    let err = WebstatsConfig::load("/nonexistent/webstats.toml")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        WebstatsError::Config(ConfigError::FileNotFound { .. })
    ));
}
