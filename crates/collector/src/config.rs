//! 수집기 설정
//!
//! [`CollectorSettings`]는 core의 [`WebstatsConfig`]에서
//! 수집기에 필요한 값(허용 목록, 배치 크기, 저장 형식)만 모은 것입니다.
//!
//! # 사용 예시
//! ```ignore
//! use webstats_core::config::WebstatsConfig;
//! use webstats_collector::config::CollectorSettings;
//!
//! let core_config = WebstatsConfig::default();
//! let settings = CollectorSettings::from_core(&core_config);
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use webstats_core::config::{
    BatchFormat, COMPRESSION_LEVEL_RANGE, MAX_BATCH_SIZE, WebstatsConfig, find_invalid_domain,
};

use crate::error::CollectorError;

/// 수집기 설정
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorSettings {
    /// 기록 대상 도메인
    pub whitelisted_domains: Vec<String>,
    /// 배치 크기 `N`
    pub batch_size: usize,
    /// 배치 파일 디렉토리
    pub log_dir: PathBuf,
    /// 인코딩 형식
    pub format: BatchFormat,
    /// zstd 압축 레벨 (columnar)
    pub compression_level: i32,
    /// 종료 시 미완성 배치 기록 여부
    pub flush_on_shutdown: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            whitelisted_domains: Vec::new(),
            batch_size: 100,
            log_dir: PathBuf::from("logs"),
            format: BatchFormat::Json,
            compression_level: 3,
            flush_on_shutdown: true,
        }
    }
}

impl CollectorSettings {
    /// core 설정에서 수집기 설정을 생성합니다.
    pub fn from_core(core: &WebstatsConfig) -> Self {
        Self {
            whitelisted_domains: core.collector.whitelisted_domains.clone(),
            batch_size: core.collector.batch_size,
            log_dir: PathBuf::from(&core.storage.log_dir),
            format: core.storage.format,
            compression_level: core.storage.compression_level,
            flush_on_shutdown: core.storage.flush_on_shutdown,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), CollectorError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(CollectorError::Config {
                field: "batch_size".to_owned(),
                reason: format!("must be 1-{}", MAX_BATCH_SIZE),
            });
        }

        if self.log_dir.as_os_str().is_empty() {
            return Err(CollectorError::Config {
                field: "log_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if !COMPRESSION_LEVEL_RANGE.contains(&self.compression_level) {
            return Err(CollectorError::Config {
                field: "compression_level".to_owned(),
                reason: format!(
                    "must be {}-{}",
                    COMPRESSION_LEVEL_RANGE.start(),
                    COMPRESSION_LEVEL_RANGE.end()
                ),
            });
        }

        if let Some(bad) = find_invalid_domain(&self.whitelisted_domains) {
            return Err(CollectorError::Config {
                field: "whitelisted_domains".to_owned(),
                reason: format!("domain entry '{}' is empty or has surrounding whitespace", bad),
            });
        }

        Ok(())
    }
}

/// 수집기 설정 빌더
#[derive(Debug, Default)]
pub struct CollectorSettingsBuilder {
    settings: CollectorSettings,
}

impl CollectorSettingsBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 허용 도메인을 설정합니다.
    pub fn whitelisted_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.settings.whitelisted_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// 배치 크기를 설정합니다.
    pub fn batch_size(mut self, size: usize) -> Self {
        self.settings.batch_size = size;
        self
    }

    /// 로그 디렉토리를 설정합니다.
    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.log_dir = dir.into();
        self
    }

    /// 인코딩 형식을 설정합니다.
    pub fn format(mut self, format: BatchFormat) -> Self {
        self.settings.format = format;
        self
    }

    /// 압축 레벨을 설정합니다.
    pub fn compression_level(mut self, level: i32) -> Self {
        self.settings.compression_level = level;
        self
    }

    /// 종료 시 플러시 여부를 설정합니다.
    pub fn flush_on_shutdown(mut self, enabled: bool) -> Self {
        self.settings.flush_on_shutdown = enabled;
        self
    }

    /// 설정을 검증하고 `CollectorSettings`를 생성합니다.
    pub fn build(self) -> Result<CollectorSettings, CollectorError> {
        self.settings.validate()?;
        Ok(self.settings)
    }
}
