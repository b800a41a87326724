//! 수집기 에러 타입
//!
//! [`CollectorError`]는 수집기 크레이트 내부에서 발생하는 에러를 표현합니다.
//! `From<CollectorError> for WebstatsError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use webstats_core::error::{ConfigError, EncodeError, WebstatsError};

/// 수집기 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum CollectorError {
    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 배치 인코딩 실패 (배치 전체가 버려짐)
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// 개별 기록 거부 (컬럼형 인코딩에서 건너뜀)
    #[error("record rejected: {field}: {reason}")]
    RecordRejected {
        /// 문제가 된 필드
        field: &'static str,
        /// 거부 사유
        reason: String,
    },

}

impl From<CollectorError> for WebstatsError {
    fn from(err: CollectorError) -> Self {
        match err {
            CollectorError::Config { field, reason } => {
                WebstatsError::Config(ConfigError::InvalidValue { field, reason })
            }
            CollectorError::Encode(e) => WebstatsError::Encode(e),
            CollectorError::RecordRejected { field, reason } => {
                WebstatsError::Encode(EncodeError::Serialize(format!("{field}: {reason}")))
            }
        }
    }
}
