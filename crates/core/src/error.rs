//! 에러 타입 — 도메인별 에러 정의
//!
//! - [`ConfigError`]: 시작 시점에 치명적 (프로세스 종료)
//! - [`EncodeError`]: 비치명적 — 로그를 남기고 해당 배치를 버림
//!
//! 어떤 에러도 HTTP 클라이언트에게 노출되지 않습니다.

/// webstats 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum WebstatsError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 배치 인코딩 에러
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// 로그 디렉토리 생성/쓰기 불가
    #[error("log directory unavailable: {path}: {reason}")]
    LogDirUnavailable { path: String, reason: String },
}

/// 배치 인코딩 에러
///
/// 두 인코더(JSON, 컬럼형) 모두 이 타입으로 실패를 보고합니다.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// 파일 생성/쓰기 실패
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 직렬화 실패
    #[error("serialize failed: {0}")]
    Serialize(String),

    /// 압축 실패
    #[error("compression failed: {0}")]
    Compress(String),

    /// 파일 마무리(finalize) 실패 — 파일 전체가 무효
    #[error("finalize failed for {path}: {reason}")]
    Finalize { path: String, reason: String },

    /// 배치 파일 손상 (디코딩 시)
    #[error("corrupted batch file: {0}")]
    Corrupted(String),
}
