#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`allowlist`]: 호스트 허용 목록 (정확히 일치 또는 서브도메인)
//! - [`extract`]: HTTP 요청에서 기록 추출 (IP 헤더 우선순위, User-Agent, Host)
//! - [`accumulator`]: 동시성 안전한 배치 누산기
//! - [`encoder`]: 배치 인코더 trait과 JSON / 컬럼형 구현
//! - [`collector`]: 요청 관찰과 플러시를 묶는 서비스
//! - [`config`]: 수집기 설정 (core 설정에서 파생)
//! - [`error`]: 도메인 에러 타입

pub mod accumulator;
pub mod allowlist;
pub mod collector;
pub mod config;
pub mod encoder;
pub mod error;
pub mod extract;

// --- 주요 타입 re-export ---

// 서비스
pub use collector::{Collector, CollectorBuilder, Observation, ShutdownReport};

// 설정
pub use config::{CollectorSettings, CollectorSettingsBuilder};

// 에러
pub use error::CollectorError;

// 구성 요소
pub use accumulator::BatchAccumulator;
pub use allowlist::Allowlist;
pub use encoder::{
    BatchEncoder, ColumnarBatchEncoder, EncodeOutcome, JsonBatchEncoder, encoder_for,
    read_columnar_batch, read_json_batch,
};
