//! 도메인 타입 — 요청 기록과 배치

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 허용된 호스트로 들어온 요청 한 건의 메타데이터
///
/// 요청당 한 번 생성되고 이후 변경되지 않습니다.
/// 소유권은 누산기(accumulator)의 열린 배치로 이동합니다.
///
/// 직렬화 필드명(`time`, `ip`, `user_agent`)은 배치 파일 형식의 일부입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    /// 기록 생성 시각
    #[serde(rename = "time")]
    pub timestamp: DateTime<Utc>,
    /// 요청 출발지 IP (헤더 우선순위 적용 후)
    #[serde(rename = "ip")]
    pub source_ip: String,
    /// `User-Agent` 헤더 원본 값 (없으면 빈 문자열)
    pub user_agent: String,
}

impl RequestRecord {
    /// 현재 시각으로 새 기록을 생성합니다.
    pub fn new(source_ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self::with_timestamp(Utc::now(), source_ip, user_agent)
    }

    /// 지정한 시각으로 기록을 생성합니다.
    pub fn with_timestamp(
        timestamp: DateTime<Utc>,
        source_ip: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            source_ip: source_ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// 완성되어 누산기에서 분리된 기록 묶음
///
/// 인코더에 넘겨진 뒤에는 변경할 수 없도록 읽기 전용 API만 제공합니다.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    records: Vec<RequestRecord>,
}

impl Batch {
    /// 기록 목록으로 배치를 생성합니다.
    pub fn from_records(records: Vec<RequestRecord>) -> Self {
        Self { records }
    }

    /// 기록 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 기록 슬라이스를 반환합니다 (추가 순서 유지).
    pub fn records(&self) -> &[RequestRecord] {
        &self.records
    }

    /// 기록을 순회합니다.
    pub fn iter(&self) -> std::slice::Iter<'_, RequestRecord> {
        self.records.iter()
    }

    /// 배치를 해체하여 기록 목록을 돌려받습니다.
    pub fn into_records(self) -> Vec<RequestRecord> {
        self.records
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a RequestRecord;
    type IntoIter = std::slice::Iter<'a, RequestRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
