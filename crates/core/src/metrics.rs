//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 레코더가 설치되지 않은 경우 `metrics` 매크로 호출은 아무 일도 하지 않습니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `webstats_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)

// ─── 레이블 ────────────────────────────────────────────────────────

/// 결과 레이블 키
pub const LABEL_RESULT: &str = "result";

/// 허용 목록 통과 요청
pub const RESULT_ACCEPTED: &str = "accepted";

/// 허용 목록 거부 요청
pub const RESULT_REJECTED: &str = "rejected";

/// 배치 형식 레이블 키 (json, columnar)
pub const LABEL_FORMAT: &str = "format";

// ─── 메트릭 이름 ────────────────────────────────────────────────────

/// 처리한 HTTP 요청 수 (counter, label: result)
pub const REQUESTS_TOTAL: &str = "webstats_requests_total";

/// 누산기에 추가된 기록 수 (counter)
pub const RECORDS_APPENDED_TOTAL: &str = "webstats_records_appended_total";

/// 파일로 기록된 배치 수 (counter, label: format)
pub const BATCHES_FLUSHED_TOTAL: &str = "webstats_batches_flushed_total";

/// 실패한 플러시 수 (counter, label: format)
pub const FLUSH_FAILURES_TOTAL: &str = "webstats_flush_failures_total";

/// 인코딩 중 건너뛴 기록 수 (counter)
pub const RECORDS_SKIPPED_TOTAL: &str = "webstats_records_skipped_total";

/// 종료 시 버려진 미완성 배치의 기록 수 (counter)
pub const RECORDS_DISCARDED_TOTAL: &str = "webstats_records_discarded_total";

/// 배치 하나를 인코딩하는 데 걸린 시간 (histogram, 초)
pub const FLUSH_DURATION_SECONDS: &str = "webstats_flush_duration_seconds";

/// 현재 열린 배치의 기록 수 (gauge)
pub const OPEN_BATCH_SIZE: &str = "webstats_open_batch_size";

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "webstats_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "webstats_daemon_build_info";

/// 플러시 지연 시간 히스토그램 버킷 (초)
pub const FLUSH_DURATION_BUCKETS: [f64; 9] = [0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(
        REQUESTS_TOTAL,
        "Total number of pixel requests, by allowlist result"
    );
    describe_counter!(
        RECORDS_APPENDED_TOTAL,
        "Total number of request records appended to the open batch"
    );
    describe_counter!(
        BATCHES_FLUSHED_TOTAL,
        "Total number of batches written to disk"
    );
    describe_counter!(
        FLUSH_FAILURES_TOTAL,
        "Total number of batches dropped because encoding failed"
    );
    describe_counter!(
        RECORDS_SKIPPED_TOTAL,
        "Total number of records skipped by the columnar encoder"
    );
    describe_counter!(
        RECORDS_DISCARDED_TOTAL,
        "Total number of buffered records discarded at shutdown"
    );
    describe_histogram!(
        FLUSH_DURATION_SECONDS,
        "Time to encode and write a single batch in seconds"
    );
    describe_gauge!(
        OPEN_BATCH_SIZE,
        "Number of records in the currently open batch"
    );
    describe_gauge!(DAEMON_UPTIME_SECONDS, "webstats daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
