//! 수집기 서비스 -- 허용 목록 검사, 기록 누산, 배치 플러시를 묶습니다.
//!
//! [`Collector`]는 시작 시 한 번 생성되어 `Arc`로 모든 요청 처리 태스크에
//! 공유됩니다. 요청 경로에서 잡는 잠금은 누산기의 짧은 임계 구간뿐이고,
//! 완성된 배치의 인코딩은 tokio의 blocking 풀에서 실행됩니다.
//!
//! # 흐름
//! ```text
//! observe(host) -> Allowlist -> extract -> BatchAccumulator::append
//!                                               |
//!                                     Some(batch) (정확히 N개)
//!                                               v
//!                              flush: spawn_blocking(BatchEncoder::encode)
//! ```
//!
//! 플러시 실패는 재시도하지 않습니다. 에러를 로그로 남기고 배치를 버립니다.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use webstats_core::error::EncodeError;
use webstats_core::metrics as m;
use webstats_core::types::{Batch, RequestRecord};

use crate::accumulator::BatchAccumulator;
use crate::allowlist::Allowlist;
use crate::config::CollectorSettings;
use crate::encoder::{BatchEncoder, EncodeOutcome, encoder_for};
use crate::error::CollectorError;

/// 요청 하나를 관찰한 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// 허용 목록에 없는 호스트 -- 기록하지 않음
    Rejected,
    /// 열린 배치에 추가됨
    Buffered,
    /// 추가로 배치가 완성되어 플러시가 시작됨
    BatchCompleted,
}

impl Observation {
    /// 허용 목록을 통과했는지 여부
    pub fn is_accepted(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// 종료 처리 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShutdownReport {
    /// 종료 시점 열린 배치에 남아 있던 기록 수
    pub pending_records: usize,
    /// 남은 기록을 파일로 기록했는지 여부
    pub flushed_pending: bool,
}

/// 수집기 서비스
#[derive(Debug)]
pub struct Collector {
    allowlist: Allowlist,
    accumulator: Arc<BatchAccumulator>,
    encoder: Arc<dyn BatchEncoder>,
    log_dir: PathBuf,
    flush_on_shutdown: bool,
    tracker: TaskTracker,
}

impl Collector {
    /// 허용 목록을 반환합니다.
    pub fn allowlist(&self) -> &Allowlist {
        &self.allowlist
    }

    /// 누산기를 반환합니다.
    pub fn accumulator(&self) -> &BatchAccumulator {
        &self.accumulator
    }

    /// 배치 파일 디렉토리
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// 현재 실행 중인 플러시 수
    pub fn in_flight_flushes(&self) -> usize {
        self.tracker.len()
    }

    /// 요청을 관찰합니다.
    ///
    /// `host`가 허용 목록에 있을 때만 `extract`로 기록을 만들어 누산기에
    /// 추가합니다. 추가로 배치가 완성되면 플러시를 시작하고 즉시 반환합니다.
    /// tokio 런타임 안에서 호출해야 합니다.
    pub fn observe<F>(&self, host: Option<&str>, extract: F) -> Observation
    where
        F: FnOnce() -> RequestRecord,
    {
        let accepted = host.is_some_and(|h| self.allowlist.is_whitelisted(h));
        if !accepted {
            debug!(host = host.unwrap_or(""), "host not whitelisted");
            metrics::counter!(m::REQUESTS_TOTAL, m::LABEL_RESULT => m::RESULT_REJECTED)
                .increment(1);
            return Observation::Rejected;
        }
        metrics::counter!(m::REQUESTS_TOTAL, m::LABEL_RESULT => m::RESULT_ACCEPTED).increment(1);

        match self.record(extract()) {
            Some(_) => Observation::BatchCompleted,
            None => Observation::Buffered,
        }
    }

    /// 허용 목록 검사 없이 기록을 추가합니다.
    ///
    /// 배치가 완성되면 시작된 플러시 태스크 핸들을 반환합니다.
    pub fn record(
        &self,
        record: RequestRecord,
    ) -> Option<JoinHandle<Result<EncodeOutcome, EncodeError>>> {
        let completed = self.accumulator.append(record);
        metrics::counter!(m::RECORDS_APPENDED_TOTAL).increment(1);
        metrics::gauge!(m::OPEN_BATCH_SIZE).set(self.accumulator.len() as f64);

        completed.and_then(|batch| self.flush(batch))
    }

    /// 분리된 배치를 blocking 풀에서 인코딩합니다.
    ///
    /// 빈 배치는 인코딩하지 않고 `None`을 반환합니다.
    pub fn flush(&self, batch: Batch) -> Option<JoinHandle<Result<EncodeOutcome, EncodeError>>> {
        if batch.is_empty() {
            return None;
        }

        let encoder = Arc::clone(&self.encoder);
        let log_dir = self.log_dir.clone();
        Some(
            self.tracker
                .spawn_blocking(move || write_batch(encoder.as_ref(), &log_dir, &batch)),
        )
    }

    /// 수집기를 종료합니다.
    ///
    /// 열린 배치를 분리하여 `flush_on_shutdown`이면 기록하고, 아니면 버립니다.
    /// 이후 실행 중인 모든 플러시가 끝날 때까지 기다립니다.
    pub async fn shutdown(&self) -> ShutdownReport {
        let pending = self.accumulator.drain();
        let pending_records = pending.len();
        metrics::gauge!(m::OPEN_BATCH_SIZE).set(0.0);

        let mut flushed_pending = false;
        if pending_records > 0 {
            if self.flush_on_shutdown {
                info!(batch_size = pending_records, "flushing partial batch on shutdown");
                flushed_pending = self.flush(pending).is_some();
            } else {
                warn!(
                    batch_size = pending_records,
                    "discarding partial batch on shutdown"
                );
                metrics::counter!(m::RECORDS_DISCARDED_TOTAL).increment(pending_records as u64);
            }
        }

        self.tracker.close();
        if !self.tracker.is_empty() {
            info!(
                in_flight = self.tracker.len(),
                "waiting for in-flight batch flushes"
            );
        }
        self.tracker.wait().await;

        ShutdownReport {
            pending_records,
            flushed_pending,
        }
    }
}

/// 배치 하나를 인코딩하고 결과를 로그와 메트릭으로 남깁니다.
///
/// blocking 컨텍스트에서 호출됩니다. 실패한 배치는 버려집니다.
pub fn write_batch(
    encoder: &dyn BatchEncoder,
    log_dir: &Path,
    batch: &Batch,
) -> Result<EncodeOutcome, EncodeError> {
    let format = encoder.format().to_string();
    let started = Instant::now();
    let result = encoder.encode(batch, log_dir);
    metrics::histogram!(m::FLUSH_DURATION_SECONDS, m::LABEL_FORMAT => format.clone())
        .record(started.elapsed().as_secs_f64());

    match &result {
        Ok(outcome) => {
            info!(
                file = %outcome.path.display(),
                batch_size = batch.len(),
                records_written = outcome.records_written,
                records_skipped = outcome.records_skipped,
                "wrote batch file"
            );
            metrics::counter!(m::BATCHES_FLUSHED_TOTAL, m::LABEL_FORMAT => format).increment(1);
            if outcome.records_skipped > 0 {
                metrics::counter!(m::RECORDS_SKIPPED_TOTAL)
                    .increment(outcome.records_skipped as u64);
            }
        }
        Err(e) => {
            error!(
                dir = %log_dir.display(),
                batch_size = batch.len(),
                error = %e,
                "failed to write batch file, batch dropped"
            );
            metrics::counter!(m::FLUSH_FAILURES_TOTAL, m::LABEL_FORMAT => format).increment(1);
        }
    }
    result
}

/// 수집기 빌더
pub struct CollectorBuilder {
    settings: CollectorSettings,
    encoder: Option<Arc<dyn BatchEncoder>>,
}

impl CollectorBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            settings: CollectorSettings::default(),
            encoder: None,
        }
    }

    /// 수집기 설정을 지정합니다.
    pub fn settings(mut self, settings: CollectorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// 인코더를 직접 지정합니다.
    ///
    /// 지정하지 않으면 설정의 `format`에 맞는 인코더를 사용합니다.
    pub fn encoder(mut self, encoder: Arc<dyn BatchEncoder>) -> Self {
        self.encoder = Some(encoder);
        self
    }

    /// 수집기를 빌드합니다.
    pub fn build(self) -> Result<Collector, CollectorError> {
        self.settings.validate()?;

        let CollectorSettings {
            whitelisted_domains,
            batch_size,
            log_dir,
            format,
            compression_level,
            flush_on_shutdown,
        } = self.settings;

        let encoder = self
            .encoder
            .unwrap_or_else(|| encoder_for(format, compression_level));

        Ok(Collector {
            allowlist: Allowlist::new(whitelisted_domains),
            accumulator: Arc::new(BatchAccumulator::new(batch_size)),
            encoder,
            log_dir,
            flush_on_shutdown,
            tracker: TaskTracker::new(),
        })
    }
}

impl Default for CollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
