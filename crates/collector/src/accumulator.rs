//! 배치 누산기 -- 동시성 안전한 인메모리 배치와 임계값 분리
//!
//! [`BatchAccumulator`]는 열린 배치 하나를 소유합니다. 추가, 크기 검사,
//! 배치 교체(swap-out)를 하나의 잠금 구간에서 수행하므로 동시 호출에서도
//! 모든 기록은 정확히 하나의 배치에만 들어갑니다.
//!
//! # 상태
//! - `Open`: 추가를 받는 배치 (누산기 내부)
//! - 분리됨: 크기가 정확히 `N`에 도달한 배치. 호출자에게 [`Batch`]로 넘어가며
//!   누산기에서는 더 이상 보이지 않음
//!
//! 인코딩은 반드시 잠금 밖에서 수행해야 합니다.

use std::sync::{Mutex, MutexGuard, PoisonError};

use webstats_core::types::{Batch, RequestRecord};

/// 새 열린 배치에 미리 확보할 최대 용량
const MAX_PREALLOCATED: usize = 10_000;

/// 잠금으로 보호되는 열린 배치와 통계
#[derive(Debug, Default)]
struct OpenBatch {
    /// 열린 배치의 기록 (추가 순서)
    records: Vec<RequestRecord>,
    /// 총 추가 기록 수
    total_appended: u64,
    /// 완성되어 분리된 배치 수
    batches_completed: u64,
}

/// 동시성 안전한 배치 누산기
///
/// 시작 시 한 번 생성하여 `Arc`로 요청 처리 계층에 공유합니다.
#[derive(Debug)]
pub struct BatchAccumulator {
    /// 열린 배치 (단일 직렬화 지점)
    open: Mutex<OpenBatch>,
    /// 배치 크기 `N`. 0이면 플러시 비활성화.
    threshold: usize,
}

impl BatchAccumulator {
    /// 임계값 `threshold`로 누산기를 생성합니다.
    ///
    /// `threshold == 0`이면 [`append`](Self::append)는 절대 배치를 분리하지 않습니다.
    pub fn new(threshold: usize) -> Self {
        Self {
            open: Mutex::new(OpenBatch {
                records: Vec::with_capacity(threshold.min(MAX_PREALLOCATED)),
                ..OpenBatch::default()
            }),
            threshold,
        }
    }

    /// 기록을 열린 배치에 추가합니다.
    ///
    /// 이 추가로 열린 배치가 정확히 `N`개가 되면, 배치를 분리하고 빈 배치로
    /// 교체한 뒤 `Some(batch)`를 반환합니다. 그 외에는 `None`.
    pub fn append(&self, record: RequestRecord) -> Option<Batch> {
        let mut open = self.lock();
        open.records.push(record);
        open.total_appended += 1;

        if self.threshold == 0 || open.records.len() != self.threshold {
            return None;
        }

        open.batches_completed += 1;
        let full = std::mem::replace(
            &mut open.records,
            Vec::with_capacity(self.threshold.min(MAX_PREALLOCATED)),
        );
        Some(Batch::from_records(full))
    }

    /// 열린 배치를 (크기와 무관하게) 분리합니다.
    ///
    /// 종료 시 남은 기록을 처리할 때 사용합니다. 비어있으면 빈 배치를 반환합니다.
    pub fn drain(&self) -> Batch {
        let mut open = self.lock();
        Batch::from_records(std::mem::take(&mut open.records))
    }

    /// 현재 열린 배치의 기록 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// 열린 배치가 비어있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// 배치 크기 `N`을 반환합니다.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// 임계값 도달 시 배치를 분리하는지 여부
    pub fn is_flushing_enabled(&self) -> bool {
        self.threshold > 0
    }

    /// 지금까지 추가된 총 기록 수를 반환합니다.
    pub fn total_appended(&self) -> u64 {
        self.lock().total_appended
    }

    /// 지금까지 분리된 배치 수를 반환합니다.
    pub fn batches_completed(&self) -> u64 {
        self.lock().batches_completed
    }

    // 보호 대상이 단순 Vec이므로 poison 상태에서도 그대로 사용
    fn lock(&self) -> MutexGuard<'_, OpenBatch> {
        self.open.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
