//! 배치 인코더 -- 완성된 배치를 로그 디렉토리의 새 파일로 기록합니다.
//!
//! # 인코더
//! - [`JsonBatchEncoder`]: 레코드 배열 JSON, 한 번에 기록 (all-or-nothing)
//! - [`ColumnarBatchEncoder`]: zstd 압축 컬럼형 컨테이너, 기록 단위 추가 후 finalize
//!
//! # 파일 이름
//! 인코딩 시작 시각(UTC, 초 단위) `2024-01-15T12:00:00.<ext>`.
//! 같은 초에 여러 배치가 기록되면 `_00001`, `_00002` 접미사를 붙여 덮어쓰지 않습니다.
//! 접미사는 `.`보다 뒤에 정렬되고 0으로 채워지므로 디렉토리를 사전순으로
//! 나열하면 플러시 순서와 같습니다.
//!
//! # 동시성
//! 각 호출이 `create_new`로 서로 다른 파일을 만들기 때문에 여러 플러시가
//! 동시에 실행되어도 안전합니다.

pub mod columnar;
pub mod json;

pub use columnar::{ColumnarBatchEncoder, ColumnarWriter, read_columnar_batch};
pub use json::{JsonBatchEncoder, read_json_batch};

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use webstats_core::config::BatchFormat;
use webstats_core::error::EncodeError;
use webstats_core::types::Batch;

/// 파일 이름 타임스탬프 형식 (초 단위)
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// 같은 초 충돌 시 시도할 최대 접미사
const MAX_COLLISION_SUFFIX: u32 = 10_000;

/// 인코딩 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOutcome {
    /// 생성된 파일 경로
    pub path: PathBuf,
    /// 파일에 기록된 기록 수
    pub records_written: usize,
    /// 기록 단위 실패로 건너뛴 수
    pub records_skipped: usize,
}

impl EncodeOutcome {
    /// 디렉토리를 제외한 파일 이름
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// 배치 인코더 trait
///
/// 새 파일 형식을 지원하려면 이 trait을 구현합니다.
/// 구현체는 여러 스레드에서 동시에 호출될 수 있습니다.
pub trait BatchEncoder: Send + Sync + fmt::Debug {
    /// 인코딩 형식
    fn format(&self) -> BatchFormat;

    /// 배치를 `directory` 안의 새 파일로 기록합니다.
    fn encode(&self, batch: &Batch, directory: &Path) -> Result<EncodeOutcome, EncodeError>;
}

/// 설정된 형식에 맞는 인코더를 생성합니다.
pub fn encoder_for(format: BatchFormat, compression_level: i32) -> Arc<dyn BatchEncoder> {
    match format {
        BatchFormat::Json => Arc::new(JsonBatchEncoder::new()),
        BatchFormat::Columnar => Arc::new(ColumnarBatchEncoder::new(compression_level)),
    }
}

/// 시각에서 파일 이름 줄기(stem)를 만듭니다.
pub fn batch_file_stem(at: DateTime<Utc>) -> String {
    at.format(FILE_TIMESTAMP_FORMAT).to_string()
}

/// 배치 파일을 새로 생성합니다. 기존 파일은 절대 덮어쓰지 않습니다.
///
/// `<stem>.<ext>`가 이미 있으면 `<stem>_00001.<ext>`, `<stem>_00002.<ext>` 순으로 시도합니다.
pub(crate) fn create_batch_file(
    directory: &Path,
    at: DateTime<Utc>,
    extension: &str,
) -> io::Result<(File, PathBuf)> {
    let stem = batch_file_stem(at);

    for attempt in 0..=MAX_COLLISION_SUFFIX {
        let name = if attempt == 0 {
            format!("{stem}.{extension}")
        } else {
            format!("{stem}_{attempt:05}.{extension}")
        };
        let path = directory.join(name);

        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => {
                if attempt > 0 {
                    tracing::debug!(
                        file = %path.display(),
                        attempt,
                        "batch file name collided within the same second"
                    );
                }
                return Ok((file, path));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free batch file name for {stem}.{extension}"),
    ))
}

/// 실패한 인코딩이 남긴 파일을 제거합니다.
pub(crate) fn discard_partial_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            tracing::warn!(
                file = %path.display(),
                error = %e,
                "failed to remove partial batch file"
            );
        }
    }
}
