//! JSON 배치 인코더 -- 배치 전체를 레코드 배열 하나로 기록합니다.
//!
//! ```json
//! [{"time":"2024-01-15T12:00:00.123456789Z","ip":"203.0.113.7","user_agent":"curl/8.0"}]
//! ```

use std::io::Write;
use std::path::Path;

use chrono::Utc;

use webstats_core::config::BatchFormat;
use webstats_core::error::EncodeError;
use webstats_core::types::{Batch, RequestRecord};

use super::{BatchEncoder, EncodeOutcome, create_batch_file, discard_partial_file};

/// 레코드 배열 JSON 인코더
#[derive(Debug, Clone, Default)]
pub struct JsonBatchEncoder;

impl JsonBatchEncoder {
    /// 새 인코더를 생성합니다.
    pub fn new() -> Self {
        Self
    }
}

impl BatchEncoder for JsonBatchEncoder {
    fn format(&self) -> BatchFormat {
        BatchFormat::Json
    }

    fn encode(&self, batch: &Batch, directory: &Path) -> Result<EncodeOutcome, EncodeError> {
        // 파일을 만들기 전에 직렬화를 끝내서 실패 시 빈 파일이 남지 않도록 함
        let data = serde_json::to_vec(batch.records())
            .map_err(|e| EncodeError::Serialize(e.to_string()))?;

        let (mut file, path) = create_batch_file(directory, Utc::now(), BatchFormat::Json.extension())?;

        let written = file.write_all(&data).and_then(|()| file.sync_all());
        if let Err(e) = written {
            drop(file);
            discard_partial_file(&path);
            return Err(EncodeError::Io(e));
        }

        Ok(EncodeOutcome {
            path,
            records_written: batch.len(),
            records_skipped: 0,
        })
    }
}

/// JSON 배치 파일을 읽습니다.
pub fn read_json_batch(path: impl AsRef<Path>) -> Result<Batch, EncodeError> {
    let data = std::fs::read(path.as_ref())?;
    let records: Vec<RequestRecord> =
        serde_json::from_slice(&data).map_err(|e| EncodeError::Corrupted(e.to_string()))?;
    Ok(Batch::from_records(records))
}
