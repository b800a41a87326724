//! 컬럼형 배치 인코더 -- zstd 압축 컬럼 컨테이너 (`.wscol`)
//!
//! 기록은 [`ColumnarWriter::write_record`]로 하나씩 컬럼 버퍼에 추가되고,
//! [`ColumnarWriter::finish`]를 정확히 한 번 호출해야 유효한 파일이 됩니다.
//! 기록 단위 실패는 건너뛰고, finalize 실패는 파일 전체를 무효화합니다.
//!
//! ## File Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │  Header (16 bytes)                                        │
//! │  - Magic: "WSCB" (4) | Version: u16 | Flags: u16          │
//! │  - Reserved: 8 bytes                                      │
//! ├──────────────────────────────────────────────────────────┤
//! │  Column chunks (timestamp, source_ip, user_agent)         │
//! │  - column_id u8 | raw_len u32 | zstd_len u32 | zstd data  │
//! ├──────────────────────────────────────────────────────────┤
//! │  Footer (16 bytes)                                        │
//! │  - row_count u32 | crc32 (header + chunks) u32            │
//! │  - Reserved: 4 bytes | Reverse magic: "BCSW"              │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! 모든 정수는 little-endian입니다. 타임스탬프 컬럼은 행마다 Unix epoch
//! 기준 나노초(i64), 문자열 컬럼은 행마다 길이(u32) + UTF-8 바이트입니다.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use webstats_core::config::BatchFormat;
use webstats_core::error::EncodeError;
use webstats_core::types::{Batch, RequestRecord};

use super::{BatchEncoder, EncodeOutcome, create_batch_file, discard_partial_file};
use crate::error::CollectorError;

/// Magic bytes for the file header: "WSCB"
pub const COLUMNAR_MAGIC: [u8; 4] = *b"WSCB";

/// Reverse magic bytes for the file footer: "BCSW"
pub const COLUMNAR_MAGIC_REVERSE: [u8; 4] = *b"BCSW";

/// Current format version.
pub const COLUMNAR_VERSION: u16 = 1;

/// Header size in bytes.
pub const HEADER_SIZE: usize = 16;

/// Footer size in bytes.
pub const FOOTER_SIZE: usize = 16;

/// 문자열 컬럼 값 하나의 최대 바이트 수
pub const MAX_VALUE_LEN: usize = 64 * 1024 - 1;

/// 컬럼 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum ColumnId {
    Timestamp = 0,
    SourceIp = 1,
    UserAgent = 2,
}

const COLUMN_ORDER: [ColumnId; 3] = [ColumnId::Timestamp, ColumnId::SourceIp, ColumnId::UserAgent];

/// 컬럼형 배치 파일 작성기
///
/// finish 없이 drop되면 만들던 파일을 지웁니다.
#[derive(Debug)]
pub struct ColumnarWriter {
    path: PathBuf,
    file: File,
    finished: bool,
    compression_level: i32,
    timestamps: Vec<u8>,
    source_ips: Vec<u8>,
    user_agents: Vec<u8>,
    rows: u32,
}

impl ColumnarWriter {
    /// `directory`에 새 배치 파일을 만듭니다.
    pub fn create(
        directory: &Path,
        at: DateTime<Utc>,
        compression_level: i32,
    ) -> Result<Self, EncodeError> {
        let (file, path) = create_batch_file(directory, at, BatchFormat::Columnar.extension())?;
        Ok(Self {
            path,
            file,
            finished: false,
            compression_level,
            timestamps: Vec::new(),
            source_ips: Vec::new(),
            user_agents: Vec::new(),
            rows: 0,
        })
    }

    /// 생성 중인 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 지금까지 받아들인 행 수
    pub fn rows(&self) -> u32 {
        self.rows
    }

    /// 기록 하나를 컬럼 버퍼에 추가합니다.
    ///
    /// 표현할 수 없는 기록(범위를 벗어난 시각, 너무 긴 필드)은 거부되며
    /// 작성기 상태는 바뀌지 않습니다.
    pub fn write_record(&mut self, record: &RequestRecord) -> Result<(), CollectorError> {
        let nanos = record
            .timestamp
            .timestamp_nanos_opt()
            .ok_or_else(|| CollectorError::RecordRejected {
                field: "timestamp",
                reason: format!("{} is outside the nanosecond range", record.timestamp),
            })?;
        check_value_len("source_ip", &record.source_ip)?;
        check_value_len("user_agent", &record.user_agent)?;
        if self.rows == u32::MAX {
            return Err(CollectorError::RecordRejected {
                field: "row",
                reason: "row count limit reached".to_owned(),
            });
        }

        self.timestamps.extend_from_slice(&nanos.to_le_bytes());
        push_str(&mut self.source_ips, &record.source_ip);
        push_str(&mut self.user_agents, &record.user_agent);
        self.rows += 1;
        Ok(())
    }

    /// 컬럼을 압축하여 파일을 완성합니다.
    ///
    /// 실패하면 파일을 지우고 [`EncodeError::Compress`] 또는
    /// [`EncodeError::Finalize`]를 반환합니다.
    pub fn finish(self) -> Result<(PathBuf, u32), EncodeError> {
        self.finish_with(|file, container| {
            write_container(BufWriter::new(file), container)?;
            file.sync_all()
        })
    }

    /// 컨테이너를 만든 뒤 `persist`로 파일에 기록합니다.
    fn finish_with<F>(mut self, persist: F) -> Result<(PathBuf, u32), EncodeError>
    where
        F: FnOnce(&File, &[u8]) -> io::Result<()>,
    {
        let result = self.build_container().and_then(|container| {
            persist(&self.file, &container).map_err(|e| self.finalize_error(&e.to_string()))
        });
        self.finished = true;

        match result {
            Ok(()) => Ok((std::mem::take(&mut self.path), self.rows)),
            Err(e) => {
                discard_partial_file(&self.path);
                Err(e)
            }
        }
    }

    fn build_container(&self) -> Result<Vec<u8>, EncodeError> {
        let mut body = Vec::with_capacity(
            HEADER_SIZE + self.timestamps.len() + self.source_ips.len() + self.user_agents.len(),
        );

        // Header
        body.extend_from_slice(&COLUMNAR_MAGIC);
        body.extend_from_slice(&COLUMNAR_VERSION.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&[0u8; 8]);

        for column in COLUMN_ORDER {
            let raw = match column {
                ColumnId::Timestamp => &self.timestamps,
                ColumnId::SourceIp => &self.source_ips,
                ColumnId::UserAgent => &self.user_agents,
            };
            let compressed = zstd::bulk::compress(raw, self.compression_level)
                .map_err(|e| EncodeError::Compress(format!("column {:?}: {}", column, e)))?;
            let raw_len = u32::try_from(raw.len())
                .map_err(|_| self.finalize_error(&format!("column {:?} exceeds 4 GiB", column)))?;
            let compressed_len = u32::try_from(compressed.len()).map_err(|_| {
                self.finalize_error(&format!("compressed column {:?} exceeds 4 GiB", column))
            })?;

            body.push(column as u8);
            body.extend_from_slice(&raw_len.to_le_bytes());
            body.extend_from_slice(&compressed_len.to_le_bytes());
            body.extend_from_slice(&compressed);
        }

        let crc = crc32fast::hash(&body);

        // Footer
        body.extend_from_slice(&self.rows.to_le_bytes());
        body.extend_from_slice(&crc.to_le_bytes());
        body.extend_from_slice(&[0u8; 4]);
        body.extend_from_slice(&COLUMNAR_MAGIC_REVERSE);

        Ok(body)
    }

    fn finalize_error(&self, reason: &str) -> EncodeError {
        EncodeError::Finalize {
            path: self.path.display().to_string(),
            reason: reason.to_owned(),
        }
    }
}

impl Drop for ColumnarWriter {
    fn drop(&mut self) {
        // finish 전에 버려진 작성기 -> 불완전한 파일 제거
        if !self.finished {
            discard_partial_file(&self.path);
        }
    }
}

fn write_container<W: Write>(mut sink: W, container: &[u8]) -> io::Result<()> {
    sink.write_all(container)?;
    sink.flush()
}

fn check_value_len(field: &'static str, value: &str) -> Result<(), CollectorError> {
    if value.len() > MAX_VALUE_LEN {
        return Err(CollectorError::RecordRejected {
            field,
            reason: format!("{} bytes exceeds limit of {}", value.len(), MAX_VALUE_LEN),
        });
    }
    Ok(())
}

fn push_str(column: &mut Vec<u8>, value: &str) {
    // check_value_len 이후에만 호출되므로 u32에 들어감
    column.extend_from_slice(&(value.len() as u32).to_le_bytes());
    column.extend_from_slice(value.as_bytes());
}

/// zstd 컬럼형 인코더
#[derive(Debug, Clone)]
pub struct ColumnarBatchEncoder {
    compression_level: i32,
}

impl ColumnarBatchEncoder {
    /// 압축 레벨을 지정하여 인코더를 생성합니다.
    pub fn new(compression_level: i32) -> Self {
        Self { compression_level }
    }

    /// 압축 레벨
    pub fn compression_level(&self) -> i32 {
        self.compression_level
    }
}

impl Default for ColumnarBatchEncoder {
    fn default() -> Self {
        Self::new(3)
    }
}

impl BatchEncoder for ColumnarBatchEncoder {
    fn format(&self) -> BatchFormat {
        BatchFormat::Columnar
    }

    fn encode(&self, batch: &Batch, directory: &Path) -> Result<EncodeOutcome, EncodeError> {
        let mut writer = ColumnarWriter::create(directory, Utc::now(), self.compression_level)?;

        let mut skipped = 0usize;
        for (index, record) in batch.iter().enumerate() {
            if let Err(e) = writer.write_record(record) {
                skipped += 1;
                tracing::warn!(
                    file = %writer.path().display(),
                    index,
                    error = %e,
                    "skipping record that cannot be encoded"
                );
            }
        }

        let (path, rows) = writer.finish()?;
        Ok(EncodeOutcome {
            path,
            records_written: rows as usize,
            records_skipped: skipped,
        })
    }
}

/// 컬럼형 배치 파일을 읽고 체크섬을 검증합니다.
pub fn read_columnar_batch(path: impl AsRef<Path>) -> Result<Batch, EncodeError> {
    let data = std::fs::read(path.as_ref())?;
    decode_container(&data).map(Batch::from_records)
}

fn decode_container(data: &[u8]) -> Result<Vec<RequestRecord>, EncodeError> {
    if data.len() < HEADER_SIZE + FOOTER_SIZE {
        return Err(corrupted(format!("file too short: {} bytes", data.len())));
    }
    if data[..4] != COLUMNAR_MAGIC {
        return Err(corrupted(format!("invalid magic {:?}", &data[..4])));
    }
    let version = u16::from_le_bytes([data[4], data[5]]);
    if version != COLUMNAR_VERSION {
        return Err(corrupted(format!("unsupported version {version}")));
    }

    let (body, footer) = data.split_at(data.len() - FOOTER_SIZE);
    if footer[12..16] != COLUMNAR_MAGIC_REVERSE {
        return Err(corrupted("invalid footer magic".to_owned()));
    }
    let rows = read_u32(footer, 0)? as usize;
    let expected_crc = read_u32(footer, 4)?;
    let actual_crc = crc32fast::hash(body);
    if expected_crc != actual_crc {
        return Err(corrupted(format!(
            "checksum mismatch: expected {expected_crc}, got {actual_crc}"
        )));
    }

    let mut cursor = HEADER_SIZE;
    let mut columns: Vec<Vec<u8>> = Vec::with_capacity(COLUMN_ORDER.len());
    for column in COLUMN_ORDER {
        let id = *body
            .get(cursor)
            .ok_or_else(|| corrupted(format!("missing column {:?}", column)))?;
        if id != column as u8 {
            return Err(corrupted(format!("expected column {:?}, found id {id}", column)));
        }
        let raw_len = read_u32(body, cursor + 1)? as usize;
        let compressed_len = read_u32(body, cursor + 5)? as usize;
        let start = cursor + 9;
        let compressed = body
            .get(start..start + compressed_len)
            .ok_or_else(|| corrupted(format!("truncated column {:?}", column)))?;
        let raw = zstd::bulk::decompress(compressed, raw_len)
            .map_err(|e| corrupted(format!("column {:?}: {e}", column)))?;
        if raw.len() != raw_len {
            return Err(corrupted(format!("column {:?} length mismatch", column)));
        }
        columns.push(raw);
        cursor = start + compressed_len;
    }

    let timestamps = &columns[0];
    if timestamps.len() != rows * 8 {
        return Err(corrupted("timestamp column does not match row count".to_owned()));
    }
    let source_ips = read_strings(&columns[1], rows, "source_ip")?;
    let user_agents = read_strings(&columns[2], rows, "user_agent")?;

    let records = timestamps
        .chunks_exact(8)
        .zip(source_ips)
        .zip(user_agents)
        .map(|((ts, ip), ua)| {
            let mut nanos = [0u8; 8];
            nanos.copy_from_slice(ts);
            RequestRecord::with_timestamp(
                DateTime::from_timestamp_nanos(i64::from_le_bytes(nanos)),
                ip,
                ua,
            )
        })
        .collect();
    Ok(records)
}

fn read_strings(column: &[u8], rows: usize, name: &str) -> Result<Vec<String>, EncodeError> {
    let mut values = Vec::with_capacity(rows);
    let mut cursor = 0;
    for _ in 0..rows {
        let len = read_u32(column, cursor)? as usize;
        let bytes = column
            .get(cursor + 4..cursor + 4 + len)
            .ok_or_else(|| corrupted(format!("truncated {name} column")))?;
        let value = std::str::from_utf8(bytes)
            .map_err(|e| corrupted(format!("{name} is not UTF-8: {e}")))?;
        values.push(value.to_owned());
        cursor += 4 + len;
    }
    if cursor != column.len() {
        return Err(corrupted(format!("trailing bytes in {name} column")));
    }
    Ok(values)
}

fn read_u32(buf: &[u8], offset: usize) -> Result<u32, EncodeError> {
    buf.get(offset..offset + 4)
        .and_then(|b| b.try_into().ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| corrupted(format!("unexpected end of data at offset {offset}")))
}

fn corrupted(reason: String) -> EncodeError {
    EncodeError::Corrupted(reason)
}
