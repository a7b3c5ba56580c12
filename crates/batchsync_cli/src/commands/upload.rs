//! Upload command implementation.

use batchsync_protocol::ServerLimits;
use batchsync_server::{ServerConfig, StorageServer};
use batchsync_upload::{
    BatchingUploader, LoopbackClient, Record, StoreDelegate, UploadConfig, UploadError,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Where the records come from.
#[derive(Debug, Clone)]
pub enum RecordSource {
    /// Newline-delimited JSON file.
    File(PathBuf),
    /// Synthesized records of a fixed size.
    Generated {
        /// Number of records.
        count: usize,
        /// Serialized size of each record.
        record_size: usize,
    },
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text.
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses `text` or `json`.
    pub fn parse(value: &str) -> Result<Self, Box<dyn std::error::Error>> {
        match value {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("Unknown format {other:?}, expected text or json").into()),
        }
    }
}

/// Options of one upload run.
#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Records to upload.
    pub source: RecordSource,
    /// Target collection.
    pub collection: String,
    /// Limits advertised by the server and honoured by the client.
    pub limits: ServerLimits,
    /// Whether the server groups POSTs into batches.
    pub batching: bool,
    /// Record ids the server refuses.
    pub reject: Vec<String>,
    /// Report format.
    pub format: OutputFormat,
}

/// One POST as the server saw it.
#[derive(Debug, Serialize)]
pub struct RequestReport {
    /// Request URL.
    pub url: String,
    /// Records in the body.
    pub records: usize,
    /// Response status.
    pub status: u16,
}

/// A record the session could not store.
#[derive(Debug, Serialize)]
pub struct FailedRecord {
    /// Record id.
    pub id: String,
    /// Why it failed.
    pub error: String,
}

/// Outcome of an upload run.
#[derive(Debug, Serialize)]
pub struct UploadReport {
    /// Target collection.
    pub collection: String,
    /// Every POST, in order.
    pub requests: Vec<RequestReport>,
    /// Number of records stored.
    pub succeeded: usize,
    /// Records that failed.
    pub failed: Vec<FailedRecord>,
    /// Session-level failures.
    pub session_errors: Vec<String>,
    /// POSTs that carried `commit=true`.
    pub commits: u64,
    /// Body bytes sent.
    pub bytes_posted: u64,
    /// Timestamp passed to `store_done`.
    pub timestamp: u64,
    /// Records the server holds afterwards.
    pub stored: usize,
}

#[derive(Default)]
struct Outcome {
    succeeded: usize,
    failed: Vec<FailedRecord>,
    session_errors: Vec<String>,
    timestamp: Option<u64>,
}

/// Collects callbacks for the report.
#[derive(Default)]
struct ReportDelegate {
    outcome: Mutex<Outcome>,
}

impl StoreDelegate for ReportDelegate {
    fn on_record_store_succeeded(&self, _guid: &str) {
        self.outcome.lock().succeeded += 1;
    }

    fn on_record_store_failed(&self, error: &UploadError, guid: &str) {
        self.outcome.lock().failed.push(FailedRecord {
            id: guid.to_string(),
            error: error.to_string(),
        });
    }

    fn on_store_failed(&self, error: &UploadError) {
        self.outcome.lock().session_errors.push(error.to_string());
    }

    fn store_done(&self, timestamp: u64) {
        self.outcome.lock().timestamp = Some(timestamp);
    }
}

/// Runs the upload command.
pub fn run(options: &UploadOptions) -> Result<(), Box<dyn std::error::Error>> {
    let report = execute(options)?;
    match options.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text_output(&report),
    }
    if report.failed.is_empty() {
        Ok(())
    } else {
        Err(format!("{} records failed to upload", report.failed.len()).into())
    }
}

/// Uploads the records in one session and collects the report.
pub fn execute(options: &UploadOptions) -> Result<UploadReport, Box<dyn std::error::Error>> {
    let records = match &options.source {
        RecordSource::File(path) => read_ndjson(path)?,
        RecordSource::Generated { count, record_size } => generate_records(*count, *record_size),
    };

    let mut config = ServerConfig::new()
        .with_limits(options.limits)
        .with_batching(options.batching);
    for id in &options.reject {
        config = config.with_rejected_id(id.clone());
    }
    let server = Arc::new(StorageServer::new(config));
    let delegate = Arc::new(ReportDelegate::default());

    let url = format!("http://localhost/1.5/cli/storage/{}", options.collection);
    let upload_config = UploadConfig::new(url).with_limits(options.limits);
    let uploader = BatchingUploader::new(
        upload_config,
        LoopbackClient::new(Arc::clone(&server)),
        delegate.clone(),
    )?;

    info!(records = records.len(), "uploading");
    for record in records {
        uploader.process(record);
    }
    uploader.no_more_records_to_upload();
    let stats = uploader.close();

    let outcome = std::mem::take(&mut *delegate.outcome.lock());
    let timestamp = match outcome.timestamp {
        Some(timestamp) => timestamp,
        None => {
            warn!("session ended without completion");
            0
        }
    };

    Ok(UploadReport {
        collection: options.collection.clone(),
        requests: server
            .request_log()
            .into_iter()
            .map(|entry| RequestReport {
                url: entry.url,
                records: entry.record_count,
                status: entry.status,
            })
            .collect(),
        succeeded: outcome.succeeded,
        failed: outcome.failed,
        session_errors: outcome.session_errors,
        commits: stats.commits_posted,
        bytes_posted: stats.bytes_posted,
        timestamp,
        stored: server.record_count(&options.collection),
    })
}

/// Reads newline-delimited JSON records. Blank lines are skipped.
///
/// Each line is uploaded byte for byte; it only has to be a JSON object
/// with a string `id`.
pub fn read_ndjson(path: &std::path::Path) -> Result<Vec<Record>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(line)
            .map_err(|e| format!("Line {}: invalid JSON: {}", index + 1, e))?;
        let id = value
            .get("id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| format!("Line {}: record has no string \"id\"", index + 1))?;
        records.push(Record::new(id, line));
    }
    Ok(records)
}

/// Synthesizes `count` records with random ids, padded to `record_size`
/// bytes where the id leaves room.
pub fn generate_records(count: usize, record_size: usize) -> Vec<Record> {
    (0..count)
        .map(|_| {
            let id = Uuid::new_v4().simple().to_string();
            let minimum = format!(r#"{{"id":"{id}","payload":""}}"#).len();
            let padding = "x".repeat(record_size.saturating_sub(minimum));
            Record::new(id.clone(), format!(r#"{{"id":"{id}","payload":"{padding}"}}"#))
        })
        .collect()
}

fn print_text_output(report: &UploadReport) {
    println!("batchsync upload: {}", report.collection);
    println!("==================");
    println!();
    println!("Requests:");
    for (index, request) in report.requests.iter().enumerate() {
        println!(
            "  #{:<3} {} {} records -> {}",
            index + 1,
            request.url,
            request.records,
            request.status
        );
    }
    println!();
    println!("Records:");
    println!("  Succeeded: {}", report.succeeded);
    println!("  Failed:    {}", report.failed.len());
    println!("  Stored:    {}", report.stored);
    println!();
    println!("Commits:      {}", report.commits);
    println!("Bytes posted: {}", report.bytes_posted);
    println!("Timestamp:    {}", report.timestamp);

    if !report.failed.is_empty() {
        println!();
        println!("Failures:");
        for failure in &report.failed {
            println!("  {}: {}", failure.id, failure.error);
        }
    }
    for error in &report.session_errors {
        println!("Session error: {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn options(source: RecordSource) -> UploadOptions {
        UploadOptions {
            source,
            collection: "bookmarks".into(),
            limits: ServerLimits::default(),
            batching: true,
            reject: Vec::new(),
            format: OutputFormat::Text,
        }
    }

    #[test]
    fn format_parsing() {
        assert_eq!(OutputFormat::parse("text").unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("json").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::parse("yaml").is_err());
    }

    #[test]
    fn reads_ndjson_lines_verbatim() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"a","title":"first"}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"  {{"id":"b"}}  "#).unwrap();

        let records = read_ndjson(file.path()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].guid, "a");
        assert_eq!(records[0].payload, br#"{"id":"a","title":"first"}"#.to_vec());
        assert_eq!(records[1].payload, br#"{"id":"b"}"#.to_vec());
    }

    #[test]
    fn ndjson_without_id_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"a"}}"#).unwrap();
        writeln!(file, r#"{{"title":"no id"}}"#).unwrap();

        let err = read_ndjson(file.path()).unwrap_err();
        assert!(err.to_string().contains("Line 2"));
    }

    #[test]
    fn generated_records_have_requested_size() {
        let records = generate_records(3, 100);
        assert_eq!(records.len(), 3);
        for record in &records {
            assert_eq!(record.payload.len(), 100);
        }
        assert_ne!(records[0].guid, records[1].guid);
    }

    #[test]
    fn uploads_file_in_batches() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for i in 0..5 {
            writeln!(file, r#"{{"id":"r{i}"}}"#).unwrap();
        }
        let mut options = options(RecordSource::File(file.path().to_path_buf()));
        options.limits = options.limits.with_max_post_records(2);

        let report = execute(&options).unwrap();
        let counts: Vec<usize> = report.requests.iter().map(|r| r.records).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert_eq!(report.succeeded, 5);
        assert!(report.failed.is_empty());
        assert_eq!(report.stored, 5);
        assert_eq!(report.commits, 1);
        assert!(report.timestamp > 0);
    }

    #[test]
    fn rejected_ids_are_reported() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"keep"}}"#).unwrap();
        writeln!(file, r#"{{"id":"drop"}}"#).unwrap();
        let mut options = options(RecordSource::File(file.path().to_path_buf()));
        options.reject = vec!["drop".into()];

        let report = execute(&options).unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].id, "drop");
        assert_eq!(report.stored, 1);
    }

    #[test]
    fn generated_upload_without_batching() {
        let mut options = options(RecordSource::Generated {
            count: 10,
            record_size: 80,
        });
        options.batching = false;
        options.limits = options.limits.with_max_post_records(4);

        let report = execute(&options).unwrap();
        assert_eq!(report.requests.len(), 3);
        assert_eq!(report.succeeded, 10);
        assert_eq!(report.stored, 10);
        assert!(report.session_errors.is_empty());
    }
}
