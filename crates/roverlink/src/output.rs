use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use roverlink_link::SchedulerStats;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One entry of a decoded capture: a frame, or the reason one was rejected.
#[derive(Debug, Serialize)]
pub struct FrameRecord {
    pub offset: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u8>,
    pub payload_size: usize,
    pub payload: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub raw: Vec<u8>,
}

#[derive(Serialize)]
struct DecodeSummary<'a> {
    frames: usize,
    failures: usize,
    trailing_bytes: usize,
    records: &'a [FrameRecord],
}

pub fn print_records(records: &[FrameRecord], trailing_bytes: usize, format: OutputFormat) {
    let failures = records.iter().filter(|r| r.error.is_some()).count();
    match format {
        OutputFormat::Json => {
            let out = DecodeSummary {
                frames: records.len() - failures,
                failures,
                trailing_bytes,
                records,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["OFFSET", "ID", "PURPOSE", "SEQ", "SIZE", "PAYLOAD"]);
            for record in records {
                table.add_row(vec![
                    record.offset.to_string(),
                    opt(record.id),
                    record.purpose.clone().unwrap_or_else(|| "-".to_string()),
                    opt(record.sequence),
                    record.payload_size.to_string(),
                    record
                        .error
                        .as_ref()
                        .map(|e| format!("<{e}>"))
                        .unwrap_or_else(|| record.payload.clone()),
                ]);
            }
            println!("{table}");
            if trailing_bytes > 0 {
                println!("{trailing_bytes} trailing bytes (incomplete frame)");
            }
        }
        OutputFormat::Pretty => {
            for record in records {
                match &record.error {
                    Some(err) => println!("@{} error: {err}", record.offset),
                    None => println!(
                        "@{} id={} purpose={} seq={} size={} payload={}",
                        record.offset,
                        opt(record.id),
                        record.purpose.as_deref().unwrap_or("-"),
                        opt(record.sequence),
                        record.payload_size,
                        record.payload
                    ),
                }
            }
            if trailing_bytes > 0 {
                println!("{trailing_bytes} trailing bytes (incomplete frame)");
            }
        }
        OutputFormat::Raw => {
            for record in records.iter().filter(|r| r.error.is_none()) {
                print_raw(&record.raw);
            }
        }
    }
}

pub fn print_stats(stats: &SchedulerStats, format: OutputFormat) {
    match format {
        OutputFormat::Json | OutputFormat::Raw => {
            println!(
                "{}",
                serde_json::to_string(stats).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TOPIC", "WEIGHT", "LIVE", "ENABLED", "QUEUED", "SENT"]);
            for topic in &stats.topics {
                table.add_row(vec![
                    topic.name.clone(),
                    topic.weight.to_string(),
                    topic.live.to_string(),
                    topic.enabled.to_string(),
                    topic.queued.to_string(),
                    topic.sent.to_string(),
                ]);
            }
            println!("{table}");
            println!(
                "pending acknowledgments: {}, acknowledged ids: {}",
                stats.pending, stats.acknowledged
            );
        }
        OutputFormat::Pretty => {
            for topic in &stats.topics {
                println!(
                    "topic={} weight={} live={} enabled={} queued={} sent={}",
                    topic.name, topic.weight, topic.live, topic.enabled, topic.queued, topic.sent
                );
            }
            println!("pending={} acknowledged={}", stats.pending, stats.acknowledged);
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

pub fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
