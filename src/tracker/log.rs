//! Append-only JSONL exchange log.
//!
//! Every exchange is written once when it starts and again when it
//! completes. Readers keep the last line per exchange id.
//!
//! Appends are blocking file writes serialized by the log's own lock, so
//! callers should not hold other locks across them.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use super::types::MessageExchange;
use crate::error::Result;

#[derive(Debug)]
pub struct ExchangeLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl ExchangeLog {
    /// Open `path` for appending, creating it and its parent directory.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append the current state of `exchange` as one line.
    pub fn append(&self, exchange: &MessageExchange) -> io::Result<()> {
        let mut line = serde_json::to_string(exchange)?;
        line.push('\n');
        let mut file = self.file.lock().unwrap_or_else(PoisonError::into_inner);
        file.write_all(line.as_bytes())
    }
}

/// Read a log, keeping the latest line per exchange id in first-seen order.
///
/// Lines that do not parse are skipped with a warning.
pub fn replay(path: impl AsRef<Path>) -> Result<Vec<MessageExchange>> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);

    let mut exchanges: Vec<MessageExchange> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (n, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let exchange: MessageExchange = match serde_json::from_str(&line) {
            Ok(exchange) => exchange,
            Err(e) => {
                tracing::warn!("Skipping line {} of {}: {}", n + 1, path.display(), e);
                continue;
            }
        };
        match index.get(&exchange.exchange_id) {
            Some(&i) => exchanges[i] = exchange,
            None => {
                index.insert(exchange.exchange_id.clone(), exchanges.len());
                exchanges.push(exchange);
            }
        }
    }

    tracing::debug!("Replayed {} exchanges from {}", exchanges.len(), path.display());
    Ok(exchanges)
}
