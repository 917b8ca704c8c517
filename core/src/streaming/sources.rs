//! Micro-batch sources.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, TallyError};
use crate::record::RecordFormat;
use crate::source::{list_data_files, read_file_lines};

/// An unbounded input read one micro-batch at a time.
///
/// `Ok(Some(lines))` is the next batch and may be empty when nothing new has
/// arrived; `Ok(None)` means the source is exhausted for good.
#[async_trait]
pub trait MicroBatchSource: Send {
    async fn next_batch(&mut self) -> Result<Option<Vec<String>>>;

    fn description(&self) -> String;
}

/// Pre-loaded batches, handed out in order.
#[derive(Debug, Default)]
pub struct MemorySource {
    batches: VecDeque<Vec<String>>,
}

impl MemorySource {
    pub fn new<I, B, S>(batches: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            batches: batches
                .into_iter()
                .map(|batch| batch.into_iter().map(Into::into).collect())
                .collect(),
        }
    }
}

#[async_trait]
impl MicroBatchSource for MemorySource {
    async fn next_batch(&mut self) -> Result<Option<Vec<String>>> {
        Ok(self.batches.pop_front())
    }

    fn description(&self) -> String {
        format!("memory source ({} batches pending)", self.batches.len())
    }
}

/// New files appearing in a directory. Each file is read once, in name
/// order; at most `max_files_per_trigger` files make up one batch.
#[derive(Debug)]
pub struct FileStreamSource {
    dir: PathBuf,
    skip_header: bool,
    max_files_per_trigger: Option<usize>,
    seen: HashSet<PathBuf>,
}

impl FileStreamSource {
    pub fn new(dir: impl Into<PathBuf>, format: &RecordFormat) -> Self {
        Self {
            dir: dir.into(),
            skip_header: format.skip_header(),
            max_files_per_trigger: None,
            seen: HashSet::new(),
        }
    }

    pub fn max_files_per_trigger(mut self, max_files: usize) -> Self {
        self.max_files_per_trigger = Some(max_files.max(1));
        self
    }
}

#[async_trait]
impl MicroBatchSource for FileStreamSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<String>>> {
        let dir = self.dir.clone();
        let files = tokio::task::spawn_blocking(move || list_data_files(&dir))
            .await
            .map_err(|e| TallyError::ContextError(format!("listing task failed: {}", e)))??;

        let limit = self.max_files_per_trigger.unwrap_or(usize::MAX);
        let new_files: Vec<PathBuf> = files
            .into_iter()
            .filter(|file| !self.seen.contains(file))
            .take(limit)
            .collect();
        if new_files.is_empty() {
            return Ok(Some(Vec::new()));
        }
        debug!("Reading {} new files from {}", new_files.len(), self.dir.display());

        let skip_header = self.skip_header;
        let to_read = new_files.clone();
        let lines = tokio::task::spawn_blocking(move || -> Result<Vec<String>> {
            let mut lines = Vec::new();
            for file in &to_read {
                lines.extend(read_file_lines(file, skip_header)?);
            }
            Ok(lines)
        })
        .await
        .map_err(|e| TallyError::ContextError(format!("read task failed: {}", e)))??;

        self.seen.extend(new_files);
        Ok(Some(lines))
    }

    fn description(&self) -> String {
        format!("file stream {}", self.dir.display())
    }
}

/// Newline-delimited text read from a TCP connection. Lines received
/// between two triggers form one batch.
#[derive(Debug)]
pub struct SocketSource {
    addr: String,
    receiver: mpsc::UnboundedReceiver<String>,
    reader: JoinHandle<()>,
}

impl SocketSource {
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        info!("Connected to socket source {}", addr);
        let (sender, receiver) = mpsc::unbounded_channel();
        let peer = addr.to_string();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        if sender.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => {
                        info!("Socket source {} closed", peer);
                        break;
                    }
                    Err(e) => {
                        warn!("Error reading from socket source {}: {}", peer, e);
                        break;
                    }
                }
            }
        });
        Ok(Self {
            addr: addr.to_string(),
            receiver,
            reader,
        })
    }
}

#[async_trait]
impl MicroBatchSource for SocketSource {
    async fn next_batch(&mut self) -> Result<Option<Vec<String>>> {
        let mut lines = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(line) => lines.push(line),
                Err(mpsc::error::TryRecvError::Empty) => return Ok(Some(lines)),
                Err(mpsc::error::TryRecvError::Disconnected) => {
                    return Ok(if lines.is_empty() { None } else { Some(lines) });
                }
            }
        }
    }

    fn description(&self) -> String {
        format!("socket {}", self.addr)
    }
}

impl Drop for SocketSource {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_memory_source_order() {
        let mut source = MemorySource::new(vec![vec!["a"], vec!["b", "c"]]);
        assert_eq!(source.next_batch().await.unwrap(), Some(vec!["a".to_string()]));
        assert_eq!(
            source.next_batch().await.unwrap(),
            Some(vec!["b".to_string(), "c".to_string()])
        );
        assert_eq!(source.next_batch().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_stream_reads_each_file_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.csv"), "x,1\n").unwrap();
        fs::write(dir.path().join("b.csv"), "y,2\n").unwrap();
        fs::write(dir.path().join(".a.csv.crc"), "junk\n").unwrap();

        let mut source =
            FileStreamSource::new(dir.path(), &RecordFormat::default()).max_files_per_trigger(1);
        assert_eq!(source.next_batch().await.unwrap(), Some(vec!["x,1".to_string()]));
        assert_eq!(source.next_batch().await.unwrap(), Some(vec!["y,2".to_string()]));
        assert_eq!(source.next_batch().await.unwrap(), Some(Vec::new()));

        fs::write(dir.path().join("c.csv"), "z,3\n").unwrap();
        assert_eq!(source.next_batch().await.unwrap(), Some(vec!["z,3".to_string()]));
    }

    #[tokio::test]
    async fn test_socket_source_collects_lines() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"ABC,10\nXYZ,5\n").await.unwrap();
        });

        let mut source = SocketSource::connect(&addr).await.unwrap();
        server.await.unwrap();

        let mut received = Vec::new();
        for _ in 0..50 {
            match source.next_batch().await.unwrap() {
                Some(lines) => received.extend(lines),
                None => break,
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(received, vec!["ABC,10", "XYZ,5"]);
    }
}
