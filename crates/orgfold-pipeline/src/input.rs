//! Adapter output as seen by the pipeline: a stream of records and links,
//! each of which may individually fail to parse.

use std::future::Future;

use orgfold_core::record::Input;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};

/// Why one item of the input stream could not be produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputError {
  /// A single malformed row. Counted and skipped.
  Row { line: usize, message: String },
  /// The stream itself failed. Aborts the run.
  Fatal(String),
}

/// A source of [`Input`] items for one ingestion run.
pub trait InputStream: Send {
  /// The next item, or `None` once the stream is exhausted.
  fn next_input(&mut self) -> impl Future<Output = Option<Result<Input, InputError>>> + Send;
}

/// An in-memory stream over any iterator of inputs.
#[derive(Debug, Clone)]
pub struct FromIter<I>(pub I);

impl<I> InputStream for FromIter<I>
where
  I: Iterator<Item = Result<Input, InputError>> + Send,
{
  async fn next_input(&mut self) -> Option<Result<Input, InputError>> { self.0.next() }
}

/// Wrap already-parsed inputs as a stream.
pub fn from_inputs(
  inputs: impl IntoIterator<Item = Input, IntoIter: Send>,
) -> FromIter<impl Iterator<Item = Result<Input, InputError>> + Send> {
  FromIter(inputs.into_iter().map(Ok))
}

// ─── JSON lines ──────────────────────────────────────────────────────────────

/// Reads one JSON-encoded [`Input`] per line. Blank lines are skipped.
pub struct JsonLines<R> {
  lines:   Lines<BufReader<R>>,
  line_no: usize,
}

impl<R: AsyncRead + Unpin> JsonLines<R> {
  pub fn new(reader: R) -> Self { Self { lines: BufReader::new(reader).lines(), line_no: 0 } }
}

impl JsonLines<tokio::fs::File> {
  pub async fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
    Ok(Self::new(tokio::fs::File::open(path).await?))
  }
}

impl<R: AsyncRead + Unpin + Send> InputStream for JsonLines<R> {
  async fn next_input(&mut self) -> Option<Result<Input, InputError>> {
    loop {
      self.line_no += 1;
      let line = match self.lines.next_line().await {
        Ok(Some(line)) => line,
        Ok(None) => return None,
        Err(e) => return Some(Err(InputError::Fatal(format!("line {}: {e}", self.line_no)))),
      };
      if line.trim().is_empty() {
        continue;
      }
      return Some(serde_json::from_str(&line).map_err(|e| InputError::Row {
        line:    self.line_no,
        message: e.to_string(),
      }));
    }
  }
}
