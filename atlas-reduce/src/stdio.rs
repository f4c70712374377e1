//! JSON-lines front end: one request per input line, one output message per
//! output line.

use crate::protocol::{InputMessage, OutputMessage};
use crate::worker::ComputeWorker;
use atlas::{Error, Result};
use std::cell::RefCell;
use std::future::Future;
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{error, warn};

/// Process `reader` line by line until it ends or `shutdown` resolves.
///
/// Requests run one at a time in input order. Blank lines are skipped.
/// Returns the number of requests handled.
pub async fn serve<R, W, S>(
    worker: &ComputeWorker,
    reader: R,
    out: &mut W,
    shutdown: S,
) -> Result<usize>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future<Output = ()>,
{
    let mut lines = reader.lines();
    let mut handled = 0;
    tokio::pin!(shutdown);

    loop {
        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = &mut shutdown => return Ok(handled),
        };
        let Some(line) = line else {
            return Ok(handled);
        };
        if line.trim().is_empty() {
            continue;
        }

        tokio::select! {
            result = handle_line(worker, &line, out) => result?,
            _ = &mut shutdown => return Ok(handled),
        }
        handled += 1;
    }
}

/// Run one request line and write every resulting message to `out`.
pub async fn handle_line<W: Write + ?Sized>(
    worker: &ComputeWorker,
    line: &str,
    out: &mut W,
) -> Result<()> {
    let request = match InputMessage::decode(line) {
        Ok(request) => request,
        Err(e) => {
            warn!("{}", e);
            return emit(out, &OutputMessage::error(e));
        }
    };

    let sink: RefCell<(&mut W, Option<Error>)> = RefCell::new((out, None));
    let record = |message: OutputMessage| {
        let mut sink = sink.borrow_mut();
        let (out, failed) = &mut *sink;
        if failed.is_none() {
            if let Err(e) = emit(&mut **out, &message) {
                *failed = Some(e);
            }
        }
    };

    let outcome = worker
        .submit(request)
        .drive(
            |frame| record(OutputMessage::from(frame)),
            |message| record(OutputMessage::error(message)),
        )
        .await;

    let (out, failed) = sink.into_inner();
    if let Some(e) = failed {
        return Err(e);
    }
    if let Err(e) = outcome {
        error!("{}", e);
        emit(out, &OutputMessage::error(&e))?;
    }
    Ok(())
}

/// Write `message` as one JSON line and flush.
pub fn emit<W: Write + ?Sized>(out: &mut W, message: &OutputMessage) -> Result<()> {
    let json = message.to_json()?;
    writeln!(out, "{}", json)?;
    out.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_writes_one_line() {
        let mut out = Vec::new();
        emit(&mut out, &OutputMessage::error("no data found")).unwrap();
        emit(&mut out, &OutputMessage::error("again")).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                r#"{"data":[],"error":"no data found"}"#,
                r#"{"data":[],"error":"again"}"#
            ]
        );
    }

    #[tokio::test]
    async fn test_invalid_line_yields_error_message() {
        let worker = ComputeWorker::default();
        let mut out = Vec::new();
        handle_line(&worker, "{not json", &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        let message: OutputMessage = serde_json::from_str(text.trim()).unwrap();
        assert!(message.is_terminal());
        assert!(matches!(
            message,
            OutputMessage::Error { ref error, .. } if error.starts_with("invalid input message")
        ));
    }
}
