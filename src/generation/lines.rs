//! Reassembles newline-delimited messages from arbitrarily split byte chunks.

use super::GenerationError;
use async_stream::try_stream;
use futures_core::Stream;
use futures_util::{StreamExt, pin_mut};

/// Yield each complete line (without its terminator) as soon as its newline arrives.
///
/// Bytes are buffered until a full line is available, so UTF-8 sequences split across network
/// reads decode correctly. A trailing line without a newline is yielded when the source ends.
pub(crate) fn split_lines<S, B, E>(source: S) -> impl Stream<Item = Result<String, GenerationError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    E: Into<GenerationError> + Send,
{
    try_stream! {
        pin_mut!(source);
        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = source.next().await {
            let chunk = chunk.map_err(Into::<GenerationError>::into)?;
            buffer.extend_from_slice(chunk.as_ref());
            while let Some(newline) = buffer.iter().position(|byte| *byte == b'\n') {
                let line: Vec<u8> = buffer.drain(..=newline).collect();
                yield decode_line(&line)?;
            }
        }
        if !buffer.is_empty() {
            yield decode_line(&buffer)?;
        }
    }
}

fn decode_line(raw: &[u8]) -> Result<String, GenerationError> {
    let text = std::str::from_utf8(raw)
        .map_err(|error| GenerationError::InvalidResponse(format!("invalid UTF-8: {error}")))?;
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::stream;

    async fn collect(chunks: Vec<&'static [u8]>) -> Vec<String> {
        let source = stream::iter(
            chunks
                .into_iter()
                .map(Ok::<&'static [u8], GenerationError>)
                .collect::<Vec<_>>(),
        );
        let lines = split_lines(source);
        pin_mut!(lines);
        let mut out = Vec::new();
        while let Some(line) = lines.next().await {
            out.push(line.expect("line"));
        }
        out
    }

    #[tokio::test]
    async fn joins_lines_split_across_chunks() {
        let lines = collect(vec![
            &b"{\"a\":"[..],
            &b"1}\n{\"b\""[..],
            &b":2}\r\n"[..],
            &b"tail"[..],
        ])
        .await;
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}", "tail"]);
    }

    #[tokio::test]
    async fn decodes_multibyte_characters_split_across_chunks() {
        // "é" is 0xC3 0xA9
        let lines = collect(vec![&b"caf\xC3"[..], &b"\xA9\n"[..]]).await;
        assert_eq!(lines, vec!["café"]);
    }

    #[tokio::test]
    async fn forwards_source_errors() {
        let source = stream::iter(vec![
            Ok(b"first\n".to_vec()),
            Err(GenerationError::Provider("connection reset".into())),
        ]);
        let lines = split_lines(source);
        pin_mut!(lines);
        assert_eq!(lines.next().await.expect("item").expect("line"), "first");
        assert!(matches!(
            lines.next().await,
            Some(Err(GenerationError::Provider(_)))
        ));
    }
}
