use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};

use crate::error::GatewayError;

/// Splits a newline-delimited JSON body into lines and hands each one to
/// `parser`. Lines may arrive split across chunks, including mid-codepoint.
pub(crate) fn create_ndjson_stream<T, F>(
    response: reqwest::Response,
    parser: F,
) -> impl Stream<Item = Result<T, GatewayError>> + Send
where
    T: Send + 'static,
    F: Fn(&str) -> Result<Option<T>, GatewayError> + Send + 'static,
{
    response
        .bytes_stream()
        .scan(NdjsonState::default(), move |state, chunk| {
            let results = handle_chunk(state, chunk, &parser);
            async move { Some(results) }
        })
        .flat_map(stream::iter)
}

#[derive(Default)]
pub(crate) struct NdjsonState {
    text: String,
    pending: Vec<u8>,
}

fn handle_chunk<T, F>(
    state: &mut NdjsonState,
    chunk: Result<Bytes, reqwest::Error>,
    parser: &F,
) -> Vec<Result<T, GatewayError>>
where
    F: Fn(&str) -> Result<Option<T>, GatewayError>,
{
    let bytes = match chunk {
        Ok(bytes) => bytes,
        Err(err) => return vec![Err(GatewayError::HttpError(err.to_string()))],
    };

    state.push_bytes(&bytes);
    state.drain_lines(parser)
}

impl NdjsonState {
    /// Decodes `bytes` onto the line buffer. An incomplete trailing sequence
    /// waits for the next chunk; invalid bytes become U+FFFD.
    pub(crate) fn push_bytes(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
        let mut consumed = 0;
        loop {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(text) => {
                    self.text.push_str(text);
                    consumed = self.pending.len();
                    break;
                }
                Err(err) => {
                    let valid = consumed + err.valid_up_to();
                    self.text
                        .push_str(&String::from_utf8_lossy(&self.pending[consumed..valid]));
                    match err.error_len() {
                        Some(invalid) => {
                            self.text.push(char::REPLACEMENT_CHARACTER);
                            consumed = valid + invalid;
                        }
                        None => {
                            consumed = valid;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }

    pub(crate) fn drain_lines<T, F>(&mut self, parser: &F) -> Vec<Result<T, GatewayError>>
    where
        F: Fn(&str) -> Result<Option<T>, GatewayError>,
    {
        let mut results = Vec::new();
        while let Some(line) = self.next_line() {
            if line.trim().is_empty() {
                continue;
            }
            match parser(line.trim()) {
                Ok(Some(item)) => results.push(Ok(item)),
                Ok(None) => {}
                Err(err) => results.push(Err(err)),
            }
        }
        results
    }

    fn next_line(&mut self) -> Option<String> {
        let pos = self.text.find('\n')?;
        let line = self.text[..pos].to_string();
        self.text.drain(..=pos);
        Some(line)
    }
}
