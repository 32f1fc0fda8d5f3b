//! Google Translate text-to-speech.
//!
//! The endpoint accepts at most 100 characters per request, so longer text
//! is split at sentence punctuation (then whitespace) and the returned MP3
//! chunks are appended in order. MP3 frames concatenate cleanly.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client};
use tokio::io::AsyncWriteExt;

use super::{ensure_text, finish_output, NarrationError, NarrationResult, Synthesizer};
use crate::models::AudioArtifact;

/// Longest text the endpoint accepts in one request.
pub const MAX_CHUNK_CHARS: usize = 100;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const USER_AGENT: &str = concat!("reelcast/", env!("CARGO_PKG_VERSION"));

/// Characters after which a chunk may end.
const BREAK_CHARS: &[char] = &['.', '!', '?', ';', ':', ',', '\n'];

pub struct GoogleTranslateTts {
    client: Client,
    tld: String,
}

impl GoogleTranslateTts {
    /// Create a client for `translate.google.<tld>`.
    pub fn new(tld: impl Into<String>) -> NarrationResult<Self> {
        let mut headers = header::HeaderMap::new();
        headers.insert(header::USER_AGENT, header::HeaderValue::from_static(USER_AGENT));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| NarrationError::request(format!("building HTTP client: {}", e)))?;

        Ok(Self {
            client,
            tld: tld.into(),
        })
    }

    fn endpoint(&self) -> String {
        format!("https://translate.google.{}/translate_tts", self.tld)
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        language: &str,
        index: usize,
        total: usize,
    ) -> NarrationResult<Vec<u8>> {
        let total = total.to_string();
        let idx = index.to_string();
        let textlen = chunk.chars().count().to_string();

        let response = self
            .client
            .get(self.endpoint())
            .query(&[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", language),
                ("client", "tw-ob"),
                ("total", total.as_str()),
                ("idx", idx.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await
            .map_err(|e| NarrationError::request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(NarrationError::request(format!(
                "chunk {} of {} rejected with HTTP {}",
                index + 1,
                total,
                status
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NarrationError::request(e.to_string()))?;
        Ok(body.to_vec())
    }
}

#[async_trait]
impl Synthesizer for GoogleTranslateTts {
    fn name(&self) -> &str {
        "google-translate"
    }

    async fn synthesize(
        &self,
        text: &str,
        language: &str,
        output: &Path,
    ) -> NarrationResult<AudioArtifact> {
        let text = ensure_text(text)?;
        let chunks = split_for_tts(text, MAX_CHUNK_CHARS);
        tracing::debug!(chunks = chunks.len(), tld = %self.tld, "Requesting speech");

        let mut file = tokio::fs::File::create(output)
            .await
            .map_err(|e| NarrationError::io("creating audio file", e))?;

        for (index, chunk) in chunks.iter().enumerate() {
            let audio = self.fetch_chunk(chunk, language, index, chunks.len()).await?;
            file.write_all(&audio)
                .await
                .map_err(|e| NarrationError::io("writing audio chunk", e))?;
        }

        file.flush()
            .await
            .map_err(|e| NarrationError::io("flushing audio file", e))?;
        drop(file);

        finish_output(output)
    }
}

/// Split narration into request-sized chunks of at most `max_chars` characters.
///
/// Breaks after sentence punctuation followed by whitespace (so `1,200` and
/// `4.5` stay whole), then at word boundaries; a single word longer than the
/// limit is cut. Adjacent short pieces are merged back up to the limit.
pub fn split_for_tts(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut chars = normalized.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);
        let at_boundary = chars.peek().map(|n| n.is_whitespace()).unwrap_or(true);
        if BREAK_CHARS.contains(&c) && at_boundary {
            push_piece(&mut pieces, &current, max_chars);
            current.clear();
        }
    }
    push_piece(&mut pieces, &current, max_chars);

    merge_pieces(pieces, max_chars)
}

fn push_piece(pieces: &mut Vec<String>, piece: &str, max_chars: usize) {
    let piece = piece.trim();
    if piece.is_empty() {
        return;
    }
    if piece.chars().count() <= max_chars {
        pieces.push(piece.to_string());
        return;
    }

    let mut line = String::new();
    for word in piece.split_whitespace() {
        for part in split_long_word(word, max_chars) {
            let line_len = line.chars().count();
            let part_len = part.chars().count();
            if line_len > 0 && line_len + 1 + part_len > max_chars {
                pieces.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&part);
        }
    }
    if !line.is_empty() {
        pieces.push(line);
    }
}

fn split_long_word(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars.chunks(max_chars).map(|c| c.iter().collect()).collect()
}

fn merge_pieces(pieces: Vec<String>, max_chars: usize) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for piece in pieces {
        match merged.last_mut() {
            Some(last) if last.chars().count() + 1 + piece.chars().count() <= max_chars => {
                last.push(' ');
                last.push_str(&piece);
            }
            _ => merged.push(piece),
        }
    }
    merged
}
