//! Streaming decode of mongoexport output.
//!
//! mongoexport writes one JSON document per line, but the process pipe
//! hands over arbitrary chunks, and a chunk boundary rarely lands on a line
//! boundary. [`LineDecoder`] keeps the unfinished tail of each chunk in a
//! carry buffer and yields a document per completed line. A line that fails
//! to decode is logged and skipped; it never aborts the stream.

use serde_json::Value;

pub struct LineDecoder {
    buffer: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed one chunk and collect the documents from every line it
    /// completed. The trailing partial line stays buffered.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Value> {
        self.buffer.extend_from_slice(chunk);

        let mut documents = Vec::new();
        let mut start = 0;
        let mut i = 0;
        while i < self.buffer.len() {
            match self.buffer[i] {
                b'\n' => {
                    Self::decode_line(&self.buffer[start..i], &mut documents);
                    i += 1;
                    start = i;
                }
                b'\r' => {
                    Self::decode_line(&self.buffer[start..i], &mut documents);
                    i += 1;
                    if self.buffer.get(i) == Some(&b'\n') {
                        i += 1;
                    }
                    start = i;
                }
                _ => i += 1,
            }
        }
        self.buffer.drain(..start);

        documents
    }

    /// Flush the carry buffer at end of stream.
    pub fn finish(&mut self) -> Vec<Value> {
        let remainder = std::mem::take(&mut self.buffer);
        let mut documents = Vec::new();
        Self::decode_line(&remainder, &mut documents);
        documents
    }

    fn decode_line(line: &[u8], documents: &mut Vec<Value>) {
        let line = String::from_utf8_lossy(line);
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match serde_json::from_str(line) {
            Ok(document) => documents.push(document),
            Err(_) => {
                let excerpt: String = line.chars().take(80).collect();
                tracing::warn!("Could not decode JSON: {excerpt}...");
            }
        }
    }
}

impl Default for LineDecoder {
    fn default() -> Self {
        Self::new()
    }
}
