use std::io;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Reads lines one at a time, reusing a single buffer. A line ends at `\n`, `\r` or
/// `\r\n`, so files exported with any of the three conventions split the same way.
///
/// Bytes that are not valid UTF-8 are replaced with U+FFFD instead of failing the read,
/// so one damaged line never stops the stream.
pub struct RawLines<R> {
    reader: R,
    buffer: Vec<u8>,
    line_number: u64,
}

impl<R: AsyncBufRead + Unpin> RawLines<R> {
    pub fn new(reader: R) -> Self {
        RawLines { reader, buffer: Vec::new(), line_number: 0 }
    }

    /// Returns the next line with its 1-based number, terminator included, or `None` at
    /// end of stream. A final line without a terminator is still returned.
    pub async fn next_line(&mut self) -> io::Result<Option<(u64, String)>> {
        self.buffer.clear();

        loop {
            let available = self.reader.fill_buf().await?;
            if available.is_empty() {
                break;
            }

            match available.iter().position(|byte| *byte == b'\n' || *byte == b'\r') {
                Some(end) => {
                    let terminator = available[end];
                    self.buffer.extend_from_slice(&available[..=end]);
                    self.reader.consume(end + 1);

                    // the `\n` of a `\r\n` pair may sit in the next chunk
                    if terminator == b'\r' && self.reader.fill_buf().await?.first() == Some(&b'\n')
                    {
                        self.buffer.push(b'\n');
                        self.reader.consume(1);
                    }
                    break;
                }
                None => {
                    let len = available.len();
                    self.buffer.extend_from_slice(available);
                    self.reader.consume(len);
                }
            }
        }

        if self.buffer.is_empty() {
            return Ok(None);
        }

        self.line_number += 1;
        Ok(Some((self.line_number, String::from_utf8_lossy(&self.buffer).into_owned())))
    }
}
