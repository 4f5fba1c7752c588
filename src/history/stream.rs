//! Incremental JSON array encoding and decoding.
//!
//! [`JsonArrayWriter`] emits one array element at a time so a partially
//! written file is always a valid prefix of the final array.
//! [`JsonArrayReader`] pulls elements back one by one and tolerates a missing
//! closing bracket or a cut-off final element.

use super::HistoryError;
use serde::Serialize;
use serde::de::{Deserialize, DeserializeOwned};
use std::io::{self, BufRead, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;

/// Writes a JSON array element by element.
///
/// # Examples
///
/// ```
/// use sortdir::history::JsonArrayWriter;
///
/// let mut array = JsonArrayWriter::begin(Vec::new()).unwrap();
/// array.push(&1).unwrap();
/// array.push(&2).unwrap();
/// array.finish().unwrap();
///
/// let parsed: Vec<u32> = serde_json::from_slice(array.get_ref()).unwrap();
/// assert_eq!(parsed, vec![1, 2]);
/// ```
#[derive(Debug)]
pub struct JsonArrayWriter<W: Write> {
    inner: W,
    count: usize,
    sealed: bool,
}

impl<W: Write> JsonArrayWriter<W> {
    /// Writes the opening bracket.
    pub fn begin(mut inner: W) -> Result<Self, HistoryError> {
        inner.write_all(b"[\n")?;
        Ok(Self {
            inner,
            count: 0,
            sealed: false,
        })
    }

    /// Appends one element, preceded by a separator unless it is the first.
    pub fn push<T: Serialize>(&mut self, item: &T) -> Result<(), HistoryError> {
        if self.sealed {
            return Err(HistoryError::Sealed);
        }
        if self.count > 0 {
            self.inner.write_all(b",\n")?;
        }
        serde_json::to_writer_pretty(&mut self.inner, item)?;
        self.count += 1;
        Ok(())
    }

    /// Number of elements written so far.
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<(), HistoryError> {
        self.inner.flush()?;
        Ok(())
    }

    /// Writes the closing bracket and flushes. No element can follow.
    pub fn finish(&mut self) -> Result<(), HistoryError> {
        if self.sealed {
            return Err(HistoryError::Sealed);
        }
        self.inner.write_all(b"\n]")?;
        self.inner.flush()?;
        self.sealed = true;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Start,
    Items,
    Done,
}

/// Pull-based reader over a JSON array, yielding one element at a time.
///
/// Only one element is held in memory at once. Each element is first read
/// as a generic JSON value, so an element of the wrong shape yields an error
/// for that element and iteration continues. Broken JSON syntax ends the
/// iteration. Reaching end of input before the closing bracket ends it
/// quietly and marks the reader as truncated.
///
/// The byte offset at which each element starts is tracked, so a seekable
/// source can later be revisited with [`read_element_at`].
#[derive(Debug)]
pub struct JsonArrayReader<R, T> {
    reader: R,
    state: ReadState,
    truncated: bool,
    position: u64,
    element_start: Option<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<R: BufRead, T: DeserializeOwned> JsonArrayReader<R, T> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            state: ReadState::Start,
            truncated: false,
            position: 0,
            element_start: None,
            _marker: PhantomData,
        }
    }

    /// True once the input ended before the closing `]`.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Byte offset of the element most recently returned by `next`.
    pub fn element_offset(&self) -> Option<u64> {
        self.element_start
    }

    fn consume(&mut self, amount: usize) {
        self.reader.consume(amount);
        self.position += amount as u64;
    }

    /// Skips whitespace (and separators inside the array) and returns the
    /// next significant byte without consuming it.
    fn peek_significant(&mut self) -> std::io::Result<Option<u8>> {
        let skip_commas = self.state == ReadState::Items;
        loop {
            let buf = self.reader.fill_buf()?;
            if buf.is_empty() {
                return Ok(None);
            }
            let skip = buf
                .iter()
                .take_while(|b| b.is_ascii_whitespace() || (skip_commas && **b == b','))
                .count();
            if skip < buf.len() {
                let byte = buf[skip];
                self.consume(skip);
                return Ok(Some(byte));
            }
            let len = buf.len();
            self.consume(len);
        }
    }

    fn end(&mut self, truncated: bool) {
        self.truncated = truncated;
        self.state = ReadState::Done;
    }

    fn read_element(&mut self) -> Option<Result<T, HistoryError>> {
        self.element_start = Some(self.position);
        let mut counted = CountingReader {
            inner: &mut self.reader,
            count: 0,
        };
        let parsed = serde_json::Value::deserialize(&mut serde_json::Deserializer::from_reader(
            &mut counted,
        ));
        self.position += counted.count;

        let value = match parsed {
            Ok(value) => value,
            Err(e) if e.is_eof() => {
                self.end(true);
                return None;
            }
            Err(e) => {
                self.end(false);
                return Some(Err(e.into()));
            }
        };
        Some(serde_json::from_value(value).map_err(HistoryError::from))
    }
}

impl<R: BufRead, T: DeserializeOwned> Iterator for JsonArrayReader<R, T> {
    type Item = Result<T, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state == ReadState::Done {
                return None;
            }
            let next = match self.peek_significant() {
                Ok(next) => next,
                Err(e) => {
                    self.end(false);
                    return Some(Err(e.into()));
                }
            };

            match (self.state, next) {
                (_, None) => {
                    self.end(true);
                    return None;
                }
                (ReadState::Start, Some(b'[')) => {
                    self.consume(1);
                    self.state = ReadState::Items;
                }
                (ReadState::Start, Some(other)) => {
                    self.end(false);
                    return Some(Err(HistoryError::Malformed(format!(
                        "expected '[' at start of history, found '{}'",
                        other as char
                    ))));
                }
                (ReadState::Items, Some(b']')) => {
                    self.consume(1);
                    self.end(false);
                    return None;
                }
                (ReadState::Items, Some(_)) => return self.read_element(),
                (ReadState::Done, Some(_)) => return None,
            }
        }
    }
}

/// Counts the bytes pulled through it.
struct CountingReader<'a, R> {
    inner: &'a mut R,
    count: u64,
}

impl<R: Read> Read for CountingReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.count += read as u64;
        Ok(read)
    }
}

/// Decodes the single element starting at `offset`.
///
/// `offset` is a value previously reported by
/// [`JsonArrayReader::element_offset`] for the same input.
pub fn read_element_at<R, T>(reader: &mut R, offset: u64) -> Result<T, HistoryError>
where
    R: Read + Seek,
    T: DeserializeOwned,
{
    reader.seek(SeekFrom::Start(offset))?;
    let mut de = serde_json::Deserializer::from_reader(reader);
    let value = serde_json::Value::deserialize(&mut de)?;
    Ok(serde_json::from_value(value)?)
}
