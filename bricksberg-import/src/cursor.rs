//! Line-oriented CSV cursor.
//!
//! The cursor counts physical lines so a task can resume by skipping the
//! number of lines it has already consumed. Each line is parsed as one CSV
//! record; quoted fields spanning several lines are not supported.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use csv::StringRecord;

/// One line read from the cursor.
#[derive(Debug, Clone, PartialEq)]
pub enum CursorLine {
    /// Empty or whitespace-only line.
    Blank,
    /// A line the CSV parser rejected.
    Malformed(String),
    Record(StringRecord),
}

pub struct CsvCursor<R> {
    reader: R,
    lines_read: u64,
    buf: Vec<u8>,
}

impl CsvCursor<BufReader<File>> {
    /// Open a file for reading from its first line.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::with_capacity(64 * 1024, file)))
    }
}

impl<R: BufRead> CsvCursor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            lines_read: 0,
            buf: Vec::with_capacity(512),
        }
    }

    /// Lines consumed so far.
    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    /// Skip up to `n` lines. Returns how many were skipped; fewer than `n`
    /// means the file ended first.
    pub fn skip_lines(&mut self, n: u64) -> io::Result<u64> {
        let mut skipped = 0;
        while skipped < n {
            if !self.read_raw()? {
                break;
            }
            skipped += 1;
        }
        Ok(skipped)
    }

    /// Read and parse the next line, or `None` at end of file.
    pub fn next_line(&mut self) -> io::Result<Option<CursorLine>> {
        if !self.read_raw()? {
            return Ok(None);
        }
        let text = String::from_utf8_lossy(&self.buf);
        let text = text.trim_end_matches(['\n', '\r']);
        if text.trim().is_empty() {
            return Ok(Some(CursorLine::Blank));
        }
        Ok(Some(parse_line(text)))
    }

    /// True when no bytes remain.
    pub fn at_eof(&mut self) -> io::Result<bool> {
        Ok(self.reader.fill_buf()?.is_empty())
    }

    fn read_raw(&mut self) -> io::Result<bool> {
        self.buf.clear();
        let n = self.reader.read_until(b'\n', &mut self.buf)?;
        if n == 0 {
            return Ok(false);
        }
        self.lines_read += 1;
        Ok(true)
    }
}

fn parse_line(text: &str) -> CursorLine {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());
    let mut record = StringRecord::new();
    match reader.read_record(&mut record) {
        Ok(true) => CursorLine::Record(record),
        Ok(false) => CursorLine::Blank,
        Err(e) => CursorLine::Malformed(e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn cursor(text: &str) -> CsvCursor<Cursor<Vec<u8>>> {
        CsvCursor::new(Cursor::new(text.as_bytes().to_vec()))
    }

    fn fields(line: Option<CursorLine>) -> Vec<String> {
        match line {
            Some(CursorLine::Record(r)) => r.iter().map(String::from).collect(),
            other => panic!("expected a record, got {other:?}"),
        }
    }

    #[test]
    fn reads_records_and_blank_lines() {
        let mut c = cursor("id,name\n\n1,\"Black, Solid\"\r\n2,White");
        assert_eq!(fields(c.next_line().unwrap()), ["id", "name"]);
        assert_eq!(c.next_line().unwrap(), Some(CursorLine::Blank));
        assert_eq!(fields(c.next_line().unwrap()), ["1", "Black, Solid"]);
        assert!(!c.at_eof().unwrap());
        assert_eq!(fields(c.next_line().unwrap()), ["2", "White"]);
        assert!(c.at_eof().unwrap());
        assert_eq!(c.next_line().unwrap(), None);
        assert_eq!(c.lines_read(), 4);
    }

    #[test]
    fn skip_reports_short_files() {
        let mut c = cursor("a\nb\nc\n");
        assert_eq!(c.skip_lines(2).unwrap(), 2);
        assert_eq!(fields(c.next_line().unwrap()), ["c"]);

        let mut c = cursor("a\nb\n");
        assert_eq!(c.skip_lines(5).unwrap(), 2);
        assert!(c.at_eof().unwrap());
    }

    #[test]
    fn eof_is_exact_after_trailing_newline() {
        let mut c = cursor("id\n1\n");
        c.skip_lines(2).unwrap();
        assert!(c.at_eof().unwrap());
    }

    #[test]
    fn invalid_utf8_is_read_lossily() {
        let mut c = CsvCursor::new(Cursor::new(b"1,caf\xe9\n".to_vec()));
        let f = fields(c.next_line().unwrap());
        assert_eq!(f[0], "1");
        assert!(f[1].starts_with("caf"));
    }
}
