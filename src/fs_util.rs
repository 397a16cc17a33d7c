use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};

use camino::Utf8Path;
use flate2::read::MultiGzDecoder;

use crate::error::LoaderError;

/// Opens an input file for line-oriented reading. Files ending in `.gz` are
/// decompressed on the fly.
pub fn open_input(path: &Utf8Path) -> Result<Box<dyn BufRead>, LoaderError> {
    let file = File::open(path.as_std_path())
        .map_err(|err| LoaderError::Filesystem(format!("open {path}: {err}")))?;
    let reader: Box<dyn Read> = if path.extension() == Some("gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

/// Numbered lines of a tab-delimited input with the terminator removed.
/// Numbering starts at 1.
pub struct NumberedLines<R> {
    inner: io::Lines<R>,
    line: usize,
}

impl<R: BufRead> NumberedLines<R> {
    pub fn new(reader: R) -> Self {
        Self {
            inner: reader.lines(),
            line: 0,
        }
    }
}

impl<R: BufRead> Iterator for NumberedLines<R> {
    type Item = Result<(usize, String), LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.inner.next()?;
        self.line += 1;
        Some(
            next.map(|text| (self.line, text.trim_end_matches('\r').to_string()))
                .map_err(|err| LoaderError::Filesystem(format!("read line {}: {err}", self.line))),
        )
    }
}

pub fn split_tabs(line: &str) -> Vec<&str> {
    line.split('\t').collect()
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Write};

    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;

    #[test]
    fn numbered_lines_strip_carriage_returns() {
        let lines: Vec<_> = NumberedLines::new(Cursor::new("a\tb\r\nc\td\n"))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(lines, vec![(1, "a\tb".to_string()), (2, "c\td".to_string())]);
    }

    #[test]
    fn gz_inputs_are_decompressed() {
        let temp = tempfile::tempdir().unwrap();
        let path = camino::Utf8PathBuf::from_path_buf(temp.path().join("net.txt.gz")).unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"gene1\tgene2\tweight\tsign\n").unwrap();
        std::fs::write(path.as_std_path(), encoder.finish().unwrap()).unwrap();

        let reader = open_input(&path).unwrap();
        let first = NumberedLines::new(reader).next().unwrap().unwrap();
        assert_eq!(first.1, "gene1\tgene2\tweight\tsign");
    }
}
