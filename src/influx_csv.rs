//! Reader for the annotated CSV produced by `influx query --raw`.
//!
//! The export is a sequence of tables. Each table starts with annotation rows
//! (`#group`, `#datatype`, `#default`) followed by its own header line, so the
//! column layout may change between tables. Rows are yielded lazily as
//! column-name to value maps.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;

use log::trace;

pub type RawRow = HashMap<String, String>;

const COMMENT_MARKER: char = '#';
const GROUP_ANNOTATION: &str = "#group";

pub struct InfluxRows<R> {
    lines: Lines<R>,
    header: Option<Vec<String>>,
    splitter: csv::ReaderBuilder,
}

impl InfluxRows<BufReader<File>> {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file)))
    }
}

impl<R: BufRead> InfluxRows<R> {
    pub fn new(reader: R) -> Self {
        let mut splitter = csv::ReaderBuilder::new();
        splitter.has_headers(false).flexible(true).buffer_capacity(1024);
        InfluxRows {
            lines: reader.lines(),
            header: None,
            splitter,
        }
    }

    fn split(&self, line: &str) -> io::Result<Vec<String>> {
        let mut reader = self.splitter.from_reader(line.as_bytes());
        match reader.records().next() {
            Some(Ok(record)) => Ok(record.iter().map(str::to_string).collect()),
            Some(Err(e)) => Err(io::Error::new(io::ErrorKind::InvalidData, e)),
            None => Ok(Vec::new()),
        }
    }
}

impl<R: BufRead> Iterator for InfluxRows<R> {
    type Item = io::Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e)),
            };
            if line.trim().is_empty() {
                continue;
            }
            if line.starts_with(COMMENT_MARKER) {
                if line.starts_with(GROUP_ANNOTATION) {
                    self.header = None;
                }
                continue;
            }

            let mut values = match self.split(&line) {
                Ok(values) => values,
                Err(e) => return Some(Err(e)),
            };

            let Some(header) = self.header.as_ref() else {
                trace!("influx csv: new header with {} column(s)", values.len());
                self.header = Some(values);
                continue;
            };

            values.resize(header.len(), String::new());
            let row = header
                .iter()
                .zip(values)
                .filter(|(name, _)| !name.is_empty())
                .map(|(name, value)| (name.clone(), value))
                .collect();
            return Some(Ok(row));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn rows(input: &str) -> Vec<RawRow> {
        InfluxRows::new(Cursor::new(input.to_string()))
            .collect::<io::Result<Vec<_>>>()
            .expect("in-memory read")
    }

    #[test]
    fn zips_header_with_values_and_drops_unnamed_columns() {
        let parsed = rows(",result,_time,_value\n,_result,2024-01-01T00:00:00Z,21.5\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].len(), 3);
        assert_eq!(parsed[0]["result"], "_result");
        assert_eq!(parsed[0]["_value"], "21.5");
        assert!(!parsed[0].contains_key(""));
    }

    #[test]
    fn pads_short_rows_and_truncates_long_rows() {
        let parsed = rows("a,b,c\n1\n1,2,3,4,5\n");
        assert_eq!(parsed[0]["a"], "1");
        assert_eq!(parsed[0]["b"], "");
        assert_eq!(parsed[0]["c"], "");
        assert_eq!(parsed[1]["c"], "3");
        assert_eq!(parsed[1].len(), 3);
    }

    #[test]
    fn group_annotation_resets_header() {
        let input = "\
#group,false,true
#datatype,string,long
a,b
1,2

#group,false,false
#default,_result,
x,y,z
7,8,9
";
        let parsed = rows(input);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0]["a"], "1");
        assert_eq!(parsed[1]["z"], "9");
        assert!(!parsed[1].contains_key("a"));
    }

    #[test]
    fn other_comments_keep_the_current_header() {
        let parsed = rows("a,b\n1,2\n# note\n3,4\n");
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[1]["a"], "3");
    }

    #[test]
    fn honours_quoted_fields() {
        let parsed = rows("state,_value\n\"SUN, CLOUDS\",\"1\"\"\"\n");
        assert_eq!(parsed[0]["state"], "SUN, CLOUDS");
        assert_eq!(parsed[0]["_value"], "1\"");
    }

    #[test]
    fn repeated_header_line_is_yielded_as_data() {
        let parsed = rows("_measurement,_field\n_measurement,_field\n");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["_measurement"], "_measurement");
    }
}
