use std::io::{BufRead, ErrorKind, Lines};

use winnow::ascii::space0;
use winnow::combinator::preceded;
use winnow::error::{ContextError, ParseError, StrContext, StrContextValue};
use winnow::token::{any, take_while};
use winnow::{ModalResult, Parser};

use crate::lru::AccessKind;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("malformed record {text:?} at column {column}: {reason}")]
    Malformed {
        text: String,
        column: usize,
        reason: String,
    },
    #[error("unrecognized access kind {0:?}")]
    UnknownKind(char),
    #[error("unrecognized data operation {0:?}")]
    UnknownOperation(char),
}

impl RecordError {
    fn malformed(text: &str, parse_error: ParseError<&str, ContextError>) -> Self {
        RecordError::Malformed {
            text: text.to_string(),
            column: parse_error.offset() + 1,
            reason: parse_error
                .inner()
                .to_string()
                .lines()
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("line {line}: {error}")]
    Record { line: usize, error: RecordError },
    #[error("failed to read trace after line {line}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}

impl TraceError {
    /// Whether replay has to stop, a bad record only costs its own line.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TraceError::Io { .. })
    }
}

/// Data operation of a trace line.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operation {
    Load,
    Store,
    /// load immediately followed by a store to the same address
    Modify,
}

impl Operation {
    /// Physical cache accesses this operation performs, in order.
    pub fn accesses(self) -> &'static [AccessKind] {
        match self {
            Operation::Load => &[AccessKind::Load],
            Operation::Store => &[AccessKind::Store],
            Operation::Modify => &[AccessKind::Load, AccessKind::Store],
        }
    }

    pub fn letter(self) -> char {
        match self {
            Operation::Load => 'L',
            Operation::Store => 'S',
            Operation::Modify => 'M',
        }
    }
}

impl TryFrom<char> for Operation {
    type Error = RecordError;

    fn try_from(letter: char) -> Result<Self, Self::Error> {
        match letter {
            'L' => Ok(Operation::Load),
            'S' => Ok(Operation::Store),
            'M' => Ok(Operation::Modify),
            op => Err(RecordError::UnknownOperation(op)),
        }
    }
}

/// One decoded line of a valgrind style memory trace, `<kind><op> <hexaddress>,<size>`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    Instruction {
        address: u64,
        size: u32,
    },
    Data {
        op: Operation,
        address: u64,
        size: u32,
    },
}

impl TryFrom<&str> for TraceRecord {
    type Error = RecordError;

    fn try_from(text: &str) -> Result<Self, Self::Error> {
        let (kind, op, address, size) = record
            .parse(text.trim_end())
            .map_err(|e| RecordError::malformed(text, e))?;

        match kind {
            'I' => Ok(TraceRecord::Instruction { address, size }),
            ' ' => Ok(TraceRecord::Data {
                op: Operation::try_from(op)?,
                address,
                size,
            }),
            kind => Err(RecordError::UnknownKind(kind)),
        }
    }
}

impl std::fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraceRecord::Instruction { address, size } => {
                f.write_fmt(format_args!("I {address:x},{size}"))
            }
            TraceRecord::Data { op, address, size } => {
                f.write_fmt(format_args!("{} {address:x},{size}", op.letter()))
            }
        }
    }
}

// kind and op are taken verbatim here and classified afterwards, so an unknown
// letter is reported as such instead of as a syntax error
fn record(input: &mut &str) -> ModalResult<(char, char, u64, u32)> {
    (
        any.context(StrContext::Label("access kind")),
        any.context(StrContext::Label("operation")),
        preceded(space0, hex_address),
        preceded(
            ','.context(StrContext::Expected(StrContextValue::CharLiteral(','))),
            size,
        ),
    )
        .parse_next(input)
}

fn hex_address(input: &mut &str) -> ModalResult<u64> {
    take_while(1.., ('0'..='9', 'a'..='f', 'A'..='F'))
        .try_map(|s| u64::from_str_radix(s, 16))
        .context(StrContext::Label("address"))
        .context(StrContext::Expected(StrContextValue::Description(
            "a hexadecimal address of at most 64 bits",
        )))
        .parse_next(input)
}

fn size(input: &mut &str) -> ModalResult<u32> {
    take_while(1.., '0'..='9')
        .try_map(str::parse::<u32>)
        .context(StrContext::Label("size"))
        .context(StrContext::Expected(StrContextValue::Description(
            "a decimal byte count",
        )))
        .parse_next(input)
}

/// Lazily decodes a trace, one line at a time.
///
/// Blank lines are skipped. Lines that can not be decoded are yielded as
/// [`TraceError::Record`] and do not stop the iterator, a failing read is
/// yielded as [`TraceError::Io`] and ends it.
#[derive(Debug)]
pub struct TraceReader<R> {
    lines: Lines<R>,
    line: usize,
    done: bool,
}

impl<R: BufRead> TraceReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            done: false,
        }
    }

    /// Number of lines read so far.
    pub fn line(&self) -> usize {
        self.line
    }
}

impl<R: BufRead> Iterator for TraceReader<R> {
    type Item = Result<TraceRecord, TraceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let text = match self.lines.next()? {
                Ok(text) => text,
                // std consumes a line that is not valid UTF-8, so it can be skipped like any other bad record
                Err(e) if e.kind() == ErrorKind::InvalidData => {
                    self.line += 1;
                    return Some(Err(TraceError::Record {
                        line: self.line,
                        error: RecordError::Malformed {
                            text: String::new(),
                            column: 1,
                            reason: e.to_string(),
                        },
                    }));
                }
                Err(source) => {
                    self.done = true;
                    return Some(Err(TraceError::Io {
                        line: self.line,
                        source,
                    }));
                }
            };
            self.line += 1;

            if text.trim().is_empty() {
                continue;
            }

            return Some(
                TraceRecord::try_from(text.as_str()).map_err(|error| TraceError::Record {
                    line: self.line,
                    error,
                }),
            );
        }
    }
}

#[cfg(test)]
mod test {
    use std::io::{BufReader, Cursor, Read};

    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::load(" L 10,4", TraceRecord::Data { op: Operation::Load, address: 0x10, size: 4 })]
    #[case::store(" S 7ff000398,8", TraceRecord::Data { op: Operation::Store, address: 0x7ff000398, size: 8 })]
    #[case::modify(" M 0421c7f0,4", TraceRecord::Data { op: Operation::Modify, address: 0x421c7f0, size: 4 })]
    #[case::upper_case_hex(" L DEADbeef,1", TraceRecord::Data { op: Operation::Load, address: 0xdeadbeef, size: 1 })]
    #[case::no_separator(" L10,4", TraceRecord::Data { op: Operation::Load, address: 0x10, size: 4 })]
    #[case::trailing_whitespace(" L 10,4 \r", TraceRecord::Data { op: Operation::Load, address: 0x10, size: 4 })]
    #[case::max_address(" L ffffffffffffffff,1", TraceRecord::Data { op: Operation::Load, address: u64::MAX, size: 1 })]
    #[case::instruction("I  0400d7d4,8", TraceRecord::Instruction { address: 0x400d7d4, size: 8 })]
    #[case::instruction_single_space("I 0400d7d4,8", TraceRecord::Instruction { address: 0x400d7d4, size: 8 })]
    fn parse(#[case] text: &str, #[case] expected: TraceRecord) {
        assert_eq!(TraceRecord::try_from(text), Ok(expected));
    }

    #[rstest]
    #[case::unknown_kind("XL 10,4", RecordError::UnknownKind('X'))]
    #[case::missing_leading_space("L 10,4", RecordError::UnknownKind('L'))]
    #[case::unknown_operation(" Q 10,4", RecordError::UnknownOperation('Q'))]
    fn parse_unknown_letters(#[case] text: &str, #[case] expected: RecordError) {
        assert_eq!(TraceRecord::try_from(text), Err(expected));
    }

    #[rstest]
    #[case::truncated(" L 10")]
    #[case::missing_size(" L 10,")]
    #[case::missing_address(" L ,4")]
    #[case::hex_prefix(" L 0x10,4")]
    #[case::negative_size(" L 10,-4")]
    #[case::trailing_garbage(" L 10,4 extra")]
    #[case::address_overflow(" L 1ffffffffffffffff,4")]
    #[case::size_overflow(" L 10,99999999999")]
    #[case::single_char("I")]
    fn parse_malformed(#[case] text: &str) {
        let error = TraceRecord::try_from(text).unwrap_err();
        assert!(
            matches!(&error, RecordError::Malformed { text: t, .. } if t == text),
            "{error}"
        );
    }

    #[test]
    fn operation_accesses() {
        assert_eq!(Operation::Load.accesses(), [AccessKind::Load]);
        assert_eq!(Operation::Store.accesses(), [AccessKind::Store]);
        assert_eq!(
            Operation::Modify.accesses(),
            [AccessKind::Load, AccessKind::Store]
        );
    }

    #[test]
    fn display() {
        let record = TraceRecord::try_from(" M 0421C7F0,4").unwrap();
        assert_eq!(record.to_string(), "M 421c7f0,4");

        let record = TraceRecord::try_from("I  0400d7d4,8").unwrap();
        assert_eq!(record.to_string(), "I 400d7d4,8");
    }

    #[test]
    fn reader() {
        let trace = "I  0400d7d4,8\n M 0421c7f0,4\n\n L 04f6b868,8\n X 10,4\r\n S 7ff0005c8,8";
        let mut reader = TraceReader::new(Cursor::new(trace));

        assert!(matches!(
            reader.next(),
            Some(Ok(TraceRecord::Instruction { .. }))
        ));
        assert!(matches!(
            reader.next(),
            Some(Ok(TraceRecord::Data {
                op: Operation::Modify,
                ..
            }))
        ));
        assert!(matches!(
            reader.next(),
            Some(Ok(TraceRecord::Data {
                op: Operation::Load,
                ..
            }))
        ));

        let error = reader.next().unwrap().unwrap_err();
        assert!(!error.is_fatal());
        assert!(
            matches!(
                error,
                TraceError::Record {
                    line: 5,
                    error: RecordError::UnknownOperation('X')
                }
            ),
            "{error}"
        );

        assert!(matches!(
            reader.next(),
            Some(Ok(TraceRecord::Data {
                op: Operation::Store,
                address: 0x7ff0005c8,
                size: 8
            }))
        ));
        assert!(reader.next().is_none());
        assert_eq!(reader.line(), 6);
    }

    #[test]
    fn reader_skips_invalid_utf8() {
        let trace: &[u8] = b" L 10,4\n \xff\xfe\n S 20,4\n";
        let records: Vec<_> = TraceReader::new(trace).collect();

        assert_eq!(records.len(), 3);
        assert!(records[0].is_ok());
        assert!(matches!(
            &records[1],
            Err(TraceError::Record { line: 2, .. })
        ));
        assert!(records[2].is_ok());
    }

    struct FailingRead;

    impl Read for FailingRead {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn reader_stops_on_io_error() {
        let mut reader = TraceReader::new(BufReader::new(FailingRead));

        let error = reader.next().unwrap().unwrap_err();
        assert!(error.is_fatal());
        assert!(reader.next().is_none());
    }
}
