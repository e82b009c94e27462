use std::io::{BufRead, BufReader, Write};
use std::str::FromStr;

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use thiserror::Error;

const GZIP_DEFAULT_LEVEL: u8 = 6;
const LZ4_DEFAULT_LEVEL: u8 = 0;
const ZSTD_DEFAULT_LEVEL: u8 = 0;

const GZIP_MAGIC_BYTES: [u8; 2] = [0x1f, 0x8b];
const BZIP2_MAGIC_BYTES: [u8; 3] = [b'B', b'Z', b'h'];
const ZSTD_MAGIC_BYTES: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];
const LZ4_MAGIC_BYTES: [u8; 4] = [0x04, 0x22, 0x4d, 0x18];

lazy_static! {
    static ref COMPRESSION_RE: Regex =
        Regex::new(r"^(?P<algo>[[:alnum:]]+)(?P<lvl>_\d+)?$").unwrap();
}

/// Compression format
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Compression {
    /// The bzip2 format
    Bzip2,
    /// The gzip format with compression level as associated value
    Gzip(u8),
    /// The lz4 format with compression level as associated value
    Lz4(u8),
    /// The zstd format with compression level as associated value
    Zstd(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseCompressionErr {
    #[error("Unknown compression algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("Level {1} not supported for {0} compression")]
    UnsupportedLevel(String, String),
}

fn parse_level(
    algo: &str,
    lvl: Option<regex::Match<'_>>,
    default: u8,
    max: u8,
) -> Result<u8, ParseCompressionErr> {
    let Some(lvl) = lvl else {
        return Ok(default);
    };
    match lvl.as_str()[1..].parse::<u8>() {
        Ok(n) if n <= max => Ok(n),
        _ => Err(ParseCompressionErr::UnsupportedLevel(
            algo.into(),
            lvl.as_str()[1..].to_owned(),
        )),
    }
}

impl FromStr for Compression {
    type Err = ParseCompressionErr;

    /// Parse a compression specification like `gzip` or `zstd_5`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use Compression::*;
        use ParseCompressionErr::*;

        let lower_case = s.to_ascii_lowercase();
        let Some(captures) = COMPRESSION_RE.captures(&lower_case) else {
            return Err(UnknownAlgorithm(s.to_owned()));
        };
        let algo = &captures["algo"];
        let lvl = captures.name("lvl");
        match algo {
            "bzip2" | "bz2" => match lvl {
                Some(lvl) => {
                    Err(UnsupportedLevel(algo.into(), lvl.as_str()[1..].to_owned()))
                }
                None => Ok(Bzip2),
            },
            "gzip" | "gz" => parse_level(algo, lvl, GZIP_DEFAULT_LEVEL, 9).map(Gzip),
            "lz4" => parse_level(algo, lvl, LZ4_DEFAULT_LEVEL, 16).map(Lz4),
            "zstd" | "zstandard" => {
                parse_level(algo, lvl, ZSTD_DEFAULT_LEVEL, 19).map(Zstd)
            }
            _ => Err(UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Convert into a writer that compresses to the given format
pub fn compress_writer<'a, W: 'a + Write>(
    writer: W,
    compression: Option<Compression>,
) -> Result<Box<dyn Write + 'a>, std::io::Error> {
    match compression {
        Some(Compression::Bzip2) => {
            let encoder = BzEncoder::new(writer, bzip2::Compression::best());
            Ok(Box::new(encoder))
        }
        Some(Compression::Gzip(lvl)) => {
            let encoder =
                GzEncoder::new(writer, flate2::Compression::new(lvl.into()));
            Ok(Box::new(encoder))
        }
        Some(Compression::Lz4(lvl)) => {
            let encoder = lz4::EncoderBuilder::new()
                .auto_flush(true)
                .level(lvl.into())
                .build(writer)?;
            Ok(Box::new(Lz4Writer(Some(encoder))))
        }
        Some(Compression::Zstd(lvl)) => {
            let encoder = zstd::Encoder::new(writer, lvl.into())?;
            Ok(Box::new(encoder.auto_finish()))
        }
        None => Ok(Box::new(writer)),
    }
}

// lz4 frames are only terminated by an explicit `finish`
struct Lz4Writer<W: Write>(Option<lz4::Encoder<W>>);

impl<W: Write> Lz4Writer<W> {
    fn encoder(&mut self) -> std::io::Result<&mut lz4::Encoder<W>> {
        self.0.as_mut().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::Other, "lz4 stream already finished")
        })
    }
}

impl<W: Write> Write for Lz4Writer<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.encoder()?.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.encoder()?.flush()
    }
}

impl<W: Write> Drop for Lz4Writer<W> {
    fn drop(&mut self) {
        if let Some(encoder) = self.0.take() {
            let (_, res) = encoder.finish();
            if let Err(err) = res {
                log::error!("Failed to finish lz4 stream: {err}");
            }
        }
    }
}

/// Wrap a reader such that compressed input is decompressed
///
/// The compression format is detected from the first bytes.
pub fn auto_decompress<'a, B: 'a + BufRead>(
    mut r: B,
) -> Result<Box<dyn BufRead + 'a>, std::io::Error> {
    let bytes = r.fill_buf()?;
    if bytes.len() < 4 {
        debug!("No decompression");
        Ok(Box::new(r))
    } else if bytes[..4] == LZ4_MAGIC_BYTES {
        debug!("Decompress as lz4");
        Ok(Box::new(BufReader::new(lz4::Decoder::new(r)?)))
    } else if bytes[..4] == ZSTD_MAGIC_BYTES {
        debug!("Decompress as zstd");
        Ok(Box::new(BufReader::new(zstd::stream::Decoder::with_buffer(r)?)))
    } else if bytes[..2] == GZIP_MAGIC_BYTES {
        debug!("Decompress as gzip");
        Ok(Box::new(BufReader::new(GzDecoder::new(r))))
    } else if bytes[..3] == BZIP2_MAGIC_BYTES {
        debug!("Decompress as bzip2");
        Ok(Box::new(BufReader::new(BzDecoder::new(r))))
    } else {
        debug!("No decompression");
        Ok(Box::new(r))
    }
}
