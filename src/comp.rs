use std::io::Write;
use std::mem;

use flate2::write::{GzDecoder, ZlibDecoder};
use zstd::stream::write::Decoder as ZstdDecoder;

use crate::error::{Error, Result};
use crate::request::Coding;

/// Streaming decompressor over the raw body bytes.
///
/// Write-side codecs keep all state in an owned value, which is what lets
/// the exchange drop it on reset. Decompressed output lands in the inner
/// `Vec` and is drained into the caller's buffer. A closed set of codings,
/// so the hot path stays a plain `match`.
pub(crate) enum Codec {
    Deflate(ZlibDecoder<Vec<u8>>),
    Gzip(GzDecoder<Vec<u8>>),
    Zstd(ZstdDecoder<'static, Vec<u8>>),
}

pub(crate) struct Decompressor {
    codec: Codec,
    pending: Vec<u8>,
    pos: usize,
    finished: bool,
}

impl std::fmt::Debug for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Codec::Deflate(_) => "Deflate",
            Codec::Gzip(_) => "Gzip",
            Codec::Zstd(_) => "Zstd",
        };
        f.debug_tuple(name).finish()
    }
}

impl std::fmt::Debug for Decompressor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Decompressor")
            .field("codec", &self.codec)
            .field("pending", &self.pending)
            .field("pos", &self.pos)
            .field("finished", &self.finished)
            .finish()
    }
}

impl PartialEq for Decompressor {
    fn eq(&self, other: &Self) -> bool {
        self.pending == other.pending && self.pos == other.pos && self.finished == other.finished
    }
}

impl Decompressor {
    /// Codec for the given coding, or `None` for identity. The legacy
    /// compress codings are recognised but not decodable.
    pub(crate) fn new(coding: Coding) -> Result<Option<Decompressor>> {
        let codec = match coding {
            Coding::Identity => return Ok(None),
            Coding::Deflate => Codec::Deflate(ZlibDecoder::new(Vec::new())),
            Coding::Gzip | Coding::XGzip => Codec::Gzip(GzDecoder::new(Vec::new())),
            Coding::Zstd => {
                let dec = ZstdDecoder::new(Vec::new()).map_err(|_| Error::DecompressionFailure)?;
                Codec::Zstd(dec)
            }
            Coding::Compress | Coding::XCompress => return Err(Error::CompressionNotSupported),
        };

        Ok(Some(Decompressor {
            codec,
            pending: Vec::new(),
            pos: 0,
            finished: false,
        }))
    }

    /// Pull decompressed bytes, reading raw body bytes through `raw` as
    /// needed. A zero return means the stream is exhausted: the raw reader
    /// returned zero and the codec tail has been flushed out.
    pub(crate) fn read(
        &mut self,
        out: &mut [u8],
        mut raw: impl FnMut(&mut [u8]) -> Result<usize>,
    ) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let mut scratch = [0_u8; 4096];

        loop {
            if self.pos < self.pending.len() {
                let take = (self.pending.len() - self.pos).min(out.len());
                out[..take].copy_from_slice(&self.pending[self.pos..self.pos + take]);
                self.pos += take;
                if self.pos == self.pending.len() {
                    self.pending.clear();
                    self.pos = 0;
                }
                return Ok(take);
            }

            if self.finished {
                return Ok(0);
            }

            let n = raw(&mut scratch)?;
            if n == 0 {
                self.codec.finish()?;
                self.pending = self.codec.take();
                self.pos = 0;
                self.finished = true;
                continue;
            }

            self.codec.push(&scratch[..n])?;
            self.pending = self.codec.take();
            self.pos = 0;
        }
    }
}

impl Codec {
    fn push(&mut self, raw: &[u8]) -> Result<()> {
        let r = match self {
            Codec::Deflate(d) => d.write_all(raw),
            Codec::Gzip(d) => d.write_all(raw),
            Codec::Zstd(d) => d.write_all(raw),
        };
        r.map_err(|_| Error::DecompressionFailure)
    }

    /// Called once the raw stream ended. Verifies the compressed stream was
    /// complete and pushes out any buffered tail.
    fn finish(&mut self) -> Result<()> {
        let r = match self {
            Codec::Deflate(d) => d.try_finish(),
            Codec::Gzip(d) => d.try_finish(),
            Codec::Zstd(d) => d.flush(),
        };
        r.map_err(|_| Error::DecompressionFailure)
    }

    fn take(&mut self) -> Vec<u8> {
        match self {
            Codec::Deflate(d) => mem::take(d.get_mut()),
            Codec::Gzip(d) => mem::take(d.get_mut()),
            Codec::Zstd(d) => mem::take(d.get_mut()),
        }
    }
}
