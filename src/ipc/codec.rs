//! NDJSON codec for the local feed socket.
//!
//! Wraps [`tokio_util::codec::LinesCodec`] with a maximum line length so a
//! misbehaving publisher cannot make the server buffer without bound. Image
//! payloads encoded as JSON byte arrays are large, hence the generous limit.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder, LinesCodec, LinesCodecError};

use crate::{AppError, Result};

/// Maximum line length accepted by the feed codec: 16 MiB.
pub const MAX_LINE_BYTES: usize = 16 * 1_048_576;

/// Line-delimited JSON codec for feed requests and responses.
///
/// Inbound lines longer than [`MAX_LINE_BYTES`] return
/// [`AppError::Ipc`]`("line too long: …")`. I/O errors map to
/// [`AppError::Io`].
#[derive(Debug)]
pub struct FeedCodec(LinesCodec);

impl FeedCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(LinesCodec::new_with_max_length(MAX_LINE_BYTES))
    }
}

impl Default for FeedCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FeedCodec {
    type Item = String;
    type Error = AppError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode(src).map_err(map_codec_error)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0.decode_eof(src).map_err(map_codec_error)
    }
}

impl Encoder<String> for FeedCodec {
    type Error = AppError;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<()> {
        self.0.encode(item, dst).map_err(map_codec_error)
    }
}

fn map_codec_error(e: LinesCodecError) -> AppError {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            AppError::Ipc(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
        }
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
