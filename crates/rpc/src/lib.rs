//! RouteGuide wire protocol.
//!
//! Every frame is a one byte tag, a big-endian `u32` payload length and a
//! bincode payload. Calls are multiplexed over one connection by
//! [`CallId`]; see [`ClientFrame`] and [`ServerFrame`] for the call flow.

use anyhow::Result;
use bytes::{Buf, BufMut, BytesMut};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::codec::{Decoder, Encoder};

pub mod message;
pub mod status;

pub use message::{CallId, ClientFrame, Message, Method, ServerFrame};
pub use status::{Code, Status};

pub const FRAME_TAG: u8 = 0x52;
pub const HEADER_LEN: usize = 5;
pub const DEFAULT_MAX_FRAME_SIZE: usize = 4 * 1024 * 1024; // 4MB

fn decode_frame<T: DeserializeOwned>(src: &mut BytesMut, max_frame_size: usize) -> Result<Option<T>> {
    if src.is_empty() {
        return Ok(None);
    }
    if src[0] != FRAME_TAG {
        return Err(anyhow::anyhow!("Invalid frame tag 0x{:02x}", src[0]));
    }
    if src.len() < HEADER_LEN {
        return Ok(None);
    }

    let mut buf = std::io::Cursor::new(&src[..]);
    let _tag = buf.get_u8();
    let len = buf.get_u32() as usize;

    if len > max_frame_size {
        return Err(anyhow::anyhow!(
            "Frame size {} exceeds maximum {}",
            len,
            max_frame_size
        ));
    }

    if src.len() < HEADER_LEN + len {
        src.reserve(HEADER_LEN + len - src.len());
        return Ok(None);
    }

    src.advance(HEADER_LEN);
    let payload = src.split_to(len);
    let frame: T = bincode::deserialize(&payload)?;

    Ok(Some(frame))
}

fn encode_frame<T: Serialize>(item: &T, dst: &mut BytesMut, max_frame_size: usize) -> Result<()> {
    let payload = bincode::serialize(item)?;
    if payload.len() > max_frame_size {
        return Err(anyhow::anyhow!(
            "Frame size {} exceeds maximum {}",
            payload.len(),
            max_frame_size
        ));
    }

    dst.reserve(HEADER_LEN + payload.len());
    dst.put_u8(FRAME_TAG);
    dst.put_u32(payload.len() as u32);
    dst.put_slice(&payload);

    Ok(())
}

/// Server side codec: decodes [`ClientFrame`]s, encodes [`ServerFrame`]s.
#[derive(Debug, Clone)]
pub struct RpcServerCodec {
    max_frame_size: usize,
}

impl RpcServerCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for RpcServerCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for RpcServerCodec {
    type Item = ClientFrame;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.max_frame_size)
    }
}

impl Encoder<ServerFrame> for RpcServerCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: ServerFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst, self.max_frame_size)
    }
}

/// Client side codec: decodes [`ServerFrame`]s, encodes [`ClientFrame`]s.
#[derive(Debug, Clone)]
pub struct RpcClientCodec {
    max_frame_size: usize,
}

impl RpcClientCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }
}

impl Default for RpcClientCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl Decoder for RpcClientCodec {
    type Item = ServerFrame;
    type Error = anyhow::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        decode_frame(src, self.max_frame_size)
    }
}

impl Encoder<ClientFrame> for RpcClientCodec {
    type Error = anyhow::Error;

    fn encode(&mut self, item: ClientFrame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        encode_frame(&item, dst, self.max_frame_size)
    }
}
