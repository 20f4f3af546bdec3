//! Record codecs.
//!
//! The container never looks inside a frame or the metadata record; it only stores the bytes a
//! [`TraceCodec`] produces and hands the same bytes back to the codec when reading.

use std::fmt;
use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CodecError;

/// Serialize/parse capability for the per-frame record type and the trace-level metadata type.
pub trait TraceCodec {
    type Frame;
    type Meta;

    fn encode_frame(&self, frame: &Self::Frame) -> Result<Vec<u8>, CodecError>;
    fn decode_frame(&self, bytes: &[u8]) -> Result<Self::Frame, CodecError>;

    fn encode_meta(&self, meta: &Self::Meta) -> Result<Vec<u8>, CodecError>;
    fn decode_meta(&self, bytes: &[u8]) -> Result<Self::Meta, CodecError>;
}

/// Identity codec: frames and metadata are plain byte buffers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl TraceCodec for RawCodec {
    type Frame = Vec<u8>;
    type Meta = Vec<u8>;

    fn encode_frame(&self, frame: &Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(frame.clone())
    }

    fn decode_frame(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }

    fn encode_meta(&self, meta: &Vec<u8>) -> Result<Vec<u8>, CodecError> {
        Ok(meta.clone())
    }

    fn decode_meta(&self, bytes: &[u8]) -> Result<Vec<u8>, CodecError> {
        Ok(bytes.to_vec())
    }
}

/// Stores frames and metadata as JSON documents.
pub struct JsonCodec<F, M> {
    _marker: PhantomData<fn() -> (F, M)>,
}

impl<F, M> JsonCodec<F, M> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<F, M> Default for JsonCodec<F, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F, M> Clone for JsonCodec<F, M> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<F, M> fmt::Debug for JsonCodec<F, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonCodec").finish()
    }
}

impl<F, M> TraceCodec for JsonCodec<F, M>
where
    F: Serialize + DeserializeOwned,
    M: Serialize + DeserializeOwned,
{
    type Frame = F;
    type Meta = M;

    fn encode_frame(&self, frame: &F) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(frame)?)
    }

    fn decode_frame(&self, bytes: &[u8]) -> Result<F, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn encode_meta(&self, meta: &M) -> Result<Vec<u8>, CodecError> {
        Ok(serde_json::to_vec(meta)?)
    }

    fn decode_meta(&self, bytes: &[u8]) -> Result<M, CodecError> {
        Ok(serde_json::from_slice(bytes)?)
    }
}
