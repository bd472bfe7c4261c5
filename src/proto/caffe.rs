//! # Caffe Message Schema
//!
//! Field numbers from Caffe's `caffe.proto` for the messages this crate
//! writes, plus a decoder that summarizes a `.caffemodel` file.

use super::wire::{self, Decoder, FieldValue};
use super::{Message, ProtoError, Value};
use crate::blob::Blob;
use std::path::Path;

/// `NetParameter` fields.
pub mod net_param {
    pub const NAME: u32 = 1;
    pub const LAYER: u32 = 100;
}

/// `LayerParameter` fields.
pub mod layer_param {
    pub const NAME: u32 = 1;
    pub const TYPE: u32 = 2;
    pub const BOTTOM: u32 = 3;
    pub const TOP: u32 = 4;
    pub const BLOBS: u32 = 7;
    pub const PHASE: u32 = 10;
    pub const CONVOLUTION_PARAM: u32 = 106;
    pub const DUMMY_DATA_PARAM: u32 = 109;
    pub const INNER_PRODUCT_PARAM: u32 = 117;
    pub const POOLING_PARAM: u32 = 121;
    pub const BATCH_NORM_PARAM: u32 = 139;
    pub const SCALE_PARAM: u32 = 142;
}

/// `BlobProto` fields. `NUM`..`WIDTH` are the legacy 4-D shape.
pub mod blob_proto {
    pub const NUM: u32 = 1;
    pub const CHANNELS: u32 = 2;
    pub const HEIGHT: u32 = 3;
    pub const WIDTH: u32 = 4;
    pub const DATA: u32 = 5;
    pub const SHAPE: u32 = 7;
}

/// `BlobShape` fields.
pub mod blob_shape {
    pub const DIM: u32 = 1;
}

/// `Phase` enum value written for every layer of a saved model.
pub const PHASE_TEST: Value = Value::Enum("TEST", 1);

/// Builds a `BlobShape` message.
pub fn shape_message(dims: &[usize]) -> Message {
    let dims = dims.iter().map(|&d| d as i64).collect();
    Message::new().with("dim", blob_shape::DIM, Value::PackedInt64(dims))
}

/// Builds a `BlobProto` message holding the blob's shape and data.
pub fn blob_message(blob: &Blob) -> Message {
    Message::new()
        .with("shape", blob_proto::SHAPE, Value::Message(shape_message(blob.shape())))
        .with("data", blob_proto::DATA, Value::PackedFloat(blob.to_vec()))
}

// --- Decoding ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlobSummary {
    pub shape: Vec<i64>,
    pub data: Vec<f32>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerSummary {
    pub name: String,
    pub layer_type: String,
    pub bottoms: Vec<String>,
    pub tops: Vec<String>,
    pub blobs: Vec<BlobSummary>,
}

/// The parts of a `NetParameter` needed to check a converted model.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelSummary {
    pub name: String,
    pub layers: Vec<LayerSummary>,
}

impl ModelSummary {
    /// Decodes a binary `NetParameter`. Unknown fields are skipped.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtoError> {
        let mut summary = ModelSummary::default();
        let mut dec = Decoder::new(bytes);
        while let Some((field, value)) = dec.next_field()? {
            match field {
                net_param::NAME => summary.name = wire::read_string(field, value)?,
                net_param::LAYER => summary.layers.push(decode_layer(expect_bytes(field, value)?)?),
                _ => {}
            }
        }
        Ok(summary)
    }

    /// Reads and decodes a `.caffemodel` file.
    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self, ProtoError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::decode(&bytes)
    }

    pub fn layer(&self, name: &str) -> Option<&LayerSummary> {
        self.layers.iter().find(|l| l.name == name)
    }
}

fn expect_bytes(field: u32, value: FieldValue<'_>) -> Result<&[u8], ProtoError> {
    match value {
        FieldValue::Bytes(b) => Ok(b),
        other => Err(ProtoError::WireTypeMismatch {
            field,
            expected: wire::WIRE_LEN,
            got: other.wire_type(),
        }),
    }
}

fn decode_layer(bytes: &[u8]) -> Result<LayerSummary, ProtoError> {
    let mut layer = LayerSummary::default();
    let mut dec = Decoder::new(bytes);
    while let Some((field, value)) = dec.next_field()? {
        match field {
            layer_param::NAME => layer.name = wire::read_string(field, value)?,
            layer_param::TYPE => layer.layer_type = wire::read_string(field, value)?,
            layer_param::BOTTOM => layer.bottoms.push(wire::read_string(field, value)?),
            layer_param::TOP => layer.tops.push(wire::read_string(field, value)?),
            layer_param::BLOBS => layer.blobs.push(decode_blob(expect_bytes(field, value)?)?),
            _ => {}
        }
    }
    Ok(layer)
}

fn decode_blob(bytes: &[u8]) -> Result<BlobSummary, ProtoError> {
    let mut blob = BlobSummary::default();
    let mut legacy = [None; 4];
    let mut dec = Decoder::new(bytes);
    while let Some((field, value)) = dec.next_field()? {
        match field {
            blob_proto::DATA => wire::read_floats(field, value, &mut blob.data)?,
            blob_proto::SHAPE => {
                let mut shape_dec = Decoder::new(expect_bytes(field, value)?);
                while let Some((f, v)) = shape_dec.next_field()? {
                    if f == blob_shape::DIM {
                        wire::read_varints(f, v, &mut blob.shape)?;
                    }
                }
            }
            blob_proto::NUM | blob_proto::CHANNELS | blob_proto::HEIGHT | blob_proto::WIDTH => {
                let mut dims = Vec::new();
                wire::read_varints(field, value, &mut dims)?;
                legacy[(field - blob_proto::NUM) as usize] = dims.last().copied();
            }
            _ => {}
        }
    }
    if blob.shape.is_empty() && legacy.iter().any(Option::is_some) {
        blob.shape = legacy.iter().map(|d| d.unwrap_or(0)).collect();
    }
    Ok(blob)
}
