//! # Pooling Layer Module

use super::window::{Window, POOLING_FIELDS};
use crate::config::ConfigParams;
use crate::nn::registry::{param_block, parse_params, LayerBuilder};
use crate::nn::{image_dims, Layer, LayerError};
use crate::proto::caffe::layer_param;
use crate::proto::{Message, TextMessage, Value};
use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;
use std::fmt;

/// `PoolingParameter.PoolMethod`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolMethod {
    #[default]
    Max,
    Ave,
    Stochastic,
}

impl PoolMethod {
    pub fn ident(self) -> &'static str {
        match self {
            PoolMethod::Max => "MAX",
            PoolMethod::Ave => "AVE",
            PoolMethod::Stochastic => "STOCHASTIC",
        }
    }

    pub fn number(self) -> i32 {
        match self {
            PoolMethod::Max => 0,
            PoolMethod::Ave => 1,
            PoolMethod::Stochastic => 2,
        }
    }

    /// Accepts the enum identifier in any case, or its number.
    pub fn parse(text: &str) -> Option<Self> {
        match text.to_ascii_uppercase().as_str() {
            "MAX" | "0" => Some(PoolMethod::Max),
            "AVE" | "1" => Some(PoolMethod::Ave),
            "STOCHASTIC" | "2" => Some(PoolMethod::Stochastic),
            _ => None,
        }
    }
}

// Dumped configs carry either the identifier or the enum number.
impl<'de> Deserialize<'de> for PoolMethod {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct PoolMethodVisitor;

        impl<'de> Visitor<'de> for PoolMethodVisitor {
            type Value = PoolMethod;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("MAX, AVE, STOCHASTIC or 0, 1, 2")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<PoolMethod, E> {
                PoolMethod::parse(v).ok_or_else(|| E::invalid_value(de::Unexpected::Str(v), &self))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<PoolMethod, E> {
                PoolMethod::parse(&v.to_string()).ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<PoolMethod, E> {
                PoolMethod::parse(&v.to_string()).ok_or_else(|| E::invalid_value(de::Unexpected::Signed(v), &self))
            }
        }

        deserializer.deserialize_any(PoolMethodVisitor)
    }
}

/// Applies max, average or stochastic pooling over an input image.
///
/// Input shape: `(N, C, H_in, W_in)`
/// Output shape: `(N, C, H_out, W_out)`
#[derive(Debug, Clone, PartialEq)]
pub struct Pooling {
    pub pool: PoolMethod,
    pub window: Window,
}

#[derive(Deserialize)]
struct PoolConfig {
    pool_type: PoolMethod,
    #[serde(flatten)]
    window: Window,
}

impl Layer for Pooling {
    fn type_name(&self) -> &'static str {
        "Pooling"
    }

    fn output_shape(&self, input: &[usize]) -> Result<Vec<usize>, LayerError> {
        let [n, c, h, w] = image_dims(input)?;
        let (out_h, out_w) = self.window.pool_output(h, w)?;
        Ok(vec![n, c, out_h, out_w])
    }

    fn param_message(&self) -> Option<(&'static str, u32, Message)> {
        let mut param = Message::new();
        param.push("pool", 1, Value::Enum(self.pool.ident(), self.pool.number()));
        self.window.extend_message(&mut param, &POOLING_FIELDS);
        Some(("pooling_param", layer_param::POOLING_PARAM, param))
    }
}

impl LayerBuilder for Pooling {
    fn from_config(params: &ConfigParams) -> Result<Self, LayerError> {
        let config: PoolConfig = parse_params(params)?;
        Ok(Pooling {
            pool: config.pool_type,
            window: config.window,
        })
    }

    fn from_text(layer: &TextMessage) -> Result<Self, LayerError> {
        let param = param_block(layer, "pooling_param")?;
        let pool = match param.token("pool")? {
            None => PoolMethod::default(),
            Some(token) => PoolMethod::parse(token).ok_or_else(|| LayerError::InvalidValue {
                field: "pool",
                value: token.to_string(),
            })?,
        };
        Ok(Pooling {
            pool,
            window: Window::from_text(param)?,
        })
    }
}
