//! # Sliding Window Geometry
//!
//! Kernel, stride and padding shared by convolution and pooling.

use crate::nn::LayerError;
use crate::proto::{Message, TextMessage, Value};
use serde::Deserialize;

/// Kernel size, stride and padding along width and height.
///
/// Deserializes from the dumped config keys `kW kH dW dH pW pH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Window {
    #[serde(rename = "kW")]
    pub kernel_w: usize,
    #[serde(rename = "kH")]
    pub kernel_h: usize,
    #[serde(rename = "dW", default = "one")]
    pub stride_w: usize,
    #[serde(rename = "dH", default = "one")]
    pub stride_h: usize,
    #[serde(rename = "pW", default)]
    pub pad_w: usize,
    #[serde(rename = "pH", default)]
    pub pad_h: usize,
}

fn one() -> usize {
    1
}

/// Field numbers of the window fields inside a `*_param` message.
#[derive(Debug, Clone, Copy)]
pub struct WindowFields {
    pub kernel_h: u32,
    pub kernel_w: u32,
    pub stride_h: u32,
    pub stride_w: u32,
    pub pad_h: u32,
    pub pad_w: u32,
}

pub const CONVOLUTION_FIELDS: WindowFields = WindowFields {
    pad_h: 9,
    pad_w: 10,
    kernel_h: 11,
    kernel_w: 12,
    stride_h: 13,
    stride_w: 14,
};

pub const POOLING_FIELDS: WindowFields = WindowFields {
    kernel_h: 5,
    kernel_w: 6,
    stride_h: 7,
    stride_w: 8,
    pad_h: 9,
    pad_w: 10,
};

/// Reads an explicit `*_h`/`*_w` pair, falling back to the repeated
/// square form (`kernel_size: 3` or `kernel_size: 3 kernel_size: 5`).
fn pair(
    param: &TextMessage,
    h_name: &str,
    w_name: &str,
    square: &str,
    default: Option<usize>,
) -> Result<Option<(usize, usize)>, LayerError> {
    let h = param.number::<usize>(h_name)?;
    let w = param.number::<usize>(w_name)?;
    if let (Some(h), Some(w)) = (h, w) {
        return Ok(Some((h, w)));
    }
    let squares = param.numbers::<usize>(square)?;
    let (sh, sw) = match squares.as_slice() {
        [] => (default, default),
        [s] => (Some(*s), Some(*s)),
        [sh, sw, ..] => (Some(*sh), Some(*sw)),
    };
    Ok(match (h.or(sh), w.or(sw)) {
        (Some(h), Some(w)) => Some((h, w)),
        _ => None,
    })
}

impl Window {
    /// Reads the window from a `convolution_param` or `pooling_param` block.
    pub fn from_text(param: &TextMessage) -> Result<Self, LayerError> {
        let (kernel_h, kernel_w) = pair(param, "kernel_h", "kernel_w", "kernel_size", None)?
            .ok_or(LayerError::MissingParam("kernel_h/kernel_w"))?;
        let (stride_h, stride_w) = pair(param, "stride_h", "stride_w", "stride", Some(1))?.unwrap_or((1, 1));
        let (pad_h, pad_w) = pair(param, "pad_h", "pad_w", "pad", Some(0))?.unwrap_or((0, 0));
        Ok(Window {
            kernel_w,
            kernel_h,
            stride_w,
            stride_h,
            pad_w,
            pad_h,
        })
    }

    /// Appends the six window fields in field-number order.
    pub fn extend_message(&self, message: &mut Message, fields: &WindowFields) {
        let mut entries = [
            ("kernel_h", fields.kernel_h, self.kernel_h),
            ("kernel_w", fields.kernel_w, self.kernel_w),
            ("stride_h", fields.stride_h, self.stride_h),
            ("stride_w", fields.stride_w, self.stride_w),
            ("pad_h", fields.pad_h, self.pad_h),
            ("pad_w", fields.pad_w, self.pad_w),
        ];
        entries.sort_by_key(|&(_, number, _)| number);
        for (name, number, value) in entries {
            message.push(name, number, Value::UInt(value as u64));
        }
    }

    fn validate(&self) -> Result<(), LayerError> {
        if self.kernel_h == 0 || self.kernel_w == 0 {
            return Err(LayerError::Geometry("kernel size must be positive".to_string()));
        }
        if self.stride_h == 0 || self.stride_w == 0 {
            return Err(LayerError::Geometry("stride must be positive".to_string()));
        }
        Ok(())
    }

    /// Convolution output size: `(in + 2 * pad - kernel) / stride + 1`.
    pub fn conv_output(&self, height: usize, width: usize) -> Result<(usize, usize), LayerError> {
        self.validate()?;
        let dim = |input: usize, kernel: usize, stride: usize, pad: usize| -> Result<usize, LayerError> {
            let padded = padded_extent(input, pad)?;
            if padded < kernel {
                return Err(LayerError::Geometry(format!(
                    "kernel {} larger than padded input {}",
                    kernel, padded
                )));
            }
            Ok((padded - kernel) / stride + 1)
        };
        Ok((
            dim(height, self.kernel_h, self.stride_h, self.pad_h)?,
            dim(width, self.kernel_w, self.stride_w, self.pad_w)?,
        ))
    }

    /// Pooling output size. Rounds up, then drops a last window that would
    /// start inside the padding.
    pub fn pool_output(&self, height: usize, width: usize) -> Result<(usize, usize), LayerError> {
        self.validate()?;
        if self.pad_h >= self.kernel_h || self.pad_w >= self.kernel_w {
            return Err(LayerError::Geometry("padding must be smaller than the kernel".to_string()));
        }
        let padded = self.pad_h > 0 || self.pad_w > 0;
        let dim = |input: usize, kernel: usize, stride: usize, pad: usize| -> Result<usize, LayerError> {
            let span = padded_extent(input, pad)?;
            if span < kernel {
                return Err(LayerError::Geometry(format!(
                    "kernel {} larger than padded input {}",
                    kernel, span
                )));
            }
            let mut pooled = (span - kernel).div_ceil(stride) + 1;
            // `input + 2 * pad` fits, so `input + pad` does too.
            let last_start = (pooled - 1).checked_mul(stride);
            if padded && last_start.map_or(true, |start| start >= input + pad) {
                pooled -= 1;
            }
            Ok(pooled)
        };
        Ok((
            dim(height, self.kernel_h, self.stride_h, self.pad_h)?,
            dim(width, self.kernel_w, self.stride_w, self.pad_w)?,
        ))
    }
}

/// `input + 2 * pad`, or a geometry error when it does not fit a `usize`.
fn padded_extent(input: usize, pad: usize) -> Result<usize, LayerError> {
    pad.checked_mul(2)
        .and_then(|both| input.checked_add(both))
        .ok_or_else(|| LayerError::Geometry(format!("padding {} on input {} overflows", pad, input)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(k: usize, s: usize, p: usize) -> Window {
        Window {
            kernel_w: k,
            kernel_h: k,
            stride_w: s,
            stride_h: s,
            pad_w: p,
            pad_h: p,
        }
    }

    #[test]
    fn test_conv_output() {
        assert_eq!(window(3, 1, 1).conv_output(32, 32).unwrap(), (32, 32));
        assert_eq!(window(5, 2, 0).conv_output(28, 28).unwrap(), (12, 12));
        assert!(window(5, 1, 0).conv_output(3, 3).is_err());
    }

    #[test]
    fn test_pool_output_rounds_up() {
        // ceil((7 - 2) / 2) + 1 = 4
        assert_eq!(window(2, 2, 0).pool_output(7, 7).unwrap(), (4, 4));
        assert_eq!(window(2, 2, 0).pool_output(8, 8).unwrap(), (4, 4));
        // 3x3/2 pad 1 on 8: ceil(7 / 2) + 1 = 5, (5-1)*2 = 8 >= 9? no -> 5
        assert_eq!(window(3, 2, 1).pool_output(8, 8).unwrap(), (5, 5));
    }

    #[test]
    fn test_pool_output_clips_padding_window() {
        // 2x2/2 pad 1 on 4: ceil(4 / 2) + 1 = 3, (3-1)*2 = 4 >= 5? no -> 3
        assert_eq!(window(2, 2, 1).pool_output(4, 4).unwrap(), (3, 3));
        // 3x3/3 pad 1 on 3: ceil(2 / 3) + 1 = 2, (2-1)*3 = 3 >= 4? no -> 2
        assert_eq!(window(3, 3, 1).pool_output(3, 3).unwrap(), (2, 2));
        // 3x3/2 pad 1 on 5: ceil(4 / 2) + 1 = 3, (3-1)*2 = 4 >= 6? no -> 3
        assert_eq!(window(3, 2, 1).pool_output(5, 5).unwrap(), (3, 3));
        // 2x2/1 pad 1 on 1: ceil(1 / 1) + 1 = 2, (2-1)*1 = 1 >= 2? no -> 2
        assert_eq!(window(2, 1, 1).pool_output(1, 1).unwrap(), (2, 2));
        // 3x3/4 pad 2 on 2: ceil(3 / 4) + 1 = 2, (2-1)*4 = 4 >= 4 -> 1
        assert_eq!(window(3, 4, 2).pool_output(2, 2).unwrap(), (1, 1));
    }

    #[test]
    fn test_invalid_pool_padding() {
        assert!(window(2, 2, 2).pool_output(8, 8).is_err());
        assert!(window(2, 0, 0).pool_output(8, 8).is_err());
    }

    #[test]
    fn test_oversized_geometry_is_an_error() {
        let huge = window(3, 1, usize::MAX / 2 + 1);
        assert!(matches!(huge.conv_output(8, 8), Err(LayerError::Geometry(_))));
        assert!(matches!(window(3, 1, 1).conv_output(usize::MAX, 8), Err(LayerError::Geometry(_))));

        let mut pool = window(usize::MAX, 1, usize::MAX / 2);
        pool.kernel_h = 2;
        pool.pad_h = 1;
        assert!(matches!(pool.pool_output(8, 8), Err(LayerError::Geometry(_))));
        assert!(matches!(window(3, 2, 1).pool_output(usize::MAX - 1, 8), Err(LayerError::Geometry(_))));
    }

    #[test]
    fn test_deserialize_defaults() {
        let w: Window = serde_json::from_str(r#"{"kW": 3, "kH": 5}"#).unwrap();
        assert_eq!((w.kernel_w, w.kernel_h, w.stride_w, w.pad_h), (3, 5, 1, 0));
    }

    #[test]
    fn test_from_text_square_form() {
        let param = TextMessage::parse("kernel_size: 3 stride: 2").unwrap();
        let w = Window::from_text(&param).unwrap();
        assert_eq!(w, window(3, 2, 0));

        let param = TextMessage::parse("stride: 2").unwrap();
        assert!(Window::from_text(&param).is_err());
    }

    #[test]
    fn test_extend_message_order() {
        let mut msg = Message::new();
        window(3, 1, 0).extend_message(&mut msg, &POOLING_FIELDS);
        let numbers: Vec<u32> = msg.fields().iter().map(|f| f.number).collect();
        assert_eq!(numbers, vec![5, 6, 7, 8, 9, 10]);
    }
}
