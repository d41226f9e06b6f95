//! # `ResNet` Utilities
use bimm_contracts::unpack_shape_contract;
use burn::nn::conv::Conv3dConfig;
use burn::nn::{Initializer, PaddingConfig3d};

/// Initializer for convolutions feeding a ReLU.
///
/// Kaiming-normal over the fan-out:
/// ``std = sqrt(2 / (kernel_volume * out_channels))``.
pub const CONV_INTO_RELU_INITIALIZER: Initializer = Initializer::KaimingNormal {
    gain: core::f64::consts::SQRT_2,
    fan_out_only: true,
};

/// Broadcast a scalar to a fixed-size array.
#[inline(always)]
pub fn scalar_to_array<const N: usize>(value: usize) -> [usize; N] {
    [value; N]
}

/// 3x3x3 convolution config: padding 1, bias-free, fan-out initialized.
pub fn conv3x3x3(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
) -> Conv3dConfig {
    Conv3dConfig::new([in_channels, out_channels], scalar_to_array(3))
        .with_stride(scalar_to_array(stride))
        .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
        .with_bias(false)
        .with_initializer(CONV_INTO_RELU_INITIALIZER.clone())
}

/// 1x1x1 convolution config: bias-free, fan-out initialized.
pub fn conv1x1x1(
    in_channels: usize,
    out_channels: usize,
    stride: usize,
) -> Conv3dConfig {
    Conv3dConfig::new([in_channels, out_channels], scalar_to_array(1))
        .with_stride(scalar_to_array(stride))
        .with_bias(false)
        .with_initializer(CONV_INTO_RELU_INITIALIZER.clone())
}

/// Get the output volume for a given input volume.
///
/// The input must be a multiple of the stride on every axis.
///
/// # Arguments
///
/// - `input_size`: ``[depth_in, height_in, width_in]``.
///
/// # Returns
///
/// ``[depth_out, height_out, width_out]``
///
/// # Panics
///
/// If the input volume is not a multiple of the stride.
#[inline(always)]
pub fn stride_div_output_size(
    input_size: [usize; 3],
    stride: usize,
) -> [usize; 3] {
    unpack_shape_contract!(
        [
            "depth_in" = "depth_out" * "stride",
            "height_in" = "height_out" * "stride",
            "width_in" = "width_out" * "stride"
        ],
        &input_size,
        &["depth_out", "height_out", "width_out"],
        &[("stride", stride)]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_to_array() {
        assert_eq!(scalar_to_array::<3>(2), [2, 2, 2]);
    }

    #[test]
    fn test_stride_div_output_size() {
        assert_eq!(stride_div_output_size([8, 16, 24], 2), [4, 8, 12]);
        assert_eq!(stride_div_output_size([8, 16, 24], 1), [8, 16, 24]);
    }

    #[test]
    #[should_panic(expected = "7 !~ depth_in=(depth_out*stride)")]
    fn test_stride_div_output_size_panic() {
        stride_div_output_size([7, 8, 8], 2);
    }
}
