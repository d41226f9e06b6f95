//! # `AvgPool3d`
//!
//! Volumetric average pooling, composed from two [`avg_pool2d`] passes.
//! With a constant divisor (padding counted), the mean over a box window
//! factors into a spatial mean followed by a temporal mean, so the
//! composition is exact.

use crate::layers::pool::pooled_extent;
use burn::prelude::{Backend, Config, Module, Tensor};
use burn::tensor::module::avg_pool2d;

/// [`AvgPool3d`] Config.
#[derive(Config, Debug)]
pub struct AvgPool3dConfig {
    /// The size of the kernel, as ``[depth, height, width]``.
    pub kernel_size: [usize; 3],

    /// The strides, as ``[depth, height, width]``.
    #[config(default = "[1, 1, 1]")]
    pub strides: [usize; 3],

    /// The padding, as ``[depth, height, width]``.
    ///
    /// Padded positions count toward the divisor.
    #[config(default = "[0, 0, 0]")]
    pub padding: [usize; 3],
}

impl AvgPool3dConfig {
    /// Initialize a [`AvgPool3d`] layer.
    pub fn init(self) -> AvgPool3d {
        AvgPool3d {
            kernel_size: self.kernel_size,
            strides: self.strides,
            padding: self.padding,
        }
    }
}

/// Volumetric average pooling layer.
#[derive(Module, Clone, Debug)]
pub struct AvgPool3d {
    /// The size of the kernel.
    pub kernel_size: [usize; 3],

    /// The strides.
    pub strides: [usize; 3],

    /// The padding.
    pub padding: [usize; 3],
}

impl AvgPool3d {
    /// Output volume for an input volume.
    pub fn output_size(
        &self,
        input_size: [usize; 3],
    ) -> [usize; 3] {
        let mut out = [0; 3];
        for axis in 0..3 {
            out[axis] = pooled_extent(
                input_size[axis],
                self.kernel_size[axis],
                self.strides[axis],
                self.padding[axis],
            );
        }
        out
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, channels, in_depth, in_height, in_width]`` tensor.
    ///
    /// # Returns
    ///
    /// A ``[batch, channels, out_depth, out_height, out_width]`` tensor.
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 5>,
    ) -> Tensor<B, 5> {
        let [batch, channels, depth, height, width] = input.dims();
        let [kd, kh, kw] = self.kernel_size;
        let [sd, sh, sw] = self.strides;
        let [pd, ph, pw] = self.padding;

        // Mean over (height, width) per frame, folding depth into the batch dim.
        let x = input
            .swap_dims(1, 2)
            .reshape([batch * depth, channels, height, width]);
        let x = avg_pool2d(x, [kh, kw], [sh, sw], [ph, pw], true);
        let [_, _, out_height, out_width] = x.dims();
        let x = x
            .reshape([batch, depth, channels, out_height, out_width])
            .swap_dims(1, 2);

        // Mean over depth, folding (height, width) into one dim.
        let x = x.reshape([batch, channels, depth, out_height * out_width]);
        let x = avg_pool2d(x, [kd, 1], [sd, 1], [pd, 0], true);
        let [_, _, out_depth, _] = x.dims();

        x.reshape([batch, channels, out_depth, out_height, out_width])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    #[test]
    fn test_avg_pool_3d_config() {
        let config = AvgPool3dConfig::new([1, 4, 4]);
        assert_eq!(config.strides, [1, 1, 1]);
        assert_eq!(config.padding, [0, 0, 0]);

        let pool = config.init();
        assert_eq!(pool.output_size([2, 4, 4]), [2, 1, 1]);
    }

    #[test]
    fn test_avg_pool_3d_global_mean() {
        type B = NdArray<f32>;
        let device = Default::default();

        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let input = Tensor::<B, 5>::from_data(TensorData::new(data, [1, 1, 2, 2, 2]), &device);

        let pool = AvgPool3dConfig::new([2, 2, 2]).init();
        let output = pool.forward(input);

        assert_eq!(output.dims(), [1, 1, 1, 1, 1]);
        let value: f32 = output.into_scalar();
        assert_eq!(value, 3.5);
    }

    /// Kernel 1 with a stride subsamples without mixing values.
    #[test]
    fn test_avg_pool_3d_kernel_one_subsample() {
        type B = NdArray<f32>;
        let device = Default::default();

        let data: Vec<f32> = (0..64).map(|v| v as f32).collect();
        let input = Tensor::<B, 5>::from_data(TensorData::new(data, [1, 1, 4, 4, 4]), &device);

        let pool = AvgPool3dConfig::new([1, 1, 1]).with_strides([2, 2, 2]).init();
        let output = pool.forward(input.clone());

        assert_shape_contract!(
            ["batch", "channels", "out_depth", "out_height", "out_width"],
            &output,
            &[
                ("batch", 1),
                ("channels", 1),
                ("out_depth", 2),
                ("out_height", 2),
                ("out_width", 2)
            ],
        );

        // Element [0, 0, 1, 1, 1] of the output is input element [0, 0, 2, 2, 2].
        let expected: f32 = input.narrow(2, 2, 1).narrow(3, 2, 1).narrow(4, 2, 1).into_scalar();
        let value: f32 = output.narrow(2, 1, 1).narrow(3, 1, 1).narrow(4, 1, 1).into_scalar();
        assert_eq!(value, expected);
    }
}
