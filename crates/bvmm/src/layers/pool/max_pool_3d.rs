//! # `MaxPool3d`
//!
//! Volumetric max pooling, composed from two [`max_pool2d`] passes.
//! Max over a box window is axis-separable, so pooling ``(height, width)``
//! per frame and then ``depth`` per location is exact.

use crate::layers::pool::pooled_extent;
use burn::prelude::{Backend, Config, Module, Tensor};
use burn::tensor::module::max_pool2d;

/// [`MaxPool3d`] Config.
#[derive(Config, Debug)]
pub struct MaxPool3dConfig {
    /// The size of the kernel, as ``[depth, height, width]``.
    pub kernel_size: [usize; 3],

    /// The strides, as ``[depth, height, width]``.
    #[config(default = "[1, 1, 1]")]
    pub strides: [usize; 3],

    /// The padding, as ``[depth, height, width]``.
    #[config(default = "[0, 0, 0]")]
    pub padding: [usize; 3],
}

impl MaxPool3dConfig {
    /// Initialize a [`MaxPool3d`] layer.
    pub fn init(self) -> MaxPool3d {
        MaxPool3d {
            kernel_size: self.kernel_size,
            strides: self.strides,
            padding: self.padding,
        }
    }
}

/// Volumetric max pooling layer.
///
/// Padded positions never win a window unless the window is entirely
/// padding, which is ruled out by ``padding < kernel_size``.
#[derive(Module, Clone, Debug)]
pub struct MaxPool3d {
    /// The size of the kernel.
    pub kernel_size: [usize; 3],

    /// The strides.
    pub strides: [usize; 3],

    /// The padding.
    pub padding: [usize; 3],
}

impl MaxPool3d {
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

        // Pool (height, width) per frame, folding depth into the batch dim.
        let x = input
            .swap_dims(1, 2)
            .reshape([batch * depth, channels, height, width]);
        let x = max_pool2d(x, [kh, kw], [sh, sw], [ph, pw], [1, 1]);
        let [_, _, out_height, out_width] = x.dims();
        let x = x
            .reshape([batch, depth, channels, out_height, out_width])
            .swap_dims(1, 2);

        // Pool depth, folding (height, width) into one dim.
        let x = x.reshape([batch, channels, depth, out_height * out_width]);
        let x = max_pool2d(x, [kd, 1], [sd, 1], [pd, 0], [1, 1]);
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
    fn test_max_pool_3d_config() {
        let config = MaxPool3dConfig::new([3, 3, 3]);
        assert_eq!(config.strides, [1, 1, 1]);
        assert_eq!(config.padding, [0, 0, 0]);

        let pool = config
            .with_strides([2, 2, 2])
            .with_padding([1, 1, 1])
            .init();
        assert_eq!(pool.output_size([8, 8, 8]), [4, 4, 4]);
        assert_eq!(pool.output_size([7, 9, 16]), [4, 5, 8]);
    }

    #[test]
    fn test_max_pool_3d_forward_shape() {
        type B = NdArray<f32>;
        let device = Default::default();

        let pool = MaxPool3dConfig::new([3, 3, 3])
            .with_strides([2, 2, 2])
            .with_padding([1, 1, 1])
            .init();

        let input = Tensor::<B, 5>::ones([2, 3, 8, 8, 8], &device);
        let output = pool.forward(input);

        assert_shape_contract!(
            ["batch", "channels", "out_depth", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("channels", 3),
                ("out_depth", 4),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }

    #[test]
    fn test_max_pool_3d_forward_values() {
        type B = NdArray<f32>;
        let device = Default::default();

        let data: Vec<f32> = (0..8).map(|v| v as f32).collect();
        let input = Tensor::<B, 5>::from_data(TensorData::new(data, [1, 1, 2, 2, 2]), &device);

        let pool = MaxPool3dConfig::new([2, 2, 2]).with_strides([2, 2, 2]).init();
        let output = pool.forward(input);

        assert_eq!(output.dims(), [1, 1, 1, 1, 1]);
        let value: f32 = output.into_scalar();
        assert_eq!(value, 7.0);
    }
}
