//! # Input Stem
//!
//! The stem maps raw clips onto the first stage width: a 3x3x3
//! convolution with stride ``(1, 2, 2)``, normalization and activation,
//! then a 3x3x3 max-pool with stride 2. The temporal axis is halved once
//! here (by the pool only); the spatial axes are quartered.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{CNA3d, CNA3dConfig, CNA3dMeta};
use crate::layers::pool::{MaxPool3d, MaxPool3dConfig};
use crate::models::resnet::util::{CONV_INTO_RELU_INITIALIZER, scalar_to_array};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::Conv3dConfig;
use burn::nn::{BatchNormConfig, PaddingConfig3d};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`ResNetStem`] Configuration.
#[derive(Config, Debug)]
pub struct ResNetStemConfig {
    /// The number of input channels.
    #[config(default = 3)]
    pub in_channels: usize,

    /// The stem output width.
    #[config(default = 64)]
    pub width: usize,

    /// [`crate::compat::normalization_wrapper::Normalization`] config.
    ///
    /// The feature size of this config will be replaced with `width`.
    #[config(default = "NormalizationConfig::Batch(BatchNormConfig::new(0))")]
    pub normalization: NormalizationConfig,

    /// [`crate::compat::activation_wrapper::Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl ResNetStemConfig {
    /// Initialize a [`ResNetStem`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResNetStem<B> {
        let cna = CNA3dConfig::new(
            Conv3dConfig::new([self.in_channels, self.width], scalar_to_array(3))
                .with_stride([1, 2, 2])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .with_bias(false)
                .with_initializer(CONV_INTO_RELU_INITIALIZER.clone()),
            self.normalization,
        )
        .with_act(self.activation);

        let pool = MaxPool3dConfig::new(scalar_to_array(3))
            .with_strides(scalar_to_array(2))
            .with_padding(scalar_to_array(1));

        ResNetStem {
            cna: cna.init(device),
            pool: pool.init(),
        }
    }
}

/// Input stem: conv/norm/act plus max-pool.
#[derive(Module, Debug)]
pub struct ResNetStem<B: Backend> {
    /// Conv/Norm/Act group.
    pub cna: CNA3d<B>,

    /// Stem pooling.
    pub pool: MaxPool3d,
}

impl<B: Backend> ResNetStem<B> {
    /// The number of input channels.
    pub fn in_channels(&self) -> usize {
        self.cna.in_channels()
    }

    /// The stem output width.
    pub fn out_channels(&self) -> usize {
        self.cna.out_channels()
    }

    /// Get the output volume for a given input volume.
    ///
    /// # Arguments
    ///
    /// - `input_size`: ``[in_depth, in_height, in_width]``;
    ///   depth must be even, height and width multiples of 4.
    ///
    /// # Returns
    ///
    /// ``[in_depth / 2, in_height / 4, in_width / 4]``
    pub fn output_size(
        &self,
        input_size: [usize; 3],
    ) -> [usize; 3] {
        unpack_shape_contract!(
            [
                "in_depth" = "out_depth" * "depth_reduction",
                "in_height" = "out_height" * "space_reduction",
                "in_width" = "out_width" * "space_reduction"
            ],
            &input_size,
            &["out_depth", "out_height", "out_width"],
            &[("depth_reduction", 2), ("space_reduction", 4)]
        )
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_channels, in_depth, in_height, in_width]`` tensor;
    ///   depth must be even, height and width multiples of 4.
    ///
    /// # Returns
    ///
    /// A ``[batch, width, in_depth / 2, in_height / 4, in_width / 4]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 5>,
    ) -> Tensor<B, 5> {
        let [batch, out_depth, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "in_depth" = "out_depth" * "depth_reduction",
                "in_height" = "out_height" * "space_reduction",
                "in_width" = "out_width" * "space_reduction"
            ],
            &input,
            &["batch", "out_depth", "out_height", "out_width"],
            &[
                ("in_channels", self.in_channels()),
                ("depth_reduction", 2),
                ("space_reduction", 4),
            ]
        );

        let x = self.cna.forward(input);
        let x = self.pool.forward(x);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_depth", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_depth", out_depth),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_stem_config() {
        let config = ResNetStemConfig::new();
        assert_eq!(config.in_channels, 3);
        assert_eq!(config.width, 64);
    }

    #[test]
    fn test_stem_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let stem: ResNetStem<B> = ResNetStemConfig::new().with_width(8).init(&device);
        assert_eq!(stem.in_channels(), 3);
        assert_eq!(stem.out_channels(), 8);
        assert_eq!(stem.output_size([8, 16, 16]), [4, 4, 4]);

        let input = Tensor::ones([2, 3, 8, 16, 16], &device);
        let output = stem.forward(input);

        assert_shape_contract!(
            ["batch", "out_channels", "out_depth", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_channels", 8),
                ("out_depth", 4),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }
}
