//! # Residual Block Wrapper
//!
//! A residual unit is either a [`BasicBlock`] or a [`BottleneckBlock`];
//! the two forms differ in their internal convolution count and their
//! channel expansion factor.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::models::resnet::basic_block::{BasicBlock, BasicBlockConfig, BasicBlockMeta};
use crate::models::resnet::bottleneck_block::{
    BottleneckBlock, BottleneckBlockConfig, BottleneckBlockMeta,
};
use crate::models::resnet::downsample::ShortcutStrategy;
use crate::models::resnet::util::stride_div_output_size;
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`ResidualBlock`] Meta API.
pub trait ResidualBlockMeta {
    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// The stride of the convolution path.
    fn stride(&self) -> usize;

    /// Get the output volume for a given input volume.
    ///
    /// The input must be a multiple of the stride on every axis.
    ///
    /// # Arguments
    ///
    /// - `input_size`: ``[in_depth, in_height, in_width]``.
    ///
    /// # Returns
    ///
    /// ``[out_depth, out_height, out_width]``
    ///
    /// # Panics
    ///
    /// If the input volume is not a multiple of the stride.
    fn output_size(
        &self,
        input_size: [usize; 3],
    ) -> [usize; 3] {
        stride_div_output_size(input_size, self.stride())
    }
}

/// [`ResidualBlock`] Config.
#[derive(Config, Debug)]
pub enum ResidualBlockConfig {
    /// A [`BasicBlock`] config.
    Basic(BasicBlockConfig),

    /// A [`BottleneckBlock`] config.
    Bottleneck(BottleneckBlockConfig),
}

impl From<BasicBlockConfig> for ResidualBlockConfig {
    fn from(config: BasicBlockConfig) -> Self {
        Self::Basic(config)
    }
}

impl From<BottleneckBlockConfig> for ResidualBlockConfig {
    fn from(config: BottleneckBlockConfig) -> Self {
        Self::Bottleneck(config)
    }
}

impl ResidualBlockMeta for ResidualBlockConfig {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.in_planes(),
            Self::Bottleneck(config) => config.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(config) => config.out_planes(),
            Self::Bottleneck(config) => config.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(config) => config.stride(),
            Self::Bottleneck(config) => config.stride(),
        }
    }
}

impl ResidualBlockConfig {
    /// Build a block config of the given form.
    ///
    /// # Arguments
    ///
    /// - `in_planes`: input channel count.
    /// - `planes`: nominal width; bottleneck blocks expand it by 4.
    /// - `stride`: the block stride.
    /// - `bottleneck`: select [`BottleneckBlock`] over [`BasicBlock`].
    pub fn build(
        in_planes: usize,
        planes: usize,
        stride: usize,
        bottleneck: bool,
    ) -> Self {
        if bottleneck {
            BottleneckBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .into()
        } else {
            BasicBlockConfig::new(in_planes, planes)
                .with_stride(stride)
                .into()
        }
    }

    /// Set the shortcut strategy.
    pub fn with_shortcut(
        self,
        shortcut: ShortcutStrategy,
    ) -> Self {
        match self {
            Self::Basic(config) => config.with_shortcut(shortcut).into(),
            Self::Bottleneck(config) => config.with_shortcut(shortcut).into(),
        }
    }

    /// Set the normalization config.
    pub fn with_normalization(
        self,
        normalization: NormalizationConfig,
    ) -> Self {
        match self {
            Self::Basic(config) => config.with_normalization(normalization).into(),
            Self::Bottleneck(config) => config.with_normalization(normalization).into(),
        }
    }

    /// Set the activation config.
    pub fn with_activation(
        self,
        activation: ActivationConfig,
    ) -> Self {
        match self {
            Self::Basic(config) => config.with_activation(activation).into(),
            Self::Bottleneck(config) => config.with_activation(activation).into(),
        }
    }

    /// Initialize a [`ResidualBlock`].
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ResidualBlock<B> {
        match self {
            Self::Basic(config) => ResidualBlock::Basic(config.clone().init(device)),
            Self::Bottleneck(config) => ResidualBlock::Bottleneck(config.clone().init(device)),
        }
    }
}

/// A [`BasicBlock`] or [`BottleneckBlock`] wrapper.
#[derive(Module, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ResidualBlock<B: Backend> {
    /// A [`BasicBlock`].
    Basic(BasicBlock<B>),

    /// A [`BottleneckBlock`].
    Bottleneck(BottleneckBlock<B>),
}

impl<B: Backend> From<BasicBlock<B>> for ResidualBlock<B> {
    fn from(block: BasicBlock<B>) -> Self {
        Self::Basic(block)
    }
}

impl<B: Backend> From<BottleneckBlock<B>> for ResidualBlock<B> {
    fn from(block: BottleneckBlock<B>) -> Self {
        Self::Bottleneck(block)
    }
}

impl<B: Backend> ResidualBlockMeta for ResidualBlock<B> {
    fn in_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.in_planes(),
            Self::Bottleneck(block) => block.in_planes(),
        }
    }

    fn out_planes(&self) -> usize {
        match self {
            Self::Basic(block) => block.out_planes(),
            Self::Bottleneck(block) => block.out_planes(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Basic(block) => block.stride(),
            Self::Bottleneck(block) => block.stride(),
        }
    }
}

impl<B: Backend> ResidualBlock<B> {
    /// Apply the wrapped block to the input.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_planes, in_depth=out_depth*stride, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes, out_depth, out_height, out_width]`` tensor.
    pub fn forward(
        &self,
        input: Tensor<B, 5>,
    ) -> Tensor<B, 5> {
        match self {
            Self::Basic(block) => block.forward(input),
            Self::Bottleneck(block) => block.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_residual_block_config() {
        {
            let cfg = ResidualBlockConfig::build(16, 32, 2, false);
            assert!(matches!(cfg, ResidualBlockConfig::Basic(_)));
            assert_eq!(cfg.in_planes(), 16);
            assert_eq!(cfg.out_planes(), 32);
            assert_eq!(cfg.stride(), 2);
            assert_eq!(cfg.output_size([4, 20, 20]), [2, 10, 10]);
        }

        {
            let cfg = ResidualBlockConfig::build(16, 32, 2, true);
            assert!(matches!(cfg, ResidualBlockConfig::Bottleneck(_)));
            assert_eq!(cfg.in_planes(), 16);
            assert_eq!(cfg.out_planes(), 128);
            assert_eq!(cfg.stride(), 2);
        }
    }

    #[test]
    fn test_residual_block_forward() {
        type B = NdArray<f32>;
        let device = Default::default();

        let cfg = ResidualBlockConfig::build(4, 8, 2, false)
            .with_shortcut(ShortcutStrategy::ZeroPad);

        let block: ResidualBlock<B> = cfg.init(&device);
        assert!(matches!(block, ResidualBlock::Basic(_)));
        assert_eq!(block.in_planes(), 4);
        assert_eq!(block.out_planes(), 8);
        assert_eq!(block.stride(), 2);

        let input = Tensor::ones([2, 4, 4, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_depth", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_planes", 8),
                ("out_depth", 2),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }
}
