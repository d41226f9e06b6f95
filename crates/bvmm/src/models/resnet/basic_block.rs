//! # Basic Block
//!
//! [`BasicBlock`] is the two-convolution `ResNet` unit: two 3x3x3
//! conv/norm/act groups, with the block activation applied after the
//! shortcut addition.
//!
//! [`BasicBlockMeta`] defines a common meta API for [`BasicBlock`]
//! and [`BasicBlockConfig`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{AbstractCNA3dConfig, CNA3d, CNA3dConfig, CNA3dMeta};
use crate::models::resnet::downsample::{Downsample, DownsampleConfig, ShortcutStrategy};
use crate::models::resnet::util::{conv3x3x3, stride_div_output_size};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::BatchNormConfig;
use burn::prelude::{Backend, Config, Module, Tensor};

/// Channel expansion factor for [`BasicBlock`].
pub const BASIC_EXPANSION: usize = 1;

/// [`BasicBlock`] Meta trait.
pub trait BasicBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The nominal channel width of the block.
    fn planes(&self) -> usize;

    /// The stride of the convolution path.
    ///
    /// Affects downsample behavior.
    fn stride(&self) -> usize;

    /// The size of the out channels dimension.
    ///
    /// Basic blocks do not expand: ``out_planes = planes``.
    fn out_planes(&self) -> usize {
        self.planes() * BASIC_EXPANSION
    }

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

/// [`BasicBlock`] Config.
///
/// Implements [`BasicBlockMeta`].
#[derive(Config, Debug)]
pub struct BasicBlockConfig {
    /// The size of the in channels dimension.
    pub in_planes: usize,

    /// The nominal channel width of the block.
    pub planes: usize,

    /// The stride of the convolution path.
    #[config(default = 1)]
    pub stride: usize,

    /// The shortcut strategy used when the shapes differ.
    #[config(default = "ShortcutStrategy::Projection")]
    pub shortcut: ShortcutStrategy,

    /// [`crate::compat::normalization_wrapper::Normalization`] config.
    ///
    /// The feature size of this config will be replaced
    /// with the appropriate feature size for each layer.
    #[config(default = "NormalizationConfig::Batch(BatchNormConfig::new(0))")]
    pub normalization: NormalizationConfig,

    /// [`crate::compat::activation_wrapper::Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub activation: ActivationConfig,
}

impl BasicBlockMeta for BasicBlockConfig {
    fn in_planes(&self) -> usize {
        self.in_planes
    }

    fn planes(&self) -> usize {
        self.planes
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl BasicBlockConfig {
    /// Initialize a [`BasicBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BasicBlock<B> {
        let in_planes = self.in_planes();
        let planes = self.planes();
        let out_planes = self.out_planes();
        let stride = self.stride();

        let downsample = DownsampleConfig::for_block(
            self.shortcut,
            in_planes,
            out_planes,
            stride,
            self.normalization.clone(),
        );

        let cna_builder = AbstractCNA3dConfig {
            norm: self.normalization.clone(),
            act: self.activation.clone(),
        };

        let cna1: CNA3dConfig = cna_builder.build_config(conv3x3x3(in_planes, planes, stride));

        let cna2: CNA3dConfig = cna_builder.build_config(conv3x3x3(planes, out_planes, 1));

        BasicBlock {
            downsample: downsample.map(|cfg| cfg.init(device)),
            cna1: cna1.init(device),
            cna2: cna2.init(device),
        }
    }
}

/// Basic Block for `ResNet`.
///
/// Implements [`BasicBlockMeta`].
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    /// Optional downsample layer for the residual connection.
    pub downsample: Option<Downsample<B>>,

    /// First Conv/Norm/Act group.
    pub cna1: CNA3d<B>,

    /// Second Conv/Norm/Act group.
    pub cna2: CNA3d<B>,
}

impl<B: Backend> BasicBlockMeta for BasicBlock<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn planes(&self) -> usize {
        self.cna1.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna1.stride()[0]
    }

    fn out_planes(&self) -> usize {
        self.cna2.out_channels()
    }
}

impl<B: Backend> BasicBlock<B> {
    /// Forward Pass.
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
        let [batch, out_depth, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_planes",
                "in_depth" = "out_depth" * "stride",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_depth", "out_height", "out_width"],
            &[("in_planes", self.in_planes()), ("stride", self.stride())],
        );

        let shortcut = match &self.downsample {
            Some(downsample) => downsample.forward(input.clone()),
            None => input.clone(),
        };

        let x = self.cna1.forward(input);

        // The block activation runs after the residual addition.
        let x = self.cna2.hook_forward(x, |x| x + shortcut);

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_depth", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
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
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_basic_block_config() {
        let config = BasicBlockConfig::new(16, 32);
        assert_eq!(config.in_planes(), 16);
        assert_eq!(config.planes(), 32);
        assert_eq!(config.out_planes(), 32);
        assert_eq!(config.stride(), 1);
        assert_eq!(config.output_size([4, 16, 16]), [4, 16, 16]);

        let config = config.with_stride(2);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_size([4, 16, 16]), [2, 8, 8]);
    }

    #[test]
    fn test_basic_block_meta() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(2, 2).init(&device);

        assert_eq!(block.in_planes(), 2);
        assert_eq!(block.out_planes(), 2);
        assert_eq!(block.stride(), 1);
        assert!(block.downsample.is_none());
    }

    #[test]
    fn test_basic_block_forward_identity_shortcut() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let batch_size = 2;
        let planes = 4;

        let block: BasicBlock<B> = BasicBlockConfig::new(planes, planes).init(&device);

        let input = Tensor::ones([batch_size, planes, 4, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_depth", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", planes),
                ("out_depth", 4),
                ("out_height", 8),
                ("out_width", 8)
            ],
        );
    }

    #[test]
    fn test_basic_block_forward_projection_shortcut() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let batch_size = 2;

        let block: BasicBlock<B> = BasicBlockConfig::new(2, 4).with_stride(2).init(&device);
        assert!(matches!(block.downsample, Some(Downsample::Conv(_))));

        let [out_depth, out_height, out_width] = block.output_size([4, 8, 8]);

        let input = Tensor::ones([batch_size, 2, 4, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_depth", "out_height", "out_width"],
            &output,
            &[
                ("batch", batch_size),
                ("out_planes", 4),
                ("out_depth", out_depth),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );
    }

    #[test]
    fn test_basic_block_forward_zero_pad_shortcut() {
        type B = NdArray<f32>;
        let device = Default::default();

        let block: BasicBlock<B> = BasicBlockConfig::new(2, 4)
            .with_stride(2)
            .with_shortcut(ShortcutStrategy::ZeroPad)
            .init(&device);

        match &block.downsample {
            Some(downsample @ Downsample::ZeroPad(_)) => {
                // Strategy does not add trainable state to the shortcut.
                assert_eq!(downsample.num_params(), 0);
            }
            _ => panic!("expected a zero-pad shortcut"),
        }

        let input = Tensor::ones([2, 2, 4, 8, 8], &device);
        let output = block.forward(input);

        assert_shape_contract!(
            ["batch", "out_planes", "out_depth", "out_height", "out_width"],
            &output,
            &[
                ("batch", 2),
                ("out_planes", 4),
                ("out_depth", 2),
                ("out_height", 4),
                ("out_width", 4)
            ],
        );
    }
}
