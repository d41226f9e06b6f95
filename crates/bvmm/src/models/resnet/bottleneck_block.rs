//! # Bottleneck Block
//!
//! [`BottleneckBlock`] is the three-convolution `ResNet` unit:
//! a 1x1x1 channel reduction, a 3x3x3 convolution carrying the stride,
//! and a 1x1x1 expansion back out to ``planes * 4``.
//!
//! [`BottleneckBlockMeta`] defines a common meta API for
//! [`BottleneckBlock`] and [`BottleneckBlockConfig`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::blocks::cna::{AbstractCNA3dConfig, CNA3d, CNA3dConfig, CNA3dMeta};
use crate::models::resnet::downsample::{Downsample, DownsampleConfig, ShortcutStrategy};
use crate::models::resnet::util::{conv1x1x1, conv3x3x3, stride_div_output_size};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::BatchNormConfig;
use burn::prelude::{Backend, Config, Module, Tensor};

/// Channel expansion factor for [`BottleneckBlock`].
pub const BOTTLENECK_EXPANSION: usize = 4;

/// [`BottleneckBlock`] Meta trait.
pub trait BottleneckBlockMeta {
    /// The size of the in channels dimension.
    fn in_planes(&self) -> usize;

    /// The nominal channel width of the block.
    ///
    /// The two inner convolutions run at this width.
    fn planes(&self) -> usize;

    /// The stride of the convolution path.
    ///
    /// Affects downsample behavior.
    fn stride(&self) -> usize;

    /// The size of the out channels dimension.
    ///
    /// ``out_planes = planes * 4``
    fn out_planes(&self) -> usize {
        self.planes() * BOTTLENECK_EXPANSION
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

/// [`BottleneckBlock`] Config.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Config, Debug)]
pub struct BottleneckBlockConfig {
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

impl BottleneckBlockMeta for BottleneckBlockConfig {
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

impl BottleneckBlockConfig {
    /// Initialize a [`BottleneckBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> BottleneckBlock<B> {
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

        let cna1: CNA3dConfig = cna_builder.build_config(conv1x1x1(in_planes, planes, 1));

        let cna2: CNA3dConfig = cna_builder.build_config(conv3x3x3(planes, planes, stride));

        let cna3: CNA3dConfig = cna_builder.build_config(conv1x1x1(planes, out_planes, 1));

        BottleneckBlock {
            downsample: downsample.map(|cfg| cfg.init(device)),
            cna1: cna1.init(device),
            cna2: cna2.init(device),
            cna3: cna3.init(device),
        }
    }
}

/// Bottleneck Block for `ResNet`.
///
/// Implements [`BottleneckBlockMeta`].
#[derive(Module, Debug)]
pub struct BottleneckBlock<B: Backend> {
    /// Optional downsample layer for the residual connection.
    pub downsample: Option<Downsample<B>>,

    /// Reduction conv/norm/act group.
    pub cna1: CNA3d<B>,

    /// Processing conv/norm/act group; carries the stride.
    pub cna2: CNA3d<B>,

    /// Expansion conv/norm/act group.
    pub cna3: CNA3d<B>,
}

impl<B: Backend> BottleneckBlockMeta for BottleneckBlock<B> {
    fn in_planes(&self) -> usize {
        self.cna1.in_channels()
    }

    fn planes(&self) -> usize {
        self.cna1.out_channels()
    }

    fn stride(&self) -> usize {
        self.cna2.stride()[0]
    }

    fn out_planes(&self) -> usize {
        self.cna3.out_channels()
    }
}

impl<B: Backend> BottleneckBlock<B> {
    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_planes, in_depth=out_depth*stride, in_height=out_height*stride, in_width=out_width*stride]``.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_planes=planes*4, out_depth, out_height, out_width]`` tensor.
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
        let x = self.cna2.forward(x);

        // The block activation runs after the residual addition.
        let x = self.cna3.hook_forward(x, |x| x + shortcut);

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
