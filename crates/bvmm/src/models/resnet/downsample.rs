//! # Residual Shortcut Downsampling
//!
//! When a residual block changes channel count or stride, the shortcut
//! path has to be reshaped to match before the addition. Two strategies
//! are supported, selected per-model at construction:
//!
//! * [`ShortcutStrategy::ZeroPad`] - parameter-free; subsample with a
//!   kernel-1 average pool and concatenate zero channels.
//! * [`ShortcutStrategy::Projection`] - a learned 1x1x1 strided
//!   convolution followed by normalization.

use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use crate::layers::pool::{AvgPool3d, AvgPool3dConfig};
use crate::models::resnet::util::{
    CONV_INTO_RELU_INITIALIZER, scalar_to_array, stride_div_output_size,
};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::{Conv3d, Conv3dConfig};
use burn::nn::{BatchNormConfig, Initializer};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Residual shortcut construction strategy, chosen per-model.
#[derive(Config, Copy, Debug, PartialEq, Eq)]
pub enum ShortcutStrategy {
    /// Parameter-free: average-pool subsample, zero-pad new channels.
    ZeroPad,

    /// Learned 1x1x1 strided projection with normalization.
    Projection,
}

/// [`Downsample`] Meta trait.
pub trait DownsampleMeta {
    /// The size of the in channels dimension.
    fn in_channels(&self) -> usize;

    /// The size of the out channels dimension.
    fn out_channels(&self) -> usize;

    /// The stride of the downsample layer.
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

/// [`ConvDownsample`] configuration.
///
/// Implements [`DownsampleMeta`].
#[derive(Config, Debug)]
pub struct ConvDownsampleConfig {
    /// The size of the in channels dimension.
    in_channels: usize,

    /// The size of the out channels dimension.
    out_channels: usize,

    /// The stride of the downsample layer.
    #[config(default = 1)]
    stride: usize,

    /// The [`Normalization`] config.
    ///
    /// The feature size will be auto-matched.
    #[config(default = "NormalizationConfig::Batch(BatchNormConfig::new(0))")]
    norm: NormalizationConfig,

    /// The [`Conv3d`] initializer.
    #[config(default = "CONV_INTO_RELU_INITIALIZER.clone()")]
    pub initializer: Initializer,
}

impl DownsampleMeta for ConvDownsampleConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl ConvDownsampleConfig {
    /// Initialize a [`ConvDownsample`] `Module`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> ConvDownsample<B> {
        ConvDownsample {
            conv: Conv3dConfig::new(
                [self.in_channels, self.out_channels],
                scalar_to_array(1),
            )
            .with_stride(scalar_to_array(self.stride))
            .with_bias(false)
            .with_initializer(self.initializer.clone())
            .init(device),

            norm: self
                .norm
                .clone()
                .with_num_features(self.out_channels)
                .init(device),
        }
    }
}

/// Projection shortcut: 1x1x1 strided conv plus normalization.
///
/// Maps ``[batch, in_channels, in_depth, in_height, in_width]`` to
/// ``[batch, out_channels, out_depth, out_height, out_width]`` tensors.
///
/// Implements [`DownsampleMeta`].
#[derive(Module, Debug)]
pub struct ConvDownsample<B: Backend> {
    /// Projection conv.
    pub conv: Conv3d<B>,

    /// Normalization layer.
    pub norm: Normalization<B>,
}

impl<B: Backend> DownsampleMeta for ConvDownsample<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1]
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn stride(&self) -> usize {
        self.conv.stride[0]
    }
}

impl<B: Backend> ConvDownsample<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, in_depth=out_depth*stride, in_height=out_height*stride, in_width=out_width*stride]``
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_depth, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 5>,
    ) -> Tensor<B, 5> {
        let [batch, out_depth, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "in_depth" = "out_depth" * "stride",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_depth", "out_height", "out_width"],
            &[
                ("in_channels", self.in_channels()),
                ("stride", self.stride())
            ]
        );

        let out = self.conv.forward(input);
        let out = self.norm.forward(out);

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_depth", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_depth", out_depth),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        out
    }
}

/// [`ZeroPadDownsample`] configuration.
///
/// Implements [`DownsampleMeta`].
#[derive(Config, Debug)]
pub struct ZeroPadDownsampleConfig {
    /// The size of the in channels dimension.
    in_channels: usize,

    /// The size of the out channels dimension.
    ///
    /// Must not be smaller than `in_channels`.
    out_channels: usize,

    /// The stride of the downsample layer.
    #[config(default = 1)]
    stride: usize,
}

impl DownsampleMeta for ZeroPadDownsampleConfig {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn stride(&self) -> usize {
        self.stride
    }
}

impl ZeroPadDownsampleConfig {
    /// Initialize a [`ZeroPadDownsample`] `Module`.
    ///
    /// # Panics
    ///
    /// If `out_channels < in_channels`; zero-padding cannot narrow.
    pub fn init(&self) -> ZeroPadDownsample {
        assert!(
            self.out_channels >= self.in_channels,
            "out_channels ({}) < in_channels ({})",
            self.out_channels,
            self.in_channels,
        );
        ZeroPadDownsample {
            in_channels: self.in_channels,
            out_channels: self.out_channels,
            pool: AvgPool3dConfig::new(scalar_to_array(1))
                .with_strides(scalar_to_array(self.stride))
                .init(),
        }
    }
}

/// Parameter-free shortcut: kernel-1 average-pool subsample,
/// then zero-fill the missing channels.
///
/// Implements [`DownsampleMeta`].
#[derive(Module, Clone, Debug)]
pub struct ZeroPadDownsample {
    /// The size of the in channels dimension.
    pub in_channels: usize,

    /// The size of the out channels dimension.
    pub out_channels: usize,

    /// Subsampling pool.
    pub pool: AvgPool3d,
}

impl DownsampleMeta for ZeroPadDownsample {
    fn in_channels(&self) -> usize {
        self.in_channels
    }

    fn out_channels(&self) -> usize {
        self.out_channels
    }

    fn stride(&self) -> usize {
        self.pool.strides[0]
    }
}

impl ZeroPadDownsample {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, in_depth=out_depth*stride, in_height=out_height*stride, in_width=out_width*stride]``
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_depth, out_height, out_width]``
    pub fn forward<B: Backend>(
        &self,
        input: Tensor<B, 5>,
    ) -> Tensor<B, 5> {
        let [batch, out_depth, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "in_depth" = "out_depth" * "stride",
                "in_height" = "out_height" * "stride",
                "in_width" = "out_width" * "stride"
            ],
            &input,
            &["batch", "out_depth", "out_height", "out_width"],
            &[
                ("in_channels", self.in_channels()),
                ("stride", self.stride())
            ]
        );

        let out = self.pool.forward(input);

        let pad_channels = self.out_channels - self.in_channels;
        let out = if pad_channels > 0 {
            let zeros = Tensor::zeros(
                [batch, pad_channels, out_depth, out_height, out_width],
                &out.device(),
            );
            Tensor::cat(vec![out, zeros], 1)
        } else {
            out
        };

        assert_shape_contract_periodically!(
            ["batch", "out_channels", "out_depth", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch),
                ("out_channels", self.out_channels()),
                ("out_depth", out_depth),
                ("out_height", out_height),
                ("out_width", out_width)
            ]
        );

        out
    }
}

/// Shortcut transform config; one variant per [`ShortcutStrategy`].
///
/// Implements [`DownsampleMeta`].
#[derive(Config, Debug)]
pub enum DownsampleConfig {
    /// A [`ConvDownsample`] projection.
    Conv(ConvDownsampleConfig),

    /// A [`ZeroPadDownsample`].
    ZeroPad(ZeroPadDownsampleConfig),
}

impl From<ConvDownsampleConfig> for DownsampleConfig {
    fn from(config: ConvDownsampleConfig) -> Self {
        Self::Conv(config)
    }
}

impl From<ZeroPadDownsampleConfig> for DownsampleConfig {
    fn from(config: ZeroPadDownsampleConfig) -> Self {
        Self::ZeroPad(config)
    }
}

impl DownsampleMeta for DownsampleConfig {
    fn in_channels(&self) -> usize {
        match self {
            Self::Conv(config) => config.in_channels(),
            Self::ZeroPad(config) => config.in_channels(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Conv(config) => config.out_channels(),
            Self::ZeroPad(config) => config.out_channels(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Conv(config) => config.stride(),
            Self::ZeroPad(config) => config.stride(),
        }
    }
}

impl DownsampleConfig {
    /// Build the shortcut transform for a block, if the shapes require one.
    ///
    /// A transform is inserted exactly when
    /// ``stride != 1 || in_channels != out_channels``.
    pub fn for_block(
        strategy: ShortcutStrategy,
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        norm: NormalizationConfig,
    ) -> Option<Self> {
        if stride == 1 && in_channels == out_channels {
            return None;
        }
        Some(match strategy {
            ShortcutStrategy::ZeroPad => ZeroPadDownsampleConfig::new(in_channels, out_channels)
                .with_stride(stride)
                .into(),
            ShortcutStrategy::Projection => ConvDownsampleConfig::new(in_channels, out_channels)
                .with_stride(stride)
                .with_norm(norm)
                .into(),
        })
    }

    /// Initialize a [`Downsample`] `Module`.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Downsample<B> {
        match self {
            Self::Conv(config) => Downsample::Conv(config.init(device)),
            Self::ZeroPad(config) => Downsample::ZeroPad(config.init()),
        }
    }
}

/// Shortcut transform wrapper; one variant per [`ShortcutStrategy`].
///
/// Implements [`DownsampleMeta`].
#[derive(Module, Debug)]
pub enum Downsample<B: Backend> {
    /// A [`ConvDownsample`] projection.
    Conv(ConvDownsample<B>),

    /// A [`ZeroPadDownsample`].
    ZeroPad(ZeroPadDownsample),
}

impl<B: Backend> DownsampleMeta for Downsample<B> {
    fn in_channels(&self) -> usize {
        match self {
            Self::Conv(layer) => layer.in_channels(),
            Self::ZeroPad(layer) => layer.in_channels(),
        }
    }

    fn out_channels(&self) -> usize {
        match self {
            Self::Conv(layer) => layer.out_channels(),
            Self::ZeroPad(layer) => layer.out_channels(),
        }
    }

    fn stride(&self) -> usize {
        match self {
            Self::Conv(layer) => layer.stride(),
            Self::ZeroPad(layer) => layer.stride(),
        }
    }
}

impl<B: Backend> Downsample<B> {
    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, in_depth=out_depth*stride, in_height=out_height*stride, in_width=out_width*stride]``
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_depth, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 5>,
    ) -> Tensor<B, 5> {
        match self {
            Self::Conv(layer) => layer.forward(input),
            Self::ZeroPad(layer) => layer.forward(input),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;
    use burn::module::Module;

    #[test]
    fn test_conv_downsample_config() {
        let config = ConvDownsampleConfig::new(2, 4);
        assert_eq!(config.in_channels(), 2);
        assert_eq!(config.out_channels(), 4);
        assert_eq!(config.stride(), 1);
        assert_eq!(config.output_size([4, 8, 8]), [4, 8, 8]);

        let config = config.with_stride(2);
        assert_eq!(config.stride(), 2);
        assert_eq!(config.output_size([4, 8, 8]), [2, 4, 4]);
    }

    #[test]
    fn test_conv_downsample() {
        type B = NdArray<f32>;
        let device = Default::default();

        let batch_size = 2;

        let downsample: ConvDownsample<B> = ConvDownsampleConfig::new(2, 4)
            .with_stride(2)
            .init(&device);
        assert_eq!(downsample.in_channels(), 2);
        assert_eq!(downsample.out_channels(), 4);
        assert_eq!(downsample.stride(), 2);

        // A projection shortcut carries its own trainable parameters.
        assert!(downsample.num_params() > 0);

        let tensor = Tensor::ones([batch_size, 2, 4, 8, 8], &device);
        let out = downsample.forward(tensor);

        assert_shape_contract!(
            ["batch", "out_channels", "out_depth", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch_size),
                ("out_channels", 4),
                ("out_depth", 2),
                ("out_height", 4),
                ("out_width", 4)
            ]
        );
    }

    #[test]
    fn test_zero_pad_downsample() {
        type B = NdArray<f32>;
        let device = Default::default();

        let batch_size = 2;

        let downsample = ZeroPadDownsampleConfig::new(2, 5).with_stride(2).init();
        assert_eq!(downsample.in_channels(), 2);
        assert_eq!(downsample.out_channels(), 5);
        assert_eq!(downsample.stride(), 2);

        // Stateless; contributes no trainable parameters.
        assert_eq!(downsample.num_params(), 0);

        let tensor: Tensor<B, 5> = Tensor::ones([batch_size, 2, 4, 8, 8], &device);
        let out = downsample.forward(tensor);

        assert_shape_contract!(
            ["batch", "out_channels", "out_depth", "out_height", "out_width"],
            &out,
            &[
                ("batch", batch_size),
                ("out_channels", 5),
                ("out_depth", 2),
                ("out_height", 4),
                ("out_width", 4)
            ]
        );

        // Carried channels pass through untouched; padded channels are zero.
        let carried = out.clone().narrow(1, 0, 2);
        let padded = out.narrow(1, 2, 3);

        let cells = (batch_size * 2 * 2 * 4 * 4) as f32;
        let carried_sum: f32 = carried.sum().into_scalar();
        assert_eq!(carried_sum, cells);

        let padded_sum: f32 = padded.abs().sum().into_scalar();
        assert_eq!(padded_sum, 0.0);
    }

    #[test]
    #[should_panic(expected = "out_channels (2) < in_channels (4)")]
    fn test_zero_pad_downsample_narrowing_panics() {
        ZeroPadDownsampleConfig::new(4, 2).init();
    }

    #[test]
    fn test_for_block() {
        let norm = NormalizationConfig::Batch(BatchNormConfig::new(0));

        // Matching shapes need no transform.
        assert!(
            DownsampleConfig::for_block(ShortcutStrategy::Projection, 16, 16, 1, norm.clone())
                .is_none()
        );

        let config =
            DownsampleConfig::for_block(ShortcutStrategy::Projection, 16, 32, 2, norm.clone())
                .unwrap();
        assert!(matches!(config, DownsampleConfig::Conv(_)));
        assert_eq!(config.in_channels(), 16);
        assert_eq!(config.out_channels(), 32);
        assert_eq!(config.stride(), 2);

        let config =
            DownsampleConfig::for_block(ShortcutStrategy::ZeroPad, 16, 32, 2, norm).unwrap();
        assert!(matches!(config, DownsampleConfig::ZeroPad(_)));
        assert_eq!(config.stride(), 2);
    }
}
