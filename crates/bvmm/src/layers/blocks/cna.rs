//! # `CNA3d` - conv/norm/activation block.
//!
//! A [`CNA3d`] module is:
//! * a [`Conv3d`] layer,
//! * a [`Normalization`] layer,
//! * a [`Activation`] layer.
//!
//! With support for hooking the forward method,
//! to run code between the norm and activation layers.

use crate::compat::activation_wrapper::{Activation, ActivationConfig};
use crate::compat::normalization_wrapper::{Normalization, NormalizationConfig};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::conv::{Conv3d, Conv3dConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// Abstract policy for [`CNA3d`] Config.
///
/// Defines a [`NormalizationConfig`] and [`ActivationConfig`],
/// and can be lifted to a [`CNA3dConfig`] to match a [`Conv3dConfig`].
#[derive(Config, Debug)]
pub struct AbstractCNA3dConfig {
    /// The [`Normalization`] config.
    pub norm: NormalizationConfig,

    /// Activation Config.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,
}

impl AbstractCNA3dConfig {
    /// Merge with a [`Conv3dConfig`] to construct a [`CNA3dConfig`].
    ///
    /// The abstract [`NormalizationConfig`] will be feature matched
    /// with the target [`Conv3dConfig`], resulting in a normalization
    /// layer sized appropriately for the input convolution.
    pub fn build_config(
        &self,
        conv: Conv3dConfig,
    ) -> CNA3dConfig {
        CNA3dConfig {
            conv,
            norm: self.norm.clone(),
            act: self.act.clone(),
        }
        .match_norm_features()
    }
}

/// [`CNA3d`] Meta.
pub trait CNA3dMeta {
    /// Number of input channels.
    fn in_channels(&self) -> usize;

    /// Number of output channels.
    fn out_channels(&self) -> usize;

    /// Get the stride, as ``[depth, height, width]``.
    fn stride(&self) -> [usize; 3];
}

/// [`CNA3d`] Config.
///
/// Implements [`CNA3dMeta`].
#[derive(Config, Debug)]
pub struct CNA3dConfig {
    /// The [`Conv3d`] config.
    pub conv: Conv3dConfig,

    /// The [`Normalization`] config.
    pub norm: NormalizationConfig,

    /// The [`Activation`] config.
    #[config(default = "ActivationConfig::Relu")]
    pub act: ActivationConfig,
}

impl CNA3dMeta for CNA3dConfig {
    fn in_channels(&self) -> usize {
        self.conv.channels[0]
    }

    fn out_channels(&self) -> usize {
        self.conv.channels[1]
    }

    fn stride(&self) -> [usize; 3] {
        self.conv.stride
    }
}

impl CNA3dConfig {
    /// Initialize a [`CNA3d`].
    ///
    /// Auto-matches the norm layer input channels
    /// to the conv layer's output channels.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> CNA3d<B> {
        let cfg = self.match_norm_features();
        CNA3d {
            conv: cfg.conv.init(device),
            norm: cfg.norm.init(device),
            act: cfg.act.init(device),
        }
    }

    /// Adjust the norm features to match the conv output size.
    ///
    /// [`CNA3dConfig::init`] does this automatically.
    pub fn match_norm_features(self) -> Self {
        let features = self.out_channels();
        let norm = self.norm.with_num_features(features);
        Self { norm, ..self }
    }
}

/// Sequenced conv/norm/activation block over volumetric tensors.
///
/// Implements [`CNA3dMeta`].
#[derive(Module, Debug)]
pub struct CNA3d<B: Backend> {
    /// Internal Conv3d layer.
    pub conv: Conv3d<B>,

    /// Internal Norm Layer.
    pub norm: Normalization<B>,

    /// Activation layer.
    pub act: Activation<B>,
}

impl<B: Backend> CNA3dMeta for CNA3d<B> {
    fn in_channels(&self) -> usize {
        self.conv.weight.shape().dims[1] * self.conv.groups
    }

    fn out_channels(&self) -> usize {
        self.conv.weight.shape().dims[0]
    }

    fn stride(&self) -> [usize; 3] {
        self.conv.stride
    }
}

impl<B: Backend> CNA3d<B> {
    /// Forward Pass.
    ///
    /// Applies the conv/norm/act layers in sequence.
    ///
    /// # Arguments
    ///
    /// - `input`: \
    ///   ``[batch, in_channels, in_depth=out_depth*stride.0, in_height=out_height*stride.1, in_width=out_width*stride.2]``.
    ///
    /// # Returns
    ///
    /// ``[batch, out_channels, out_depth, out_height, out_width]``
    pub fn forward(
        &self,
        input: Tensor<B, 5>,
    ) -> Tensor<B, 5> {
        self.hook_forward(input, |x| x)
    }

    /// Hooked Forward Pass.
    ///
    /// Applies the hook after normalization but before activation:
    ///
    /// ```rust,ignore
    /// let x = self.conv.forward(input);
    /// let x = self.norm.forward(x);
    /// let x = hook(x);
    /// let x = self.act.forward(x);
    /// return x
    /// ```
    pub fn hook_forward<F>(
        &self,
        input: Tensor<B, 5>,
        hook: F,
    ) -> Tensor<B, 5>
    where
        F: FnOnce(Tensor<B, 5>) -> Tensor<B, 5>,
    {
        let [batch, out_depth, out_height, out_width] = unpack_shape_contract!(
            [
                "batch",
                "in_channels",
                "in_depth" = "out_depth" * "depth_stride",
                "in_height" = "out_height" * "height_stride",
                "in_width" = "out_width" * "width_stride"
            ],
            &input,
            &["batch", "out_depth", "out_height", "out_width"],
            &[
                ("in_channels", self.in_channels()),
                ("depth_stride", self.stride()[0]),
                ("height_stride", self.stride()[1]),
                ("width_stride", self.stride()[2]),
            ]
        );

        let x = self.conv.forward(input);

        let x = self.norm.forward(x);

        let x = hook(x);

        let x = self.act.forward(x);

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
    use burn::backend::{Autodiff, NdArray};
    use burn::nn::{BatchNormConfig, PaddingConfig3d};
    use burn::tensor::Distribution;

    #[test]
    fn test_cna_config() {
        let abstract_config =
            AbstractCNA3dConfig::new(NormalizationConfig::Batch(BatchNormConfig::new(0)));

        let conv_config = Conv3dConfig::new([2, 4], [3, 3, 3])
            .with_stride([1, 2, 2])
            .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
            .with_bias(false);

        let config: CNA3dConfig = abstract_config.build_config(conv_config);

        assert_eq!(config.in_channels(), 2);
        assert_eq!(config.out_channels(), 4);
        assert_eq!(config.stride(), [1, 2, 2]);
        assert_eq!(config.norm.num_features(), 4);
    }

    #[test]
    fn test_cna_forward() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let config = CNA3dConfig::new(
            Conv3dConfig::new([2, 4], [3, 3, 3])
                .with_stride([2, 2, 2])
                .with_padding(PaddingConfig3d::Explicit(1, 1, 1))
                .with_bias(false),
            NormalizationConfig::Batch(BatchNormConfig::new(0)),
        )
        .with_act(ActivationConfig::Relu);

        let layer: CNA3d<B> = config.init(&device);
        assert_eq!(layer.in_channels(), 2);
        assert_eq!(layer.out_channels(), 4);
        assert_eq!(layer.stride(), [2, 2, 2]);

        let input = Tensor::random([2, 2, 4, 6, 6], Distribution::Default, &device);

        {
            let output = layer.forward(input.clone());
            let expected = {
                let x = layer.conv.forward(input.clone());
                let x = layer.norm.forward(x);
                layer.act.forward(x)
            };
            output.to_data().assert_eq(&expected.to_data(), true);
        }

        {
            let hook = |x| x * 2.0;

            let output = layer.hook_forward(input.clone(), hook);
            let expected = {
                let x = layer.conv.forward(input.clone());
                let x = layer.norm.forward(x);
                let x = hook(x);
                layer.act.forward(x)
            };
            output.to_data().assert_eq(&expected.to_data(), true);
        }
    }
}
