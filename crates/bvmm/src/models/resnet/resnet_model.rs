//! # Volumetric `ResNet` Core Model
//!
//! [`ResNetConfig`] implements [`Config`], and provides
//! [`ResNetConfig::init`] to initialize a [`ResNet`].
//!
//! [`ResNet`] implements [`Module`], and provides [`ResNet::forward`].
//!
//! The model consumes clips shaped
//! ``[batch, in_channels, duration, height, width]`` and produces either
//! class logits or a pooled feature vector, depending on whether the
//! classifier head is attached.

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::layers::pool::{AvgPool3d, AvgPool3dConfig};
use crate::models::resnet::basic_block::BASIC_EXPANSION;
use crate::models::resnet::bottleneck_block::BOTTLENECK_EXPANSION;
use crate::models::resnet::downsample::ShortcutStrategy;
use crate::models::resnet::layer_block::{LayerBlock, LayerBlockConfig, LayerBlockMeta};
use crate::models::resnet::stem::{ResNetStem, ResNetStemConfig};
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::nn::{BatchNormConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`ResNet`] model configuration.
///
/// The declared `sample_size` / `sample_duration` geometry sizes the head
/// pool so that a conforming input collapses to a single spatiotemporal
/// cell before the classifier.
#[derive(Config, Debug)]
pub struct ResNetConfig {
    /// Residual block depths for the four stages.
    pub blocks: [usize; 4],

    /// Use bottleneck blocks (expansion 4) instead of basic blocks.
    #[config(default = false)]
    pub bottleneck: bool,

    /// Declared input spatial extent (height and width).
    #[config(default = 112)]
    pub sample_size: usize,

    /// Declared input temporal extent (frames).
    #[config(default = 16)]
    pub sample_duration: usize,

    /// Residual shortcut strategy, applied to every block.
    #[config(default = "ShortcutStrategy::Projection")]
    pub shortcut: ShortcutStrategy,

    /// Number of classifier classes.
    #[config(default = 400)]
    pub num_classes: usize,

    /// Attach the classification head.
    ///
    /// Disable to use the model as a feature extractor.
    #[config(default = true)]
    pub classifier: bool,

    /// The number of input channels.
    #[config(default = 3)]
    pub in_channels: usize,

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

impl ResNetConfig {
    /// The channel expansion factor of the configured block form.
    pub fn expansion(&self) -> usize {
        if self.bottleneck {
            BOTTLENECK_EXPANSION
        } else {
            BASIC_EXPANSION
        }
    }

    /// The channel width of the pooled feature vector.
    pub fn feature_planes(&self) -> usize {
        512 * self.expansion()
    }

    /// Initialize a [`ResNet`] model.
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> ResNet<B> {
        let expansion = self.expansion();

        tracing::debug!(
            blocks = ?self.blocks,
            bottleneck = self.bottleneck,
            classifier = self.classifier,
            "initializing volumetric resnet"
        );

        let stem = ResNetStemConfig::new()
            .with_in_channels(self.in_channels)
            .with_normalization(self.normalization.clone())
            .with_activation(self.activation.clone());

        let blocks = self.blocks;
        let bottleneck = self.bottleneck;
        let shortcut = self.shortcut;
        let normalization = self.normalization.clone();
        let activation = self.activation.clone();

        let stage = |idx: usize, in_planes: usize, planes: usize, stride: usize| {
            LayerBlockConfig::build(blocks[idx], in_planes, planes, stride, bottleneck)
                .with_shortcut(shortcut)
                .with_normalization(normalization.clone())
                .with_activation(activation.clone())
        };

        let layer1 = stage(0, 64, 64, 1);
        let layer2 = stage(1, 64 * expansion, 128, 2);
        let layer3 = stage(2, 128 * expansion, 256, 2);
        let layer4 = stage(3, 256 * expansion, 512, 2);

        // The stem halves the duration once and quarters the spatial
        // extent; stages 2..4 halve both. A conforming sample therefore
        // reaches the head at duration/16 x size/32 x size/32, and this
        // kernel pools it to a single cell.
        let last_duration = self.sample_duration.div_ceil(16);
        let last_size = self.sample_size.div_ceil(32);
        let avgpool = AvgPool3dConfig::new([last_duration, last_size, last_size]);

        ResNet {
            stem: stem.init(device),

            layer1: layer1.init(device),
            layer2: layer2.init(device),
            layer3: layer3.init(device),
            layer4: layer4.init(device),

            avgpool: avgpool.init(),
            fc: if self.classifier {
                Some(LinearConfig::new(self.feature_planes(), self.num_classes).init(device))
            } else {
                None
            },
        }
    }
}

/// Volumetric `ResNet` model.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    /// Input stem.
    pub stem: ResNetStem<B>,

    /// First stage; width 64, stride 1.
    pub layer1: LayerBlock<B>,
    /// Second stage; width 128, stride 2.
    pub layer2: LayerBlock<B>,
    /// Third stage; width 256, stride 2.
    pub layer3: LayerBlock<B>,
    /// Fourth stage; width 512, stride 2.
    pub layer4: LayerBlock<B>,

    /// Head pooling.
    pub avgpool: AvgPool3d,

    /// Optional classifier head.
    pub fc: Option<Linear<B>>,
}

impl<B: Backend> ResNet<B> {
    /// The channel width of the pooled feature vector.
    pub fn feature_planes(&self) -> usize {
        self.layer4.out_planes()
    }

    /// The number of classifier classes, if the head is attached.
    pub fn num_classes(&self) -> Option<usize> {
        self.fc.as_ref().map(|fc| fc.weight.dims()[1])
    }

    /// The size of the forward output feature dimension.
    ///
    /// `num_classes` with the classifier head, `feature_planes` without.
    pub fn out_features(&self) -> usize {
        self.num_classes().unwrap_or_else(|| self.feature_planes())
    }

    /// `ResNet` forward pass.
    ///
    /// # Arguments
    ///
    /// - `input`: a ``[batch, in_channels, duration, height, width]``
    ///   tensor matching the declared sample geometry.
    ///
    /// # Returns
    ///
    /// A ``[batch, out_features]`` tensor: class logits when the
    /// classifier head is attached, pooled features otherwise.
    pub fn forward(
        &self,
        input: Tensor<B, 5>,
    ) -> Tensor<B, 2> {
        let [batch] = unpack_shape_contract!(
            ["batch", "in_channels", "duration", "height", "width"],
            &input,
            &["batch"],
            &[("in_channels", self.stem.in_channels())],
        );

        // Prep block
        let x = self.stem.forward(input);

        // Residual stages
        let x = self.layer1.forward(x);
        let x = self.layer2.forward(x);
        let x = self.layer3.forward(x);
        let x = self.layer4.forward(x);

        // Head
        let x = self.avgpool.forward(x);
        // Reshape [B, C, 1, 1, 1] -> [B, C]
        let x = x.flatten(1, 4);

        let out = match &self.fc {
            Some(fc) => fc.forward(x),
            None => x,
        };

        assert_shape_contract_periodically!(
            ["batch", "out_features"],
            &out,
            &[("batch", batch), ("out_features", self.out_features())]
        );

        out
    }

    /// Re-initialize the classifier head with the specified number of
    /// output classes, attaching one if the model was built without.
    pub fn with_classes(
        mut self,
        num_classes: usize,
    ) -> Self {
        let device = self.devices()[0].clone();
        self.fc = Some(LinearConfig::new(self.feature_planes(), num_classes).init(&device));
        self
    }
}
