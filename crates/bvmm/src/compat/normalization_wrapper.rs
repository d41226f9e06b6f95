//! # Normalization Wrapper
//!
//! Wraps the ``burn::nn`` norm layers that make sense over channel-first
//! volumetric input ``[batch, channels, depth, height, width]``:
//! * [`Batch`] - [`BatchNorm`], restricted to three spatial dims.
//! * [`Group`] - [`GroupNorm`]
//! * [`Instance`] - [`InstanceNorm`]
//!
//! The enum is non-exhaustive, to prepare for future additions.
//!
//! [`Batch`]: Normalization::Batch
//! [`Group`]: Normalization::Group
//! [`Instance`]: Normalization::Instance

use burn::nn::{
    BatchNorm, BatchNormConfig, GroupNorm, GroupNormConfig, InstanceNorm, InstanceNormConfig,
};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`Normalization`] Configuration.
#[derive(Config, Debug)]
#[non_exhaustive]
pub enum NormalizationConfig {
    /// [`BatchNorm`] Configuration.
    Batch(BatchNormConfig),

    /// [`GroupNorm`] Configuration.
    Group(GroupNormConfig),

    /// [`InstanceNorm`] Configuration.
    Instance(InstanceNormConfig),
}

impl From<BatchNormConfig> for NormalizationConfig {
    fn from(config: BatchNormConfig) -> Self {
        Self::Batch(config)
    }
}

impl From<GroupNormConfig> for NormalizationConfig {
    fn from(config: GroupNormConfig) -> Self {
        Self::Group(config)
    }
}

impl From<InstanceNormConfig> for NormalizationConfig {
    fn from(config: InstanceNormConfig) -> Self {
        Self::Instance(config)
    }
}

impl NormalizationConfig {
    /// Initialize a [`Normalization`] layer.
    pub fn init<B: Backend>(
        &self,
        device: &B::Device,
    ) -> Normalization<B> {
        match self {
            NormalizationConfig::Batch(config) => config.init(device).into(),
            NormalizationConfig::Group(config) => config.init(device).into(),
            NormalizationConfig::Instance(config) => config.init(device).into(),
        }
    }

    /// Adjust a norm config to the feature size.
    pub fn with_num_features(
        self,
        num_features: usize,
    ) -> Self {
        match self {
            NormalizationConfig::Batch(config) => BatchNormConfig {
                num_features,
                ..config
            }
            .into(),
            NormalizationConfig::Group(config) => GroupNormConfig {
                num_channels: num_features,
                ..config
            }
            .into(),
            NormalizationConfig::Instance(config) => InstanceNormConfig {
                num_channels: num_features,
                ..config
            }
            .into(),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            NormalizationConfig::Batch(config) => config.num_features,
            NormalizationConfig::Group(config) => config.num_channels,
            NormalizationConfig::Instance(config) => config.num_channels,
        }
    }
}

/// Normalization Layer Wrapper.
///
/// All wrapped layers initialize their scale to 1 and their shift to 0,
/// and preserve the rank and shape of their input.
#[derive(Module, Debug)]
#[non_exhaustive]
pub enum Normalization<B: Backend> {
    /// [`BatchNorm`] layer over three spatial dims.
    Batch(BatchNorm<B, 3>),

    /// [`GroupNorm`] layer.
    Group(GroupNorm<B>),

    /// [`InstanceNorm`] layer.
    Instance(InstanceNorm<B>),
}

impl<B: Backend> From<BatchNorm<B, 3>> for Normalization<B> {
    fn from(layer: BatchNorm<B, 3>) -> Self {
        Self::Batch(layer)
    }
}

impl<B: Backend> From<GroupNorm<B>> for Normalization<B> {
    fn from(layer: GroupNorm<B>) -> Self {
        Self::Group(layer)
    }
}

impl<B: Backend> From<InstanceNorm<B>> for Normalization<B> {
    fn from(layer: InstanceNorm<B>) -> Self {
        Self::Instance(layer)
    }
}

impl<B: Backend> Normalization<B> {
    /// Applies normalization to a tensor.
    ///
    /// The normalization contract depends upon the wrapped norm layer;
    /// the batch variant requires rank-5 input, the others accept any
    /// rank of at least 2. Output rank and shape match the input.
    pub fn forward<const D: usize>(
        &self,
        input: Tensor<B, D>,
    ) -> Tensor<B, D> {
        match self {
            Normalization::Batch(norm) => norm.forward(input),
            Normalization::Group(norm) => norm.forward(input),
            Normalization::Instance(norm) => norm.forward(input),
        }
    }

    /// Get the number of features.
    pub fn num_features(&self) -> usize {
        match self {
            Normalization::Batch(norm) => norm.gamma.shape().dims[0],
            Normalization::Group(norm) => norm.num_channels,
            Normalization::Instance(norm) => norm.num_channels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::{Autodiff, NdArray};

    #[test]
    fn test_num_features_rewrite() {
        let config: NormalizationConfig = BatchNormConfig::new(0).into();
        assert_eq!(config.num_features(), 0);

        let config = config.with_num_features(12);
        assert_eq!(config.num_features(), 12);

        let config: NormalizationConfig = GroupNormConfig::new(3, 6).into();
        assert_eq!(config.with_num_features(12).num_features(), 12);
    }

    #[test]
    fn test_batch_norm() {
        type B = Autodiff<NdArray<f32>>;
        let device = Default::default();

        let num_features = 12;
        let input: Tensor<B, 5> = Tensor::ones([2, num_features, 2, 3, 4], &device);

        let config: NormalizationConfig = BatchNormConfig::new(num_features).into();

        let layer: Normalization<B> = config.init(&device);
        assert_eq!(layer.num_features(), num_features);

        let expected = match &layer {
            Normalization::Batch(inner) => inner.forward(input.clone()),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_group_norm() {
        type B = NdArray<f32>;
        let device = Default::default();

        let num_features = 12;
        let input: Tensor<B, 5> = Tensor::ones([2, num_features, 2, 3, 4], &device);

        let config: NormalizationConfig = GroupNormConfig::new(3, num_features).into();

        let layer: Normalization<B> = config.init(&device);

        let expected = match &layer {
            Normalization::Group(inner) => inner.forward(input.clone()),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }

    #[test]
    fn test_instance_norm() {
        type B = NdArray<f32>;
        let device = Default::default();

        let num_features = 12;
        let input: Tensor<B, 5> = Tensor::ones([2, num_features, 2, 3, 4], &device);

        let config: NormalizationConfig = InstanceNormConfig::new(num_features).into();

        let layer: Normalization<B> = config.init(&device);

        let expected = match &layer {
            Normalization::Instance(inner) => inner.forward(input.clone()),
            _ => panic!("Unexpected layer type"),
        };

        let output = layer.forward(input);

        output.to_data().assert_eq(&expected.to_data(), true);
    }
}
