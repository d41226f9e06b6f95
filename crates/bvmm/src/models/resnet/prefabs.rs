//! # Named Model Recipes
//!
//! One constructor per named depth. Each returns a [`ResNetConfig`];
//! geometry, shortcut strategy, class count and head toggle are set with
//! the config's builder methods before `init`.

use crate::models::resnet::resnet_model::ResNetConfig;

/// ResNet-10 block depths.
pub const RESNET10_BLOCKS: [usize; 4] = [1, 1, 1, 1];
/// ResNet-18 block depths.
pub const RESNET18_BLOCKS: [usize; 4] = [2, 2, 2, 2];
/// ResNet-34 block depths.
pub const RESNET34_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// ResNet-50 block depths.
pub const RESNET50_BLOCKS: [usize; 4] = [3, 4, 6, 3];
/// ResNet-101 block depths.
pub const RESNET101_BLOCKS: [usize; 4] = [3, 4, 23, 3];
/// ResNet-152 block depths.
pub const RESNET152_BLOCKS: [usize; 4] = [3, 8, 36, 3];
/// ResNet-200 block depths.
pub const RESNET200_BLOCKS: [usize; 4] = [3, 24, 36, 3];

/// ResNet-10; basic blocks.
pub fn resnet10() -> ResNetConfig {
    ResNetConfig::new(RESNET10_BLOCKS)
}

/// ResNet-18; basic blocks.
pub fn resnet18() -> ResNetConfig {
    ResNetConfig::new(RESNET18_BLOCKS)
}

/// ResNet-34; basic blocks.
pub fn resnet34() -> ResNetConfig {
    ResNetConfig::new(RESNET34_BLOCKS)
}

/// ResNet-50; bottleneck blocks.
pub fn resnet50() -> ResNetConfig {
    ResNetConfig::new(RESNET50_BLOCKS).with_bottleneck(true)
}

/// ResNet-101; bottleneck blocks.
pub fn resnet101() -> ResNetConfig {
    ResNetConfig::new(RESNET101_BLOCKS).with_bottleneck(true)
}

/// ResNet-152; bottleneck blocks.
pub fn resnet152() -> ResNetConfig {
    ResNetConfig::new(RESNET152_BLOCKS).with_bottleneck(true)
}

/// ResNet-200; bottleneck blocks.
pub fn resnet200() -> ResNetConfig {
    ResNetConfig::new(RESNET200_BLOCKS).with_bottleneck(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hamcrest::prelude::*;

    #[test]
    fn test_basic_recipes() {
        for (config, blocks) in [
            (resnet10(), [1, 1, 1, 1]),
            (resnet18(), [2, 2, 2, 2]),
            (resnet34(), [3, 4, 6, 3]),
        ] {
            assert_that!(config.blocks, is(equal_to(blocks)));
            assert!(!config.bottleneck);
            assert_eq!(config.feature_planes(), 512);
        }
    }

    #[test]
    fn test_bottleneck_recipes() {
        for (config, blocks) in [
            (resnet50(), [3, 4, 6, 3]),
            (resnet101(), [3, 4, 23, 3]),
            (resnet152(), [3, 8, 36, 3]),
            (resnet200(), [3, 24, 36, 3]),
        ] {
            assert_that!(config.blocks, is(equal_to(blocks)));
            assert!(config.bottleneck);
            assert_eq!(config.feature_planes(), 2048);
        }
    }
}
