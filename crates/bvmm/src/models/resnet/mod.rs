//! # Volumetric `ResNet`
//!
//! A family of 3D convolutional residual networks over spatiotemporal
//! input, with named constructors from ResNet-10 through ResNet-200 and
//! staged fine-tuning support.

pub mod basic_block;
pub mod bottleneck_block;
pub mod downsample;
pub mod finetune;
pub mod layer_block;
pub mod prefabs;
pub mod residual_block;
pub mod resnet_model;
pub mod stem;
pub mod util;

pub use downsample::ShortcutStrategy;
pub use finetune::FineTuneGroup;
pub use prefabs::*;
pub use resnet_model::{ResNet, ResNetConfig};
