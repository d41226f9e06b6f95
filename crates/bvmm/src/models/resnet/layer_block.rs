//! # `ResNet` Layer Block
//!
//! A [`LayerBlock`] is one stage of the model: an ordered sequence of
//! [`ResidualBlock`]s sharing an output width. Only the first block of a
//! stage may change the channel count or the stride; every later block
//! preserves shape.
//!
//! [`LayerBlockMeta`] defines a common meta API for [`LayerBlock`]
//! and [`LayerBlockConfig`].

use crate::compat::activation_wrapper::ActivationConfig;
use crate::compat::normalization_wrapper::NormalizationConfig;
use crate::models::resnet::basic_block::BASIC_EXPANSION;
use crate::models::resnet::bottleneck_block::BOTTLENECK_EXPANSION;
use crate::models::resnet::downsample::ShortcutStrategy;
use crate::models::resnet::residual_block::{
    ResidualBlock, ResidualBlockConfig, ResidualBlockMeta,
};
use crate::models::resnet::util::stride_div_output_size;
use bimm_contracts::{assert_shape_contract_periodically, unpack_shape_contract};
use burn::prelude::{Backend, Config, Module, Tensor};

/// [`LayerBlock`] Meta API.
pub trait LayerBlockMeta {
    /// The number of blocks.
    fn len(&self) -> usize;

    /// Check if the layer block is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of input feature planes.
    fn in_planes(&self) -> usize;

    /// The number of output feature planes.
    fn out_planes(&self) -> usize;

    /// Get the effective stride of the stage.
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

/// [`LayerBlock`] Configuration.
#[derive(Config, Debug)]
pub struct LayerBlockConfig {
    /// The component blocks.
    pub blocks: Vec<ResidualBlockConfig>,
}

impl From<Vec<ResidualBlockConfig>> for LayerBlockConfig {
    fn from(blocks: Vec<ResidualBlockConfig>) -> Self {
        Self { blocks }
    }
}

impl LayerBlockMeta for LayerBlockConfig {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl LayerBlockConfig {
    /// Build a stage config.
    ///
    /// The first block adapts `in_planes` and applies `stride`;
    /// every following block preserves shape.
    ///
    /// # Arguments
    ///
    /// - `num_blocks`: blocks in the stage.
    /// - `in_planes`: stage input channel count.
    /// - `planes`: nominal stage width; bottleneck blocks expand it by 4.
    /// - `stride`: stride of the first block.
    /// - `bottleneck`: select bottleneck block form.
    pub fn build(
        num_blocks: usize,
        in_planes: usize,
        planes: usize,
        stride: usize,
        bottleneck: bool,
    ) -> Self {
        let expansion = if bottleneck {
            BOTTLENECK_EXPANSION
        } else {
            BASIC_EXPANSION
        };

        let blocks = (0..num_blocks)
            .map(|b| {
                if b == 0 {
                    ResidualBlockConfig::build(in_planes, planes, stride, bottleneck)
                } else {
                    ResidualBlockConfig::build(planes * expansion, planes, 1, bottleneck)
                }
            })
            .collect();

        Self { blocks }
    }

    /// Check if the config is valid.
    ///
    /// # Returns
    ///
    /// A `Result<(), String>`
    pub fn try_validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("blocks is empty".to_string());
        }

        for idx in 1..self.blocks.len() {
            let prev = &self.blocks[idx - 1];
            let curr = &self.blocks[idx];
            if prev.out_planes() != curr.in_planes() {
                return Err(format!(
                    "block[{}].out_planes({}) != block[{}].in_planes({})\n{:#?}",
                    idx - 1,
                    prev.out_planes(),
                    idx,
                    curr.in_planes(),
                    self,
                ));
            }
            if curr.stride() != 1 {
                return Err(format!(
                    "block[{}] has stride {}; only the first block of a stage may stride\n{:#?}",
                    idx,
                    curr.stride(),
                    self,
                ));
            }
        }
        Ok(())
    }

    /// Panic if `try_validate` returns an error.
    pub fn expect_valid(&self) {
        match self.try_validate() {
            Ok(_) => (),
            Err(err) => panic!("{}", err),
        }
    }

    /// Apply a mapping over the blocks.
    pub fn map_blocks<F>(
        self,
        f: &mut F,
    ) -> Self
    where
        F: FnMut(usize, ResidualBlockConfig) -> ResidualBlockConfig,
    {
        Self {
            blocks: self
                .blocks
                .into_iter()
                .enumerate()
                .map(|(idx, block)| f(idx, block))
                .collect(),
        }
    }

    /// Set the shortcut strategy on every block.
    pub fn with_shortcut(
        self,
        shortcut: ShortcutStrategy,
    ) -> Self {
        self.map_blocks(&mut |_, block| block.with_shortcut(shortcut))
    }

    /// Set the normalization config on every block.
    pub fn with_normalization(
        self,
        normalization: NormalizationConfig,
    ) -> Self {
        self.map_blocks(&mut |_, block| block.with_normalization(normalization.clone()))
    }

    /// Set the activation config on every block.
    pub fn with_activation(
        self,
        activation: ActivationConfig,
    ) -> Self {
        self.map_blocks(&mut |_, block| block.with_activation(activation.clone()))
    }

    /// Initialize a new [`LayerBlock`].
    pub fn init<B: Backend>(
        self,
        device: &B::Device,
    ) -> LayerBlock<B> {
        self.expect_valid();

        LayerBlock {
            blocks: self
                .blocks
                .into_iter()
                .map(|block| block.init(device))
                .collect(),
        }
    }
}

/// Layer block.
#[derive(Module, Debug)]
pub struct LayerBlock<B: Backend> {
    /// Internal blocks.
    pub blocks: Vec<ResidualBlock<B>>,
}

impl<B: Backend> LayerBlockMeta for LayerBlock<B> {
    fn len(&self) -> usize {
        self.blocks.len()
    }

    fn in_planes(&self) -> usize {
        self.blocks[0].in_planes()
    }

    fn out_planes(&self) -> usize {
        self.blocks[self.blocks.len() - 1].out_planes()
    }

    fn stride(&self) -> usize {
        self.blocks
            .iter()
            .fold(1, |acc, block| acc * block.stride())
    }
}

impl<B: Backend> LayerBlock<B> {
    /// Apply the layer block.
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

        let x = self.blocks.iter().fold(input, |x, block| block.forward(x));

        assert_shape_contract_periodically!(
            ["batch", "out_planes", "out_depth", "out_height", "out_width"],
            &x,
            &[
                ("batch", batch),
                ("out_planes", self.out_planes()),
                ("out_depth", out_depth),
                ("out_height", out_height),
                ("out_width", out_width)
            ],
        );

        x
    }
}
