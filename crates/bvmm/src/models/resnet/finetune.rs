//! # Staged Fine-Tuning Parameter Selection
//!
//! Transfer-learning on this model family typically re-trains the later
//! stages while freezing the early ones. [`ResNet::fine_tuning_groups`]
//! partitions the model parameters into groups tagged with a
//! learning-rate multiplier, ready for an external optimizer.

use crate::models::resnet::resnet_model::ResNet;
use burn::module::{Module, ModuleVisitor, ParamId};
use burn::prelude::{Backend, Tensor};
use burn::tensor::{Bool, Int};

/// A set of parameters sharing a learning-rate multiplier.
#[derive(Debug, Clone)]
pub struct FineTuneGroup {
    /// Learning-rate multiplier for the group; 0.0 freezes it.
    pub lr_scale: f64,

    /// The ids of the parameters in the group.
    pub params: Vec<ParamId>,
}

struct ParamIdCollector {
    ids: Vec<ParamId>,
}

impl<B: Backend> ModuleVisitor<B> for ParamIdCollector {
    fn visit_float<const D: usize>(
        &mut self,
        id: ParamId,
        _tensor: &Tensor<B, D>,
    ) {
        self.ids.push(id);
    }

    fn visit_int<const D: usize>(
        &mut self,
        id: ParamId,
        _tensor: &Tensor<B, D, Int>,
    ) {
        self.ids.push(id);
    }

    fn visit_bool<const D: usize>(
        &mut self,
        id: ParamId,
        _tensor: &Tensor<B, D, Bool>,
    ) {
        self.ids.push(id);
    }
}

/// Collect the ids of every parameter tensor in a module.
pub fn collect_param_ids<B: Backend, M: Module<B>>(module: &M) -> Vec<ParamId> {
    let mut collector = ParamIdCollector { ids: Vec::new() };
    module.visit(&mut collector);
    collector.ids
}

impl<B: Backend> ResNet<B> {
    /// Partition the model parameters for staged fine-tuning.
    ///
    /// Stages at or after `begin_stage` (1-based), plus the classifier
    /// head, keep the default learning rate; the stem and every earlier
    /// stage get a multiplier of 0.0. Every parameter lands in exactly
    /// one group.
    ///
    /// # Arguments
    ///
    /// - `begin_stage`: first trainable stage, `1..=4`;
    ///   `0` returns all parameters in a single default-rate group;
    ///   values above 4 leave only the head trainable.
    ///
    /// # Returns
    ///
    /// A list of [`FineTuneGroup`]s, consumable by an external optimizer.
    pub fn fine_tuning_groups(
        &self,
        begin_stage: usize,
    ) -> Vec<FineTuneGroup> {
        if begin_stage == 0 {
            return vec![FineTuneGroup {
                lr_scale: 1.0,
                params: collect_param_ids(self),
            }];
        }

        let mut trainable: Vec<ParamId> = Vec::new();
        let mut frozen: Vec<ParamId> = collect_param_ids(&self.stem);

        let stages = [
            collect_param_ids(&self.layer1),
            collect_param_ids(&self.layer2),
            collect_param_ids(&self.layer3),
            collect_param_ids(&self.layer4),
        ];
        for (idx, params) in stages.into_iter().enumerate() {
            if idx + 1 >= begin_stage {
                trainable.extend(params);
            } else {
                frozen.extend(params);
            }
        }

        if let Some(fc) = &self.fc {
            trainable.extend(collect_param_ids(fc));
        }

        tracing::debug!(
            begin_stage,
            trainable = trainable.len(),
            frozen = frozen.len(),
            "partitioned parameters for fine-tuning"
        );

        vec![
            FineTuneGroup {
                lr_scale: 1.0,
                params: trainable,
            },
            FineTuneGroup {
                lr_scale: 0.0,
                params: frozen,
            },
        ]
    }
}
