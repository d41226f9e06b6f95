//! Run a headless ResNet-18 backbone over a random clip and print the
//! pooled feature shape.

use bvmm::models::resnet::{ShortcutStrategy, resnet18};
use burn::backend::NdArray;
use burn::prelude::Tensor;
use burn::tensor::Distribution;

fn main() {
    type B = NdArray<f32>;
    let device = Default::default();

    let model = resnet18()
        .with_sample_size(64)
        .with_sample_duration(16)
        .with_shortcut(ShortcutStrategy::ZeroPad)
        .with_classifier(false)
        .init::<B>(&device);

    let clip = Tensor::<B, 5>::random([1, 3, 16, 64, 64], Distribution::Default, &device);
    let features = model.forward(clip);

    println!("features: {:?}", features.dims());
}
