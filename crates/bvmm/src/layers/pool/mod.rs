//! # Volumetric Pooling
//!
//! ``burn`` 0.18 ships 1d and 2d pooling only. The layers here lift the 2d
//! primitives to ``[batch, channels, depth, height, width]`` tensors by
//! pooling the spatial plane per frame, then the temporal axis per location.

pub mod avg_pool_3d;
pub mod max_pool_3d;

pub use avg_pool_3d::{AvgPool3d, AvgPool3dConfig};
pub use max_pool_3d::{MaxPool3d, MaxPool3dConfig};

/// Pooled output extent of one axis.
///
/// ``out = (extent + 2 * padding - kernel_size) / stride + 1``, rounded down.
pub(crate) fn pooled_extent(
    extent: usize,
    kernel_size: usize,
    stride: usize,
    padding: usize,
) -> usize {
    (extent + 2 * padding - kernel_size) / stride + 1
}
