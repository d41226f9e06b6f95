#![warn(missing_docs)]
//!# bvmm - Burn Video Models
//!
//! Volumetric convolutional networks over spatiotemporal input
//! ``[batch, channels, depth, height, width]``, for use as
//! feature-extraction backbones in detection/tracking systems.
//!
//! ## Notable Components
//!
//! * [`compat`] - compat code, wrapping or papering over ``burn`` layer APIs.
//!   * [`compat::activation_wrapper::Activation`] - activation layer abstraction wrapper.
//!   * [`compat::normalization_wrapper::Normalization`] - norm layer abstraction wrapper.
//! * [`layers`] - reusable neural network modules.
//!   * [`layers::blocks::cna`] - ``Conv3d + Norm + Act`` block.
//!   * [`layers::pool`] - volumetric pooling built from 2d pooling primitives.
//! * [`models`] - complete model families.
//!   * [`models::resnet`] - the volumetric `ResNet` family.

/// Test-only macro import.
#[cfg(test)]
#[allow(unused_imports)]
#[macro_use]
extern crate hamcrest;

pub mod compat;
pub mod layers;
pub mod models;
