//! # Compat wrappers over `burn::nn` layer families.
//!
//! ``burn`` ships norm and activation layers as distinct types with no
//! common trait; the wrappers here give model configs a single abstract
//! slot for each concern.

pub mod activation_wrapper;
pub mod normalization_wrapper;
