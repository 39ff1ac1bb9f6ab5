//! Monocular camera pose regression on top of tch.

pub mod common;
pub mod config;
pub mod data;
pub mod geometry;
pub mod model;
pub mod predict;
