pub mod bilateral;
pub mod camera;
pub mod error;
pub mod extract;
pub mod frame;
pub mod icp;
pub mod metrics;
pub mod optim;
pub mod pointcloud;
pub mod pose;
pub mod raycast;
pub mod tracker;
pub mod trajectory;
mod utils;
pub mod view;
pub mod volume;

pub use tracker::{KinFuParams, KinFuTracker};

#[cfg(test)]
pub(crate) mod unit_test;
