mod icp_params;
pub use icp_params::IcpParams;

mod estimate;
pub use estimate::accumulate_step;

mod frame_icp;
pub use frame_icp::FrameToModelIcp;
