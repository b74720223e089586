mod maps;
pub use maps::{compute_normals, create_vertex_map, transform_maps};

mod pyramid;
pub use pyramid::{pyr_down, truncate_depth, FramePyramid, LEVELS};

mod resize;
pub use resize::{resize_nmap, resize_vmap};
