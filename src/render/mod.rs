pub mod backend;
pub mod controller;
pub mod frame;
pub mod gpu;
pub mod particles;
pub mod pipeline;
pub mod scheduler;
pub mod shader;
pub mod uniforms;
