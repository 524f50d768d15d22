pub mod attention;
pub mod norm;
pub mod positional;
pub mod sdpa;
