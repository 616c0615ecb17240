// Layers, leaves first: geometry and observations feed the state store; cluster_layout,
// readiness and emit_controller decide what to compose; coalescer paces the passes; the
// compositor renders through image_ops.

pub mod cluster_layout;
pub mod coalescer;
pub mod compositor;
pub mod emit_controller;
pub mod geometry;
pub mod image_ops;
pub mod observation;
pub mod readiness;
pub mod state_store;
pub mod utils;
