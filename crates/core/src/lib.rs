pub mod attrs;
pub mod device;
pub mod graph;
pub mod indexed;
pub mod node;
pub mod op;
pub mod pass;
