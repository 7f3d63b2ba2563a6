pub mod node;
pub mod protocol;
pub mod utils;

pub use node::{is_proxy_node, node_from_chains, DIRECT_NODE};
pub use utils::format_bytes;
