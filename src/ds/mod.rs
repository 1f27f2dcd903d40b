pub mod router;
pub mod scored_list;

pub use router::ShardRouter;
pub use scored_list::{Node, ScoredList};
