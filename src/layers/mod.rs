pub mod base;
pub mod macros;
pub mod tile;

pub use base::{LayerAttachment, LayerContext, LayerId, LayerProperties, LayerTrait};
pub use tile::GridLayer;
