//! Multi-strategy element resolution with a self-healing selector
//! cache.
//!
//! Resolution tries strategies in decreasing confidence order:
//! structural selector, accessibility role/name, visible text, and
//! finally model-guided vision coordinates. Handle wins leave a
//! durable selector in the cache so the next resolution of the same
//! query is a single verified lookup.

pub mod cache;
pub mod errors;
pub mod resolver;
pub mod strategies;
pub mod types;
pub mod vision;

pub use cache::{HealingResolver, SelectorCache};
pub use errors::LocatorError;
pub use resolver::{ElementResolver, FallbackResolver, LocatorConfig};
pub use types::{ElementQuery, LocatorStrategy, ResolvedElement, ResolvedTarget};
pub use vision::{rescale_to_viewport, VisionHit, VisionLocator};
