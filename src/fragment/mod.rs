//! Reusable named fragments and resolution of `...name` references.

mod resolver;
mod store;

pub use resolver::{find_dependencies, references};
pub use store::FragmentStore;
