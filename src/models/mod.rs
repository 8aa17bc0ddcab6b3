pub mod audit;
pub mod document;
pub mod enums;
pub mod evidence;
pub mod filters;
pub mod record;
pub mod verdict;

pub use audit::*;
pub use document::*;
pub use enums::*;
pub use evidence::*;
pub use filters::*;
pub use record::*;
pub use verdict::*;
