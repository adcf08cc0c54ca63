pub mod change;
pub mod tree;


pub use change::{decode_change, transcode, ChangeOperation, ChangeRecord, RowImage};
pub use tree::{decode, Child, GenericNode};
