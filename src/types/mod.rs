/// The 32-byte Sui account address type.
pub mod address;
/// Transaction digests, the correlation keys of the sponsorship protocol.
pub mod digest;
/// `package::module::function` Move call targets.
pub mod move_target;
/// On-chain object identifiers and references.
pub mod object;

pub use address::SuiAddress;
pub use digest::TransactionDigest;
pub use move_target::MoveCallTarget;
pub use object::{ObjectDigest, ObjectId, ObjectRef};
